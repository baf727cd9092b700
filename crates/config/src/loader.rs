use std::path::{Path, PathBuf};

use {anyhow::Context as _, tracing::debug};

use crate::{env_subst::substitute_env, schema::ParleyConfig};

/// File stem every config file shares.
const STEM: &str = "parley";

/// Supported config file formats, in discovery preference order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Toml,
    Yaml,
    Json,
}

impl Format {
    const ALL: [(Self, &'static str); 4] = [
        (Self::Toml, "toml"),
        (Self::Yaml, "yaml"),
        (Self::Yaml, "yml"),
        (Self::Json, "json"),
    ];

    /// Format for a path, by extension. Files without one are read as TOML.
    pub fn of(path: &Path) -> anyhow::Result<Self> {
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            return Ok(Self::Toml);
        };
        Self::ALL
            .iter()
            .find(|(_, e)| e.eq_ignore_ascii_case(ext))
            .map(|(format, _)| *format)
            .with_context(|| format!("unsupported config format: .{ext}"))
    }

    fn parse(self, raw: &str) -> anyhow::Result<ParleyConfig> {
        Ok(match self {
            Self::Toml => toml::from_str(raw)?,
            Self::Yaml => serde_yaml::from_str(raw)?,
            Self::Json => serde_json::from_str(raw)?,
        })
    }
}

/// Read, expand `${VAR}` placeholders, and parse one config file.
pub fn load_config(path: &Path) -> anyhow::Result<ParleyConfig> {
    let format = Format::of(path)?;
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    format
        .parse(&substitute_env(&raw))
        .with_context(|| format!("invalid config in {}", path.display()))
}

/// Load the first config file found in the working directory or the user
/// config dir.
///
/// No file means defaults: a bot with no channels still answers `/health`.
/// A file that exists but does not parse is an error, never silently
/// replaced by defaults.
pub fn discover_and_load() -> anyhow::Result<ParleyConfig> {
    match find_config_file() {
        Some(path) => {
            debug!(path = %path.display(), "loading config");
            load_config(&path)
        },
        None => {
            debug!("no config file found, using defaults");
            Ok(ParleyConfig::default())
        },
    }
}

/// Directories searched for a config file, highest priority first.
fn search_dirs() -> Vec<PathBuf> {
    let mut dirs = vec![PathBuf::from(".")];
    dirs.extend(config_dir());
    dirs
}

/// First `parley.<ext>` in `dirs`, trying every format in each directory
/// before moving on.
fn find_in(dirs: &[PathBuf]) -> Option<PathBuf> {
    dirs.iter()
        .flat_map(|dir| {
            Format::ALL
                .iter()
                .map(move |(_, ext)| dir.join(format!("{STEM}.{ext}")))
        })
        .find(|path| path.is_file())
}

pub(crate) fn find_config_file() -> Option<PathBuf> {
    find_in(&search_dirs())
}

/// The user-global config directory, e.g. `~/.config/parley/`.
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", STEM).map(|d| d.config_dir().to_path_buf())
}

/// The config file in use, or where `parley.toml` would go in the user
/// config dir.
pub fn find_or_default_config_path() -> PathBuf {
    find_config_file().unwrap_or_else(|| {
        config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(format!("{STEM}.toml"))
    })
}
