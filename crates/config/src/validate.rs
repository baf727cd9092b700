//! Configuration validation.
//!
//! Detects unknown or misspelled keys, type errors, and timer or routing
//! settings that parse fine but cannot behave the way they read.

use std::{
    collections::{HashMap, HashSet},
    path::{Path, PathBuf},
};

use crate::{
    loader::Format,
    schema::{ParleyConfig, SessionDriver},
};

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
            Self::Info => write!(f, "info"),
        }
    }
}

/// A single validation diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Category: "syntax", "unknown-field", "type-error", "timer", "routing",
    /// "session", "file-ref"
    pub category: &'static str,
    /// Dotted path, e.g. "channels.console.timer.mode"
    pub path: String,
    pub message: String,
}

/// Result of validating a configuration file.
#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
    pub config_path: Option<PathBuf>,
}

impl ValidationResult {
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }
}

// ── Schema tree for unknown-field detection ─────────────────────────────────

enum KnownKeys {
    Struct(HashMap<&'static str, KnownKeys>),
    /// Dynamic keys (channel names, initial state) whose values share a shape.
    Map(Box<KnownKeys>),
    Leaf,
}

fn build_schema_map() -> KnownKeys {
    use KnownKeys::{Leaf, Map, Struct};

    let timer = Struct(HashMap::from([
        ("enabled", Leaf),
        ("initial_duration", Leaf),
        ("extend_duration", Leaf),
        ("show_seen_before_end_ms", Leaf),
        ("show_typing_before_end_ms", Leaf),
        ("mode", Leaf),
        ("seen_always_after_first", Leaf),
    ]));

    let channel = Struct(HashMap::from([
        ("enabled", Leaf),
        ("path", Leaf),
        ("sync", Leaf),
        ("timer", timer),
    ]));

    Struct(HashMap::from([
        (
            "server",
            Struct(HashMap::from([("bind", Leaf), ("port", Leaf)])),
        ),
        (
            "session",
            Struct(HashMap::from([
                ("driver", Leaf),
                ("expires_in", Leaf),
                ("memory", Struct(HashMap::from([("max_size", Leaf)]))),
                ("file", Struct(HashMap::from([("dirname", Leaf)]))),
            ])),
        ),
        ("initial_state", Leaf),
        ("channels", Map(Box::new(channel))),
    ]))
}

/// Compute the Levenshtein edit distance between two strings.
fn levenshtein(a: &str, b: &str) -> usize {
    let b_len = b.chars().count();
    if a.is_empty() {
        return b_len;
    }
    if b.is_empty() {
        return a.chars().count();
    }

    let mut prev: Vec<usize> = (0..=b_len).collect();
    let mut curr = vec![0; b_len + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.chars().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b_len]
}

fn suggest<'a>(needle: &str, candidates: &[&'a str], max_distance: usize) -> Option<&'a str> {
    let mut best: Option<(&'a str, usize)> = None;
    for &candidate in candidates {
        let d = levenshtein(needle, candidate);
        if d > 0 && d <= max_distance && best.as_ref().is_none_or(|(_, bd)| d < *bd) {
            best = Some((candidate, d));
        }
    }
    best.map(|(s, _)| s)
}

// ── Core validation ─────────────────────────────────────────────────────────

/// Validate a config file at the given path, or the discovered one when
/// `path` is `None`.
#[must_use]
pub fn validate(path: Option<&Path>) -> ValidationResult {
    let config_path = path
        .map(Path::to_path_buf)
        .or_else(crate::loader::find_config_file);

    let Some(actual_path) = config_path else {
        return ValidationResult {
            diagnostics: vec![Diagnostic {
                severity: Severity::Info,
                category: "file-ref",
                path: String::new(),
                message: "no config file found; using defaults".into(),
            }],
            config_path: None,
        };
    };

    let is_toml = matches!(Format::of(&actual_path), Ok(Format::Toml));

    let mut result = if is_toml {
        match std::fs::read_to_string(&actual_path) {
            Ok(content) => validate_toml_str(&crate::env_subst::substitute_env(&content)),
            Err(e) => ValidationResult {
                diagnostics: vec![Diagnostic {
                    severity: Severity::Error,
                    category: "syntax",
                    path: String::new(),
                    message: format!("failed to read config file: {e}"),
                }],
                config_path: None,
            },
        }
    } else {
        // YAML and JSON skip unknown-field detection but still get type and
        // semantic checks.
        match crate::loader::load_config(&actual_path) {
            Ok(config) => {
                let mut diagnostics = Vec::new();
                check_semantic_warnings(&config, &mut diagnostics);
                ValidationResult {
                    diagnostics,
                    config_path: None,
                }
            },
            Err(e) => ValidationResult {
                diagnostics: vec![Diagnostic {
                    severity: Severity::Error,
                    category: "type-error",
                    path: String::new(),
                    message: format!("{e}"),
                }],
                config_path: None,
            },
        }
    };
    result.config_path = Some(actual_path);
    result
}

/// Validate a TOML string without touching the file system.
#[must_use]
pub fn validate_toml_str(toml_str: &str) -> ValidationResult {
    let mut diagnostics = Vec::new();

    let toml_value: toml::Value = match toml::from_str(toml_str) {
        Ok(v) => v,
        Err(e) => {
            diagnostics.push(Diagnostic {
                severity: Severity::Error,
                category: "syntax",
                path: String::new(),
                message: format!("TOML syntax error: {e}"),
            });
            return ValidationResult {
                diagnostics,
                config_path: None,
            };
        },
    };

    check_unknown_fields(&toml_value, &build_schema_map(), "", &mut diagnostics);

    match toml::from_str::<ParleyConfig>(toml_str) {
        Ok(config) => check_semantic_warnings(&config, &mut diagnostics),
        Err(e) => diagnostics.push(Diagnostic {
            severity: Severity::Error,
            category: "type-error",
            path: String::new(),
            message: format!("type error: {e}"),
        }),
    }

    ValidationResult {
        diagnostics,
        config_path: None,
    }
}

fn join_path(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

fn check_unknown_fields(
    value: &toml::Value,
    schema: &KnownKeys,
    prefix: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    match (value, schema) {
        (toml::Value::Table(table), KnownKeys::Struct(fields)) => {
            let known_keys: Vec<&str> = fields.keys().copied().collect();
            for (key, child_value) in table {
                let path = join_path(prefix, key);
                if let Some(child_schema) = fields.get(key.as_str()) {
                    check_unknown_fields(child_value, child_schema, &path, diagnostics);
                    continue;
                }
                let message = match suggest(key, &known_keys, 3) {
                    Some(s) => format!("unknown field (did you mean \"{s}\"?)"),
                    None => "unknown field".to_string(),
                };
                diagnostics.push(Diagnostic {
                    severity: Severity::Error,
                    category: "unknown-field",
                    path,
                    message,
                });
            }
        },
        (toml::Value::Table(table), KnownKeys::Map(value_schema)) => {
            for (key, child_value) in table {
                check_unknown_fields(
                    child_value,
                    value_schema,
                    &join_path(prefix, key),
                    diagnostics,
                );
            }
        },
        _ => {},
    }
}

fn check_semantic_warnings(config: &ParleyConfig, diagnostics: &mut Vec<Diagnostic>) {
    match config.session.driver {
        SessionDriver::Unknown => diagnostics.push(Diagnostic {
            severity: Severity::Warning,
            category: "session",
            path: "session.driver".into(),
            message: "unknown session driver; the memory store will be used".into(),
        }),
        SessionDriver::Memory if config.session.memory.max_size == 0 => {
            diagnostics.push(Diagnostic {
                severity: Severity::Error,
                category: "session",
                path: "session.memory.max_size".into(),
                message: "memory store capacity must be at least 1".into(),
            });
        },
        _ => {},
    }

    if config.channels.values().all(|c| !c.enabled) {
        diagnostics.push(Diagnostic {
            severity: Severity::Info,
            category: "routing",
            path: "channels".into(),
            message: "no channel is enabled; the server will only answer /health".into(),
        });
    }

    let mut seen_paths: HashSet<String> = HashSet::new();
    for (name, channel) in &config.channels {
        let base = format!("channels.{name}");
        if !channel.enabled {
            continue;
        }

        let webhook = channel.webhook_path(name);
        if !webhook.starts_with('/') {
            diagnostics.push(Diagnostic {
                severity: Severity::Error,
                category: "routing",
                path: format!("{base}.path"),
                message: format!("webhook path \"{webhook}\" must start with '/'"),
            });
        }
        if !seen_paths.insert(webhook.clone()) {
            diagnostics.push(Diagnostic {
                severity: Severity::Error,
                category: "routing",
                path: format!("{base}.path"),
                message: format!("webhook path \"{webhook}\" is used by another channel"),
            });
        }

        let timer = &channel.timer;
        if !timer.enabled {
            continue;
        }
        let timer_path = format!("{base}.timer");
        if timer.initial_duration == 0 {
            diagnostics.push(Diagnostic {
                severity: Severity::Warning,
                category: "timer",
                path: format!("{timer_path}.initial_duration"),
                message: "a zero-length window dispatches every message on its own".into(),
            });
        }
        for (key, offset) in [
            ("show_seen_before_end_ms", timer.show_seen_before_end_ms),
            ("show_typing_before_end_ms", timer.show_typing_before_end_ms),
        ] {
            if offset > timer.initial_duration {
                diagnostics.push(Diagnostic {
                    severity: Severity::Warning,
                    category: "timer",
                    path: format!("{timer_path}.{key}"),
                    message: format!(
                        "offset {offset}ms exceeds initial_duration {}ms; it fires as soon as a window opens",
                        timer.initial_duration
                    ),
                });
            }
        }
        if timer.seen_always_after_first && timer.show_seen_before_end_ms == 0 {
            diagnostics.push(Diagnostic {
                severity: Severity::Warning,
                category: "timer",
                path: format!("{timer_path}.seen_always_after_first"),
                message: "has no effect while show_seen_before_end_ms is 0".into(),
            });
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn categories(result: &ValidationResult) -> Vec<(&'static str, String)> {
        result
            .diagnostics
            .iter()
            .map(|d| (d.category, d.path.clone()))
            .collect()
    }

    #[test]
    fn levenshtein_basics() {
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("timer", "timer"), 0);
        assert_eq!(levenshtein("sever", "server"), 1);
    }

    #[test]
    fn misspelled_key_gets_suggestion() {
        let result = validate_toml_str("[sever]\nport = 1");
        let d = &result.diagnostics[0];
        assert_eq!(d.category, "unknown-field");
        assert_eq!(d.path, "sever");
        assert!(d.message.contains("\"server\""));
        assert!(result.has_errors());
    }

    #[test]
    fn unknown_timer_key_is_reported_under_channel() {
        let result = validate_toml_str(
            "[channels.console]\nenabled = true\n[channels.console.timer]\nmdoe = \"fixed\"",
        );
        assert!(
            categories(&result)
                .contains(&("unknown-field", "channels.console.timer.mdoe".into()))
        );
    }

    #[test]
    fn initial_state_accepts_any_keys() {
        let result = validate_toml_str(
            "[initial_state]\nstep = 1\nnested = { a = 1 }\n[channels.console]\nenabled = true",
        );
        assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
    }

    #[test]
    fn type_error_is_reported() {
        let result = validate_toml_str("[server]\nport = \"eighty\"");
        assert_eq!(result.count(Severity::Error), 1);
        assert_eq!(result.diagnostics[0].category, "type-error");
    }

    #[test]
    fn duplicate_webhook_paths_are_errors() {
        let result = validate_toml_str(
            r#"
            [channels.a]
            enabled = true
            path = "/hook"
            [channels.b]
            enabled = true
            path = "/hook"
            "#,
        );
        assert!(categories(&result).contains(&("routing", "channels.b.path".into())));
        assert!(result.has_errors());
    }

    #[test]
    fn presence_offset_longer_than_window_warns() {
        let result = validate_toml_str(
            r#"
            [channels.console]
            enabled = true
            [channels.console.timer]
            enabled = true
            initial_duration = 2000
            show_seen_before_end_ms = 7000
            show_typing_before_end_ms = 1000
            "#,
        );
        assert_eq!(result.count(Severity::Warning), 1);
        assert_eq!(
            result.diagnostics[0].path,
            "channels.console.timer.show_seen_before_end_ms"
        );
    }

    #[test]
    fn no_enabled_channel_is_informational() {
        let result = validate_toml_str("");
        assert_eq!(result.count(Severity::Info), 1);
        assert!(!result.has_errors());
    }

    #[test]
    fn unknown_driver_and_zero_capacity() {
        let unknown = validate_toml_str("[session]\ndriver = \"redis\"");
        assert!(categories(&unknown).contains(&("session", "session.driver".into())));

        let zero = validate_toml_str("[session.memory]\nmax_size = 0");
        assert!(zero.has_errors());
    }

    #[test]
    fn validate_reads_file_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("parley.toml");
        std::fs::write(&path, "[channels.console]\nenabled = true\n").unwrap();
        let result = validate(Some(&path));
        assert_eq!(result.config_path.as_deref(), Some(path.as_path()));
        assert!(result.diagnostics.is_empty());
    }
}
