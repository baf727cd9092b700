use std::{
    fs::{self, File, OpenOptions},
    io::{Read, Write},
    path::PathBuf,
};

use {async_trait::async_trait, fd_lock::RwLock, tracing::warn};

#[cfg(feature = "metrics")]
use parley_metrics::{counter, labels, session as session_metrics};

use crate::{
    Error, Result,
    session::{Session, now_ms},
    store::SessionStore,
};

/// One JSON file per session under `base_dir`, guarded by advisory file
/// locks so several processes can share a directory.
pub struct FileSessionStore {
    pub base_dir: PathBuf,
    /// Minutes of inactivity after which a session reads as missing.
    expires_in: Option<u64>,
}

impl FileSessionStore {
    pub fn new(base_dir: impl Into<PathBuf>, expires_in: Option<u64>) -> Self {
        Self {
            base_dir: base_dir.into(),
            expires_in: expires_in.filter(|m| *m > 0),
        }
    }

    /// File name for a session key. Every byte outside `[A-Za-z0-9-]` is
    /// percent-encoded, so distinct keys never share a file.
    pub fn key_to_filename(key: &str) -> String {
        let mut name = String::with_capacity(key.len());
        for byte in key.bytes() {
            if byte.is_ascii_alphanumeric() || byte == b'-' {
                name.push(char::from(byte));
            } else {
                name.push_str(&format!("%{byte:02X}"));
            }
        }
        name
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.base_dir
            .join(format!("{}.json", Self::key_to_filename(key)))
    }

    fn read_file(path: &PathBuf) -> Result<Option<Session>> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let lock = RwLock::new(file);
        let guard = lock
            .read()
            .map_err(|e| Error::lock_failed(e.to_string()))?;
        let mut raw = String::new();
        (&*guard).read_to_string(&mut raw)?;
        drop(guard);
        if raw.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(&raw)?))
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn init(&self) -> Result<()> {
        let dir = self.base_dir.clone();
        tokio::task::spawn_blocking(move || fs::create_dir_all(dir)).await??;
        Ok(())
    }

    async fn read(&self, key: &str) -> Result<Option<Session>> {
        let path = self.path_for(key);
        let expires_in = self.expires_in;

        #[cfg(feature = "metrics")]
        counter!(session_metrics::READS_TOTAL, labels::DRIVER => "file").increment(1);

        tokio::task::spawn_blocking(move || -> Result<Option<Session>> {
            match Self::read_file(&path) {
                Ok(session) => Ok(session.filter(|s| !s.is_expired(expires_in, now_ms()))),
                Err(Error::Json(e)) => {
                    warn!(path = %path.display(), error = %e, "ignoring malformed session file");
                    Ok(None)
                },
                Err(e) => Err(e),
            }
        })
        .await?
    }

    async fn write(&self, key: &str, session: &Session) -> Result<()> {
        let path = self.path_for(key);
        let mut session = session.clone();
        session.touch();
        let body = serde_json::to_vec(&session)?;

        tokio::task::spawn_blocking(move || -> Result<()> {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(false)
                .open(&path)?;
            let mut lock = RwLock::new(file);
            let mut guard = lock
                .write()
                .map_err(|e| Error::lock_failed(e.to_string()))?;
            guard.set_len(0)?;
            guard.write_all(&body)?;
            guard.sync_data()?;
            Ok(())
        })
        .await??;

        #[cfg(feature = "metrics")]
        counter!(session_metrics::WRITES_TOTAL, labels::DRIVER => "file").increment(1);

        Ok(())
    }

    async fn destroy(&self, key: &str) -> Result<()> {
        let path = self.path_for(key);
        tokio::task::spawn_blocking(move || -> Result<()> {
            match fs::remove_file(&path) {
                Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
                _ => Ok(()),
            }
        })
        .await?
    }

    async fn all(&self) -> Result<Vec<Session>> {
        let dir = self.base_dir.clone();
        let expires_in = self.expires_in;

        tokio::task::spawn_blocking(move || -> Result<Vec<Session>> {
            let entries = match fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(vec![]),
                Err(e) => return Err(e.into()),
            };
            let now = now_ms();
            let mut sessions = Vec::new();
            for entry in entries {
                let path = entry?.path();
                if path.extension().and_then(|e| e.to_str()) != Some("json") {
                    continue;
                }
                match Self::read_file(&path) {
                    Ok(Some(session)) if !session.is_expired(expires_in, now) => {
                        sessions.push(session);
                    },
                    Ok(_) => {},
                    Err(e) => warn!(path = %path.display(), error = %e, "skipping session file"),
                }
            }
            sessions.sort_by(|a, b| a.id().cmp(&b.id()));
            Ok(sessions)
        })
        .await?
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use {super::*, serde_json::json};

    fn session(key: &str) -> Session {
        let mut session = Session::new();
        session.ensure_identity("console", key);
        session
    }

    #[tokio::test]
    async fn round_trip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path().join("sessions"), None);
        store.init().await.unwrap();

        let mut s = session("1");
        s.set("_state", json!({"greeted": true}));
        store.write("console:1", &s).await.unwrap();

        assert!(dir.path().join("sessions/console%3A1.json").exists());
        let read = store.read("console:1").await.unwrap().unwrap();
        assert_eq!(read.id(), Some("console:1"));
        assert_eq!(read.get("_state"), Some(&json!({"greeted": true})));
        assert!(read.last_activity().is_some());
    }

    #[tokio::test]
    async fn shorter_rewrite_leaves_no_trailing_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path(), None);

        let mut s = session("1");
        s.set("blob", json!("x".repeat(256)));
        store.write("console:1", &s).await.unwrap();
        s.remove("blob");
        store.write("console:1", &s).await.unwrap();

        let read = store.read("console:1").await.unwrap().unwrap();
        assert!(read.get("blob").is_none());
    }

    #[tokio::test]
    async fn expired_sessions_read_as_missing() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path(), Some(1));

        let mut s = session("old");
        s.touch_at(now_ms() - 5 * 60_000);
        fs::write(
            dir.path().join("console%3Aold.json"),
            serde_json::to_vec(&s).unwrap(),
        )
        .unwrap();

        assert!(store.read("console:old").await.unwrap().is_none());
        assert!(store.all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_and_malformed_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path(), None);
        assert!(store.read("console:none").await.unwrap().is_none());

        fs::write(dir.path().join("console%3Abad.json"), b"{not json").unwrap();
        assert!(store.read("console:bad").await.unwrap().is_none());

        store.destroy("console:none").await.unwrap();
    }

    #[test]
    fn filenames_are_distinct_per_key() {
        let names: Vec<_> = ["console:a/b", "console:a\\b", "console:a_b", "console:a%2Fb"]
            .iter()
            .map(|k| FileSessionStore::key_to_filename(k))
            .collect();
        assert_eq!(names, vec![
            "console%3Aa%2Fb",
            "console%3Aa%5Cb",
            "console%3Aa%5Fb",
            "console%3Aa%252Fb",
        ]);
    }

    #[tokio::test]
    async fn lookalike_keys_do_not_share_a_session() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path(), None);

        let mut alice = session("a_b");
        alice.set("secret", json!("alice-only"));
        store.write("console:a_b", &alice).await.unwrap();

        assert!(store.read("console:a/b").await.unwrap().is_none());
        assert!(store.read("console:a\\b").await.unwrap().is_none());

        store.write("console:a/b", &session("a/b")).await.unwrap();
        let read = store.read("console:a_b").await.unwrap().unwrap();
        assert_eq!(read.id(), Some("console:a_b"));
        assert_eq!(read.get("secret"), Some(&json!("alice-only")));
        assert_eq!(store.all().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn all_lists_sorted_and_destroy_removes() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path(), None);
        for key in ["b", "a"] {
            store
                .write(&format!("console:{key}"), &session(key))
                .await
                .unwrap();
        }
        fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();

        let ids: Vec<_> = store
            .all()
            .await
            .unwrap()
            .iter()
            .filter_map(|s| s.id().map(str::to_string))
            .collect();
        assert_eq!(ids, vec!["console:a", "console:b"]);

        store.destroy("console:a").await.unwrap();
        assert_eq!(store.all().await.unwrap().len(), 1);
    }
}
