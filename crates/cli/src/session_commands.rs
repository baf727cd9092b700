//! CLI commands for inspecting and clearing stored sessions.

use {anyhow::Result, clap::Subcommand, parley_sessions::SessionStore};

#[derive(Clone, Subcommand)]
pub enum SessionAction {
    /// List live sessions.
    List {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Print one session as JSON.
    Show {
        /// Session id, `<platform>:<key>`.
        id: String,
    },
    /// Delete sessions.
    Clear {
        /// Session id to delete.
        id: Option<String>,
        /// Delete every session.
        #[arg(long, conflicts_with = "id")]
        all: bool,
    },
}

pub async fn handle_sessions(action: SessionAction, store: &dyn SessionStore) -> Result<()> {
    store.init().await?;
    match action {
        SessionAction::List { json } => {
            let sessions = store.all().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&sessions)?);
            } else if sessions.is_empty() {
                println!("No sessions.");
            } else {
                for session in &sessions {
                    println!(
                        "  {}  last active {}",
                        session.id().unwrap_or("?"),
                        session
                            .last_activity()
                            .map(|ms| ms.to_string())
                            .unwrap_or_else(|| "never".into())
                    );
                }
            }
        },
        SessionAction::Show { id } => match store.read(&id).await? {
            Some(session) => println!("{}", serde_json::to_string_pretty(&session)?),
            None => anyhow::bail!("no session '{id}'"),
        },
        SessionAction::Clear { id, all } => {
            let ids = match (id, all) {
                (Some(id), _) => vec![id],
                (None, true) => store
                    .all()
                    .await?
                    .iter()
                    .filter_map(|s| s.id().map(str::to_string))
                    .collect(),
                (None, false) => anyhow::bail!("pass a session id or --all"),
            };
            for id in &ids {
                store.destroy(id).await?;
            }
            println!("Removed {} session(s).", ids.len());
        },
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use {
        super::*,
        parley_sessions::{FileSessionStore, Session},
    };

    async fn seeded(dir: &std::path::Path) -> FileSessionStore {
        let store = FileSessionStore::new(dir, None);
        for key in ["a", "b"] {
            let mut session = Session::new();
            session.ensure_identity("console", key);
            store.write(&format!("console:{key}"), &session).await.unwrap();
        }
        store
    }

    #[tokio::test]
    async fn clear_one_keeps_the_rest() {
        let dir = tempfile::tempdir().unwrap();
        let store = seeded(dir.path()).await;

        handle_sessions(
            SessionAction::Clear {
                id: Some("console:a".into()),
                all: false,
            },
            &store,
        )
        .await
        .unwrap();

        let left: Vec<_> = store
            .all()
            .await
            .unwrap()
            .iter()
            .filter_map(|s| s.id().map(str::to_string))
            .collect();
        assert_eq!(left, vec!["console:b"]);
    }

    #[tokio::test]
    async fn clear_all_empties_the_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = seeded(dir.path()).await;

        handle_sessions(
            SessionAction::Clear {
                id: None,
                all: true,
            },
            &store,
        )
        .await
        .unwrap();
        assert!(store.all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn show_unknown_session_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = seeded(dir.path()).await;
        let err = handle_sessions(SessionAction::Show { id: "console:z".into() }, &store)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("console:z"));
    }
}
