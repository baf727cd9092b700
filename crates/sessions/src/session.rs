use std::time::{SystemTime, UNIX_EPOCH};

use {
    serde::{Deserialize, Serialize},
    serde_json::{Map, Value},
};

/// Field names the session manages itself; user code cannot set them.
const RESERVED_FIELDS: &[&str] = &["id", "platform", "lastActivity"];

/// Build the store key / session id for a platform and a connector-provided
/// session key.
#[must_use]
pub fn session_id(platform: &str, session_key: &str) -> String {
    format!("{platform}:{session_key}")
}

/// Milliseconds since the Unix epoch.
#[must_use]
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or_default()
}

/// Persistent per-conversation state.
///
/// Serializes to a flat JSON object: `id`, `platform`, `lastActivity`, then
/// every user field. `id` and `platform` are filled once and never change.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Session {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    platform: Option<String>,
    #[serde(
        default,
        rename = "lastActivity",
        skip_serializing_if = "Option::is_none"
    )]
    last_activity: Option<u64>,
    #[serde(flatten)]
    fields: Map<String, Value>,
}

impl Session {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn platform(&self) -> Option<&str> {
        self.platform.as_deref()
    }

    pub fn last_activity(&self) -> Option<u64> {
        self.last_activity
    }

    /// Fill `id` and `platform` if they are still empty.
    ///
    /// Returns `true` when anything was filled. A session that already has an
    /// identity keeps it, even if the arguments differ.
    pub fn ensure_identity(&mut self, platform: &str, session_key: &str) -> bool {
        let mut filled = false;
        if self.id.is_none() {
            self.id = Some(session_id(platform, session_key));
            filled = true;
        }
        if self.platform.is_none() {
            self.platform = Some(platform.to_string());
            filled = true;
        }
        filled
    }

    /// Stamp `last_activity` with the current time.
    pub fn touch(&mut self) {
        self.touch_at(now_ms());
    }

    pub fn touch_at(&mut self, millis: u64) {
        self.last_activity = Some(millis);
    }

    /// Whether the session has been idle longer than `expires_in_minutes`.
    /// Sessions without activity never expire.
    #[must_use]
    pub fn is_expired(&self, expires_in_minutes: Option<u64>, now_ms: u64) -> bool {
        match (expires_in_minutes, self.last_activity) {
            (Some(minutes), Some(last)) if minutes > 0 => {
                last < now_ms.saturating_sub(minutes.saturating_mul(60_000))
            },
            _ => false,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Set a user field. Reserved fields are ignored and `false` is returned.
    pub fn set(&mut self, key: impl Into<String>, value: Value) -> bool {
        let key = key.into();
        if RESERVED_FIELDS.contains(&key.as_str()) {
            return false;
        }
        self.fields.insert(key, value);
        true
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.fields.remove(key)
    }

    /// User fields, without the managed ones.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use {super::*, serde_json::json};

    #[test]
    fn identity_is_set_once() {
        let mut session = Session::new();
        assert!(session.ensure_identity("console", "42"));
        assert_eq!(session.id(), Some("console:42"));
        assert_eq!(session.platform(), Some("console"));

        assert!(!session.ensure_identity("messenger", "7"));
        assert_eq!(session.id(), Some("console:42"));
        assert_eq!(session.platform(), Some("console"));
    }

    #[test]
    fn reserved_fields_cannot_be_set() {
        let mut session = Session::new();
        session.ensure_identity("console", "1");
        assert!(!session.set("id", json!("hijack")));
        assert!(!session.set("platform", json!("other")));
        assert!(session.set("user", json!({"name": "kim"})));
        assert_eq!(session.id(), Some("console:1"));
        assert_eq!(session.get("user"), Some(&json!({"name": "kim"})));
    }

    #[test]
    fn serializes_flat_with_camel_case_activity() {
        let mut session = Session::new();
        session.ensure_identity("console", "1");
        session.touch_at(1_000);
        session.set("_state", json!({"step": 2}));

        let value = serde_json::to_value(&session).unwrap();
        assert_eq!(
            value,
            json!({
                "id": "console:1",
                "platform": "console",
                "lastActivity": 1000,
                "_state": {"step": 2}
            })
        );

        let back: Session = serde_json::from_value(value).unwrap();
        assert_eq!(back, session);
    }

    #[test]
    fn expiry_is_measured_in_minutes() {
        let mut session = Session::new();
        assert!(!session.is_expired(Some(1), 10 * 60_000));

        session.touch_at(0);
        assert!(!session.is_expired(None, u64::MAX));
        assert!(!session.is_expired(Some(0), u64::MAX));
        assert!(!session.is_expired(Some(10), 10 * 60_000));
        assert!(session.is_expired(Some(10), 10 * 60_000 + 1));
    }
}
