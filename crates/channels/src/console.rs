//! Console connector: a minimal platform for local use and tests.
//!
//! Accepts `{"sender": {"id": ".."}, "message": {"text": ".."}}` or
//! `{"payload": ".."}`, or a batch of those under `"events"`. Replies are
//! collected on the context and exposed as a `{"replies": [..]}` response.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use {
    async_trait::async_trait,
    parley_common::RequestContext,
    parley_sessions::Session,
    serde_json::{Value, json},
    tracing::{debug, info},
};

use crate::{
    Error, Result,
    connector::Connector,
    context::{Context, ContextBase, ContextParams, Presence},
    event::Event,
};

pub const PLATFORM: &str = "console";

/// Session key used when a console event names no sender.
const DEFAULT_SENDER: &str = "1";

/// Presence indicators shown on a console.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceSignal {
    Seen,
    TypingOn,
    TypingOff,
}

/// Records presence signals so callers (and tests) can observe them.
#[derive(Debug, Default)]
pub struct ConsolePresence {
    session_key: String,
    log: Mutex<Vec<PresenceSignal>>,
}

impl ConsolePresence {
    pub fn signals(&self) -> Vec<PresenceSignal> {
        self.log
            .lock()
            .map(|log| log.clone())
            .unwrap_or_default()
    }

    fn record(&self, signal: PresenceSignal) {
        info!(session_key = %self.session_key, ?signal, "presence");
        if let Ok(mut log) = self.log.lock() {
            log.push(signal);
        }
    }
}

#[async_trait]
impl Presence for ConsolePresence {
    async fn mark_seen(&self) -> anyhow::Result<()> {
        self.record(PresenceSignal::Seen);
        Ok(())
    }

    async fn typing_on(&self) -> anyhow::Result<()> {
        self.record(PresenceSignal::TypingOn);
        Ok(())
    }

    async fn typing_off(&self) -> anyhow::Result<()> {
        self.record(PresenceSignal::TypingOff);
        Ok(())
    }
}

pub struct ConsoleContext {
    base: ContextBase,
    presence: Arc<ConsolePresence>,
    replies: Vec<String>,
    echo_to_stdout: bool,
}

impl ConsoleContext {
    /// Send a text reply.
    pub fn send_text(&mut self, text: impl Into<String>) {
        let text = text.into();
        if self.echo_to_stdout {
            println!("Bot > {text}");
        }
        self.replies.push(text);
        let body = json!({ "replies": self.replies }).to_string();
        self.response().update(|response| {
            response
                .headers
                .insert("content-type".into(), "application/json".into());
            response.body = Some(body);
        });
    }

    pub fn replies(&self) -> &[String] {
        &self.replies
    }

    pub fn console_presence(&self) -> Arc<ConsolePresence> {
        Arc::clone(&self.presence)
    }
}

impl Context for ConsoleContext {
    fn base(&self) -> &ContextBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ContextBase {
        &mut self.base
    }

    fn presence(&self) -> Option<Arc<dyn Presence>> {
        Some(Arc::clone(&self.presence) as Arc<dyn Presence>)
    }
}

/// Connector for the console platform.
#[derive(Debug, Clone, Default)]
pub struct ConsoleConnector {
    echo_to_stdout: bool,
    presence: Arc<Mutex<HashMap<String, Arc<ConsolePresence>>>>,
}

impl ConsoleConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also print every reply as `Bot > ..`, for the interactive console.
    pub fn with_stdout(mut self, echo: bool) -> Self {
        self.echo_to_stdout = echo;
        self
    }

    /// Presence log for a sender, shared by all of its contexts.
    pub fn presence_for(&self, session_key: &str) -> Arc<ConsolePresence> {
        let Ok(mut map) = self.presence.lock() else {
            return Arc::new(ConsolePresence::default());
        };
        Arc::clone(map.entry(session_key.to_string()).or_insert_with(|| {
            Arc::new(ConsolePresence {
                session_key: session_key.to_string(),
                log: Mutex::default(),
            })
        }))
    }

    fn sender_id(raw: &Value) -> String {
        match raw.pointer("/sender/id") {
            Some(Value::String(id)) => id.clone(),
            Some(Value::Number(id)) => id.to_string(),
            _ => DEFAULT_SENDER.to_string(),
        }
    }

    fn map_one(raw: &Value) -> Result<Event> {
        if !raw.is_object() {
            return Err(Error::invalid_input("console event must be a JSON object"));
        }
        if let Some(text) = raw.pointer("/message/text").and_then(Value::as_str) {
            return Ok(Event::text(raw.clone(), text));
        }
        if let Some(payload) = raw.get("payload").and_then(Value::as_str) {
            return Ok(Event::payload(raw.clone(), payload));
        }
        Ok(Event {
            message: raw.get("message").cloned(),
            ..Event::new(raw.clone())
        })
    }
}

#[async_trait]
impl Connector for ConsoleConnector {
    type Context = ConsoleContext;

    fn platform(&self) -> &str {
        PLATFORM
    }

    fn map_request_to_events(&self, body: &Value) -> Result<Vec<Event>> {
        match body.get("events") {
            Some(Value::Array(events)) => events.iter().map(Self::map_one).collect(),
            Some(_) => Err(Error::invalid_input("\"events\" must be an array")),
            None => Ok(vec![Self::map_one(body)?]),
        }
    }

    async fn unique_session_key(
        &self,
        _body: &Value,
        event: &Event,
        _request: Option<&RequestContext>,
    ) -> Result<Option<String>> {
        Ok(Some(Self::sender_id(&event.raw)))
    }

    async fn update_session(
        &self,
        session: &mut Session,
        _body: &Value,
        event: &Event,
    ) -> Result<()> {
        if session.get("user").is_none() {
            let id = Self::sender_id(&event.raw);
            debug!(sender = %id, "attaching console user to session");
            session.set("user", json!({ "id": id, "name": "you" }));
        }
        Ok(())
    }

    fn create_context(&self, params: ContextParams) -> ConsoleContext {
        let presence = self.presence_for(&Self::sender_id(&params.event.raw));
        ConsoleContext {
            base: ContextBase::new(params),
            presence,
            replies: Vec::new(),
            echo_to_stdout: self.echo_to_stdout,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use {super::*, rstest::rstest};

    #[rstest]
    #[case(json!({"sender": {"id": "7"}, "message": {"text": "hi"}}), true, false)]
    #[case(json!({"payload": "GET_STARTED"}), false, true)]
    #[case(json!({"message": {"sticker": 1}}), false, false)]
    fn maps_single_event(#[case] body: Value, #[case] is_text: bool, #[case] is_payload: bool) {
        let events = ConsoleConnector::new().map_request_to_events(&body).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].is_text(), is_text);
        assert_eq!(events[0].is_payload(), is_payload);
    }

    #[test]
    fn maps_event_batches_in_order() {
        let body = json!({"events": [
            {"message": {"text": "a"}},
            {"message": {"text": "b"}},
        ]});
        let events = ConsoleConnector::new().map_request_to_events(&body).unwrap();
        let texts: Vec<_> = events.iter().filter_map(|e| e.text.clone()).collect();
        assert_eq!(texts, vec!["a", "b"]);
    }

    #[test]
    fn rejects_non_objects() {
        let err = ConsoleConnector::new()
            .map_request_to_events(&json!("hello"))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput { .. }));
    }

    #[tokio::test]
    async fn session_key_defaults_to_one() {
        let connector = ConsoleConnector::new();
        let anonymous = Event::text(json!({"message": {"text": "x"}}), "x");
        let numbered = Event::text(json!({"sender": {"id": 42}}), "x");
        assert_eq!(
            connector
                .unique_session_key(&Value::Null, &anonymous, None)
                .await
                .unwrap()
                .as_deref(),
            Some("1")
        );
        assert_eq!(
            connector
                .unique_session_key(&Value::Null, &numbered, None)
                .await
                .unwrap()
                .as_deref(),
            Some("42")
        );
    }

    #[tokio::test]
    async fn update_session_keeps_existing_user() {
        let connector = ConsoleConnector::new();
        let event = Event::text(json!({"sender": {"id": "9"}}), "x");
        let mut session = Session::new();
        connector
            .update_session(&mut session, &Value::Null, &event)
            .await
            .unwrap();
        assert_eq!(session.get("user"), Some(&json!({"id": "9", "name": "you"})));

        session.set("user", json!({"id": "9", "name": "kim"}));
        connector
            .update_session(&mut session, &Value::Null, &event)
            .await
            .unwrap();
        assert_eq!(session.get("user").unwrap()["name"], json!("kim"));
    }

    #[test]
    fn replies_render_into_response() {
        let connector = ConsoleConnector::new();
        let mut ctx = connector.create_context(ContextParams {
            event: Event::text(json!({}), "hi"),
            session: None,
            initial_state: Default::default(),
            request: None,
        });
        let slot = ctx.response();
        ctx.send_text("one");
        ctx.send_text("two");

        let response = slot.get().unwrap();
        assert_eq!(response.status_code(), 200);
        let body: Value = serde_json::from_str(response.body.as_deref().unwrap()).unwrap();
        assert_eq!(body, json!({"replies": ["one", "two"]}));
    }

    #[tokio::test]
    async fn presence_is_shared_per_sender() {
        let connector = ConsoleConnector::new();
        let ctx = connector.create_context(ContextParams {
            event: Event::text(json!({"sender": {"id": "5"}}), "hi"),
            session: None,
            initial_state: Default::default(),
            request: None,
        });
        ctx.presence().unwrap().mark_seen().await.unwrap();
        assert_eq!(
            connector.presence_for("5").signals(),
            vec![PresenceSignal::Seen]
        );
    }
}
