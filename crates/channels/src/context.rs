use std::sync::{Arc, Mutex};

use {
    async_trait::async_trait,
    parley_common::{RequestContext, Response},
    parley_sessions::Session,
    serde_json::{Map, Value},
    tracing::warn,
};

use crate::event::Event;

/// Session field holding the conversation state.
pub const STATE_FIELD: &str = "_state";

/// Shared handle to a context's response.
///
/// The orchestrator keeps a clone of the first context's slot so it can read
/// the response after the context itself moved into a lane.
#[derive(Debug, Clone, Default)]
pub struct ResponseSlot(Arc<Mutex<Option<Response>>>);

impl ResponseSlot {
    pub fn set(&self, response: Response) {
        if let Ok(mut slot) = self.0.lock() {
            *slot = Some(response);
        }
    }

    /// Apply `f` to the current response, creating a default one first.
    pub fn update(&self, f: impl FnOnce(&mut Response)) {
        if let Ok(mut slot) = self.0.lock() {
            f(slot.get_or_insert_with(Response::default));
        }
    }

    pub fn get(&self) -> Option<Response> {
        self.0.lock().ok().and_then(|slot| slot.clone())
    }
}

/// Platform-side presence indicators.
///
/// Held by timers independently of the context, so implementations carry
/// whatever client handle they need.
#[async_trait]
pub trait Presence: Send + Sync {
    fn supports_seen(&self) -> bool {
        true
    }

    fn supports_typing(&self) -> bool {
        true
    }

    async fn mark_seen(&self) -> anyhow::Result<()>;

    async fn typing_on(&self) -> anyhow::Result<()>;

    async fn typing_off(&self) -> anyhow::Result<()>;
}

/// Everything a connector needs to build a context for one event.
#[derive(Debug, Clone)]
pub struct ContextParams {
    pub event: Event,
    pub session: Option<Session>,
    pub initial_state: Map<String, Value>,
    pub request: Option<RequestContext>,
}

/// Fields shared by every platform context.
#[derive(Debug)]
pub struct ContextBase {
    event: Event,
    session: Option<Session>,
    initial_state: Map<String, Value>,
    state: Map<String, Value>,
    request: Option<RequestContext>,
    is_session_written: bool,
    response: ResponseSlot,
    errors: Vec<String>,
}

impl ContextBase {
    pub fn new(params: ContextParams) -> Self {
        let state = state_from(params.session.as_ref(), &params.initial_state);
        Self {
            event: params.event,
            session: params.session,
            initial_state: params.initial_state,
            state,
            request: params.request,
            is_session_written: false,
            response: ResponseSlot::default(),
            errors: Vec::new(),
        }
    }
}

fn state_from(session: Option<&Session>, initial: &Map<String, Value>) -> Map<String, Value> {
    session
        .and_then(|s| s.get(STATE_FIELD))
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_else(|| initial.clone())
}

/// A single event paired with its session.
///
/// Platform contexts embed a [`ContextBase`] and add their send/reply API.
#[async_trait]
pub trait Context: Send + Sync + 'static {
    fn base(&self) -> &ContextBase;

    fn base_mut(&mut self) -> &mut ContextBase;

    /// Presence capability, when the platform has one.
    fn presence(&self) -> Option<Arc<dyn Presence>> {
        None
    }

    /// Runs after the handler finished without error.
    async fn handler_did_end(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    fn event(&self) -> &Event {
        &self.base().event
    }

    fn request(&self) -> Option<&RequestContext> {
        self.base().request.as_ref()
    }

    fn session(&self) -> Option<&Session> {
        self.base().session.as_ref()
    }

    fn session_mut(&mut self) -> Option<&mut Session> {
        self.base_mut().session.as_mut()
    }

    fn session_id(&self) -> Option<&str> {
        self.session().and_then(Session::id)
    }

    /// Replace the session, re-deriving the state from it.
    fn replace_session(&mut self, session: Session) {
        let base = self.base_mut();
        base.state = state_from(Some(&session), &base.initial_state);
        base.session = Some(session);
    }

    fn take_session(&mut self) -> Option<Session> {
        self.base_mut().session.take()
    }

    fn state(&self) -> &Map<String, Value> {
        &self.base().state
    }

    /// Shallow-merge `patch` into the state and store it in the session.
    fn set_state(&mut self, patch: Map<String, Value>) {
        let base = self.base_mut();
        base.state.extend(patch);
        let state = Value::Object(base.state.clone());
        if let Some(session) = base.session.as_mut() {
            session.set(STATE_FIELD, state);
        }
    }

    fn reset_state(&mut self) {
        let base = self.base_mut();
        base.state = base.initial_state.clone();
        let state = Value::Object(base.state.clone());
        if let Some(session) = base.session.as_mut() {
            session.set(STATE_FIELD, state);
        }
    }

    fn is_session_written(&self) -> bool {
        self.base().is_session_written
    }

    fn set_session_written(&mut self, written: bool) {
        self.base_mut().is_session_written = written;
    }

    fn response(&self) -> ResponseSlot {
        self.base().response.clone()
    }

    /// Record a handler error on this context.
    fn emit_error(&mut self, err: &anyhow::Error) {
        warn!(session_id = ?self.session_id(), error = %err, "context error");
        self.base_mut().errors.push(err.to_string());
    }

    fn errors(&self) -> &[String] {
        &self.base().errors
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use {super::*, serde_json::json};

    struct Plain(ContextBase);

    impl Context for Plain {
        fn base(&self) -> &ContextBase {
            &self.0
        }

        fn base_mut(&mut self) -> &mut ContextBase {
            &mut self.0
        }
    }

    fn object(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn context(session: Option<Session>) -> Plain {
        Plain(ContextBase::new(ContextParams {
            event: Event::text(json!({}), "hi"),
            session,
            initial_state: object(json!({"step": 0, "lang": "en"})),
            request: None,
        }))
    }

    #[test]
    fn state_starts_from_initial_state() {
        let ctx = context(Some(Session::new()));
        assert_eq!(ctx.state()["step"], json!(0));
    }

    #[test]
    fn set_state_merges_and_persists_into_session() {
        let mut ctx = context(Some(Session::new()));
        ctx.set_state(object(json!({"step": 1})));
        assert_eq!(ctx.state()["step"], json!(1));
        assert_eq!(ctx.state()["lang"], json!("en"));
        assert_eq!(
            ctx.session().unwrap().get(STATE_FIELD),
            Some(&json!({"step": 1, "lang": "en"}))
        );

        ctx.reset_state();
        assert_eq!(ctx.state()["step"], json!(0));
    }

    #[test]
    fn state_is_read_back_from_session() {
        let mut session = Session::new();
        session.set(STATE_FIELD, json!({"step": 5}));
        let ctx = context(Some(session));
        assert_eq!(ctx.state()["step"], json!(5));
    }

    #[test]
    fn replacing_session_refreshes_state() {
        let mut ctx = context(Some(Session::new()));
        let mut newer = Session::new();
        newer.set(STATE_FIELD, json!({"step": 9}));
        ctx.replace_session(newer);
        assert_eq!(ctx.state()["step"], json!(9));
    }

    #[test]
    fn response_slot_is_shared() {
        let ctx = context(None);
        let slot = ctx.response();
        ctx.response()
            .update(|r| r.body = Some("hello".into()));
        assert_eq!(slot.get().unwrap().body.as_deref(), Some("hello"));
    }

    #[test]
    fn emitted_errors_are_recorded() {
        let mut ctx = context(None);
        ctx.emit_error(&anyhow::anyhow!("boom"));
        assert_eq!(ctx.errors(), ["boom".to_string()]);
    }
}
