use {
    async_trait::async_trait,
    parley_common::{RequestContext, Response},
    parley_sessions::Session,
    serde_json::Value,
};

use crate::{
    Result,
    context::{Context, ContextParams},
    event::Event,
};

/// Outcome of [`Connector::preprocess`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preprocess {
    /// `false` answers the webhook with `response` without dispatching.
    pub should_next: bool,
    pub response: Option<Response>,
}

impl Preprocess {
    pub fn next() -> Self {
        Self {
            should_next: true,
            response: None,
        }
    }

    pub fn respond(response: Response) -> Self {
        Self {
            should_next: false,
            response: Some(response),
        }
    }
}

/// Adapter between one chat platform's webhook payloads and dispatch.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Context: Context;

    /// Platform name; prefixes every session id.
    fn platform(&self) -> &str;

    /// Split one webhook body into its events, in delivery order.
    fn map_request_to_events(&self, body: &Value) -> Result<Vec<Event>>;

    /// Conversation key for `event`, or `None` when the event belongs to no
    /// conversation.
    async fn unique_session_key(
        &self,
        body: &Value,
        event: &Event,
        request: Option<&RequestContext>,
    ) -> Result<Option<String>>;

    /// Fill platform data (user profile, channel info) into the session.
    async fn update_session(&self, session: &mut Session, body: &Value, event: &Event)
    -> Result<()>;

    fn create_context(&self, params: ContextParams) -> Self::Context;

    /// Inspect the raw request before dispatch: verification handshakes,
    /// signature checks.
    async fn preprocess(&self, _request: &RequestContext) -> Preprocess {
        Preprocess::next()
    }
}
