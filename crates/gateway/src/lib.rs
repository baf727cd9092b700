//! HTTP front door: mounts one webhook route per enabled channel.
//!
//! Each delivery goes through the connector's `preprocess` first; when it
//! lets the request through, query parameters are merged into the JSON body
//! and the bot's request handler takes over.

#[cfg(feature = "metrics")]
pub mod metrics_middleware;
pub mod server;
pub mod webhook;

pub use {
    server::{build_gateway_app, start_gateway},
    webhook::{WebhookHandler, WebhookRoute},
};
