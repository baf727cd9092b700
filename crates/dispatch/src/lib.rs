//! Webhook dispatch: from a request body to handler invocations.
//!
//! Flow: body → camelCase keys → connector events → contexts with sessions →
//! plugins → grouper → immediate lane or debounce window → handler action
//! (trampoline) → session write → response.

pub mod action;
pub mod batch;
pub mod bot;
pub mod debounce;
pub mod error;
pub mod error_sink;
pub mod grouper;
pub mod handlers;
pub mod keys;

pub use {
    action::{Action, ActionRef, Props, Step, chain, fn_action, with_props},
    batch::Batch,
    bot::{Bot, BotBuilder, RequestHandler, RequestObserver},
    debounce::{Completion, DebounceEngine, Scheduler, TimerHandle, TokioScheduler},
    error::{Error, Result},
    error_sink::{ErrorReport, ErrorSink, Lane},
    handlers::{Handlers, Plugin},
};
