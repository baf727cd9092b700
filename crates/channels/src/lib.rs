//! Platform-facing contracts: events, contexts, presence, connectors.
//!
//! A [`Connector`] turns a webhook body into [`Event`]s and builds one
//! [`Context`] per event. The console connector is the built-in platform.

pub mod connector;
pub mod console;
pub mod context;
pub mod error;
pub mod event;

pub use {
    connector::{Connector, Preprocess},
    console::{ConsoleConnector, ConsoleContext},
    context::{Context, ContextBase, ContextParams, Presence, ResponseSlot},
    error::{Error, Result},
    event::Event,
};
