//! Transport types shared by the connector, dispatch and HTTP crates.

pub mod types;

pub use types::{RequestContext, Response};
