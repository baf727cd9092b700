//! Session storage.
//!
//! A [`Session`] is the persistent state of one conversation, keyed by
//! `"<platform>:<sessionKey>"`. Stores implement [`SessionStore`]; the memory
//! store sits on the generic [`cache::CacheStore`] layer, the file store keeps
//! one JSON file per session.

pub mod cache;
pub mod cache_store;
pub mod error;
pub mod factory;
pub mod file_store;
pub mod session;
pub mod store;

pub use {
    cache_store::{CacheBasedSessionStore, MemorySessionStore},
    error::{Error, Result},
    factory::session_store_from_config,
    file_store::FileSessionStore,
    session::{Session, session_id},
    store::SessionStore,
};
