use std::sync::Arc;

use {
    parley_config::{SessionConfig, SessionDriver},
    tracing::{info, warn},
};

use crate::{cache_store::MemorySessionStore, file_store::FileSessionStore, store::SessionStore};

/// Build the session store named by `config.driver`.
///
/// Unknown drivers fall back to the memory store.
pub fn session_store_from_config(config: &SessionConfig) -> Arc<dyn SessionStore> {
    match config.driver {
        SessionDriver::File => {
            info!(dir = %config.file.dirname, expires_in = ?config.expires_in, "using file session store");
            Arc::new(FileSessionStore::new(
                config.file.dirname.clone(),
                config.expires_in,
            ))
        },
        SessionDriver::Memory | SessionDriver::Unknown => {
            if config.driver == SessionDriver::Unknown {
                warn!("unknown session driver, falling back to memory store");
            }
            info!(max_size = config.memory.max_size, "using memory session store");
            Arc::new(MemorySessionStore::new(
                config.memory.max_size,
                config.expires_in,
            ))
        },
    }
}
