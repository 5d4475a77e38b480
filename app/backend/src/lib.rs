//! Persistence and push gateway connectors for the courier daemon.

pub mod connector;
pub mod error;
pub mod gcm;
pub mod store;

pub use connector::{Connector, Gateway, Registry, push_all};
pub use error::{PushError, StoreError};
pub use gcm::{Gcm, GcmConfig};
pub use store::{MAX_TOKENS_PER_USER, MemStore, PgStore, Storage, Store, init_schema};

use std::sync::Arc;

/// The shared state a dispatcher worker operates on: the store plus the
/// immutable connector registry.
#[derive(Clone)]
pub struct Backend {
    pub store: Store,
    pub registry: Arc<Registry>,
}

impl Backend {
    pub fn new(store: Store, registry: Registry) -> Self {
        Self {
            store,
            registry: Arc::new(registry),
        }
    }
}
