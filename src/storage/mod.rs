use std::{sync::Arc, time::Duration};

use crate::{
    config::StoreConfig,
    domain::track::{Track, TrackAttrs, TrackId},
    storage::{db::SqliteStore, error::StoreError, memory::MemoryStore},
};

pub mod db;
pub mod error;
pub mod memory;
pub(crate) mod schema;

/// Persistence seam shared by all request handlers.
///
/// Implementations are used concurrently from every request thread, so
/// they take `&self` and synchronize internally. A missing record is
/// always reported as [`StoreError::TrackNotFound`], never as an
/// infrastructure failure.
pub trait TrackStore: Send + Sync {
    /// Stores a new track and returns it with its assigned ID
    fn create(&self, attrs: TrackAttrs) -> Result<Track, StoreError>;

    fn get(&self, id: TrackId) -> Result<Track, StoreError>;

    /// Returns every stored track in ID order
    fn list(&self) -> Result<Vec<Track>, StoreError>;

    fn delete(&self, id: TrackId) -> Result<(), StoreError>;
}

/// Opens the store selected in the configuration
pub fn open(config: &StoreConfig) -> Result<Arc<dyn TrackStore>, StoreError> {
    let store: Arc<dyn TrackStore> = match config {
        StoreConfig::Memory => Arc::new(MemoryStore::new()),
        StoreConfig::Sqlite {
            path,
            busy_timeout_ms,
        } => Arc::new(SqliteStore::open(
            path,
            Duration::from_millis(*busy_timeout_ms),
        )?),
    };
    Ok(store)
}
