use thiserror::Error;

use crate::domain::track::TrackId;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("track {0} not found")]
    TrackNotFound(TrackId),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}
