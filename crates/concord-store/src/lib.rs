//! The mapping store (C2) — a transactional SQLite-backed key-value/relational
//! store holding cross-system identifiers, content hashes, and sync cursors
//! for every tracked [`Project`](concord_core::types::Project) and
//! [`Issue`](concord_core::types::Issue) (§4.2).
//!
//! Grounded on `at_core::cache::CacheDb`: an async `tokio_rusqlite`
//! connection, WAL pragmas tuned for a single-writer workload, and
//! `ON CONFLICT ... DO UPDATE` upserts. The store is single-writer (the sync
//! process); external tooling only ever reads.

mod queries;

pub use queries::MappingStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] tokio_rusqlite::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("parent cycle detected for issue {0}")]
    ParentCycle(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

impl From<StoreError> for concord_core::error::SyncError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::ParentCycle(id) => concord_core::error::SyncError::Integrity(format!("parent cycle detected for issue {id}")),
            other => concord_core::error::SyncError::Transient(other.to_string()),
        }
    }
}
