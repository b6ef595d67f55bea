/// Error taxonomy for the sync core
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    /// Live subscription dropped. Not retried internally — the next
    /// dependency change re-subscribes.
    #[error("feed error: {0}")]
    Feed(String),

    /// Local transaction aborted. The whole batch rolled back, no
    /// partial writes are visible.
    #[error("local write error: {0}")]
    LocalWrite(String),

    /// A migration step failed mid-transaction. The stored version is
    /// unchanged; migration is retried at next launch.
    #[error("schema migration error: {0}")]
    Migration(String),

    /// Rejected before reaching any store.
    #[error("validation error: {0}")]
    Validation(String),
}

pub type Result<T> = std::result::Result<T, SyncError>;
