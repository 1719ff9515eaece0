//! Shared error types for the services crate.

use thiserror::Error;

use proctor_core::model::TestId;
use storage::repository::StorageError;

/// Errors emitted by session services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionError {
    #[error("test {0} not found")]
    NotFound(TestId),
    #[error("test {0} has no questions")]
    Empty(TestId),
    #[error("session controller is no longer running")]
    Closed,
    #[error(transparent)]
    Storage(#[from] StorageError),
}
