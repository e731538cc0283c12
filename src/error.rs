//! Typed error taxonomy for the component boundaries described in the
//! error-handling design: transient I/O, permanent upstream, repository
//! conflict, cancellation, deadline-exceeded, and uncategorized-internal.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("not found")]
    NotFound,
    #[error("concurrent sync run already active for seller")]
    Conflict,
    #[error("transient repository error: {0}")]
    Transient(String),
}

impl RepositoryError {
    pub fn retryable(&self) -> bool {
        matches!(self, RepositoryError::Transient(_))
    }
}

#[derive(Debug, Error)]
pub enum MarketplaceError {
    #[error("transient marketplace error: {0}")]
    Transient(String),
    #[error("permanent marketplace error: {0}")]
    Permanent(String),
}

impl MarketplaceError {
    pub fn retryable(&self) -> bool {
        matches!(self, MarketplaceError::Transient(_))
    }
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("a sync run is already pending or running for this seller")]
    AlreadyRunning,
    #[error("sync run cancelled")]
    Cancelled,
    #[error("sync run exceeded its hard deadline")]
    DeadlineExceeded,
    #[error("internal sync error: {0}")]
    Internal(String),
}

#[derive(Debug, Error)]
pub enum CanonicalizeError {
    #[error("value cannot be canonicalized: {0}")]
    Unrepresentable(String),
}
