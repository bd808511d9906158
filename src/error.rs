//! Error types for ticketq.

use thiserror::Error;

use crate::limiter::Scope;
use crate::model::{JobId, State};

#[derive(Debug, Error)]
pub enum Error {
    #[error("rate limit exceeded ({scope})")]
    RateLimitExceeded { scope: Scope },

    #[error("job not found: {0}")]
    NotFound(String),

    #[error("duplicate fingerprint: {0}")]
    DuplicateFingerprint(String),

    #[error("invalid state transition: {from} -> {to}")]
    InvalidTransition { from: State, to: State },

    #[error("transition conflict on job {id}: expected {expected}")]
    TransitionConflict { id: JobId, expected: State },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
