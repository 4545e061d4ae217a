//! Error types for the native user store

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("not started: {0}")]
    NotStarted(String),

    #[error("index not found: {0}")]
    IndexNotFound(String),

    #[error("backing store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("malformed user document: {0}")]
    Decode(String),

    #[error("clearing the realm cache for [{username}] failed, please clear the realm cache manually")]
    CachePurgeFailed {
        username: String,
        #[source]
        source: Box<Error>,
    },

    #[error("change listener failed: {p} ({n} additional failures suppressed)", p = .primary, n = .suppressed.len())]
    ListenerFailure {
        primary: Box<Error>,
        suppressed: Vec<Error>,
    },

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("internal error: {0}")]
    Internal(String),
}
