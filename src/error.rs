//! Error types, one enum per failure domain.
//!
//! None of these are fatal to the engine. Fetch failures become a per-endpoint
//! status, action failures roll the optimistic flag back, config failures drop
//! the offending entry, and storage failures are handed back to the caller
//! after the in-memory mutation has already been applied.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::article::ActionKind;
use crate::endpoint::EndpointType;
use crate::timeline::TimelineId;

/// Failure of a `fetch_page` call, or a load that could not be issued.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(String),

    #[error("rate limited until {reset}")]
    RateLimited { reset: u64 },

    #[error("no adapter registered for service '{0}'")]
    UnknownService(String),

    #[error("service '{service}' does not support {endpoint_type:?} endpoints")]
    UnsupportedEndpoint {
        service: String,
        endpoint_type: EndpointType,
    },

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Failure of a remote action (like, repost).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActionError {
    #[error("{kind} is already pending for this article")]
    AlreadyPending { kind: ActionKind },

    #[error("article not found")]
    ArticleNotFound,

    #[error("action rejected: {0}")]
    Rejected(String),

    #[error("service '{service}' does not support {kind}")]
    Unsupported { service: String, kind: ActionKind },

    #[error("no adapter registered for service '{0}'")]
    UnknownService(String),

    #[error("network error: {0}")]
    Network(String),
}

/// A persisted configuration entry that could not be used.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("malformed entry in '{key}': {reason}")]
    Malformed { key: String, reason: String },

    #[error("no adapter registered for service '{0}'")]
    UnknownService(String),

    #[error("service '{service}' has no endpoint type at index {index}")]
    UnknownEndpointIndex { service: String, index: usize },

    #[error("invalid query parameter: {0}")]
    InvalidQuery(String),
}

/// Durable storage failure.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("storage JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("another writer holds the lock on {}", .0.display())]
    Locked(PathBuf),
}

/// Top-level error returned by engine and registry commands.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Action(#[from] ActionError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("timeline {0} not found")]
    TimelineNotFound(TimelineId),

    #[error("timeline {timeline} has no endpoint at index {index}")]
    EndpointIndexOutOfRange { timeline: TimelineId, index: usize },
}

pub type Result<T> = std::result::Result<T, Error>;
