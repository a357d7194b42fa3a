//! Error types for the relay queue.
//!
//! `QueueError` covers caller contract violations and is returned directly.
//! `FetchError` is data: collaborators produce it and the delivery channel
//! carries it to the request's listener like any other outcome.

use thiserror::Error;

use crate::request::RequestId;

/// Errors reported to callers of the queue API.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Request {id} has already been admitted to a queue")]
    AlreadyAdmitted { id: RequestId },

    #[error("Failed to spawn dispatcher thread: {0}")]
    ThreadSpawn(String),
}

/// Failure of a cache, network or local fetch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out")]
    Timeout,

    #[error("No connection")]
    NoConnection,

    #[error("Server responded with status {status}")]
    Server { status: u16 },

    #[error("Local source error: {0}")]
    Local(String),

    #[error("Local source has no data for this request")]
    LocalMiss,

    /// A collaborator panicked while handling the request.
    #[error("Collaborator panicked: {0}")]
    Panicked(String),
}

impl FetchError {
    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Network(_) => "network",
            Self::Timeout => "timeout",
            Self::NoConnection => "no_connection",
            Self::Server { .. } => "server",
            Self::Local(_) => "local",
            Self::LocalMiss => "local_miss",
            Self::Panicked(_) => "panicked",
        }
    }
}
