//! Error types for the follower pipeline.

use thiserror::Error;

use crate::block::Round;

/// Errors that can occur while following the chain.
#[derive(Debug, Error)]
pub enum FollowError {
    /// Network-level failure talking to the node (connection refused, HTTP 5xx, ...).
    #[error("transport error: {0}")]
    Transport(String),

    /// The request did not complete in time.
    #[error("request timed out after {ms}ms")]
    Timeout { ms: u64 },

    /// The node answered a raw-block request with JSON; raw blocks are unavailable.
    #[error("node does not serve raw blocks (got content type {content_type:?})")]
    UnsupportedFormat { content_type: String },

    /// The node answered with a content type that is neither raw nor JSON.
    #[error("unrecognized response content type {content_type:?}")]
    UnrecognizedProtocol { content_type: String },

    /// A block is missing structure the engine relies on (round, payload).
    #[error("malformed block: {0}")]
    MalformedBlock(String),

    /// The progress journal could not be written.
    #[error("progress journal error: {0}")]
    Journal(#[from] std::io::Error),

    /// A user handler returned an error.
    #[error("handler error in '{handler}' at round {round}: {reason}")]
    Handler {
        handler: String,
        round: Round,
        reason: String,
    },

    /// `next()` kept failing with transient errors until the retry bound ran out.
    #[error("fetching next block failed after {attempts} attempts: {source}")]
    FetchExhausted {
        attempts: u32,
        #[source]
        source: Box<FollowError>,
    },

    /// Invalid engine or client configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl FollowError {
    /// Returns `true` if the error is transient and the fetch may be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Timeout { .. })
    }

    /// Returns `true` if this error means the raw format should be abandoned.
    pub fn is_unsupported_format(&self) -> bool {
        matches!(self, Self::UnsupportedFormat { .. })
    }

    /// Shorthand for a handler failure.
    pub fn handler(handler: impl Into<String>, round: Round, reason: impl ToString) -> Self {
        Self::Handler {
            handler: handler.into(),
            round,
            reason: reason.to_string(),
        }
    }
}
