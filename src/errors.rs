//! Batch-level error taxonomy.
//!
//! Everything fatal to a whole submission is a `BatchError` variant.
//! Per-frame corruption and unknown correlation keys are *not* errors —
//! they are diagnostics counters on the session (see `batch::session`).

use std::time::Duration;
use thiserror::Error;

/// Errors that settle or reject an entire batch submission.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("batch contains no resumes")]
    EmptyBatch,

    #[error("batch of {count} resumes exceeds the server limit of {limit}")]
    BatchTooLarge { count: usize, limit: usize },

    #[error("invalid server URL '{url}': {reason}")]
    InvalidServerUrl { url: String, reason: String },

    #[error("server rejected the request with status {status}: {body}")]
    Http { status: u16, body: String },

    #[error("transport failure: {message}")]
    Transport {
        message: String,
        #[source]
        source: Option<reqwest::Error>,
    },

    #[error("server reported a batch failure: {message}")]
    Server { message: String },

    #[error("batch timed out after {}s", after.as_secs())]
    TimedOut { after: Duration },

    #[error("batch cancelled by caller")]
    Cancelled,
}

impl BatchError {
    /// Wrap a reqwest error as a transport failure, keeping it as source.
    pub fn from_transport(source: reqwest::Error) -> Self {
        BatchError::Transport {
            message: source.to_string(),
            source: Some(source),
        }
    }

    /// Transport failure with no underlying reqwest error.
    pub fn transport(message: impl Into<String>) -> Self {
        BatchError::Transport {
            message: message.into(),
            source: None,
        }
    }
}
