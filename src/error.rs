//! Per-event failure classification.
//!
//! Everything inside the crate propagates `anyhow::Error`; the event adapter
//! folds a failed unit of work into a `ProcessError` so its log line names
//! what kind of failure ended it.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProcessError {
    /// The inbound payload could not be decoded into a snapshot event.
    #[error("malformed event: {0}")]
    MalformedEvent(String),
    /// A remote dependency (inference service, broker) failed.
    #[error("remote failure: {0}")]
    TransientRemote(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ProcessError {
    pub fn malformed(err: impl std::fmt::Display) -> Self {
        Self::MalformedEvent(err.to_string())
    }

    pub fn remote(err: impl std::fmt::Display) -> Self {
        Self::TransientRemote(err.to_string())
    }

    /// Short label for log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MalformedEvent(_) => "malformed_event",
            Self::TransientRemote(_) => "transient_remote",
            Self::Internal(_) => "internal",
        }
    }
}
