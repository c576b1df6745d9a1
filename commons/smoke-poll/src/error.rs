use thiserror::Error;

use crate::poller::PollResult;
use crate::query::{LastState, ResourceQuery};

/// Failure reported by a [`crate::ResourceFetcher`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("transient error: {0}")]
    Transient(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    /// The query itself cannot succeed (unknown kind, bad JSON-path,
    /// broken client configuration).
    #[error("invalid query: {0}")]
    Invalid(String),
}

impl FetchError {
    /// Fatal errors abort polling instead of being retried.
    pub fn is_fatal(&self) -> bool {
        matches!(self, FetchError::Auth(_) | FetchError::Invalid(_))
    }
}

#[derive(Error, Debug)]
pub enum PollError {
    #[error("timed out: {0}")]
    Timeout(Box<PollResult>),

    #[error("aborted while fetching {query}: {source}\n{report}")]
    Fatal {
        query: ResourceQuery,
        source: FetchError,
        report: Box<PollResult>,
    },

    #[error("assertion failed for {query}: expected state {predicate}, got {observed}")]
    Assertion {
        query: ResourceQuery,
        predicate: String,
        observed: LastState,
    },

    #[error("cancelled: {0}")]
    Cancelled(Box<PollResult>),
}

impl PollError {
    /// The poll report attached to this error, if the error came from a
    /// polling loop rather than a one-shot check.
    pub fn report(&self) -> Option<&PollResult> {
        match self {
            PollError::Timeout(r) | PollError::Cancelled(r) => Some(r),
            PollError::Fatal { report, .. } => Some(report),
            PollError::Assertion { .. } => None,
        }
    }
}
