/// Request state definitions for tracking crawl progress
///
/// Every crawl request ends in exactly one terminal state, which is what the
/// `requests` table records.
use std::fmt;

/// Represents the current state of a crawl request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestState {
    // ===== Active States =====
    /// Request is queued and waiting for a worker
    Queued,

    /// A worker is navigating to or extracting from the page
    Processing,

    // ===== Terminal States =====
    /// Page was handled (links discovered or reviews extracted)
    Processed,

    /// Detail page had no usable embedded state; nothing extracted
    Aborted,

    /// Navigation failed after all retries
    Failed,

    /// Dequeued after the global quota was already reached
    Skipped,
}

impl RequestState {
    /// Returns true if this is a terminal state (no further processing needed)
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Queued | Self::Processing)
    }

    /// Returns true if this represents an error state
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Aborted | Self::Failed)
    }

    /// Converts the request state to a database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Processed => "processed",
            Self::Aborted => "aborted",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }

    /// Parses a request state from a database string representation
    ///
    /// Returns None if the string doesn't match any known state.
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(Self::Queued),
            "processing" => Some(Self::Processing),
            "processed" => Some(Self::Processed),
            "aborted" => Some(Self::Aborted),
            "failed" => Some(Self::Failed),
            "skipped" => Some(Self::Skipped),
            _ => None,
        }
    }

    /// Returns all possible request states
    pub fn all_states() -> Vec<Self> {
        vec![
            Self::Queued,
            Self::Processing,
            Self::Processed,
            Self::Aborted,
            Self::Failed,
            Self::Skipped,
        ]
    }
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}
