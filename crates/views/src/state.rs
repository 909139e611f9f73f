//! Lifecycle of a view result stream.

use serde::{Deserialize, Serialize};

/// The state of a [`ViewRequest`](crate::ViewRequest).
///
/// State transitions:
/// ```text
/// NotStarted ──► Streaming ──► Done
/// ```
/// `Done` is reached exactly once, by natural end of stream or by error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum StreamState {
    /// Query built but not yet submitted.
    #[default]
    NotStarted,

    /// Submitted; rows are being pulled.
    Streaming,

    /// Terminal; no further rows will be produced.
    Done,
}

impl StreamState {
    /// Returns true if the query may still be submitted.
    pub fn can_submit(&self) -> bool {
        matches!(self, StreamState::NotStarted)
    }

    /// Returns true if rows may be pulled (submitting first if needed).
    pub fn can_pull(&self) -> bool {
        !self.is_terminal()
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamState::Done)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StreamState::NotStarted => "NotStarted",
            StreamState::Streaming => "Streaming",
            StreamState::Done => "Done",
        }
    }
}

impl std::fmt::Display for StreamState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
