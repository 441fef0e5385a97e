use std::fmt;

use crate::error::FetchError;

/// Terminal outcome of a fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    Success,
    Error(FetchError),
}

/// Lifecycle of a fetch slot.
///
/// ```text
/// Idle ─▶ AwaitingResolve ─▶ AwaitingNetwork ─▶ Buffering ─▶ Completed(Success)
///               │                   │               │
///               └───────────────────┴───────────────┴──────▶ Completed(Error)
/// ```
///
/// A cache hit jumps straight from `Idle` to `Completed(Success)`.
/// Cancellation returns the slot to `Idle` from any state.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SlotState {
    #[default]
    Idle,
    AwaitingResolve,
    AwaitingNetwork,
    Buffering,
    Completed(Completion),
}

impl SlotState {
    /// Whether a fetch is under way.
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            SlotState::AwaitingResolve | SlotState::AwaitingNetwork | SlotState::Buffering
        )
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, SlotState::Completed(_))
    }

    pub fn is_success(&self) -> bool {
        matches!(self, SlotState::Completed(Completion::Success))
    }

    /// The failure, if the slot completed with one.
    pub fn error(&self) -> Option<&FetchError> {
        match self {
            SlotState::Completed(Completion::Error(e)) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for SlotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotState::Idle => f.write_str("idle"),
            SlotState::AwaitingResolve => f.write_str("awaiting resolve"),
            SlotState::AwaitingNetwork => f.write_str("awaiting network"),
            SlotState::Buffering => f.write_str("buffering"),
            SlotState::Completed(Completion::Success) => f.write_str("completed"),
            SlotState::Completed(Completion::Error(e)) => write!(f, "failed ({})", e),
        }
    }
}
