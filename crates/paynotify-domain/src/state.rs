//! Queue entry lifecycle states.
//!
//! ```text
//! Queued --lock--> Locked --finalize--> Sent | Failed | Skipped
//!                  Locked --reclaim---> Queued
//! ```
//!
//! Terminal states are never left.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QueueState {
    Queued,
    Locked,
    Sent,
    Failed,
    Skipped,
}

/// The subset of [`QueueState`] a batch can be finalized to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TerminalState {
    Sent,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown queue state: {0}")]
pub struct ParseStateError(pub String);

impl QueueState {
    pub const ALL: [QueueState; 5] = [
        QueueState::Queued,
        QueueState::Locked,
        QueueState::Sent,
        QueueState::Failed,
        QueueState::Skipped,
    ];

    /// Single-character code stored in the `state` column.
    pub fn code(self) -> &'static str {
        match self {
            Self::Queued => "Q",
            Self::Locked => "L",
            Self::Sent => "T",
            Self::Failed => "F",
            Self::Skipped => "S",
        }
    }

    pub fn from_code(code: &str) -> Result<Self, ParseStateError> {
        Self::ALL
            .into_iter()
            .find(|s| s.code() == code)
            .ok_or_else(|| ParseStateError(code.to_owned()))
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Sent | Self::Failed | Self::Skipped)
    }
}

impl fmt::Display for QueueState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Queued => "queued",
            Self::Locked => "locked",
            Self::Sent => "sent",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        };
        f.write_str(name)
    }
}

impl From<TerminalState> for QueueState {
    fn from(state: TerminalState) -> Self {
        match state {
            TerminalState::Sent => Self::Sent,
            TerminalState::Failed => Self::Failed,
            TerminalState::Skipped => Self::Skipped,
        }
    }
}

impl FromStr for TerminalState {
    type Err = ParseStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sent" => Ok(Self::Sent),
            "failed" => Ok(Self::Failed),
            "skipped" => Ok(Self::Skipped),
            _ => Err(ParseStateError(s.to_owned())),
        }
    }
}
