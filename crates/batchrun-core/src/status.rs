//! Per-item processing phases.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::CoreError;

/// Where an item is in the driver loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemPhase {
    /// Read from the source, not yet started.
    #[default]
    Pending,
    /// Executor running.
    Invoking,
    /// Channel read, record built.
    Captured,
    /// Record appended to the aggregate log.
    Recorded,
}

impl ItemPhase {
    /// Returns true once the item's record is in the log.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Recorded)
    }

    /// The only phase reachable from this one.
    pub fn next(&self) -> Option<Self> {
        match self {
            Self::Pending => Some(Self::Invoking),
            Self::Invoking => Some(Self::Captured),
            Self::Captured => Some(Self::Recorded),
            Self::Recorded => None,
        }
    }

    /// Move forward to `to`, rejecting skips and reversals.
    ///
    /// `Pending -> Captured` is allowed for blank items, which are
    /// recorded without an invocation.
    pub fn transition(&mut self, to: Self) -> Result<(), CoreError> {
        let allowed = self.next() == Some(to) || (*self == Self::Pending && to == Self::Captured);
        if !allowed {
            return Err(CoreError::InvalidStateTransition {
                from: self.to_string(),
                to: to.to_string(),
            });
        }
        *self = to;
        Ok(())
    }
}

impl fmt::Display for ItemPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Invoking => "invoking",
            Self::Captured => "captured",
            Self::Recorded => "recorded",
        };
        f.write_str(name)
    }
}
