//! Lifecycle of one server session

use crate::error::{WireError, WireResult};
use std::fmt;

/// Where a [`super::Connection`] is in its lifecycle
///
/// ```text
/// Initial -> AwaitingAuth -> Authenticating -> Idle
/// Idle -> QueryInProgress -> ReadingResults -> Idle
/// any -> Closed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Socket open, startup packet not sent yet
    Initial,
    /// Startup packet sent
    AwaitingAuth,
    /// Password or SASL exchange running
    Authenticating,
    /// Ready for a query
    Idle,
    /// Query message being written
    QueryInProgress,
    /// Result messages being read
    ReadingResults,
    /// Terminated or broken; never leaves this state
    Closed,
}

impl ConnectionState {
    /// True if moving from `self` to `next` follows the lifecycle
    pub fn allows(self, next: ConnectionState) -> bool {
        use ConnectionState as S;

        match (self, next) {
            (_, S::Closed) => true,
            (S::Closed, _) => false,
            (S::Initial, S::AwaitingAuth)
            | (S::AwaitingAuth, S::Authenticating)
            | (S::Authenticating, S::Idle)
            | (S::Idle, S::QueryInProgress)
            | (S::QueryInProgress, S::ReadingResults)
            | (S::ReadingResults, S::Idle) => true,
            _ => false,
        }
    }

    /// Move to `next`, or fail with [`WireError::InvalidState`] and stay put
    pub fn transition(&mut self, next: ConnectionState) -> WireResult<()> {
        if !self.allows(next) {
            return Err(WireError::InvalidState {
                expected: format!("a state reachable from {}", self),
                actual: next.to_string(),
            });
        }
        *self = next;
        Ok(())
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Initial => "initial",
            Self::AwaitingAuth => "awaiting_auth",
            Self::Authenticating => "authenticating",
            Self::Idle => "idle",
            Self::QueryInProgress => "query_in_progress",
            Self::ReadingResults => "reading_results",
            Self::Closed => "closed",
        })
    }
}
