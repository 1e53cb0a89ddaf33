//! Session lifecycle
//!
//! ```text
//! Idle -> Opening -> Ready -> Closing -> Closed
//!   \________\________\________\-------> Faulted
//! ```
//!
//! `Closed` and `Faulted` are terminal.

use std::fmt;

use crate::error::{Error, Result};

/// Session state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// Created, link not opened yet
    #[default]
    Idle,

    /// Link open in progress
    Opening,

    /// Requests may be submitted
    Ready,

    /// Shutting down, pending requests are being failed
    Closing,

    Closed,

    /// Link failed; every pending request got a transport fault
    Faulted,
}

impl SessionState {
    /// Check if no further transition is possible
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Faulted)
    }

    /// Check if requests may be sent
    pub fn is_ready(self) -> bool {
        self == Self::Ready
    }

    /// Whether `self -> next` is a legal transition
    pub fn can_transition_to(self, next: Self) -> bool {
        use SessionState::*;

        match (self, next) {
            (Idle, Opening) | (Opening, Ready) | (Ready, Closing) | (Closing, Closed) => true,
            // a session that never opened may be closed directly
            (Idle, Closing) | (Opening, Closing) => true,
            (from, Faulted) => !from.is_terminal(),
            _ => false,
        }
    }

    /// Move to `next`
    ///
    /// # Errors
    ///
    /// `InvalidSessionState` if the transition is not allowed.
    pub fn transition(&mut self, next: Self) -> Result<()> {
        if !self.can_transition_to(next) {
            return Err(Error::InvalidSessionState(format!(
                "Cannot move from {} to {}",
                self, next
            )));
        }

        *self = next;
        Ok(())
    }

    /// Error for an operation that needs `Ready`
    pub fn not_ready_error(self) -> Error {
        match self {
            Self::Closed | Self::Closing => Error::TransportClosed,
            Self::Faulted => Error::TransportFault("session faulted".into()),
            other => Error::InvalidSessionState(format!("session is {}", other)),
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "Idle",
            Self::Opening => "Opening",
            Self::Ready => "Ready",
            Self::Closing => "Closing",
            Self::Closed => "Closed",
            Self::Faulted => "Faulted",
        };
        f.write_str(name)
    }
}
