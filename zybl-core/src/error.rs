//! Error types for zybl-core

use bytes::Bytes;

/// Result type alias for zybl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core protocol errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Frame does not start with the `24 3C` sync header
    #[error("Invalid frame header: expected 24 3C, got {found:02X?}")]
    InvalidHeader {
        found: Vec<u8>,
    },
    
    /// Length byte disagrees with the bytes actually enclosed
    #[error("Length mismatch: header declares {declared} bytes, frame encloses {actual} bytes")]
    LengthMismatch {
        declared: usize,
        actual: usize,
    },
    
    /// Checksum verification failed
    #[error("Checksum mismatch: expected 0x{expected:04X}, received 0x{received:04X}")]
    ChecksumMismatch {
        expected: u16,
        received: u16,
    },
    
    /// Data section does not fit in one frame
    #[error("Frame too large: {size} bytes of data (max: {max} bytes)")]
    FrameTooLarge {
        size: usize,
        max: usize,
    },
    
    /// Data section too short to hold protocol field, sequence and command
    #[error("Malformed data section: {0} bytes, need at least 6")]
    MalformedDataSection(usize),
    
    /// Read requested on a write-only command or vice versa
    #[error("Direction mismatch: {command} does not accept a {requested}")]
    DirectionMismatch {
        command: crate::command::CommandId,
        requested: &'static str,
    },
    
    /// No descriptor registered; the raw payload is still surfaced
    #[error("Unknown command {command} ({} payload bytes)", .raw.len())]
    UnknownCommand {
        command: crate::command::CommandId,
        raw: Bytes,
    },
    
    /// Value bytes do not have the width the codec expects
    #[error("Payload length mismatch for {command}: expected {expected} bytes, got {actual} bytes")]
    PayloadLengthMismatch {
        command: crate::command::CommandId,
        expected: usize,
        actual: usize,
    },
    
    /// Caller input rejected before any bytes were built
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    
    /// Descriptor registered twice
    #[error("Duplicate command descriptor: {0}")]
    DuplicateCommand(crate::command::CommandId),
    
    /// No matching response before the deadline
    #[error("Timeout waiting for {command} response (seq={sequence})")]
    Timeout {
        command: crate::command::CommandId,
        sequence: u16,
    },
    
    /// Session closed while the request was pending
    #[error("Transport closed")]
    TransportClosed,
    
    /// Link failed; the session is unusable
    #[error("Transport fault: {0}")]
    TransportFault(String),
    
    /// Invalid session state
    #[error("Invalid session state: {0}")]
    InvalidSessionState(String),
    
    /// Too many requests in flight
    #[error("Too many pending requests: {0} in flight")]
    TooManyPending(usize),
    
    /// Type-level decode failure
    #[error("Type error: {0}")]
    Types(zybl_types::Error),
}

impl Error {
    /// Check if error is recoverable (retry might succeed)
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
    
    /// Check if error requires reconnection
    pub fn requires_reconnect(&self) -> bool {
        matches!(
            self,
            Self::TransportClosed
                | Self::TransportFault(_)
        )
    }
    
    /// Frame-level failure the session recovers from by discarding bytes
    pub fn is_frame_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidHeader { .. }
                | Self::LengthMismatch { .. }
                | Self::ChecksumMismatch { .. }
        )
    }
}

impl From<zybl_types::Error> for Error {
    fn from(err: zybl_types::Error) -> Self {
        match err {
            zybl_types::Error::Validation(msg) => Self::InvalidArgument(msg),
            other => Self::Types(other),
        }
    }
}

/// Cloneable teardown reason handed to every pending request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Teardown {
    Closed,
    Fault(String),
}

impl From<Teardown> for Error {
    fn from(reason: Teardown) -> Self {
        match reason {
            Teardown::Closed => Self::TransportClosed,
            Teardown::Fault(msg) => Self::TransportFault(msg),
        }
    }
}
