//! High-level error types

use zybl_core::CommandId;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Core protocol error: {0}")]
    Core(#[from] zybl_core::Error),
    
    #[error("Transport error: {0}")]
    Transport(#[from] zybl_transport::Error),
    
    #[error("Unexpected {got} value in {command} response (expected {expected})")]
    UnexpectedValue {
        command: CommandId,
        expected: &'static str,
        got: &'static str,
    },
}

impl Error {
    /// Protocol error, if this is one
    pub fn core(&self) -> Option<&zybl_core::Error> {
        match self {
            Self::Core(e) => Some(e),
            _ => None,
        }
    }
    
    /// Check if input was rejected before anything was sent
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, Self::Core(zybl_core::Error::InvalidArgument(_)))
    }
    
    /// Check if the device did not answer in time
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Core(zybl_core::Error::Timeout { .. }))
    }
    
    /// Check if the session must be reopened
    pub fn requires_reconnect(&self) -> bool {
        self.core().is_some_and(zybl_core::Error::requires_reconnect)
    }
}

impl From<zybl_types::Error> for Error {
    fn from(err: zybl_types::Error) -> Self {
        Self::Core(err.into())
    }
}
