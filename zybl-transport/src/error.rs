//! Link errors

use std::io;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Link not open")]
    NotOpen,
    
    #[error("Link already open")]
    AlreadyOpen,
    
    #[error("Link closed by remote")]
    LinkClosed,
    
    #[error("Write rejected: {0}")]
    WriteRejected(String),
    
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
