//! Transport layer for ZYBL fixtures
//!
//! The [`Link`] trait is the boundary to whatever carries the bytes (a BLE
//! GATT write/notify characteristic pair in practice). [`TransportSession`]
//! owns one link and does framing, chunking, reassembly and correlation on
//! top of it.

pub mod channel;
pub mod error;
pub mod session;

pub use channel::{ChannelLink, ChannelPeer};
pub use error::{Error, Result};
pub use session::TransportSession;

use async_trait::async_trait;
use bytes::Bytes;

/// Byte link to one fixture
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Link: Send {
    /// Open the link
    async fn open(&mut self) -> Result<()>;
    
    /// Close the link
    async fn close(&mut self) -> Result<()>;
    
    /// Check if open
    fn is_open(&self) -> bool;
    
    /// Write one chunk of at most `max_write_size()` bytes
    async fn write(&mut self, chunk: &[u8]) -> Result<()>;
    
    /// Receive the next inbound chunk
    async fn recv(&mut self) -> Result<Bytes>;
    
    /// Largest chunk a single write may carry
    fn max_write_size(&self) -> usize;
    
    /// Largest data section the peer accepts in one frame
    fn max_data_section(&self) -> usize;
    
    /// Human-readable peer description
    fn describe(&self) -> String;
}
