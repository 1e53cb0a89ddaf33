//! In-memory link
//!
//! [`ChannelLink`] stands in for a BLE connection: writes are delivered to a
//! [`ChannelPeer`] and whatever the peer notifies comes back out of
//! [`Link::recv`]. Used for simulated fixtures and the demo.

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use zybl_core::constants::{DEFAULT_WRITE_SIZE, MAX_DATA_SECTION};

use crate::{error::*, Link};

/// ATT header bytes taken out of every write
const ATT_OVERHEAD: usize = 3;

/// Link half owned by the session
#[derive(Debug)]
pub struct ChannelLink {
    name: String,
    max_write_size: usize,
    open: bool,
    outbound: mpsc::UnboundedSender<Bytes>,
    inbound: mpsc::UnboundedReceiver<Bytes>,
}

/// Far side of a [`ChannelLink`]
#[derive(Debug)]
pub struct ChannelPeer {
    written: mpsc::UnboundedReceiver<Bytes>,
    notify: mpsc::UnboundedSender<Bytes>,
}

impl ChannelLink {
    /// Create a connected pair with the given negotiated MTU
    ///
    /// Each write carries at most `mtu - 3` bytes.
    pub fn pair(mtu: usize) -> (Self, ChannelPeer) {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();

        let link = Self {
            name: "channel".to_string(),
            max_write_size: mtu.saturating_sub(ATT_OVERHEAD).max(1),
            open: false,
            outbound: out_tx,
            inbound: in_rx,
        };
        let peer = ChannelPeer {
            written: out_rx,
            notify: in_tx,
        };

        (link, peer)
    }

    /// Pair with the un-negotiated default MTU (20-byte writes)
    pub fn default_pair() -> (Self, ChannelPeer) {
        Self::pair(DEFAULT_WRITE_SIZE + ATT_OVERHEAD)
    }

    /// Set the name returned by `describe`
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

#[async_trait]
impl Link for ChannelLink {
    async fn open(&mut self) -> Result<()> {
        if self.open {
            return Err(Error::AlreadyOpen);
        }
        if self.outbound.is_closed() {
            return Err(Error::LinkClosed);
        }

        debug!(link = %self.name, mtu = self.max_write_size + ATT_OVERHEAD, "Channel link open");
        self.open = true;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if self.open {
            debug!(link = %self.name, "Channel link closed");
        }
        self.open = false;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }

    async fn write(&mut self, chunk: &[u8]) -> Result<()> {
        if !self.open {
            return Err(Error::NotOpen);
        }
        if chunk.len() > self.max_write_size {
            return Err(Error::WriteRejected(format!(
                "{} bytes exceeds write size {}",
                chunk.len(),
                self.max_write_size
            )));
        }

        trace!(link = %self.name, chunk = hex::encode(chunk), "Write");

        self.outbound
            .send(Bytes::copy_from_slice(chunk))
            .map_err(|_| Error::LinkClosed)
    }

    async fn recv(&mut self) -> Result<Bytes> {
        if !self.open {
            return Err(Error::NotOpen);
        }

        let chunk = self.inbound.recv().await.ok_or(Error::LinkClosed)?;
        trace!(link = %self.name, chunk = hex::encode(&chunk), "Notify");
        Ok(chunk)
    }

    fn max_write_size(&self) -> usize {
        self.max_write_size
    }

    fn max_data_section(&self) -> usize {
        MAX_DATA_SECTION
    }

    fn describe(&self) -> String {
        format!("{} (write size {})", self.name, self.max_write_size)
    }
}

impl ChannelPeer {
    /// Next chunk written by the session, `None` once the link is dropped
    pub async fn recv_written(&mut self) -> Option<Bytes> {
        self.written.recv().await
    }

    /// Written chunk, if one is queued
    pub fn try_recv_written(&mut self) -> Option<Bytes> {
        self.written.try_recv().ok()
    }

    /// Push an inbound chunk to the session; false once the link is dropped
    pub fn notify(&self, chunk: impl Into<Bytes>) -> bool {
        self.notify.send(chunk.into()).is_ok()
    }

    /// Push `bytes` split into chunks of `size`
    pub fn notify_chunked(&self, bytes: &[u8], size: usize) -> bool {
        bytes
            .chunks(size.max(1))
            .all(|chunk| self.notify(Bytes::copy_from_slice(chunk)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_write_reaches_peer() {
        let (mut link, mut peer) = ChannelLink::default_pair();
        assert_eq!(link.max_write_size(), 20);

        link.open().await.unwrap();
        link.write(&[1, 2, 3]).await.unwrap();

        assert_eq!(peer.recv_written().await.unwrap().as_ref(), &[1, 2, 3]);
    }

    #[tokio::test]
    async fn test_notify_reaches_link() {
        let (mut link, peer) = ChannelLink::pair(8);
        link.open().await.unwrap();

        assert!(peer.notify_chunked(&[1, 2, 3, 4, 5, 6, 7], 3));
        assert_eq!(link.recv().await.unwrap().as_ref(), &[1, 2, 3]);
        assert_eq!(link.recv().await.unwrap().as_ref(), &[4, 5, 6]);
        assert_eq!(link.recv().await.unwrap().as_ref(), &[7]);
    }

    #[tokio::test]
    async fn test_not_open() {
        let (mut link, _peer) = ChannelLink::default_pair();

        assert!(matches!(link.write(&[1]).await, Err(Error::NotOpen)));
        assert!(matches!(link.recv().await, Err(Error::NotOpen)));

        link.open().await.unwrap();
        assert!(matches!(link.open().await, Err(Error::AlreadyOpen)));
    }

    #[tokio::test]
    async fn test_oversized_write_rejected() {
        let (mut link, _peer) = ChannelLink::pair(8);
        link.open().await.unwrap();

        assert!(matches!(
            link.write(&[0; 6]).await,
            Err(Error::WriteRejected(_))
        ));
    }

    #[tokio::test]
    async fn test_peer_dropped() {
        let (mut link, peer) = ChannelLink::default_pair();
        link.open().await.unwrap();
        drop(peer);

        assert!(matches!(link.write(&[1]).await, Err(Error::LinkClosed)));
        assert!(matches!(link.recv().await, Err(Error::LinkClosed)));
    }
}
