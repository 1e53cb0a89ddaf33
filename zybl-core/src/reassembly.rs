//! Inbound frame reassembly
//!
//! Notifications arrive in link-sized chunks that need not line up with frame
//! boundaries. [`FrameBuffer`] accumulates them, skips noise in front of a
//! sync header, and yields each complete frame once all of its
//! `4 + len + 2` bytes are present.
//!
//! A frame that fails validation is reported and only its first byte is
//! dropped, so a real frame starting inside the bad one is still found. A
//! header announcing more bytes than have arrived does not hold back a
//! complete, valid frame buffered after it.

use bytes::{Buf, Bytes, BytesMut};
use tracing::trace;

use crate::constants::{PAD, SYNC_HEADER};
use crate::error::{Error, Result};
use crate::frame::Frame;

/// Accumulates inbound chunks and extracts validated data sections
#[derive(Debug, Default)]
pub struct FrameBuffer {
    buffer: BytesMut,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and extract every complete frame
    ///
    /// Each item is either a validated data section or the error of a frame
    /// that was dropped.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Result<Bytes>> {
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(frame) = self.try_extract_one() {
            frames.push(frame);
        }
        frames
    }

    fn try_extract_one(&mut self) -> Option<Result<Bytes>> {
        self.skip_noise();

        if self.buffer.len() < 4 {
            return None;
        }

        if self.buffer[3] != PAD {
            let found = self.buffer[..4].to_vec();
            self.buffer.advance(1);
            return Some(Err(Error::InvalidHeader { found }));
        }

        let total = Frame::announced_len(&self.buffer)?;
        if self.buffer.len() < total {
            return self.resync().map(Ok);
        }

        match Frame::decode(&self.buffer[..total]) {
            Ok(data) => {
                self.buffer.advance(total);
                Some(Ok(data))
            }
            Err(e) => {
                self.buffer.advance(1);
                Some(Err(e))
            }
        }
    }

    /// Look past an incomplete frame for a later one that is complete and valid
    ///
    /// On success the false start and everything up to the end of the found
    /// frame are consumed.
    fn resync(&mut self) -> Option<Bytes> {
        let (start, total, data) = (1..self.buffer.len()).find_map(|pos| {
            let rest = &self.buffer[pos..];
            if !rest.starts_with(&SYNC_HEADER) || rest.get(3) != Some(&PAD) {
                return None;
            }
            let total = Frame::announced_len(rest)?;
            let data = Frame::decode(rest.get(..total)?).ok()?;
            Some((pos, total, data))
        })?;

        trace!(skipped = hex::encode(&self.buffer[..start]), "Dropped incomplete frame start");
        self.buffer.advance(start + total);
        Some(data)
    }

    /// Drop everything before the next sync header
    fn skip_noise(&mut self) {
        let start = self
            .buffer
            .windows(SYNC_HEADER.len())
            .position(|w| w == SYNC_HEADER);

        let skip = match start {
            Some(0) => return,
            Some(pos) => pos,
            // keep a trailing first sync byte, its partner may be in the next chunk
            None if self.buffer.last() == Some(&SYNC_HEADER[0]) => self.buffer.len() - 1,
            None => self.buffer.len(),
        };

        if skip > 0 {
            trace!(skipped = hex::encode(&self.buffer[..skip]), "Discarded noise");
            self.buffer.advance(skip);
        }
    }

    /// Buffered byte count
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Drop all buffered bytes
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}
