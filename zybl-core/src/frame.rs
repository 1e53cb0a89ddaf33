//! ZYBL frame wrapping and unwrapping

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::fmt;
use tracing::trace;

use crate::{
    checksum,
    command::CommandId,
    constants::{DATA_HEADER_SIZE, FRAME_OVERHEAD, MAX_DATA_SECTION, PAD, SYNC_HEADER},
    error::{Error, Result},
};

/// Frame codec
///
/// # Frame Structure
///
/// ```text
/// ┌─────────────┬──────────┬─────────┬────────────────┬─────────────┐
/// │ Sync Header │  Length  │   Pad   │  Data Section  │  Checksum   │
/// │   24 3C     │  1 byte  │   00    │  Length bytes  │   2 bytes   │
/// │             │          │         │                │  (LE u16)   │
/// └─────────────┴──────────┴─────────┴────────────────┴─────────────┘
/// ```
///
/// The checksum is CRC-16/XMODEM over the data section only.
///
/// # Examples
///
/// ```
/// use zybl_core::Frame;
///
/// let data = [0x00, 0x01, 0x01, 0x00, 0x03, 0x20];
/// let frame = Frame::encode(&data).unwrap();
/// assert_eq!(frame.len(), data.len() + 6);
///
/// let decoded = Frame::decode(&frame).unwrap();
/// assert_eq!(decoded.as_ref(), &data);
/// ```
pub struct Frame;

impl Frame {
    /// Wrap a data section into a frame
    ///
    /// # Errors
    ///
    /// `FrameTooLarge` if the data section exceeds 255 bytes.
    pub fn encode(data_section: &[u8]) -> Result<Bytes> {
        Self::encode_with_limit(data_section, MAX_DATA_SECTION)
    }

    /// Wrap a data section, enforcing `min(255, limit)`
    ///
    /// `limit` is the transport's negotiated maximum data section size.
    pub fn encode_with_limit(data_section: &[u8], limit: usize) -> Result<Bytes> {
        let max = limit.min(MAX_DATA_SECTION);
        if data_section.len() > max {
            return Err(Error::FrameTooLarge {
                size: data_section.len(),
                max,
            });
        }

        let mut buf = BytesMut::with_capacity(data_section.len() + FRAME_OVERHEAD);
        buf.put_slice(&SYNC_HEADER);
        buf.put_u8(data_section.len() as u8);
        buf.put_u8(PAD);
        buf.put_slice(data_section);
        buf.put_u16_le(checksum::calculate(data_section));

        trace!(frame = hex::encode(&buf), "Encoded frame");

        Ok(buf.freeze())
    }

    /// Validate a complete frame and return its data section
    ///
    /// # Errors
    ///
    /// - `InvalidHeader` if the frame does not start with `24 3C
    ///   <len> 00`
    /// - `LengthMismatch` if the length byte disagrees with the enclosed data
    /// - `ChecksumMismatch` if the CRC does not verify
    pub fn decode(bytes: &[u8]) -> Result<Bytes> {
        if bytes.len() < SYNC_HEADER.len() || bytes[..2] != SYNC_HEADER {
            return Err(Error::InvalidHeader {
                found: bytes[..bytes.len().min(2)].to_vec(),
            });
        }

        if bytes.len() < FRAME_OVERHEAD {
            return Err(Error::LengthMismatch {
                declared: bytes.get(2).copied().unwrap_or(0) as usize,
                actual: 0,
            });
        }

        if bytes[3] != PAD {
            return Err(Error::InvalidHeader {
                found: bytes[..4].to_vec(),
            });
        }

        let declared = bytes[2] as usize;
        let actual = bytes.len() - FRAME_OVERHEAD;
        if declared != actual {
            return Err(Error::LengthMismatch { declared, actual });
        }

        let data = &bytes[4..4 + actual];
        let mut tail = &bytes[4 + actual..];
        let received = tail.get_u16_le();
        let expected = checksum::calculate(data);
        if expected != received {
            return Err(Error::ChecksumMismatch { expected, received });
        }

        Ok(Bytes::copy_from_slice(data))
    }

    /// Total wire size announced by a header, if enough bytes are present
    pub fn announced_len(header: &[u8]) -> Option<usize> {
        header.get(2).map(|&len| len as usize + FRAME_OVERHEAD)
    }
}

/// Parsed data section
///
/// ```text
/// protocol_field(2 LE) | sequence(2 LE) | command_id(2 LE) | payload
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct DataSection {
    pub protocol_field: u16,
    pub sequence: u16,
    pub command: CommandId,
    pub payload: Bytes,
}

impl DataSection {
    pub fn new(
        protocol_field: u16,
        sequence: u16,
        command: CommandId,
        payload: impl Into<Bytes>,
    ) -> Self {
        Self {
            protocol_field,
            sequence,
            command,
            payload: payload.into(),
        }
    }

    /// Split raw data section bytes
    ///
    /// # Errors
    ///
    /// `MalformedDataSection` if fewer than 6 bytes are present.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < DATA_HEADER_SIZE {
            return Err(Error::MalformedDataSection(bytes.len()));
        }

        let mut buf = bytes;
        let protocol_field = buf.get_u16_le();
        let sequence = buf.get_u16_le();
        let command = CommandId(buf.get_u16_le());

        Ok(Self {
            protocol_field,
            sequence,
            command,
            payload: Bytes::copy_from_slice(buf),
        })
    }

    /// Build the data section bytes
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.size());
        buf.put_u16_le(self.protocol_field);
        buf.put_u16_le(self.sequence);
        buf.put_u16_le(self.command.code());
        buf.put_slice(&self.payload);
        buf.freeze()
    }

    /// Size in bytes
    pub fn size(&self) -> usize {
        DATA_HEADER_SIZE + self.payload.len()
    }
}

impl fmt::Debug for DataSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataSection")
            .field("protocol_field", &format!("0x{:04X}", self.protocol_field))
            .field("sequence", &self.sequence)
            .field("command", &self.command)
            .field("payload", &hex::encode(&self.payload))
            .finish()
    }
}

impl fmt::Display for DataSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DataSection[{}](seq={}, len={})",
            self.command,
            self.sequence,
            self.payload.len()
        )
    }
}
