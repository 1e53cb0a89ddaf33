//! Protocol constants

use std::time::Duration;

/// Frame sync header
pub const SYNC_HEADER: [u8; 2] = [0x24, 0x3C];

/// Byte following the length byte
pub const PAD: u8 = 0x00;

/// Header (sync + length + pad) plus trailing checksum
pub const FRAME_OVERHEAD: usize = 6;

/// Largest data section the one-byte length field can describe
pub const MAX_DATA_SECTION: usize = u8::MAX as usize;

/// protocol_field + sequence + command_id
pub const DATA_HEADER_SIZE: usize = 6;

/// Addressed payload prefix: device_id(2) + control_flag(1)
pub const ADDRESS_PREFIX_SIZE: usize = 3;

/// Protocol field observed on frames from the current app (`00 01` on the wire)
pub const PROTOCOL_FIELD: u16 = 0x0100;

/// Protocol field from older captures (`01 00` on the wire)
pub const PROTOCOL_FIELD_LEGACY: u16 = 0x0001;

/// Control flag marking a read/query
pub const READ_FLAG: u8 = 0x00;

/// Control flag marking a write/control
pub const WRITE_FLAG: u8 = 0x01;

/// Device id used before the fixture reports its own
pub const DEFAULT_DEVICE_ID: u16 = 0x0000;

/// Device id addressing every fixture on the link
pub const BROADCAST_DEVICE_ID: u16 = 0xFFFF;

/// Response deadline for status and basic light commands
pub const STATUS_TIMEOUT: Duration = Duration::from_secs(2);

/// Response deadline for effect and configuration commands
pub const EFFECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default ATT payload for an un-negotiated BLE link (MTU 23 - 3)
pub const DEFAULT_WRITE_SIZE: usize = 20;

/// Lowest color temperature the fixture accepts
pub const MIN_KELVIN: u16 = 2700;

/// Highest color temperature the fixture accepts
pub const MAX_KELVIN: u16 = 6500;

/// Upper bound on requests in flight per session
pub const MAX_PENDING: usize = 64;

/// Upper bound on `max_pending`; keeps at least one sequence number free
pub const MAX_PENDING_LIMIT: usize = u16::MAX as usize;

/// Retired sequences remembered so late replies are not re-matched by command
pub const RETIRED_WINDOW: usize = 32;
