//! Per-command value codecs
//!
//! Each codec is a pair of plain functions between a [`Value`] and the value
//! bytes that follow the address prefix. Composite values concatenate their
//! fields in declared order, little-endian, with no length prefixes.
//!
//! ```text
//! INTENSITY       f32 fraction 0..=1
//! KELVIN          u16, MIN_KELVIN..=MAX_KELVIN
//! SATURATION      f32 fraction 0..=1
//! CHROMA          u8 gamut | f32 x | f32 y
//! HSI             f32 hue | f32 saturation | u16 intensity
//! INTENSITY_MODE  f32 intensity | i8 mode
//! VOLTAGE         u16
//! ONLINE          u16 (non-zero = online)
//! DEVICE_ID       u16
//! DEVICE_INFO     NUL-separated ASCII, variable
//! RAW             anything, variable
//! ```

use byteorder::{ByteOrder, LittleEndian};
use bytes::{BufMut, Bytes, BytesMut};

use zybl_types::{Chroma, DeviceInfo, Hsi, Value};

use crate::command::CommandId;
use crate::constants::{MAX_KELVIN, MIN_KELVIN};
use crate::error::{Error, Result};

/// Encode/decode function pair for one value layout
#[derive(Debug, Clone, Copy)]
pub struct PayloadCodec {
    pub name: &'static str,

    /// Exact value width, `None` for variable-length layouts
    pub width: Option<usize>,

    encode: fn(&Value, &mut BytesMut) -> Result<()>,
    decode: fn(&[u8]) -> Result<Value>,
}

impl PayloadCodec {
    /// Build a codec from its functions
    pub const fn new(
        name: &'static str,
        width: Option<usize>,
        encode: fn(&Value, &mut BytesMut) -> Result<()>,
        decode: fn(&[u8]) -> Result<Value>,
    ) -> Self {
        Self {
            name,
            width,
            encode,
            decode,
        }
    }

    pub fn encode(&self, value: &Value, buf: &mut BytesMut) -> Result<()> {
        (self.encode)(value, buf)
    }

    /// Decode the value bytes of a `command` response
    ///
    /// # Errors
    ///
    /// `PayloadLengthMismatch` if a fixed-width codec gets any other length.
    pub fn decode(&self, command: CommandId, bytes: &[u8]) -> Result<Value> {
        if let Some(width) = self.width {
            if bytes.len() != width {
                return Err(Error::PayloadLengthMismatch {
                    command,
                    expected: width,
                    actual: bytes.len(),
                });
            }
        }
        (self.decode)(bytes)
    }
}

fn wrong_value(expected: &str, got: &Value) -> Error {
    Error::InvalidArgument(format!("expected {} value, got {}", expected, got.kind()))
}

fn check_fraction(name: &str, v: f32) -> Result<()> {
    if (0.0..=1.0).contains(&v) {
        Ok(())
    } else {
        Err(Error::InvalidArgument(format!("{} {} outside 0..=1", name, v)))
    }
}

pub const INTENSITY: PayloadCodec = PayloadCodec::new(
    "intensity",
    Some(4),
    |value, buf| match value {
        Value::Intensity(v) => {
            check_fraction("intensity", *v)?;
            buf.put_f32_le(*v);
            Ok(())
        }
        other => Err(wrong_value("intensity", other)),
    },
    |b| Ok(Value::Intensity(LittleEndian::read_f32(b))),
);

pub const KELVIN: PayloadCodec = PayloadCodec::new(
    "kelvin",
    Some(2),
    |value, buf| match value {
        Value::Kelvin(k) => {
            if !(MIN_KELVIN..=MAX_KELVIN).contains(k) {
                return Err(Error::InvalidArgument(format!(
                    "color temperature {}K outside {}..={}",
                    k, MIN_KELVIN, MAX_KELVIN
                )));
            }
            buf.put_u16_le(*k);
            Ok(())
        }
        other => Err(wrong_value("kelvin", other)),
    },
    |b| Ok(Value::Kelvin(LittleEndian::read_u16(b))),
);

pub const SATURATION: PayloadCodec = PayloadCodec::new(
    "saturation",
    Some(4),
    |value, buf| match value {
        Value::Saturation(v) => {
            check_fraction("saturation", *v)?;
            buf.put_f32_le(*v);
            Ok(())
        }
        other => Err(wrong_value("saturation", other)),
    },
    |b| Ok(Value::Saturation(LittleEndian::read_f32(b))),
);

pub const CHROMA: PayloadCodec = PayloadCodec::new(
    "chroma",
    Some(9),
    |value, buf| match value {
        Value::Chroma(c) => {
            buf.put_u8(c.gamut);
            buf.put_f32_le(c.x);
            buf.put_f32_le(c.y);
            Ok(())
        }
        other => Err(wrong_value("chroma", other)),
    },
    |b| {
        Ok(Value::Chroma(Chroma {
            gamut: b[0],
            x: LittleEndian::read_f32(&b[1..5]),
            y: LittleEndian::read_f32(&b[5..9]),
        }))
    },
);

pub const HSI: PayloadCodec = PayloadCodec::new(
    "hsi",
    Some(10),
    |value, buf| match value {
        Value::Hsi(h) => {
            buf.put_f32_le(h.hue);
            buf.put_f32_le(h.saturation);
            buf.put_u16_le(h.intensity);
            Ok(())
        }
        other => Err(wrong_value("hsi", other)),
    },
    |b| {
        Ok(Value::Hsi(Hsi {
            hue: LittleEndian::read_f32(&b[0..4]),
            saturation: LittleEndian::read_f32(&b[4..8]),
            intensity: LittleEndian::read_u16(&b[8..10]),
        }))
    },
);

pub const INTENSITY_MODE: PayloadCodec = PayloadCodec::new(
    "intensity_mode",
    Some(5),
    |value, buf| match value {
        Value::IntensityMode { intensity, mode } => {
            check_fraction("intensity", *intensity)?;
            buf.put_f32_le(*intensity);
            buf.put_i8(*mode);
            Ok(())
        }
        other => Err(wrong_value("intensity_mode", other)),
    },
    |b| {
        Ok(Value::IntensityMode {
            intensity: LittleEndian::read_f32(&b[0..4]),
            mode: b[4] as i8,
        })
    },
);

pub const VOLTAGE: PayloadCodec = PayloadCodec::new(
    "voltage",
    Some(2),
    |value, _| Err(wrong_value("nothing (read-only)", value)),
    |b| Ok(Value::Voltage(LittleEndian::read_u16(b))),
);

pub const ONLINE: PayloadCodec = PayloadCodec::new(
    "online",
    Some(2),
    |value, buf| match value {
        Value::Online(online) => {
            buf.put_u16_le(u16::from(*online));
            Ok(())
        }
        other => Err(wrong_value("online", other)),
    },
    |b| Ok(Value::Online(LittleEndian::read_u16(b) != 0)),
);

pub const DEVICE_ID: PayloadCodec = PayloadCodec::new(
    "device_id",
    Some(2),
    |value, buf| match value {
        Value::DeviceId(id) => {
            buf.put_u16_le(*id);
            Ok(())
        }
        other => Err(wrong_value("device_id", other)),
    },
    |b| Ok(Value::DeviceId(LittleEndian::read_u16(b))),
);

pub const DEVICE_INFO: PayloadCodec = PayloadCodec::new(
    "device_info",
    None,
    |value, _| Err(wrong_value("nothing (read-only)", value)),
    |b| Ok(Value::DeviceInfo(DeviceInfo::parse(b)?)),
);

pub const RAW: PayloadCodec = PayloadCodec::new(
    "raw",
    None,
    |value, buf| match value {
        Value::Raw(raw) => {
            buf.put_slice(raw);
            Ok(())
        }
        Value::Empty => Ok(()),
        other => Err(wrong_value("raw", other)),
    },
    |b| Ok(Value::Raw(Bytes::copy_from_slice(b))),
);
