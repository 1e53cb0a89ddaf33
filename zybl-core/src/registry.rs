//! Command codec registry
//!
//! Maps a [`CommandId`] to its [`CommandDescriptor`] and turns logical
//! requests into payload bytes (and response payloads back into values).
//! Built once at start-up and shared read-only afterwards.

use std::collections::HashMap;

use bytes::{BufMut, Bytes, BytesMut};
use tracing::{debug, trace};

use zybl_types::Value;

use crate::command::{CommandDescriptor, CommandId, Shape};
use crate::config::{ControlFlag, ControlFlags};
use crate::constants::ADDRESS_PREFIX_SIZE;
use crate::error::{Error, Result};

/// Result of decoding one response payload
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    /// Device the response came from (addressed commands only)
    pub device_id: Option<u16>,

    /// Control flag echoed by the device (addressed commands only)
    pub flag: Option<ControlFlag>,

    pub value: Value,

    /// Set when no descriptor was registered and `value` is the raw payload
    pub unknown: bool,
}

/// Registry of command descriptors
///
/// Holds no control-flag values of its own; callers pass the session's
/// [`ControlFlags`] so the protocol configuration stays the only source.
#[derive(Debug, Clone)]
pub struct Registry {
    descriptors: HashMap<CommandId, CommandDescriptor>,
}

impl Registry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            descriptors: HashMap::new(),
        }
    }

    /// Registry holding every built-in descriptor
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        for descriptor in CommandDescriptor::builtin() {
            // builtin ids are distinct
            let _ = registry.register(descriptor);
        }
        registry
    }

    /// Add a descriptor
    ///
    /// # Errors
    ///
    /// `DuplicateCommand` if the identifier is already registered.
    pub fn register(&mut self, descriptor: CommandDescriptor) -> Result<()> {
        if self.descriptors.contains_key(&descriptor.id) {
            return Err(Error::DuplicateCommand(descriptor.id));
        }

        debug!(command = %descriptor.id, codec = descriptor.codec.name, "Registered command");
        self.descriptors.insert(descriptor.id, descriptor);
        Ok(())
    }

    /// Registered descriptor, if any
    pub fn get(&self, command: CommandId) -> Option<&CommandDescriptor> {
        self.descriptors.get(&command)
    }

    /// Registered descriptor or a pass-through one
    pub fn descriptor(&self, command: CommandId) -> CommandDescriptor {
        self.get(command)
            .cloned()
            .unwrap_or_else(|| CommandDescriptor::passthrough(command))
    }

    pub fn contains(&self, command: CommandId) -> bool {
        self.descriptors.contains_key(&command)
    }

    /// Device id carried in the address prefix of an addressed payload
    pub fn addressed_device(&self, command: CommandId, payload: &[u8]) -> Option<u16> {
        match (self.get(command)?.shape, payload) {
            (Shape::Addressed, [lo, hi, ..]) => Some(u16::from_le_bytes([*lo, *hi])),
            _ => None,
        }
    }

    /// Build a request payload
    ///
    /// Addressed commands produce `device_id(2 LE) + flag + value`. Reads
    /// send zero placeholder bytes of the value's width. No-argument queries
    /// produce an empty payload; pass-through commands send `Value::Raw`
    /// verbatim.
    ///
    /// # Errors
    ///
    /// - `DirectionMismatch` if the descriptor does not accept this direction
    /// - `InvalidArgument` if a write carries no value or the wrong kind
    pub fn encode_request(
        &self,
        command: CommandId,
        write: bool,
        device_id: u16,
        value: Option<&Value>,
        flags: ControlFlags,
    ) -> Result<Bytes> {
        let descriptor = self.descriptor(command);

        let allowed = if write {
            descriptor.direction.allows_write()
        } else {
            descriptor.direction.allows_read()
        };
        if !allowed {
            return Err(Error::DirectionMismatch {
                command,
                requested: if write { "write" } else { "read" },
            });
        }

        let mut buf = BytesMut::new();

        match descriptor.shape {
            Shape::NoArgument => {}
            Shape::Raw => {
                if let Some(value) = value {
                    descriptor.codec.encode(value, &mut buf)?;
                }
            }
            Shape::Addressed => {
                let width = descriptor.codec.width.unwrap_or(0);
                buf.reserve(ADDRESS_PREFIX_SIZE + width);
                buf.put_u16_le(device_id);
                buf.put_u8(flags.for_request(write));

                if write {
                    let value = value.ok_or_else(|| {
                        Error::InvalidArgument(format!("{} write needs a value", command))
                    })?;
                    descriptor.codec.encode(value, &mut buf)?;
                } else {
                    buf.put_bytes(0, width);
                }
            }
        }

        trace!(
            command = %command,
            write,
            payload = hex::encode(&buf),
            "Encoded request payload"
        );

        Ok(buf.freeze())
    }

    /// Decode a response payload
    ///
    /// # Errors
    ///
    /// - `UnknownCommand` (carrying the raw bytes) if nothing is registered
    /// - `PayloadLengthMismatch` if the value is not exactly the codec's width
    pub fn decode_response(
        &self,
        command: CommandId,
        payload: &[u8],
        flags: ControlFlags,
    ) -> Result<Decoded> {
        let descriptor = self.get(command).ok_or_else(|| Error::UnknownCommand {
            command,
            raw: Bytes::copy_from_slice(payload),
        })?;

        let (device_id, flag, value_bytes) = match descriptor.shape {
            Shape::Addressed => {
                if payload.len() < ADDRESS_PREFIX_SIZE {
                    return Err(Error::PayloadLengthMismatch {
                        command,
                        expected: ADDRESS_PREFIX_SIZE + descriptor.codec.width.unwrap_or(0),
                        actual: payload.len(),
                    });
                }
                let device_id = u16::from_le_bytes([payload[0], payload[1]]);
                let flag = flags.classify(payload[2]);
                (Some(device_id), Some(flag), &payload[ADDRESS_PREFIX_SIZE..])
            }
            Shape::NoArgument | Shape::Raw => (None, None, payload),
        };

        if let Some(width) = descriptor.codec.width {
            if value_bytes.len() != width {
                let prefix = payload.len() - value_bytes.len();
                return Err(Error::PayloadLengthMismatch {
                    command,
                    expected: prefix + width,
                    actual: payload.len(),
                });
            }
        }

        Ok(Decoded {
            device_id,
            flag,
            value: descriptor.codec.decode(command, value_bytes)?,
            unknown: false,
        })
    }

    /// Decode, surfacing unregistered commands as raw values
    pub fn decode_or_passthrough(
        &self,
        command: CommandId,
        payload: &[u8],
        flags: ControlFlags,
    ) -> Result<Decoded> {
        match self.decode_response(command, payload, flags) {
            Err(Error::UnknownCommand { raw, .. }) => Ok(Decoded {
                device_id: None,
                flag: None,
                value: Value::Raw(raw),
                unknown: true,
            }),
            other => other,
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::with_builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Direction;
    use crate::payload;
    use pretty_assertions::assert_eq;

    const FLAGS: ControlFlags = ControlFlags { read: 0x00, write: 0x01 };

    #[test]
    fn test_register_duplicate() {
        let mut registry = Registry::with_builtin();
        let result = registry.register(CommandDescriptor::new(
            CommandId::INTENSITY,
            Direction::ReadWrite,
            Shape::Addressed,
            payload::INTENSITY,
        ));

        assert!(matches!(result, Err(Error::DuplicateCommand(CommandId::INTENSITY))));
    }

    #[test]
    fn test_register_new_command() {
        let mut registry = Registry::with_builtin();
        let effect = CommandId(0x7001);
        assert!(!registry.contains(effect));

        registry
            .register(CommandDescriptor::new(effect, Direction::WriteOnly, Shape::Addressed, payload::RAW))
            .unwrap();

        assert!(registry.contains(effect));
        assert_eq!(registry.descriptor(effect).timeout, crate::constants::EFFECT_TIMEOUT);
    }

    #[test]
    fn test_encode_intensity_write() {
        let registry = Registry::with_builtin();
        let payload = registry
            .encode_request(CommandId::INTENSITY, true, 1, Some(&Value::Intensity(0.5)), FLAGS)
            .unwrap();

        assert_eq!(payload.as_ref(), &[0x01, 0x00, 0x01, 0x00, 0x00, 0x00, 0x3F]);
    }

    #[test]
    fn test_encode_read_placeholder() {
        let registry = Registry::with_builtin();
        let payload = registry
            .encode_request(CommandId::COLOR_TEMPERATURE, false, 0x0380, None, FLAGS)
            .unwrap();

        assert_eq!(payload.as_ref(), &[0x80, 0x03, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn test_encode_no_argument() {
        let registry = Registry::with_builtin();
        let payload = registry
            .encode_request(CommandId::DEVICE_INFO, false, 7, None, FLAGS)
            .unwrap();

        assert!(payload.is_empty());
    }

    #[test]
    fn test_direction_mismatch() {
        let registry = Registry::with_builtin();

        let result = registry.encode_request(CommandId::VOLTAGE, true, 1, Some(&Value::Voltage(3)), FLAGS);
        assert!(matches!(result, Err(Error::DirectionMismatch { requested: "write", .. })));

        let mut registry = Registry::with_builtin();
        let effect = CommandId(0x7002);
        registry
            .register(CommandDescriptor::new(effect, Direction::WriteOnly, Shape::Addressed, payload::RAW))
            .unwrap();
        let result = registry.encode_request(effect, false, 1, None, FLAGS);
        assert!(matches!(result, Err(Error::DirectionMismatch { requested: "read", .. })));
    }

    #[test]
    fn test_write_without_value() {
        let registry = Registry::with_builtin();
        let result = registry.encode_request(CommandId::INTENSITY, true, 1, None, FLAGS);

        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_custom_flags() {
        let registry = Registry::with_builtin();
        let custom = ControlFlags { read: 0x10, write: 0x20 };
        let payload = registry
            .encode_request(CommandId::COLOR_TEMPERATURE, true, 0, Some(&Value::Kelvin(2700)), custom)
            .unwrap();

        assert_eq!(payload[2], 0x20);

        let decoded = registry.decode_response(CommandId::COLOR_TEMPERATURE, &payload, custom).unwrap();
        assert_eq!(decoded.flag, Some(ControlFlag::Write));

        // the same byte read with the default pair is not a known flag
        let decoded = registry.decode_response(CommandId::COLOR_TEMPERATURE, &payload, FLAGS).unwrap();
        assert_eq!(decoded.flag, Some(ControlFlag::Other(0x20)));
    }

    #[test]
    fn test_decode_addressed() {
        let registry = Registry::with_builtin();
        let decoded = registry
            .decode_response(CommandId::INTENSITY, &[0x01, 0x00, 0x01, 0x00, 0x00, 0x00, 0x3F], FLAGS)
            .unwrap();

        assert_eq!(decoded.device_id, Some(1));
        assert_eq!(decoded.flag, Some(ControlFlag::Write));
        assert_eq!(decoded.value, Value::Intensity(0.5));
        assert!(!decoded.unknown);
    }

    #[test]
    fn test_decode_length_mismatch() {
        let registry = Registry::with_builtin();

        // one byte short
        let result = registry.decode_response(CommandId::INTENSITY, &[0x01, 0x00, 0x01, 0x00, 0x00, 0x00], FLAGS);
        assert!(matches!(
            result,
            Err(Error::PayloadLengthMismatch { expected: 7, actual: 6, .. })
        ));

        // one byte long
        let result = registry.decode_response(CommandId::DEVICE_ID, &[0x01, 0x00, 0x00], FLAGS);
        assert!(matches!(
            result,
            Err(Error::PayloadLengthMismatch { expected: 2, actual: 3, .. })
        ));

        // no address prefix
        let result = registry.decode_response(CommandId::ONLINE, &[0x01], FLAGS);
        assert!(matches!(result, Err(Error::PayloadLengthMismatch { .. })));
    }

    #[test]
    fn test_decode_unknown_command() {
        let registry = Registry::with_builtin();
        let raw = [0x0A, 0x0B, 0x0C];

        match registry.decode_response(CommandId(0x7F01), &raw, FLAGS) {
            Err(Error::UnknownCommand { command, raw: bytes }) => {
                assert_eq!(command, CommandId(0x7F01));
                assert_eq!(bytes.as_ref(), &raw);
            }
            other => panic!("expected UnknownCommand, got {:?}", other),
        }

        let decoded = registry.decode_or_passthrough(CommandId(0x7F01), &raw, FLAGS).unwrap();
        assert!(decoded.unknown);
        assert_eq!(decoded.value, Value::Raw(Bytes::copy_from_slice(&raw)));
    }

    #[test]
    fn test_passthrough_encode() {
        let registry = Registry::with_builtin();
        let raw = Bytes::from_static(&[1, 2, 3]);
        let payload = registry
            .encode_request(CommandId(0x7F01), true, 9, Some(&Value::Raw(raw.clone())), FLAGS)
            .unwrap();

        assert_eq!(payload, raw);
    }

    #[test]
    fn test_addressed_device() {
        let registry = Registry::with_builtin();

        assert_eq!(registry.addressed_device(CommandId::ONLINE, &[0x80, 0x03, 0x00, 0x01, 0x00]), Some(0x0380));
        assert_eq!(registry.addressed_device(CommandId::INTENSITY, &[0x01]), None);
        assert_eq!(registry.addressed_device(CommandId::DEVICE_ID, &[0x01, 0x00]), None);
        assert_eq!(registry.addressed_device(CommandId(0x7F01), &[0x01, 0x00, 0x00]), None);
    }
}
