//! ZYBL command identifiers and descriptors

use std::fmt;
use std::time::Duration;

use crate::constants::{EFFECT_TIMEOUT, STATUS_TIMEOUT};
use crate::payload::{self, PayloadCodec};

/// 16-bit command identifier (CID)
///
/// Any value is representable; the associated constants name the ones the
/// engine ships codecs for.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommandId(pub u16);

impl CommandId {
    // Light parameter control
    pub const INTENSITY: Self = Self(0x1001);
    pub const COLOR_TEMPERATURE: Self = Self(0x1002);
    pub const RGB: Self = Self(0x1003);
    pub const HUE: Self = Self(0x1004);
    pub const SATURATION: Self = Self(0x1005);
    pub const CMY: Self = Self(0x1006);
    pub const CHROMA: Self = Self(0x1007);
    pub const HSI: Self = Self(0x100A);
    pub const INTENSITY_MODE: Self = Self(0x100B);

    // Status / query
    pub const VOLTAGE: Self = Self(0x2001);
    pub const DEVICE_INFO: Self = Self(0x2003);
    pub const DEVICE_ID: Self = Self(0x2005);

    /// Online/status notification, also pushed unsolicited
    pub const ONLINE: Self = Self(0xFFFF);

    /// Raw code
    pub const fn code(self) -> u16 {
        self.0
    }

    /// Namespace from the high nibble
    pub fn namespace(self) -> Namespace {
        match self.0 >> 12 {
            0x1 => Namespace::Control,
            0x2 => Namespace::Status,
            0x7 => Namespace::Effect,
            0x8 => Namespace::Config,
            _ => Namespace::Other,
        }
    }

    /// Get command name
    pub fn name(self) -> &'static str {
        match self {
            Self::INTENSITY => "INTENSITY",
            Self::COLOR_TEMPERATURE => "COLOR_TEMPERATURE",
            Self::RGB => "RGB",
            Self::HUE => "HUE",
            Self::SATURATION => "SATURATION",
            Self::CMY => "CMY",
            Self::CHROMA => "CHROMA",
            Self::HSI => "HSI",
            Self::INTENSITY_MODE => "INTENSITY_MODE",
            Self::VOLTAGE => "VOLTAGE",
            Self::DEVICE_INFO => "DEVICE_INFO",
            Self::DEVICE_ID => "DEVICE_ID",
            Self::ONLINE => "ONLINE",
            _ => "CID_UNKNOWN",
        }
    }

    /// Default response deadline for this namespace
    pub fn default_timeout(self) -> Duration {
        match self.namespace() {
            Namespace::Effect | Namespace::Config => EFFECT_TIMEOUT,
            _ => STATUS_TIMEOUT,
        }
    }
}

impl From<u16> for CommandId {
    fn from(code: u16) -> Self {
        Self(code)
    }
}

impl From<CommandId> for u16 {
    fn from(cmd: CommandId) -> u16 {
        cmd.0
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(0x{:04X})", self.name(), self.0)
    }
}

/// Identifier namespace
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Namespace {
    /// `0x1xxx`: light parameters
    Control,
    /// `0x2xxx`: status and queries
    Status,
    /// `0x7xxx`: effects
    Effect,
    /// `0x8xxx`: configuration
    Config,
    Other,
}

/// Which request kinds a command accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

impl Direction {
    pub fn allows_read(self) -> bool {
        !matches!(self, Self::WriteOnly)
    }

    pub fn allows_write(self) -> bool {
        !matches!(self, Self::ReadOnly)
    }
}

/// Payload layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// `device_id(2 LE) + control_flag(1) + value`
    Addressed,

    /// Empty request; the response payload is the bare value
    NoArgument,

    /// Payload passed through verbatim
    Raw,
}

/// Static description of one command
#[derive(Debug, Clone)]
pub struct CommandDescriptor {
    pub id: CommandId,
    pub direction: Direction,
    pub shape: Shape,
    pub codec: PayloadCodec,
    pub timeout: Duration,
}

impl CommandDescriptor {
    /// Create a descriptor with the namespace's default timeout
    pub fn new(id: CommandId, direction: Direction, shape: Shape, codec: PayloadCodec) -> Self {
        Self {
            id,
            direction,
            shape,
            codec,
            timeout: id.default_timeout(),
        }
    }

    /// Override the response deadline
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Descriptor used for identifiers nobody registered
    pub fn passthrough(id: CommandId) -> Self {
        Self::new(id, Direction::ReadWrite, Shape::Raw, payload::RAW)
    }

    /// Descriptors for every command the engine ships a codec for
    pub fn builtin() -> Vec<Self> {
        use Direction::*;
        use Shape::*;

        vec![
            Self::new(CommandId::INTENSITY, ReadWrite, Addressed, payload::INTENSITY),
            Self::new(CommandId::COLOR_TEMPERATURE, ReadWrite, Addressed, payload::KELVIN),
            Self::new(CommandId::SATURATION, ReadWrite, Addressed, payload::SATURATION),
            Self::new(CommandId::CHROMA, ReadWrite, Addressed, payload::CHROMA),
            Self::new(CommandId::HSI, ReadWrite, Addressed, payload::HSI),
            Self::new(CommandId::INTENSITY_MODE, ReadWrite, Addressed, payload::INTENSITY_MODE),
            Self::new(CommandId::VOLTAGE, ReadOnly, Addressed, payload::VOLTAGE),
            Self::new(CommandId::DEVICE_INFO, ReadOnly, NoArgument, payload::DEVICE_INFO),
            Self::new(CommandId::DEVICE_ID, ReadOnly, NoArgument, payload::DEVICE_ID),
            Self::new(CommandId::ONLINE, ReadOnly, Addressed, payload::ONLINE),
        ]
    }
}
