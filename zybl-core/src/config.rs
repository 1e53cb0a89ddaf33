//! Protocol configuration
//!
//! Several protocol constants were recovered from captures and have not been
//! confirmed against every firmware. They live here so a correction is a
//! configuration change, not a code change.

use crate::constants;

/// How inbound frames are matched to pending requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchPolicy {
    /// Sequence number (and command) must match
    SequenceOnly,
    
    /// Fall back to the oldest pending request with the same command when
    /// the sequence is not recognised
    #[default]
    SequenceThenCommand,
}

/// Wire-level protocol settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolConfig {
    /// Leading 2-byte field of every data section
    pub protocol_field: u16,
    
    /// Control flag for reads/queries
    pub read_flag: u8,
    
    /// Control flag for writes/controls
    pub write_flag: u8,
    
    /// Device id that addresses every fixture
    pub broadcast_device_id: u16,
    
    /// First sequence number of a fresh session
    pub initial_sequence: u16,
    
    /// Maximum requests in flight
    pub max_pending: usize,
    
    pub match_policy: MatchPolicy,
}

impl ProtocolConfig {
    pub fn new() -> Self {
        Self::default()
    }
    
    /// Set the protocol field
    pub fn with_protocol_field(mut self, field: u16) -> Self {
        self.protocol_field = field;
        self
    }
    
    /// Set read and write control flags
    pub fn with_control_flags(mut self, read: u8, write: u8) -> Self {
        self.read_flag = read;
        self.write_flag = write;
        self
    }
    
    /// Set broadcast device id
    pub fn with_broadcast_device_id(mut self, id: u16) -> Self {
        self.broadcast_device_id = id;
        self
    }
    
    /// Set the first sequence number
    pub fn with_initial_sequence(mut self, seq: u16) -> Self {
        self.initial_sequence = seq;
        self
    }
    
    /// Set maximum requests in flight, capped at `MAX_PENDING_LIMIT`
    pub fn with_max_pending(mut self, max: usize) -> Self {
        self.max_pending = max.min(constants::MAX_PENDING_LIMIT);
        self
    }
    
    /// Set match policy
    pub fn with_match_policy(mut self, policy: MatchPolicy) -> Self {
        self.match_policy = policy;
        self
    }
    
    /// The read/write flag pair
    pub fn flags(&self) -> ControlFlags {
        ControlFlags {
            read: self.read_flag,
            write: self.write_flag,
        }
    }
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            protocol_field: constants::PROTOCOL_FIELD,
            read_flag: constants::READ_FLAG,
            write_flag: constants::WRITE_FLAG,
            broadcast_device_id: constants::BROADCAST_DEVICE_ID,
            initial_sequence: 1,
            max_pending: constants::MAX_PENDING,
            match_policy: MatchPolicy::default(),
        }
    }
}

/// The two reserved control-flag values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlFlags {
    pub read: u8,
    pub write: u8,
}

impl ControlFlags {
    /// Flag byte for a request
    pub fn for_request(self, write: bool) -> u8 {
        if write { self.write } else { self.read }
    }
    
    /// Interpret a flag byte seen in a response
    pub fn classify(self, flag: u8) -> ControlFlag {
        if flag == self.write {
            ControlFlag::Write
        } else if flag == self.read {
            ControlFlag::Read
        } else {
            ControlFlag::Other(flag)
        }
    }
}

impl Default for ControlFlags {
    fn default() -> Self {
        ProtocolConfig::default().flags()
    }
}

/// Decoded control flag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlFlag {
    Read,
    Write,
    Other(u8),
}
