//! # zybl-core
//!
//! Core protocol implementation for ZYBL-framed light fixtures.
//!
//! This crate provides the low-level protocol primitives:
//! - Frame wrapping/unwrapping and the CRC-16 checksum
//! - Command identifiers, descriptors and payload codecs
//! - Request/response correlation and inbound reassembly
//! - Protocol configuration and constants

pub mod checksum;
pub mod command;
pub mod config;
pub mod constants;
pub mod correlation;
pub mod error;
pub mod frame;
pub mod payload;
pub mod reassembly;
pub mod registry;
pub mod session;

pub use command::{CommandDescriptor, CommandId, Direction, Namespace, Shape};
pub use config::{ControlFlag, ControlFlags, MatchPolicy, ProtocolConfig};
pub use correlation::{Correlator, Delivery, Response, ResponseHandle};
pub use error::{Error, Result, Teardown};
pub use frame::{DataSection, Frame};
pub use payload::PayloadCodec;
pub use reassembly::FrameBuffer;
pub use registry::{Decoded, Registry};
pub use session::SessionState;

pub use zybl_types::Value;
