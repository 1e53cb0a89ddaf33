//! # zybl
//!
//! Protocol engine for battery light fixtures speaking the ZYBL framed
//! protocol over a short-range wireless link.
//!
//! ## Features
//!
//! - Typed control and query operations with input validation
//! - CRC-checked framing, chunked writes and inbound reassembly
//! - Request/response correlation with per-command deadlines
//! - Replaceable payload codecs for unconfirmed command layouts
//!
//! ## Quick Start
//!
//! ```no_run
//! use zybl::{ChannelLink, Light, Target};
//!
//! #[tokio::main]
//! async fn main() -> zybl::Result<()> {
//!     let (link, _peer) = ChannelLink::default_pair();
//!     let mut light = Light::new(link);
//!     light.open().await?;
//!     
//!     let id = light.query_device_id().await?;
//!     light.set_color_temperature(Target::Device(id), 5600).await?;
//!     
//!     light.close().await?;
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod light;

// Re-exports
pub use error::{Error, Result};
pub use light::{Light, RetryPolicy, Target, MAX_KELVIN, MIN_KELVIN};

pub use zybl_core::{
    CommandDescriptor, CommandId, Direction, MatchPolicy, PayloadCodec, ProtocolConfig, Registry,
    Response, SessionState, Shape,
};
pub use zybl_transport::{ChannelLink, ChannelPeer, Link};
pub use zybl_types::{Chroma, DeviceInfo, Hsi, Value};
