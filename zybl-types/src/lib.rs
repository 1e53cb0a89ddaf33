//! Type definitions for zybl

pub mod device_info;
pub mod error;
pub mod value;

pub use device_info::DeviceInfo;
pub use error::{Error, Result};
pub use value::{check_percent, Chroma, Hsi, Value};
