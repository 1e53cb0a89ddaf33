//! Device information structures

use std::fmt;

use crate::error::{Error, Result};

/// Device identity reported by the fixture
///
/// The fixture answers the identity query with a run of NUL-separated ASCII
/// strings: serial number first, model second, then anything the firmware
/// chooses to append.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Device serial number
    pub serial_number: String,
    
    /// Device model (e.g. `PL103`)
    pub model: Option<String>,
    
    /// Trailing fields the firmware reports after the model
    pub extra: Vec<String>,
}

impl DeviceInfo {
    pub fn new(serial_number: String, model: Option<String>) -> Self {
        Self {
            serial_number,
            model,
            extra: Vec::new(),
        }
    }
    
    /// Parse the NUL-separated identity payload
    ///
    /// Empty segments are skipped, so padding NULs are harmless. Non-ASCII
    /// bytes are replaced rather than rejected.
    ///
    /// # Examples
    ///
    /// ```
    /// use zybl_types::DeviceInfo;
    ///
    /// let info = DeviceInfo::parse(b"ZY123\0PL103\0").unwrap();
    /// assert_eq!(info.serial_number, "ZY123");
    /// assert_eq!(info.model.as_deref(), Some("PL103"));
    /// ```
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let mut fields = payload
            .split(|b| *b == 0)
            .filter(|part| !part.is_empty())
            .map(|part| String::from_utf8_lossy(part).into_owned());
        
        let serial_number = fields
            .next()
            .ok_or_else(|| Error::Parse("device info payload holds no fields".into()))?;
        let model = fields.next();
        
        Ok(Self {
            serial_number,
            model,
            extra: fields.collect(),
        })
    }
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Device[SN: {}, Model: {}]",
            self.serial_number,
            self.model.as_deref().unwrap_or("?")
        )
    }
}
