//! Logical values carried by command payloads

use std::fmt;

use bytes::Bytes;

use crate::error::{Error, Result};

/// Hue + saturation + intensity triple
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hsi {
    /// Hue in degrees, 0.0..360.0
    pub hue: f32,
    
    /// Saturation as a fraction, 0.0..=1.0
    pub saturation: f32,
    
    /// Intensity in hundredths of a percent, 0..=10000
    pub intensity: u16,
}

impl Hsi {
    /// Build from user-facing units: degrees and percentages
    pub fn from_percent(hue: f32, saturation_pct: f32, intensity_pct: f32) -> Result<Self> {
        if !(0.0..360.0).contains(&hue) {
            return Err(Error::Validation(format!("hue {} outside 0..360", hue)));
        }
        check_percent("saturation", saturation_pct)?;
        check_percent("intensity", intensity_pct)?;
        
        Ok(Self {
            hue,
            saturation: saturation_pct / 100.0,
            intensity: (intensity_pct * 100.0).round() as u16,
        })
    }
}

/// Gamut selector plus CIE 1931 chromaticity coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Chroma {
    pub gamut: u8,
    pub x: f32,
    pub y: f32,
}

impl Chroma {
    pub fn new(gamut: u8, x: f32, y: f32) -> Result<Self> {
        for (name, v) in [("x", x), ("y", y)] {
            if !(0.0..=1.0).contains(&v) {
                return Err(Error::Validation(format!(
                    "chromaticity {} = {} outside 0..=1",
                    name, v
                )));
            }
        }
        Ok(Self { gamut, x, y })
    }
}

/// Reject NaN and anything outside 0..=100
pub fn check_percent(name: &str, pct: f32) -> Result<()> {
    if (0.0..=100.0).contains(&pct) {
        Ok(())
    } else {
        Err(Error::Validation(format!("{} {} outside 0..=100", name, pct)))
    }
}

/// A decoded (or to-be-encoded) command value
///
/// One variant per payload shape the registry knows about. `Raw` carries
/// bytes the engine could not (or was told not to) interpret.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// No value (acknowledgements, read placeholders)
    Empty,
    
    /// Normalized intensity, 0.0..=1.0
    Intensity(f32),
    
    /// Color temperature in Kelvin
    Kelvin(u16),
    
    /// Normalized saturation, 0.0..=1.0
    Saturation(f32),
    
    Chroma(Chroma),
    
    Hsi(Hsi),
    
    /// Intensity with a firmware-defined mode selector
    IntensityMode { intensity: f32, mode: i8 },
    
    /// Battery voltage, raw device units
    Voltage(u16),
    
    Online(bool),
    
    DeviceId(u16),
    
    DeviceInfo(crate::DeviceInfo),
    
    /// Opaque payload bytes
    Raw(Bytes),
}

impl Value {
    /// Short name of the variant, for logs and error messages
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Intensity(_) => "intensity",
            Self::Kelvin(_) => "kelvin",
            Self::Saturation(_) => "saturation",
            Self::Chroma(_) => "chroma",
            Self::Hsi(_) => "hsi",
            Self::IntensityMode { .. } => "intensity_mode",
            Self::Voltage(_) => "voltage",
            Self::Online(_) => "online",
            Self::DeviceId(_) => "device_id",
            Self::DeviceInfo(_) => "device_info",
            Self::Raw(_) => "raw",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "-"),
            Self::Intensity(v) => write!(f, "intensity={:.1}%", v * 100.0),
            Self::Kelvin(k) => write!(f, "cct={}K", k),
            Self::Saturation(v) => write!(f, "saturation={:.1}%", v * 100.0),
            Self::Chroma(c) => write!(f, "gamut={} x={:.4} y={:.4}", c.gamut, c.x, c.y),
            Self::Hsi(h) => write!(
                f,
                "hue={:.1} sat={:.1}% intensity={}",
                h.hue,
                h.saturation * 100.0,
                h.intensity
            ),
            Self::IntensityMode { intensity, mode } => {
                write!(f, "intensity={:.1}% mode={}", intensity * 100.0, mode)
            }
            Self::Voltage(v) => write!(f, "voltage={}", v),
            Self::Online(o) => write!(f, "online={}", o),
            Self::DeviceId(id) => write!(f, "device_id=0x{:04X}", id),
            Self::DeviceInfo(info) => write!(f, "{}", info),
            Self::Raw(raw) => write!(f, "raw={:02X?}", raw.as_ref()),
        }
    }
}
