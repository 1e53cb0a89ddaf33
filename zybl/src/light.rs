//! High-level fixture interface

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use zybl_core::constants::DEFAULT_DEVICE_ID;
use zybl_core::{
    CommandId, Error as CoreError, ProtocolConfig, Registry, Response, SessionState, Value,
};
use zybl_transport::{Link, TransportSession};
use zybl_types::{check_percent, Chroma, DeviceInfo, Hsi};

use crate::error::{Error, Result};

pub use zybl_core::constants::{MAX_KELVIN, MIN_KELVIN};

/// Which fixture a command addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Target {
    /// The light's configured device id
    #[default]
    Default,

    Device(u16),

    /// Every fixture on the link; writes are not acknowledged
    Broadcast,
}

/// How many times a request is attempted when it times out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts for reads and queries
    pub query_attempts: u32,

    /// Attempts for writes; writes are not idempotent
    pub control_attempts: u32,
}

impl RetryPolicy {
    /// Single attempt for everything
    pub fn none() -> Self {
        Self {
            query_attempts: 1,
            control_attempts: 1,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            query_attempts: 3,
            control_attempts: 1,
        }
    }
}

/// ZYBL light fixture
///
/// Typed operations on top of one [`TransportSession`]. Every operation
/// validates its input before any bytes are built.
///
/// # Examples
///
/// ```no_run
/// use zybl::{ChannelLink, Light, Target};
///
/// #[tokio::main]
/// async fn main() -> zybl::Result<()> {
///     let (link, _peer) = ChannelLink::default_pair();
///     let mut light = Light::new(link).with_device_id(1);
///
///     light.open().await?;
///     light.set_intensity(Target::Default, 50.0).await?;
///
///     let info = light.query_device_info().await?;
///     println!("Light: {}", info);
///
///     light.close().await?;
///     Ok(())
/// }
/// ```
pub struct Light<L: Link> {
    session: TransportSession<L>,
    device_id: u16,
    retry: RetryPolicy,
}

impl<L: Link> Light<L> {
    /// Create a light with the default protocol settings and built-in codecs
    pub fn new(link: L) -> Self {
        Self {
            session: TransportSession::new(link, ProtocolConfig::default(), Arc::new(Registry::with_builtin())),
            device_id: DEFAULT_DEVICE_ID,
            retry: RetryPolicy::default(),
        }
    }

    /// Set the device id used for `Target::Default`
    pub fn with_device_id(mut self, device_id: u16) -> Self {
        self.device_id = device_id;
        self
    }

    /// Replace the protocol settings
    ///
    /// Keeps the current registry; control flags always come from `config`.
    pub fn with_protocol(self, config: ProtocolConfig) -> Self {
        let registry = self.session.registry().clone();
        Self {
            session: TransportSession::new(self.session.into_link(), config, registry),
            ..self
        }
    }

    /// Replace the command registry
    pub fn with_registry(self, registry: Arc<Registry>) -> Self {
        let config = self.session.config().clone();
        Self {
            session: TransportSession::new(self.session.into_link(), config, registry),
            ..self
        }
    }

    /// Set retry policy
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Device id used for `Target::Default`
    pub fn device_id(&self) -> u16 {
        self.device_id
    }

    /// Session state
    pub fn status(&self) -> SessionState {
        self.session.state()
    }

    /// Requests in flight
    pub fn pending(&self) -> usize {
        self.session.pending()
    }

    /// Receive unsolicited notifications (online/status events)
    pub fn subscribe_unsolicited(&mut self) -> mpsc::Receiver<Response> {
        self.session.subscribe_unsolicited()
    }

    /// Open the link
    pub async fn open(&mut self) -> Result<()> {
        info!(device_id = self.device_id, "Opening light");
        self.session.open().await?;
        Ok(())
    }

    /// Close the link; pending requests fail with `TransportClosed`
    pub async fn close(&mut self) -> Result<()> {
        self.session.close().await?;
        Ok(())
    }

    /// Set intensity in percent (0..=100)
    ///
    /// Returns the fixture's acknowledgement, or `None` for a broadcast.
    pub async fn set_intensity(&mut self, target: Target, percent: f32) -> Result<Option<Response>> {
        check_percent("intensity", percent)?;
        self.control(target, CommandId::INTENSITY, Value::Intensity(percent / 100.0))
            .await
    }

    /// Read intensity in percent
    pub async fn get_intensity(&mut self, target: Target) -> Result<f32> {
        let response = self.query(target, CommandId::INTENSITY).await?;
        match response.value {
            Value::Intensity(v) => Ok(v * 100.0),
            other => Err(unexpected(CommandId::INTENSITY, "intensity", &other)),
        }
    }

    /// Set color temperature in Kelvin (`MIN_KELVIN..=MAX_KELVIN`)
    pub async fn set_color_temperature(&mut self, target: Target, kelvin: u16) -> Result<Option<Response>> {
        self.control(target, CommandId::COLOR_TEMPERATURE, Value::Kelvin(kelvin))
            .await
    }

    /// Read color temperature in Kelvin
    pub async fn get_color_temperature(&mut self, target: Target) -> Result<u16> {
        let response = self.query(target, CommandId::COLOR_TEMPERATURE).await?;
        match response.value {
            Value::Kelvin(k) => Ok(k),
            other => Err(unexpected(CommandId::COLOR_TEMPERATURE, "kelvin", &other)),
        }
    }

    /// Set saturation in percent (0..=100)
    pub async fn set_saturation(&mut self, target: Target, percent: f32) -> Result<Option<Response>> {
        check_percent("saturation", percent)?;
        self.control(target, CommandId::SATURATION, Value::Saturation(percent / 100.0))
            .await
    }

    /// Set hue (degrees, 0..360), saturation and intensity (percent)
    pub async fn set_hsi(
        &mut self,
        target: Target,
        hue: f32,
        saturation: f32,
        intensity: f32,
    ) -> Result<Option<Response>> {
        let hsi = Hsi::from_percent(hue, saturation, intensity)?;
        self.control(target, CommandId::HSI, Value::Hsi(hsi)).await
    }

    /// Set CIE 1931 chromaticity (x and y in 0..=1)
    pub async fn set_chroma(&mut self, target: Target, gamut: u8, x: f32, y: f32) -> Result<Option<Response>> {
        let chroma = Chroma::new(gamut, x, y)?;
        self.control(target, CommandId::CHROMA, Value::Chroma(chroma))
            .await
    }

    /// Read battery voltage (raw device units)
    pub async fn get_voltage(&mut self, target: Target) -> Result<u16> {
        let response = self.query(target, CommandId::VOLTAGE).await?;
        match response.value {
            Value::Voltage(v) => Ok(v),
            other => Err(unexpected(CommandId::VOLTAGE, "voltage", &other)),
        }
    }

    /// Query serial number and model
    pub async fn query_device_info(&mut self) -> Result<DeviceInfo> {
        let response = self.query(Target::Default, CommandId::DEVICE_INFO).await?;
        match response.value {
            Value::DeviceInfo(info) => {
                debug!(info = %info, "Device info");
                Ok(info)
            }
            other => Err(unexpected(CommandId::DEVICE_INFO, "device_info", &other)),
        }
    }

    /// Query the fixture's device id
    ///
    /// The id becomes the one used for `Target::Default`.
    pub async fn query_device_id(&mut self) -> Result<u16> {
        let response = self.query(Target::Default, CommandId::DEVICE_ID).await?;
        match response.value {
            Value::DeviceId(id) => {
                if id != self.device_id {
                    info!(old = self.device_id, new = id, "Device id updated");
                    self.device_id = id;
                }
                Ok(id)
            }
            other => Err(unexpected(CommandId::DEVICE_ID, "device_id", &other)),
        }
    }

    /// Check whether a fixture reports itself online
    pub async fn query_online(&mut self, target: Target) -> Result<bool> {
        let response = self.query(target, CommandId::ONLINE).await?;
        match response.value {
            Value::Online(online) => Ok(online),
            other => Err(unexpected(CommandId::ONLINE, "online", &other)),
        }
    }

    /// Send a payload verbatim and return whatever comes back
    ///
    /// Responses to unregistered commands carry the raw bytes and the
    /// `unknown` marker.
    pub async fn send_raw(&mut self, command: CommandId, payload: impl Into<Bytes>) -> Result<Response> {
        self.exchange(command, payload.into(), self.retry.control_attempts)
            .await
    }

    fn resolve(&self, target: Target) -> u16 {
        match target {
            Target::Default => self.device_id,
            Target::Device(id) => id,
            Target::Broadcast => self.session.config().broadcast_device_id,
        }
    }

    async fn control(&mut self, target: Target, command: CommandId, value: Value) -> Result<Option<Response>> {
        let device_id = self.resolve(target);
        let payload = self
            .session
            .registry()
            .encode_request(command, true, device_id, Some(&value), self.session.config().flags())?;

        debug!(command = %command, device_id, value = %value, "Control");

        if target == Target::Broadcast {
            self.session.send_unacknowledged(command, payload).await?;
            return Ok(None);
        }

        self.exchange(command, payload, self.retry.control_attempts)
            .await
            .map(Some)
    }

    async fn query(&mut self, target: Target, command: CommandId) -> Result<Response> {
        if target == Target::Broadcast {
            return Err(CoreError::InvalidArgument(format!(
                "{} cannot be read from every device",
                command
            ))
            .into());
        }

        let device_id = self.resolve(target);
        let payload = self
            .session
            .registry()
            .encode_request(command, false, device_id, None, self.session.config().flags())?;

        self.exchange(command, payload, self.retry.query_attempts)
            .await
    }

    async fn exchange(&mut self, command: CommandId, payload: Bytes, attempts: u32) -> Result<Response> {
        let timeout = self.session.registry().descriptor(command).timeout;
        let attempts = attempts.max(1);
        let mut attempt = 1;

        loop {
            match self.session.request(command, payload.clone(), timeout).await {
                Err(e) if e.is_recoverable() && attempt < attempts => {
                    warn!(command = %command, attempt, attempts, "No response, retrying");
                    attempt += 1;
                }
                result => return result.map_err(Error::from),
            }
        }
    }
}

fn unexpected(command: CommandId, expected: &'static str, got: &Value) -> Error {
    Error::UnexpectedValue {
        command,
        expected,
        got: got.kind(),
    }
}
