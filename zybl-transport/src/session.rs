//! Transport session
//!
//! Owns one [`Link`], the inbound reassembly buffer and the correlator. All
//! outbound frames go through [`TransportSession::send`], which writes them
//! in link-sized chunks in call order. Inbound chunks are reassembled,
//! validated and matched; frames nobody waits for are forwarded to the
//! unsolicited subscriber, if any.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use zybl_core::{
    CommandId, Correlator, DataSection, Delivery, Error, Frame, FrameBuffer, ProtocolConfig,
    Registry, Response, ResponseHandle, Result, SessionState, Teardown,
};

use crate::Link;

/// Unsolicited frames buffered for a slow subscriber before dropping
const UNSOLICITED_CAPACITY: usize = 32;

/// One logical connection to a fixture
pub struct TransportSession<L: Link> {
    link: L,
    state: SessionState,
    config: ProtocolConfig,
    correlator: Correlator,
    buffer: FrameBuffer,
    unsolicited: Option<mpsc::Sender<Response>>,
}

impl<L: Link> TransportSession<L> {
    /// Create a session over `link`
    pub fn new(link: L, config: ProtocolConfig, registry: Arc<Registry>) -> Self {
        let correlator = Correlator::new(&config, registry);
        Self {
            link,
            state: SessionState::Idle,
            config,
            correlator,
            buffer: FrameBuffer::new(),
            unsolicited: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Number of requests in flight
    pub fn pending(&self) -> usize {
        self.correlator.pending_count()
    }

    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<Registry> {
        self.correlator.registry()
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    /// Give the link back, dropping session state
    pub fn into_link(self) -> L {
        self.link
    }

    /// Open the link
    ///
    /// # Errors
    ///
    /// `InvalidSessionState` unless the session is idle; `TransportFault` if
    /// the link fails to open.
    pub async fn open(&mut self) -> Result<()> {
        self.state.transition(SessionState::Opening)?;

        debug!(link = %self.link.describe(), "Opening session");

        match self.link.open().await {
            Ok(()) => {
                self.state.transition(SessionState::Ready)?;
                info!(link = %self.link.describe(), "Session ready");
                Ok(())
            }
            Err(e) => Err(self.fault(format!("open failed: {}", e))),
        }
    }

    /// Close the session
    ///
    /// Every pending request fails with `TransportClosed`. Closing a closed
    /// or faulted session only makes sure the link is closed.
    pub async fn close(&mut self) -> Result<()> {
        if !self.state.is_terminal() {
            self.state.transition(SessionState::Closing)?;
            self.correlator.fail_all(Teardown::Closed);
        }

        if let Err(e) = self.link.close().await {
            warn!(error = %e, "Link close failed");
        }

        if self.state == SessionState::Closing {
            self.state.transition(SessionState::Closed)?;
            info!(link = %self.link.describe(), "Session closed");
        }
        self.unsolicited = None;
        Ok(())
    }

    fn ensure_ready(&self) -> Result<()> {
        if self.state.is_ready() {
            Ok(())
        } else {
            Err(self.state.not_ready_error())
        }
    }

    /// Move to `Faulted` and fail every pending request
    fn fault(&mut self, reason: String) -> Error {
        if !self.state.is_terminal() {
            warn!(reason = %reason, "Session faulted");
            self.state = SessionState::Faulted;
        }
        self.correlator.fail_all(Teardown::Fault(reason.clone()));
        Error::TransportFault(reason)
    }

    fn encode(&self, section: &DataSection) -> Result<Bytes> {
        Frame::encode_with_limit(&section.to_bytes(), self.link.max_data_section())
    }

    async fn write_frame(&mut self, frame: &[u8]) -> Result<()> {
        let size = self.link.max_write_size().max(1);

        trace!(frame = hex::encode(frame), chunk_size = size, "Writing frame");

        for chunk in frame.chunks(size) {
            if let Err(e) = self.link.write(chunk).await {
                return Err(self.fault(format!("write failed: {}", e)));
            }
        }
        Ok(())
    }

    /// Frame and write a data section
    pub async fn send(&mut self, section: &DataSection) -> Result<()> {
        self.ensure_ready()?;
        let frame = self.encode(section)?;
        self.write_frame(&frame).await
    }

    fn data_section(&self, command: CommandId, payload: Bytes) -> DataSection {
        let sequence = self.correlator.next_sequence();
        DataSection::new(self.config.protocol_field, sequence, command, payload)
    }

    /// Send a request and register it for a response
    ///
    /// # Errors
    ///
    /// - `FrameTooLarge` if the payload does not fit (nothing is sent)
    /// - `TooManyPending` if the in-flight limit is reached
    /// - `TransportFault` if the write fails
    pub async fn submit(
        &mut self,
        command: CommandId,
        payload: Bytes,
        timeout: Duration,
    ) -> Result<ResponseHandle> {
        self.ensure_ready()?;

        let section = self.data_section(command, payload);
        let frame = self.encode(&section)?;
        let device_id = self
            .correlator
            .registry()
            .addressed_device(command, &section.payload);
        let handle = self
            .correlator
            .register_addressed(section.sequence, command, device_id, timeout)?;

        debug!(sequence = section.sequence, command = %command, "Submitting request");

        self.write_frame(&frame).await?;
        Ok(handle)
    }

    /// Send without expecting a response
    ///
    /// Returns the sequence number used.
    pub async fn send_unacknowledged(&mut self, command: CommandId, payload: Bytes) -> Result<u16> {
        self.ensure_ready()?;

        let section = self.data_section(command, payload);
        let frame = self.encode(&section)?;

        debug!(sequence = section.sequence, command = %command, "Sending unacknowledged");

        self.correlator.retire_unacknowledged(section.sequence);
        self.write_frame(&frame).await?;
        Ok(section.sequence)
    }

    /// Feed one inbound chunk
    ///
    /// Returns the number of valid frames extracted.
    pub fn ingest(&mut self, chunk: &[u8]) -> usize {
        let frames = self.buffer.push(chunk);
        if frames.is_empty() {
            return 0;
        }

        self.correlator.sweep(Instant::now());

        let mut count = 0;
        for frame in frames {
            let data = match frame {
                Ok(data) => data,
                Err(e) => {
                    warn!(error = %e, "Dropped invalid frame");
                    continue;
                }
            };

            let section = match DataSection::parse(&data) {
                Ok(section) => section,
                Err(e) => {
                    warn!(error = %e, "Dropped malformed data section");
                    continue;
                }
            };
            count += 1;

            if section.protocol_field != self.config.protocol_field {
                debug!(
                    protocol_field = format!("0x{:04X}", section.protocol_field),
                    "Unexpected protocol field"
                );
            }

            match self.correlator.on_frame_received(&section) {
                Ok(Delivery::Matched { sequence }) => {
                    trace!(sequence, "Delivered response");
                }
                Ok(Delivery::Unsolicited(response)) => self.publish(response),
                Err(e) => {
                    warn!(error = %e, sequence = section.sequence, "Dropped undecodable unsolicited frame");
                }
            }
        }
        count
    }

    fn publish(&mut self, response: Response) {
        debug!(
            sequence = response.sequence,
            command = %response.command,
            value = %response.value,
            "Unsolicited frame"
        );

        if let Some(tx) = &self.unsolicited {
            match tx.try_send(response) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!("Unsolicited subscriber lagging, frame dropped");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    self.unsolicited = None;
                }
            }
        }
    }

    /// Receive one chunk from the link and ingest it
    ///
    /// # Errors
    ///
    /// `TransportFault` (after faulting the session) if the link fails.
    pub async fn pump(&mut self) -> Result<usize> {
        self.ensure_ready()?;

        match self.link.recv().await {
            Ok(chunk) => Ok(self.ingest(&chunk)),
            Err(e) => Err(self.fault(format!("receive failed: {}", e))),
        }
    }

    /// Wait for `handle` while pumping inbound chunks
    pub async fn drive(&mut self, handle: ResponseHandle) -> Result<Response> {
        let wait = handle.wait();
        tokio::pin!(wait);

        loop {
            tokio::select! {
                biased;
                result = &mut wait => return result,
                pumped = self.pump() => {
                    if let Err(e) = pumped {
                        trace!(error = %e, "Pump stopped");
                        return wait.await;
                    }
                }
            }
        }
    }

    /// Submit and wait for the response
    pub async fn request(
        &mut self,
        command: CommandId,
        payload: Bytes,
        timeout: Duration,
    ) -> Result<Response> {
        let handle = self.submit(command, payload, timeout).await?;
        self.drive(handle).await
    }

    /// Abandon a pending request
    pub fn cancel(&self, handle: ResponseHandle) -> bool {
        handle.cancel()
    }

    /// Receive unsolicited frames
    ///
    /// Replaces any previous subscriber.
    pub fn subscribe_unsolicited(&mut self) -> mpsc::Receiver<Response> {
        let (tx, rx) = mpsc::channel(UNSOLICITED_CAPACITY);
        self.unsolicited = Some(tx);
        rx
    }
}
