//! Request/response correlation
//!
//! Every outbound request gets a sequence number and a pending entry with a
//! deadline. Inbound data sections are matched back to their request, first
//! by sequence number (the command must agree) and then, if the policy
//! allows it, by command and addressed device. Anything left over is
//! unsolicited.
//!
//! The state is shared between the owning transport session and the
//! [`ResponseHandle`]s it hands out, so a handle can expire its own request
//! when its deadline passes.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use zybl_types::Value;

use crate::command::CommandId;
use crate::config::{ControlFlag, ControlFlags, MatchPolicy, ProtocolConfig};
use crate::constants::{MAX_PENDING_LIMIT, RETIRED_WINDOW};
use crate::error::{Error, Result, Teardown};
use crate::frame::DataSection;
use crate::registry::Registry;

/// Decoded response to a request, or an unsolicited notification
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub sequence: u16,
    pub command: CommandId,
    pub device_id: Option<u16>,
    pub flag: Option<ControlFlag>,
    pub value: Value,

    /// No descriptor was registered; `value` holds the raw payload
    pub unknown: bool,
}

/// Outcome of feeding one data section to the correlator
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    /// Fulfilled the pending request with this sequence
    Matched { sequence: u16 },

    /// No pending request claimed the frame
    Unsolicited(Response),
}

#[derive(Debug)]
struct Pending {
    command: CommandId,
    device_id: Option<u16>,
    deadline: Instant,
    order: u64,
    tx: oneshot::Sender<Result<Response>>,
}

#[derive(Debug)]
struct Inner {
    next_sequence: u16,
    next_order: u64,
    pending: HashMap<u16, Pending>,

    /// Recently timed out, cancelled or unacknowledged sequences
    retired: VecDeque<u16>,

    match_policy: MatchPolicy,
    max_pending: usize,
}

impl Inner {
    fn retire(&mut self, sequence: u16) {
        if self.retired.len() == RETIRED_WINDOW {
            self.retired.pop_front();
        }
        self.retired.push_back(sequence);
    }

    fn claim(&mut self, section: &DataSection, device_id: Option<u16>) -> Option<(u16, Pending)> {
        if self
            .pending
            .get(&section.sequence)
            .is_some_and(|p| p.command == section.command)
        {
            return self
                .pending
                .remove(&section.sequence)
                .map(|p| (section.sequence, p));
        }

        if self.match_policy != MatchPolicy::SequenceThenCommand
            || self.retired.contains(&section.sequence)
        {
            return None;
        }

        let sequence = self
            .pending
            .iter()
            .filter(|(_, p)| p.command == section.command)
            .filter(|(_, p)| p.device_id.is_none() || p.device_id == device_id)
            .min_by_key(|(_, p)| p.order)
            .map(|(&seq, _)| seq)?;

        self.pending.remove(&sequence).map(|p| (sequence, p))
    }
}

/// Correlation manager
///
/// Cheap to clone; all clones share one pending set.
#[derive(Debug, Clone)]
pub struct Correlator {
    inner: Arc<Mutex<Inner>>,
    registry: Arc<Registry>,
    flags: ControlFlags,
}

impl Correlator {
    pub fn new(config: &ProtocolConfig, registry: Arc<Registry>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                next_sequence: config.initial_sequence,
                next_order: 0,
                pending: HashMap::new(),
                retired: VecDeque::with_capacity(RETIRED_WINDOW),
                match_policy: config.match_policy,
                max_pending: config.max_pending.min(MAX_PENDING_LIMIT),
            })),
            registry,
            flags: config.flags(),
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Next free sequence number
    ///
    /// Increases by one per call, wrapping at 2^16, and skips values that
    /// still belong to a pending request.
    pub fn next_sequence(&self) -> u16 {
        // max_pending stays below 2^16, so a free value always exists
        let mut inner = self.inner.lock();
        loop {
            let sequence = inner.next_sequence;
            inner.next_sequence = sequence.wrapping_add(1);
            if !inner.pending.contains_key(&sequence) {
                return sequence;
            }
        }
    }

    /// Create a pending request
    ///
    /// # Errors
    ///
    /// - `TooManyPending` if the in-flight limit is reached
    /// - `InvalidArgument` if the sequence is already pending
    pub fn register(
        &self,
        sequence: u16,
        command: CommandId,
        timeout: Duration,
    ) -> Result<ResponseHandle> {
        self.register_addressed(sequence, command, None, timeout)
    }

    /// Create a pending request addressed to one device
    ///
    /// A reply matched by command alone must come from `device_id`.
    pub fn register_addressed(
        &self,
        sequence: u16,
        command: CommandId,
        device_id: Option<u16>,
        timeout: Duration,
    ) -> Result<ResponseHandle> {
        let mut inner = self.inner.lock();

        if inner.pending.len() >= inner.max_pending {
            return Err(Error::TooManyPending(inner.pending.len()));
        }
        if inner.pending.contains_key(&sequence) {
            return Err(Error::InvalidArgument(format!(
                "sequence {} is already pending",
                sequence
            )));
        }

        let (tx, rx) = oneshot::channel();
        let deadline = Instant::now() + timeout;
        let order = inner.next_order;
        inner.next_order += 1;
        inner.retired.retain(|&s| s != sequence);
        inner.pending.insert(
            sequence,
            Pending {
                command,
                device_id,
                deadline,
                order,
                tx,
            },
        );

        trace!(sequence, command = %command, ?device_id, ?timeout, "Registered pending request");

        Ok(ResponseHandle {
            sequence,
            command,
            deadline,
            rx,
            correlator: self.clone(),
        })
    }

    /// Match an inbound data section
    ///
    /// A matched request receives the decoded response, or the decode error
    /// if its payload was malformed.
    ///
    /// # Errors
    ///
    /// Decode errors of unsolicited frames.
    pub fn on_frame_received(&self, section: &DataSection) -> Result<Delivery> {
        let device_id = self
            .registry
            .addressed_device(section.command, &section.payload);
        let claimed = self.inner.lock().claim(section, device_id);

        match claimed {
            Some((sequence, pending)) => {
                if sequence != section.sequence {
                    debug!(
                        frame_sequence = section.sequence,
                        pending_sequence = sequence,
                        command = %section.command,
                        "Matched response by command"
                    );
                }

                let result = self.decode(section);
                if pending.tx.send(result).is_err() {
                    trace!(sequence, "Response handle already dropped");
                }
                Ok(Delivery::Matched { sequence })
            }
            None => {
                trace!(sequence = section.sequence, command = %section.command, "Unsolicited frame");
                self.decode(section).map(Delivery::Unsolicited)
            }
        }
    }

    fn decode(&self, section: &DataSection) -> Result<Response> {
        let decoded = self
            .registry
            .decode_or_passthrough(section.command, &section.payload, self.flags)?;

        Ok(Response {
            sequence: section.sequence,
            command: section.command,
            device_id: decoded.device_id,
            flag: decoded.flag,
            value: decoded.value,
            unknown: decoded.unknown,
        })
    }

    /// Fail every request whose deadline is at or before `now`
    pub fn sweep(&self, now: Instant) -> usize {
        let expired: Vec<(u16, Pending)> = {
            let mut inner = self.inner.lock();
            let sequences: Vec<u16> = inner
                .pending
                .iter()
                .filter(|(_, p)| p.deadline <= now)
                .map(|(&seq, _)| seq)
                .collect();

            sequences
                .into_iter()
                .filter_map(|seq| {
                    inner.retire(seq);
                    inner.pending.remove(&seq).map(|p| (seq, p))
                })
                .collect()
        };

        for (sequence, pending) in &expired {
            warn!(sequence, command = %pending.command, "Request timed out");
        }

        let count = expired.len();
        for (sequence, pending) in expired {
            let _ = pending.tx.send(Err(Error::Timeout {
                command: pending.command,
                sequence,
            }));
        }
        count
    }

    /// Abandon a pending request
    ///
    /// A frame arriving later with this sequence is treated as unsolicited.
    pub fn cancel(&self, sequence: u16) -> bool {
        let cancelled = self.remove_and_retire(sequence);
        if cancelled {
            debug!(sequence, "Cancelled pending request");
        }
        cancelled
    }

    /// Record a sequence sent without a pending request
    ///
    /// Its reply is then never matched by command to another request.
    pub fn retire_unacknowledged(&self, sequence: u16) {
        trace!(sequence, "Retired unacknowledged sequence");
        self.inner.lock().retire(sequence);
    }

    fn remove_and_retire(&self, sequence: u16) -> bool {
        let mut inner = self.inner.lock();
        match inner.pending.remove(&sequence) {
            Some(_) => {
                inner.retire(sequence);
                true
            }
            None => false,
        }
    }

    /// Fail every pending request with the teardown reason
    pub fn fail_all(&self, reason: Teardown) -> usize {
        let drained: Vec<Pending> = self
            .inner
            .lock()
            .pending
            .drain()
            .map(|(_, p)| p)
            .collect();

        let count = drained.len();
        if count > 0 {
            debug!(count, ?reason, "Failing pending requests");
        }
        for pending in drained {
            let _ = pending.tx.send(Err(reason.clone().into()));
        }
        count
    }

    pub fn pending_count(&self) -> usize {
        self.inner.lock().pending.len()
    }

    pub fn is_pending(&self, sequence: u16) -> bool {
        self.inner.lock().pending.contains_key(&sequence)
    }

    /// Earliest deadline among pending requests
    pub fn next_deadline(&self) -> Option<Instant> {
        self.inner.lock().pending.values().map(|p| p.deadline).min()
    }
}

/// Handle to await one pending request
#[derive(Debug)]
pub struct ResponseHandle {
    sequence: u16,
    command: CommandId,
    deadline: Instant,
    rx: oneshot::Receiver<Result<Response>>,
    correlator: Correlator,
}

impl ResponseHandle {
    pub fn sequence(&self) -> u16 {
        self.sequence
    }

    pub fn command(&self) -> CommandId {
        self.command
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Wait for the response
    ///
    /// Removes the pending request and fails with `Timeout` once the deadline
    /// passes. Never retries.
    pub async fn wait(mut self) -> Result<Response> {
        match tokio::time::timeout_at(self.deadline, &mut self.rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::TransportClosed),
            Err(_) => {
                if let Ok(result) = self.rx.try_recv() {
                    return result;
                }

                if self.correlator.remove_and_retire(self.sequence) {
                    warn!(sequence = self.sequence, command = %self.command, "Request timed out");
                    return Err(Error::Timeout {
                        command: self.command,
                        sequence: self.sequence,
                    });
                }

                // claimed concurrently; the result is on its way
                match self.rx.await {
                    Ok(result) => result,
                    Err(_) => Err(Error::Timeout {
                        command: self.command,
                        sequence: self.sequence,
                    }),
                }
            }
        }
    }

    /// Abandon the request without waiting
    pub fn cancel(self) -> bool {
        self.correlator.cancel(self.sequence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::STATUS_TIMEOUT;
    use bytes::Bytes;
    use pretty_assertions::assert_eq;

    fn correlator(config: ProtocolConfig) -> Correlator {
        Correlator::new(&config, Arc::new(Registry::default()))
    }

    fn intensity_reply(sequence: u16) -> DataSection {
        DataSection::new(
            0x0100,
            sequence,
            CommandId::INTENSITY,
            vec![0x01, 0x00, 0x01, 0x00, 0x00, 0x00, 0x3F],
        )
    }

    #[test]
    fn test_sequence_increments_and_wraps() {
        let c = correlator(ProtocolConfig::default().with_initial_sequence(0xFFFE));

        assert_eq!(c.next_sequence(), 0xFFFE);
        assert_eq!(c.next_sequence(), 0xFFFF);
        assert_eq!(c.next_sequence(), 0x0000);
        assert_eq!(c.next_sequence(), 0x0001);
    }

    #[tokio::test]
    async fn test_sequence_skips_pending() {
        let c = correlator(ProtocolConfig::default());
        let _handle = c.register(2, CommandId::INTENSITY, STATUS_TIMEOUT).unwrap();

        assert_eq!(c.next_sequence(), 1);
        assert_eq!(c.next_sequence(), 3);
    }

    #[tokio::test]
    async fn test_sequences_unique_while_pending() {
        let c = correlator(ProtocolConfig::default().with_max_pending(1000));
        let mut handles = Vec::new();
        for _ in 0..500 {
            let seq = c.next_sequence();
            handles.push(c.register(seq, CommandId::VOLTAGE, STATUS_TIMEOUT).unwrap());
        }

        let mut seqs: Vec<u16> = handles.iter().map(|h| h.sequence()).collect();
        seqs.sort_unstable();
        seqs.dedup();
        assert_eq!(seqs.len(), 500);
    }

    #[tokio::test]
    async fn test_duplicate_and_limit() {
        let c = correlator(ProtocolConfig::default().with_max_pending(2));
        let _a = c.register(1, CommandId::INTENSITY, STATUS_TIMEOUT).unwrap();

        assert!(matches!(
            c.register(1, CommandId::INTENSITY, STATUS_TIMEOUT),
            Err(Error::InvalidArgument(_))
        ));

        let _b = c.register(2, CommandId::INTENSITY, STATUS_TIMEOUT).unwrap();
        assert!(matches!(
            c.register(3, CommandId::INTENSITY, STATUS_TIMEOUT),
            Err(Error::TooManyPending(2))
        ));
    }

    #[tokio::test]
    async fn test_match_by_sequence() {
        let c = correlator(ProtocolConfig::default());
        let first = c.register(1, CommandId::INTENSITY, STATUS_TIMEOUT).unwrap();
        let second = c.register(2, CommandId::INTENSITY, STATUS_TIMEOUT).unwrap();

        let delivery = c.on_frame_received(&intensity_reply(2)).unwrap();
        assert_eq!(delivery, Delivery::Matched { sequence: 2 });
        assert!(c.is_pending(1));
        assert!(!c.is_pending(2));

        let response = second.wait().await.unwrap();
        assert_eq!(response.sequence, 2);
        assert_eq!(response.device_id, Some(1));
        assert_eq!(response.value, Value::Intensity(0.5));

        assert!(first.cancel());
        assert_eq!(c.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_command_fallback_picks_oldest() {
        let c = correlator(ProtocolConfig::default());
        let _old = c.register(4, CommandId::INTENSITY, STATUS_TIMEOUT).unwrap();
        let _new = c.register(3, CommandId::INTENSITY, STATUS_TIMEOUT).unwrap();
        let _other = c.register(5, CommandId::VOLTAGE, STATUS_TIMEOUT).unwrap();

        let delivery = c.on_frame_received(&intensity_reply(0x0900)).unwrap();
        assert_eq!(delivery, Delivery::Matched { sequence: 4 });
    }

    #[tokio::test]
    async fn test_sequence_with_wrong_command_falls_back() {
        let c = correlator(ProtocolConfig::default());
        let _voltage = c.register(1, CommandId::VOLTAGE, STATUS_TIMEOUT).unwrap();
        let _intensity = c.register(2, CommandId::INTENSITY, STATUS_TIMEOUT).unwrap();

        let delivery = c.on_frame_received(&intensity_reply(1)).unwrap();
        assert_eq!(delivery, Delivery::Matched { sequence: 2 });
        assert!(c.is_pending(1));
    }

    #[tokio::test]
    async fn test_command_fallback_checks_device() {
        let c = correlator(ProtocolConfig::default());
        let _other = c
            .register_addressed(3, CommandId::INTENSITY, Some(2), STATUS_TIMEOUT)
            .unwrap();

        // reply from device 1 with an unknown sequence
        let delivery = c.on_frame_received(&intensity_reply(0x0900)).unwrap();
        assert!(matches!(delivery, Delivery::Unsolicited(r) if r.device_id == Some(1)));
        assert!(c.is_pending(3));

        let from_two = DataSection::new(
            0x0100,
            0x0901,
            CommandId::INTENSITY,
            vec![0x02, 0x00, 0x01, 0x00, 0x00, 0x00, 0x3F],
        );
        assert_eq!(c.on_frame_received(&from_two).unwrap(), Delivery::Matched { sequence: 3 });
    }

    #[tokio::test]
    async fn test_unacknowledged_reply_not_claimed() {
        let c = correlator(ProtocolConfig::default());
        c.retire_unacknowledged(1);
        let handle = c
            .register_addressed(2, CommandId::INTENSITY, Some(1), STATUS_TIMEOUT)
            .unwrap();

        let delivery = c.on_frame_received(&intensity_reply(1)).unwrap();
        assert!(matches!(delivery, Delivery::Unsolicited(r) if r.sequence == 1));
        assert!(c.is_pending(2));

        assert_eq!(c.on_frame_received(&intensity_reply(2)).unwrap(), Delivery::Matched { sequence: 2 });
        assert_eq!(handle.wait().await.unwrap().sequence, 2);
    }

    #[tokio::test]
    async fn test_sequence_only_policy() {
        let c = correlator(ProtocolConfig::default().with_match_policy(MatchPolicy::SequenceOnly));
        let _handle = c.register(1, CommandId::INTENSITY, STATUS_TIMEOUT).unwrap();

        let delivery = c.on_frame_received(&intensity_reply(7)).unwrap();
        assert!(matches!(delivery, Delivery::Unsolicited(r) if r.sequence == 7));
        assert!(c.is_pending(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_then_unsolicited() {
        let c = correlator(ProtocolConfig::default());
        let late = c.register(1, CommandId::INTENSITY, STATUS_TIMEOUT).unwrap();
        let waiting = c.register(2, CommandId::INTENSITY, Duration::from_secs(10)).unwrap();

        tokio::time::advance(Duration::from_secs(3)).await;
        assert_eq!(c.sweep(Instant::now()), 1);

        assert!(matches!(
            late.wait().await,
            Err(Error::Timeout { sequence: 1, .. })
        ));

        // the late reply must not be handed to the other intensity request
        let delivery = c.on_frame_received(&intensity_reply(1)).unwrap();
        assert!(matches!(delivery, Delivery::Unsolicited(_)));
        assert!(c.is_pending(2));

        drop(waiting);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_expires_itself() {
        let c = correlator(ProtocolConfig::default());
        let handle = c.register(1, CommandId::VOLTAGE, STATUS_TIMEOUT).unwrap();

        let start = Instant::now();
        let result = handle.wait().await;

        assert!(matches!(result, Err(Error::Timeout { sequence: 1, .. })));
        assert!(start.elapsed() >= STATUS_TIMEOUT);
        assert_eq!(c.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_reply_is_unsolicited() {
        let c = correlator(ProtocolConfig::default());
        let handle = c.register(1, CommandId::INTENSITY, STATUS_TIMEOUT).unwrap();

        assert!(handle.cancel());
        assert!(!c.cancel(1));

        let delivery = c.on_frame_received(&intensity_reply(1)).unwrap();
        assert!(matches!(delivery, Delivery::Unsolicited(_)));
    }

    #[tokio::test]
    async fn test_fail_all() {
        let c = correlator(ProtocolConfig::default());
        let a = c.register(1, CommandId::INTENSITY, STATUS_TIMEOUT).unwrap();
        let b = c.register(2, CommandId::VOLTAGE, STATUS_TIMEOUT).unwrap();

        assert_eq!(c.fail_all(Teardown::Closed), 2);
        assert!(matches!(a.wait().await, Err(Error::TransportClosed)));
        assert!(matches!(b.wait().await, Err(Error::TransportClosed)));

        let c2 = correlator(ProtocolConfig::default());
        let h = c2.register(1, CommandId::VOLTAGE, STATUS_TIMEOUT).unwrap();
        c2.fail_all(Teardown::Fault("link lost".into()));
        assert!(matches!(h.wait().await, Err(Error::TransportFault(msg)) if msg == "link lost"));
    }

    #[tokio::test]
    async fn test_decode_error_reaches_waiter() {
        let c = correlator(ProtocolConfig::default());
        let handle = c.register(1, CommandId::INTENSITY, STATUS_TIMEOUT).unwrap();

        let short = DataSection::new(0x0100, 1, CommandId::INTENSITY, vec![0x01, 0x00, 0x01, 0x00]);
        assert_eq!(c.on_frame_received(&short).unwrap(), Delivery::Matched { sequence: 1 });

        assert!(matches!(
            handle.wait().await,
            Err(Error::PayloadLengthMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_unknown_command_passthrough() {
        let c = correlator(ProtocolConfig::default());
        let handle = c.register(1, CommandId(0x7F01), STATUS_TIMEOUT).unwrap();

        let reply = DataSection::new(0x0100, 1, CommandId(0x7F01), vec![0x0A, 0x0B, 0x0C]);
        c.on_frame_received(&reply).unwrap();

        let response = handle.wait().await.unwrap();
        assert!(response.unknown);
        assert_eq!(response.value, Value::Raw(Bytes::from_static(&[0x0A, 0x0B, 0x0C])));
    }
}
