//! Simulated fixture on the far side of a channel link

#![allow(dead_code)]

use bytes::{BufMut, Bytes, BytesMut};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use zybl::{ChannelLink, ChannelPeer, CommandId, Light};
use zybl_core::constants::{READ_FLAG, WRITE_FLAG};
use zybl_core::{DataSection, Frame, FrameBuffer, Namespace};

/// Behaviour of the simulated fixture
#[derive(Debug, Clone)]
pub struct Fixture {
    pub device_id: u16,
    pub serial: &'static str,
    pub model: &'static str,
    pub voltage: u16,
    pub online: bool,

    /// Requests dropped without a reply before the fixture starts answering
    pub ignore_first: usize,

    /// Size of the notification chunks replies are split into
    pub chunk_size: usize,

    /// Reply with this sequence instead of the request's
    pub sequence_override: Option<u16>,
}

impl Default for Fixture {
    fn default() -> Self {
        Self {
            device_id: 1,
            serial: "SN0042",
            model: "PL103",
            voltage: 0x0F3C,
            online: true,
            ignore_first: 0,
            chunk_size: 7,
            sequence_override: None,
        }
    }
}

struct State {
    intensity: [u8; 4],
    kelvin: [u8; 2],
}

impl Fixture {
    /// Spawn the fixture; every frame it receives is forwarded to the returned
    /// receiver
    pub fn spawn(self, mut peer: ChannelPeer) -> (JoinHandle<()>, mpsc::UnboundedReceiver<Bytes>) {
        let (seen_tx, seen_rx) = mpsc::unbounded_channel();

        let task = tokio::spawn(async move {
            let mut buffer = FrameBuffer::new();
            let mut state = State {
                intensity: 0f32.to_le_bytes(),
                kelvin: 3200u16.to_le_bytes(),
            };
            let mut ignored = 0;

            while let Some(chunk) = peer.recv_written().await {
                for data in buffer.push(&chunk).into_iter().flatten() {
                    let Ok(request) = DataSection::parse(&data) else {
                        continue;
                    };
                    let _ = seen_tx.send(Frame::encode(&data).unwrap());

                    if ignored < self.ignore_first {
                        ignored += 1;
                        continue;
                    }

                    if let Some(payload) = self.reply(&request, &mut state) {
                        let sequence = self.sequence_override.unwrap_or(request.sequence);
                        let section = DataSection::new(request.protocol_field, sequence, request.command, payload);
                        let frame = Frame::encode(&section.to_bytes()).unwrap();
                        peer.notify_chunked(&frame, self.chunk_size);
                    }
                }
            }
        });

        (task, seen_rx)
    }

    fn reply(&self, request: &DataSection, state: &mut State) -> Option<Bytes> {
        let payload = &request.payload;
        let mut out = BytesMut::new();

        match request.command {
            CommandId::DEVICE_INFO => {
                out.put_slice(self.serial.as_bytes());
                out.put_u8(0);
                out.put_slice(self.model.as_bytes());
                out.put_u8(0);
            }
            CommandId::DEVICE_ID => out.put_u16_le(self.device_id),
            command if payload.len() >= 3 && is_addressed(command) => {
                let device_id = u16::from_le_bytes([payload[0], payload[1]]);
                let write = payload[2] == WRITE_FLAG;
                let value = &payload[3..];

                out.put_u16_le(device_id);
                out.put_u8(if write { WRITE_FLAG } else { READ_FLAG });

                match (command, write) {
                    (CommandId::INTENSITY, true) => {
                        state.intensity.copy_from_slice(value);
                        out.put_slice(value);
                    }
                    (CommandId::INTENSITY, false) => out.put_slice(&state.intensity),
                    (CommandId::COLOR_TEMPERATURE, true) => {
                        state.kelvin.copy_from_slice(value);
                        out.put_slice(value);
                    }
                    (CommandId::COLOR_TEMPERATURE, false) => out.put_slice(&state.kelvin),
                    (CommandId::VOLTAGE, _) => out.put_u16_le(self.voltage),
                    (CommandId::ONLINE, _) => out.put_u16_le(u16::from(self.online)),
                    // writes are acknowledged with the value echoed
                    _ => out.put_slice(value),
                }
            }
            // unknown commands: echo the payload
            _ => out.put_slice(payload),
        }

        Some(out.freeze())
    }
}

fn is_addressed(command: CommandId) -> bool {
    matches!(command.namespace(), Namespace::Control | Namespace::Status) || command == CommandId::ONLINE
}

/// An open light wired to a simulated fixture
pub async fn light_with(fixture: Fixture) -> (Light<ChannelLink>, mpsc::UnboundedReceiver<Bytes>) {
    let (link, peer) = ChannelLink::default_pair();
    let device_id = fixture.device_id;
    let (_task, seen) = fixture.spawn(peer);

    let mut light = Light::new(link).with_device_id(device_id);
    light.open().await.unwrap();
    (light, seen)
}

/// Drain every frame the fixture has seen so far
pub fn seen_frames(seen: &mut mpsc::UnboundedReceiver<Bytes>) -> Vec<Bytes> {
    let mut frames = Vec::new();
    while let Ok(frame) = seen.try_recv() {
        frames.push(frame);
    }
    frames
}

/// Data section of a frame
pub fn section(frame: &[u8]) -> DataSection {
    DataSection::parse(&Frame::decode(frame).unwrap()).unwrap()
}
