//! Drive a light over an in-memory link against a toy fixture
//!
//! Run with `RUST_LOG=zybl=debug,zybl_transport=trace` to see the frames.

use bytes::{BufMut, BytesMut};
use tracing_subscriber::EnvFilter;

use zybl::{ChannelLink, ChannelPeer, CommandId, Light, Target};
use zybl_core::{DataSection, Frame, FrameBuffer};

/// Echoes every request back; answers device info and id queries
async fn fixture(mut peer: ChannelPeer) {
    let mut buffer = FrameBuffer::new();

    while let Some(chunk) = peer.recv_written().await {
        for data in buffer.push(&chunk).into_iter().flatten() {
            let Ok(request) = DataSection::parse(&data) else {
                continue;
            };

            let mut payload = BytesMut::new();
            match request.command {
                CommandId::DEVICE_INFO => payload.put_slice(b"DEMO-0001\0PL103\0"),
                CommandId::DEVICE_ID => payload.put_u16_le(1),
                _ => payload.put_slice(&request.payload),
            }

            let reply = DataSection::new(
                request.protocol_field,
                request.sequence,
                request.command,
                payload.freeze(),
            );
            if let Ok(frame) = Frame::encode(&reply.to_bytes()) {
                peer.notify_chunked(&frame, 20);
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let (link, peer) = ChannelLink::default_pair();
    tokio::spawn(fixture(peer));

    let mut light = Light::new(link.with_name("loopback"));
    light.open().await?;

    let info = light.query_device_info().await?;
    println!("Connected to {}", info);

    let id = light.query_device_id().await?;
    println!("Device id: {}", id);

    light.set_intensity(Target::Default, 50.0).await?;
    light.set_color_temperature(Target::Default, 5600).await?;
    light.set_hsi(Target::Default, 210.0, 80.0, 40.0).await?;
    println!("Intensity 50%, 5600K, then HSI 210 deg");

    light.set_intensity(Target::Broadcast, 10.0).await?;
    println!("Broadcast intensity 10%");

    light.close().await?;
    Ok(())
}
