//! Implement `PacketSource` for a host-side demuxer and inspect bitmaps.
//!
//! The source below produces one plain-text caption, one styled caption
//! and one DVD subpicture. The subpicture is saved as `subpicture.png`.
//!
//! Usage:
//!   cargo run --example custom_source

use std::collections::VecDeque;
use std::error::Error;
use std::time::Duration;

use overlaysync::{
    EngineOptions, OverlayEngine, PacketSource, RawPacket, SlotKind,
};

/// 4x2 subpicture: white row over grey row, hidden after ~2 s.
const SUBPICTURE_UNIT: [u8; 38] = [
    0x00, 0x26, 0x00, 0x08, 0x00, 0x01, 0x00, 0x02, 0x00, 0x00, 0x00, 0x20, 0x01, 0x03, 0x32,
    0x10, 0x04, 0xff, 0xf0, 0x05, 0x00, 0xa0, 0x0d, 0x01, 0x40, 0x15, 0x06, 0x00, 0x04, 0x00,
    0x06, 0xff, 0x00, 0xaf, 0x00, 0x20, 0x02, 0xff,
];

/// A pretend demuxer that hands out packets in timestamp order.
struct ScriptedDemuxer {
    packets: VecDeque<RawPacket>,
}

impl ScriptedDemuxer {
    fn new() -> Self {
        let packets = [
            RawPacket::new(Duration::from_millis(500), b't', b"<i>Plain caption</i>".to_vec())
                .with_duration(Duration::from_secs(1)),
            RawPacket::new(
                Duration::from_millis(2000),
                b'a',
                b"1,0,Default,,0,0,0,,{\\an8}Styled caption".to_vec(),
            )
            .with_duration(Duration::from_secs(1)),
            RawPacket::new(Duration::from_millis(3000), b'v', SUBPICTURE_UNIT.to_vec()),
        ];
        Self {
            packets: packets.into(),
        }
    }
}

impl PacketSource for ScriptedDemuxer {
    fn pull(&mut self) -> Option<RawPacket> {
        self.packets.pop_front()
    }

    fn peek_timestamp(&mut self) -> Option<Duration> {
        self.packets.front().map(|packet| packet.timestamp)
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let mut engine = OverlayEngine::new(EngineOptions::default())?;
    engine.attach_source(ScriptedDemuxer::new());

    let mut saved = false;
    for frame in 0..150u64 {
        let report = engine.tick_at(Duration::from_millis(frame * 40));
        if !report.changed {
            continue;
        }

        println!("{:?}: OSD v{}", report.time, report.snapshot.version);
        for (slot, overlay) in &report.snapshot.active {
            match overlay.lines() {
                Some(lines) => println!("  {slot}: {}", lines.join(" / ")),
                None => println!("  {slot}: bitmap"),
            }
        }

        if let Some(bitmap) = report.snapshot.get(SlotKind::Bitmap)
            && !saved
            && let Some(image) = bitmap.to_rgba_image()
        {
            image.save("subpicture.png")?;
            println!("  Saved subpicture.png ({}x{})", image.width(), image.height());
            saved = true;
        }
    }

    Ok(())
}
