//! Feed the engine from a demuxer task through a channel (feature = "async").
//!
//! Usage:
//!   cargo run --features=async --example channel_source -- <subtitle_file>

use std::error::Error;
use std::time::Duration;

use overlaysync::{
    EngineOptions, OverlayEngine, PacketSource, SlotKind, SubtitleFileSource, packet_channel,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let input_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "input.srt".to_string());

    let mut file = SubtitleFileSource::open(&input_path)?;
    println!("Streaming {} cues from {input_path}...", file.len());

    let (sender, source) = packet_channel(16);
    let demuxer = tokio::spawn(async move {
        while let Some(packet) = file.pull() {
            if sender.send(packet).await.is_err() {
                break;
            }
        }
    });

    let mut engine = OverlayEngine::new(EngineOptions::default())?;
    engine.attach_source(source);

    // Render loop: one tick per 40 ms frame.
    let mut interval = tokio::time::interval(Duration::from_millis(40));
    let mut position = Duration::ZERO;
    for _ in 0..250 {
        interval.tick().await;
        let report = engine.tick_at(position);
        if report.changed {
            match report.snapshot.lines(SlotKind::Subtitle) {
                Some(lines) => println!("{position:?}: {}", lines.join(" / ")),
                None => println!("{position:?}: (blank)"),
            }
        }
        position += Duration::from_millis(40);
    }

    demuxer.abort();
    Ok(())
}
