//! Show the subtitle track of a media file (feature = "ffmpeg").
//!
//! Usage:
//!   cargo run --features=ffmpeg --example media_subtitles -- <input_file>

use std::error::Error;
use std::time::Duration;

use overlaysync::{
    EngineOptions, FfmpegLogLevel, FfmpegSubtitleSource, OverlayEngine, set_ffmpeg_log_level,
};

fn main() -> Result<(), Box<dyn Error>> {
    let input_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "input.mkv".to_string());

    set_ffmpeg_log_level(FfmpegLogLevel::Error);

    println!("Opening {input_path}...");
    let source = FfmpegSubtitleSource::open(&input_path)?;
    println!(
        "Using stream {} ({} packets)",
        source.stream_index(),
        source.kind(),
    );

    let mut engine = OverlayEngine::new(EngineOptions::default())?;
    engine.attach_source(source);

    // Walk the first ten minutes at 10 ticks per second.
    for step in 0..6000u64 {
        let report = engine.tick_at(Duration::from_millis(step * 100));
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
    }

    println!("{:?}", engine.stats());
    Ok(())
}
