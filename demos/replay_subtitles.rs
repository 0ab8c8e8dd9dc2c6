//! Replay a subtitle file against a simulated 25 fps clock.
//!
//! Usage:
//!   cargo run --example replay_subtitles -- <subtitle_file>

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use overlaysync::{
    EngineOptions, ManualClock, OsdSnapshot, OverlayEngine, RedrawCallback, SlotKind,
    SubtitleFileSource,
};

struct PrintRedraw;

impl RedrawCallback for PrintRedraw {
    fn on_redraw(&self, snapshot: &OsdSnapshot) {
        match snapshot.lines(SlotKind::Subtitle) {
            Some(lines) => println!("  v{}: {}", snapshot.version, lines.join(" / ")),
            None => println!("  v{}: (blank)", snapshot.version),
        }
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let input_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "input.srt".to_string());

    println!("Opening {input_path}...");
    let source = SubtitleFileSource::open(&input_path)?;
    let last_end = source
        .cues()
        .iter()
        .map(|cue| cue.end_time)
        .max()
        .unwrap_or_default();
    println!("{} cues, last one ends at {last_end:?}", source.len());

    let options = EngineOptions::new().with_redraw(Arc::new(PrintRedraw));
    let mut engine = OverlayEngine::new(options)?;
    engine.attach_source(source);

    // Play the file at 25 frames per second.
    let clock = ManualClock::new(Duration::ZERO);
    let frame = Duration::from_millis(40);
    let mut position = Duration::ZERO;
    while position <= last_end + frame {
        engine.tick(&clock);
        clock.advance(frame);
        position += frame;
    }

    let stats = engine.stats();
    println!(
        "Done: {} ticks, {} packets, {} redraws",
        stats.ticks, stats.packets, stats.redraws,
    );

    Ok(())
}
