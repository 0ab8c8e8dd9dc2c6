use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use overlaysync::{
    EngineOptions, OsdSnapshot, OverlayEngine, PacketSource, RenderableOverlay, SlotKind,
    SourceKind, SubtitleCue, SubtitleFileSource, SubtitleFormat, UnknownEndPolicy,
    format_subtitles,
};
use serde_json::json;

#[cfg(feature = "ffmpeg")]
use overlaysync::{FfmpegLogLevel, FfmpegSubtitleSource};

const CLI_AFTER_HELP: &str = "Examples:\n  overlaysync inspect movie.srt --json\n  overlaysync convert movie.srt --format vtt --out movie.vtt\n  overlaysync replay movie.srt --fps 25 --seek-at 00:01:00 --seek-to 00:10:00\n  overlaysync completions zsh > _overlaysync";

#[derive(Debug, Parser)]
#[command(
    name = "overlaysync",
    version,
    about = "Inspect, convert and replay subtitle overlays against a presentation clock",
    after_help = CLI_AFTER_HELP
)]
struct Cli {
    #[command(flatten)]
    global: GlobalOptions,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Parser, Clone, Default)]
struct GlobalOptions {
    /// Show additional output.
    #[arg(long)]
    verbose: bool,

    /// Show a progress bar where supported.
    #[arg(long)]
    progress: bool,

    /// Allow overwriting existing output files.
    #[arg(long)]
    overwrite: bool,

    /// FFmpeg log level (quiet, panic, fatal, error, warning, info, verbose, debug, trace).
    #[arg(long)]
    log_level: Option<String>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// List the cues of a subtitle file.
    #[command(
        about = "List subtitle cues",
        visible_alias = "info",
        after_help = "Examples:\n  overlaysync inspect movie.srt\n  overlaysync inspect movie.vtt --search hello --json"
    )]
    Inspect {
        /// Input subtitle file (.srt or .vtt).
        input: PathBuf,
        /// Only list cues containing this text (case-insensitive).
        #[arg(long)]
        search: Option<String>,
        /// Output cues as machine-readable JSON.
        #[arg(long)]
        json: bool,
    },

    /// Convert a subtitle file to another format.
    #[command(
        about = "Convert subtitle files",
        after_help = "Examples:\n  overlaysync convert movie.srt --format vtt --out movie.vtt\n  overlaysync convert movie.vtt --format srt --out movie.srt --shift -1.5"
    )]
    Convert {
        /// Input subtitle file (.srt or .vtt).
        input: PathBuf,
        /// Output format: srt | vtt | raw.
        #[arg(long)]
        format: String,
        /// Output file path.
        #[arg(long)]
        out: PathBuf,
        /// Shift every cue by this many seconds (may be negative).
        #[arg(long, allow_hyphen_values = true)]
        shift: Option<f64>,
    },

    /// Drive the overlay engine over a subtitle source and print OSD changes.
    #[command(
        about = "Replay overlays frame by frame",
        after_help = "Examples:\n  overlaysync replay movie.srt --fps 25\n  overlaysync replay movie.srt --start 0:01:00 --end 0:02:00 --delay-ms 500 --json"
    )]
    Replay {
        /// Input subtitle file, or a media file when built with `ffmpeg`.
        input: PathBuf,
        /// Simulated video frame rate.
        #[arg(long, default_value_t = 25.0)]
        fps: f64,
        /// Start of the replay.
        #[arg(long)]
        start: Option<String>,
        /// End of the replay. Defaults to the last cue's end.
        #[arg(long)]
        end: Option<String>,
        /// Presentation time at which to simulate a seek.
        #[arg(long, requires = "seek_to")]
        seek_at: Option<String>,
        /// Target of the simulated seek.
        #[arg(long, requires = "seek_at")]
        seek_to: Option<String>,
        /// Subtitle delay in milliseconds (negative shows subtitles earlier).
        #[arg(long, allow_hyphen_values = true, default_value_t = 0)]
        delay_ms: i64,
        /// Display time for captions without an end, in seconds.
        #[arg(long)]
        fallback_duration: Option<f64>,
        /// Output changes as JSON lines.
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completion scripts.
    #[command(about = "Generate shell completions")]
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn parse_subtitle_format(value: &str) -> Option<SubtitleFormat> {
    match value.to_ascii_lowercase().as_str() {
        "srt" => Some(SubtitleFormat::Srt),
        "vtt" | "webvtt" => Some(SubtitleFormat::WebVtt),
        "raw" | "txt" => Some(SubtitleFormat::Raw),
        _ => None,
    }
}

fn parse_timecode(value: &str) -> Result<Duration, Box<dyn std::error::Error>> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("time value cannot be empty".into());
    }

    if let Ok(seconds) = trimmed.parse::<f64>() {
        return seconds_to_duration(seconds);
    }

    let parts: Vec<&str> = trimmed.split(':').collect();
    if parts.len() < 2 || parts.len() > 3 {
        return Err(format!("invalid time format: {trimmed}").into());
    }

    let (hours, minutes, seconds_str) = if parts.len() == 3 {
        (parts[0].parse::<u64>()?, parts[1].parse::<u64>()?, parts[2])
    } else {
        (0_u64, parts[0].parse::<u64>()?, parts[1])
    };

    let seconds = seconds_str.parse::<f64>()?;
    let total_seconds = (hours as f64 * 3600.0) + (minutes as f64 * 60.0) + seconds;
    seconds_to_duration(total_seconds)
}

fn seconds_to_duration(seconds: f64) -> Result<Duration, Box<dyn std::error::Error>> {
    if !seconds.is_finite() {
        return Err(format!("time value must be finite, got {seconds}").into());
    }
    Ok(Duration::try_from_secs_f64(seconds.max(0.0))?)
}

#[cfg(feature = "ffmpeg")]
fn parse_log_level(value: &str) -> Option<FfmpegLogLevel> {
    match value.to_ascii_lowercase().as_str() {
        "quiet" => Some(FfmpegLogLevel::Quiet),
        "panic" => Some(FfmpegLogLevel::Panic),
        "fatal" => Some(FfmpegLogLevel::Fatal),
        "error" => Some(FfmpegLogLevel::Error),
        "warning" | "warn" => Some(FfmpegLogLevel::Warning),
        "info" => Some(FfmpegLogLevel::Info),
        "verbose" => Some(FfmpegLogLevel::Verbose),
        "debug" => Some(FfmpegLogLevel::Debug),
        "trace" => Some(FfmpegLogLevel::Trace),
        _ => None,
    }
}

fn ensure_writable_path(path: &Path, overwrite: bool) -> Result<(), Box<dyn std::error::Error>> {
    if path.exists() {
        if overwrite {
            eprintln!(
                "{} {}",
                "warning:".yellow().bold(),
                format!("overwriting {}", path.display()).yellow()
            );
        } else {
            return Err(format!(
                "output already exists: {} (use --overwrite to replace)",
                path.display()
            )
            .into());
        }
    }
    Ok(())
}

fn apply_global_options(global: &GlobalOptions) -> Result<(), Box<dyn std::error::Error>> {
    #[cfg(feature = "ffmpeg")]
    if let Some(level) = &global.log_level {
        let parsed = parse_log_level(level).ok_or(format!("unsupported --log-level: {level}"))?;
        overlaysync::set_ffmpeg_log_level(parsed);
    }

    #[cfg(not(feature = "ffmpeg"))]
    if global.log_level.is_some() {
        eprintln!(
            "{} {}",
            "warning:".yellow().bold(),
            "--log-level requires building with the `ffmpeg` feature".yellow()
        );
    }

    Ok(())
}

fn is_subtitle_file(path: &Path) -> bool {
    matches!(
        SubtitleFormat::from_path(path),
        Some(SubtitleFormat::Srt | SubtitleFormat::WebVtt)
    )
}

/// Open a replay source; returns it with the end of its last cue, if known.
fn open_source(
    input: &Path,
) -> Result<(Box<dyn PacketSource>, Option<Duration>), Box<dyn std::error::Error>> {
    if is_subtitle_file(input) {
        let source = SubtitleFileSource::open(input)?;
        let last_end = source.cues().iter().map(|cue| cue.end_time).max();
        return Ok((Box::new(source), last_end));
    }
    Ok((open_media(input)?, None))
}

#[cfg(feature = "ffmpeg")]
fn open_media(input: &Path) -> Result<Box<dyn PacketSource>, Box<dyn std::error::Error>> {
    Ok(Box::new(FfmpegSubtitleSource::open(input)?))
}

#[cfg(not(feature = "ffmpeg"))]
fn open_media(input: &Path) -> Result<Box<dyn PacketSource>, Box<dyn std::error::Error>> {
    Err(format!(
        "unsupported input {} (media files require the `ffmpeg` feature)",
        input.display()
    )
    .into())
}

fn shift_cues(cues: &mut [SubtitleCue], seconds: f64) {
    let offset = Duration::from_secs_f64(seconds.abs());
    for cue in cues {
        if seconds >= 0.0 {
            cue.start_time += offset;
            cue.end_time += offset;
        } else {
            cue.start_time = cue.start_time.saturating_sub(offset);
            cue.end_time = cue.end_time.saturating_sub(offset);
        }
    }
}

fn describe_overlay(overlay: &RenderableOverlay) -> String {
    match overlay {
        RenderableOverlay::Text { lines, .. } => lines.join(" / "),
        RenderableOverlay::Bitmap { rect, .. } => {
            format!("<bitmap {}x{} at {},{}>", rect.width, rect.height, rect.x, rect.y)
        }
    }
}

fn snapshot_json(time: Duration, snapshot: &OsdSnapshot) -> serde_json::Value {
    let slots: serde_json::Map<String, serde_json::Value> = snapshot
        .active
        .iter()
        .map(|(slot, overlay)| {
            let value = match overlay {
                RenderableOverlay::Text { lines, style_hints } => json!({
                    "lines": lines,
                    "style": style_hints.style,
                    "alignment": style_hints.alignment,
                    "italic": style_hints.italic,
                }),
                RenderableOverlay::Bitmap { rect, .. } => json!({
                    "x": rect.x,
                    "y": rect.y,
                    "width": rect.width,
                    "height": rect.height,
                }),
            };
            (slot.to_string(), value)
        })
        .collect();

    json!({
        "time_seconds": time.as_secs_f64(),
        "version": snapshot.version,
        "slots": slots,
    })
}

fn print_snapshot(time: Duration, snapshot: &OsdSnapshot) {
    let timestamp = format!("[{:>10.3}s]", time.as_secs_f64()).dimmed();
    if snapshot.is_empty() {
        println!("{timestamp} {}", "(clear)".dimmed());
        return;
    }
    for slot in SlotKind::ALL {
        if let Some(overlay) = snapshot.get(slot) {
            println!(
                "{timestamp} {} {}",
                format!("{slot}:").cyan().bold(),
                describe_overlay(overlay)
            );
        }
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    apply_global_options(&cli.global)?;

    match cli.command {
        Commands::Inspect {
            input,
            search,
            json,
        } => {
            let source = SubtitleFileSource::open(&input)?;
            let cues: Vec<&SubtitleCue> = match &search {
                Some(query) => source.search(query),
                None => source.cues().iter().collect(),
            };

            if json {
                let payload = json!({
                    "file": input.display().to_string(),
                    "cue_count": source.len(),
                    "cues": cues.iter().map(|cue| json!({
                        "index": cue.index,
                        "start_seconds": cue.start_time.as_secs_f64(),
                        "end_seconds": cue.end_time.as_secs_f64(),
                        "text": cue.text,
                    })).collect::<Vec<_>>(),
                });
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else {
                println!("File: {}", input.display());
                println!("Cues: {}", source.len());
                for cue in cues {
                    println!(
                        "{:>5} {} {:?} → {:?}  {}",
                        cue.index.to_string().cyan(),
                        "│".dimmed(),
                        cue.start_time,
                        cue.end_time,
                        cue.text.replace('\n', " / ")
                    );
                }
            }
        }
        Commands::Convert {
            input,
            format,
            out,
            shift,
        } => {
            let subtitle_format =
                parse_subtitle_format(&format).ok_or(format!("unsupported --format: {format}"))?;
            ensure_writable_path(&out, cli.global.overwrite)?;

            let mut cues = SubtitleFileSource::open(&input)?.cues().to_vec();
            if let Some(seconds) = shift {
                shift_cues(&mut cues, seconds);
            }

            fs::write(&out, format_subtitles(&cues, subtitle_format))?;
            println!(
                "{} {} cues → {} ({subtitle_format})",
                "converted".green().bold(),
                cues.len(),
                out.display()
            );
        }
        Commands::Replay {
            input,
            fps,
            start,
            end,
            seek_at,
            seek_to,
            delay_ms,
            fallback_duration,
            json,
        } => {
            if !(fps.is_finite() && fps > 0.0) {
                return Err(format!("--fps must be positive, got {fps}").into());
            }

            let (source, last_end) = open_source(&input)?;
            let start = start.as_deref().map(parse_timecode).transpose()?.unwrap_or_default();
            let end = match end.as_deref().map(parse_timecode).transpose()? {
                Some(end) => end,
                None => last_end.ok_or("--end is required for this input")?,
            };
            let seek = match (seek_at, seek_to) {
                (Some(at), Some(to)) => Some((parse_timecode(&at)?, parse_timecode(&to)?)),
                _ => None,
            };

            let mut options = EngineOptions::new().with_subtitle_delay_ms(delay_ms);
            if let Some(seconds) = fallback_duration {
                options = options.with_unknown_text_end(UnknownEndPolicy::Fixed(
                    Duration::from_secs_f64(seconds.max(0.0)),
                ));
            }
            let mut engine = OverlayEngine::new(options)?;
            engine.attach_source(source);
            if start > Duration::ZERO {
                engine.seek(start);
            }

            let frame_duration = Duration::from_secs_f64(1.0 / fps);
            let total_frames = (end.saturating_sub(start).as_secs_f64() * fps).ceil() as u64;

            let progress_bar = if cli.global.progress && !json {
                let pb = ProgressBar::new(total_frames);
                let style = ProgressStyle::with_template(
                    "{spinner:.green} {bar:40.cyan/blue} {pos}/{len} {msg}",
                )?;
                pb.set_style(style.progress_chars("##-"));
                Some(pb)
            } else {
                None
            };

            let mut seek_pending = seek;
            let mut time = start;
            let mut frame = 0_u64;
            while frame < total_frames {
                if let Some((at, to)) = seek_pending {
                    if time >= at {
                        seek_pending = None;
                        if cli.global.verbose {
                            eprintln!("{} {at:?} → {to:?}", "seek".magenta().bold());
                        }
                        time = to;
                    }
                }

                let report = engine.tick_at(time);
                if report.changed {
                    if json {
                        println!("{}", snapshot_json(time, &report.snapshot));
                    } else if let Some(pb) = &progress_bar {
                        pb.suspend(|| print_snapshot(time, &report.snapshot));
                    } else {
                        print_snapshot(time, &report.snapshot);
                    }
                }

                if let Some(pb) = &progress_bar {
                    pb.inc(1);
                }
                time += frame_duration;
                frame += 1;
            }

            if let Some(pb) = progress_bar {
                pb.finish_with_message("done");
            }

            if cli.global.verbose {
                let stats = engine.stats();
                eprintln!(
                    "{} ticks={} packets={} dropped={} resets={} redraws={}",
                    "stats".cyan().bold(),
                    stats.ticks,
                    stats.packets,
                    stats.malformed_packets + stats.unknown_packets,
                    stats.resets,
                    stats.redraws
                );
                for kind in SourceKind::ALL {
                    if !engine.options().is_kind_enabled(kind) {
                        eprintln!("  {kind} disabled");
                    }
                }
            }
        }
        Commands::Completions { shell } => {
            let mut command = Cli::command();
            clap_complete::generate(shell, &mut command, "overlaysync", &mut std::io::stdout());
        }
    }

    Ok(())
}

fn main() {
    if let Err(error) = run() {
        eprintln!("error: {error}");
        std::process::exit(1);
    }
}
