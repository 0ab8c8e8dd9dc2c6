//! External subtitle file parsing, formatting and playback tests.

use std::time::Duration;

use overlaysync::{
    OverlayError, PacketSource, SubtitleCue, SubtitleFileSource, SubtitleFormat,
    format_subtitles, parse_subtitles,
};

const SRT: &str = "1
00:00:01,000 --> 00:00:02,500
Hello

2
00:00:03,000 --> 00:00:04,000
Two
lines
";

const VTT: &str = "WEBVTT

NOTE this is a comment

cue-one
00:01.000 --> 00:02.000 align:start position:10%
First

00:00:03.500 --> 00:00:05.000
Second
";

fn ms(value: u64) -> Duration {
    Duration::from_millis(value)
}

// ── Parsing ──────────────────────────────────────────────────────

#[test]
fn parses_srt() {
    let cues = parse_subtitles(SRT).unwrap();
    assert_eq!(cues.len(), 2);

    assert_eq!(cues[0].start_time, ms(1000));
    assert_eq!(cues[0].end_time, ms(2500));
    assert_eq!(cues[0].text, "Hello");
    assert_eq!(cues[0].index, 0);

    assert_eq!(cues[1].text, "Two\nlines");
    assert_eq!(cues[1].index, 1);
}

#[test]
fn parses_webvtt_with_identifiers_and_settings() {
    let cues = parse_subtitles(VTT).unwrap();
    assert_eq!(cues.len(), 2);

    assert_eq!(cues[0].start_time, ms(1000));
    assert_eq!(cues[0].end_time, ms(2000));
    assert_eq!(cues[0].text, "First");
    assert_eq!(cues[1].start_time, ms(3500));
}

#[test]
fn handles_bom_and_crlf() {
    let input = "\u{feff}1\r\n00:00:01,000 --> 00:00:02,000\r\nWindows\r\n";
    let cues = parse_subtitles(input).unwrap();

    assert_eq!(cues.len(), 1);
    assert_eq!(cues[0].text, "Windows");
}

#[test]
fn sorts_out_of_order_cues() {
    let input = "1\n00:00:05,000 --> 00:00:06,000\nLater\n\n2\n00:00:01,000 --> 00:00:02,000\nSooner\n";
    let cues = parse_subtitles(input).unwrap();

    assert_eq!(cues[0].text, "Sooner");
    assert_eq!(cues[0].index, 0);
    assert_eq!(cues[1].text, "Later");
}

#[test]
fn empty_input_has_no_cues() {
    assert!(parse_subtitles("").unwrap().is_empty());
    assert!(parse_subtitles("WEBVTT\n").unwrap().is_empty());
}

#[test]
fn missing_timing_line_reports_block_start() {
    let input = "1\n00:00:01,000 --> 00:00:02,000\nFine\n\n2\nno timing here\n";
    let error = parse_subtitles(input).unwrap_err();

    assert!(matches!(error, OverlayError::SubtitleParse { line: 5, .. }));
}

#[test]
fn bad_timestamp_reports_its_line() {
    let input = "1\n00:00:01,000 --> 00:00:xx,000\nBroken\n";
    let error = parse_subtitles(input).unwrap_err();

    match error {
        OverlayError::SubtitleParse { line, reason } => {
            assert_eq!(line, 2);
            assert!(reason.contains("end timestamp"), "reason: {reason}");
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn overflowing_hours_are_a_parse_error() {
    let input = "1\n18446744073709551615:00:00,000 --> 18446744073709551615:00:01,000\nHuge\n";
    match parse_subtitles(input).unwrap_err() {
        OverlayError::SubtitleParse { line, reason } => {
            assert_eq!(line, 2);
            assert!(reason.contains("start timestamp"), "reason: {reason}");
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert!(SubtitleFileSource::parse(input).is_err());
}

#[test]
fn reversed_cue_is_rejected() {
    let input = "1\n00:00:05,000 --> 00:00:01,000\nBackwards\n";
    assert!(matches!(
        parse_subtitles(input),
        Err(OverlayError::SubtitleParse { line: 2, .. })
    ));
}

// ── Formatting ───────────────────────────────────────────────────

fn sample_cues() -> Vec<SubtitleCue> {
    vec![
        SubtitleCue {
            start_time: ms(1000),
            end_time: ms(2500),
            text: "Hello".to_string(),
            index: 0,
        },
        SubtitleCue {
            start_time: Duration::from_secs(3661),
            end_time: Duration::from_secs(3662),
            text: "Two\nlines".to_string(),
            index: 1,
        },
    ]
}

#[test]
fn formats_srt() {
    let output = format_subtitles(&sample_cues(), SubtitleFormat::Srt);
    assert!(output.starts_with("1\n00:00:01,000 --> 00:00:02,500\nHello\n\n"));
    assert!(output.contains("2\n01:01:01,000 --> 01:01:02,000\nTwo\nlines\n"));
}

#[test]
fn formats_webvtt() {
    let output = format_subtitles(&sample_cues(), SubtitleFormat::WebVtt);
    assert!(output.starts_with("WEBVTT\n\n"));
    assert!(output.contains("00:00:01.000 --> 00:00:02.500"));
}

#[test]
fn formats_raw_on_one_line() {
    let output = format_subtitles(&sample_cues(), SubtitleFormat::Raw);
    assert_eq!(output.lines().count(), 2);
    assert!(output.contains("Two / lines"));
}

#[test]
fn formatted_srt_parses_back() {
    let cues = sample_cues();
    let reparsed = parse_subtitles(&format_subtitles(&cues, SubtitleFormat::Srt)).unwrap();
    assert_eq!(reparsed, cues);
}

#[test]
fn format_from_path() {
    assert_eq!(SubtitleFormat::from_path("movie.SRT"), Some(SubtitleFormat::Srt));
    assert_eq!(SubtitleFormat::from_path("movie.vtt"), Some(SubtitleFormat::WebVtt));
    assert_eq!(SubtitleFormat::from_path("notes.txt"), Some(SubtitleFormat::Raw));
    assert_eq!(SubtitleFormat::from_path("movie.mkv"), None);
    assert_eq!(SubtitleFormat::from_path("no_extension"), None);
    assert_eq!(SubtitleFormat::WebVtt.to_string(), "WebVTT");
}

// ── Packet source ────────────────────────────────────────────────

#[test]
fn serves_cues_as_text_packets() {
    let mut source = SubtitleFileSource::parse(SRT).unwrap();
    assert_eq!(source.len(), 2);
    assert_eq!(source.remaining(), 2);

    assert_eq!(source.peek_timestamp(), Some(ms(1000)));
    let packet = source.pull().unwrap();
    assert_eq!(packet.type_tag, b't');
    assert_eq!(packet.bytes, b"Hello");
    assert_eq!(packet.duration, Some(ms(1500)));
    assert_eq!(source.remaining(), 1);

    source.pull().unwrap();
    assert!(source.pull().is_none());
    assert!(source.peek_timestamp().is_none());
}

#[test]
fn seek_finds_first_visible_cue() {
    let mut source = SubtitleFileSource::parse(SRT).unwrap();

    source.seek(ms(2000));
    assert_eq!(source.peek_timestamp(), Some(ms(1000)));

    source.seek(ms(2500));
    assert_eq!(source.peek_timestamp(), Some(ms(3000)));

    source.seek(ms(10_000));
    assert!(source.pull().is_none());

    source.seek(Duration::ZERO);
    assert_eq!(source.remaining(), 2);
}

#[test]
fn search_ignores_case() {
    let source = SubtitleFileSource::parse(SRT).unwrap();
    let hits = source.search("LINES");

    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].index, 1);
    assert!(source.search("absent").is_empty());
}

#[test]
fn opens_files_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("episode.srt");
    std::fs::write(&path, SRT).unwrap();

    let source = SubtitleFileSource::open(&path).unwrap();
    assert_eq!(source.len(), 2);
    assert_eq!(source.cues()[1].text, "Two\nlines");
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let result = SubtitleFileSource::open(dir.path().join("absent.srt"));

    assert!(matches!(result, Err(OverlayError::IoError(_))));
}
