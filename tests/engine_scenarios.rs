//! End-to-end engine scenarios: packets in, snapshots out.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use overlaysync::{
    ClockObservation, EndTime, EngineOptions, IngestOutcome, ManualClock, OsdSnapshot,
    OverlayEngine, OverlayError, OverlayEvent, PacketQueue, RawPacket, RedrawCallback,
    SequenceId, SlotKind, SourceKind, SubtitleFileSource,
};

/// 4x2 subpicture shown at its packet time and hidden ~1.99 s later.
const SUBPICTURE_UNIT: [u8; 38] = [
    0x00, 0x26, 0x00, 0x08, // size, control offset
    0x00, 0x01, 0x00, 0x02, // RLE rows
    0x00, 0x00, 0x00, 0x20, // date 0, next sequence
    0x01, // show
    0x03, 0x32, 0x10, // palette
    0x04, 0xff, 0xf0, // alpha
    0x05, 0x00, 0xa0, 0x0d, 0x01, 0x40, 0x15, // coordinates
    0x06, 0x00, 0x04, 0x00, 0x06, // RLE offsets
    0xff, //
    0x00, 0xaf, 0x00, 0x20, // date 175, last sequence
    0x02, // hide
    0xff,
];

fn ms(value: u64) -> Duration {
    Duration::from_millis(value)
}

fn engine() -> OverlayEngine {
    OverlayEngine::new(EngineOptions::default()).expect("default options are valid")
}

fn text(at: u64, body: &str) -> RawPacket {
    RawPacket::new(ms(at), b't', body.as_bytes().to_vec())
}

fn dialogue(at: u64, line: &str) -> RawPacket {
    RawPacket::new(ms(at), b'a', line.as_bytes().to_vec())
}

fn subtitle(snapshot: &OsdSnapshot) -> Option<Vec<String>> {
    snapshot.lines(SlotKind::Subtitle).map(<[String]>::to_vec)
}

fn one(line: &str) -> Option<Vec<String>> {
    Some(vec![line.to_string()])
}

#[derive(Default)]
struct CountingRedraw {
    calls: AtomicUsize,
}

impl RedrawCallback for CountingRedraw {
    fn on_redraw(&self, _snapshot: &OsdSnapshot) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

// ── Supersession and expiry ──────────────────────────────────────

#[test]
fn styled_captions_replace_each_other_and_expire() {
    let mut queue = PacketQueue::new();
    queue.push(dialogue(1000, "Dialogue: 0,0:00:01.00,0:00:03.00,Default,,0,0,0,,A"));
    queue.push(dialogue(2500, "Dialogue: 0,0:00:02.50,0:00:04.00,Default,,0,0,0,,B"));

    let mut engine = engine();
    engine.attach_source(queue);

    assert_eq!(subtitle(&engine.tick_at(ms(2000)).snapshot), one("A"));
    assert_eq!(subtitle(&engine.tick_at(ms(2600)).snapshot), one("B"));
    assert_eq!(subtitle(&engine.tick_at(ms(3100)).snapshot), one("B"));
    assert_eq!(subtitle(&engine.tick_at(ms(3600)).snapshot), one("B"));

    let report = engine.tick_at(ms(4100));
    assert!(report.changed);
    assert!(report.snapshot.is_empty());
}

#[test]
fn unknown_end_waits_for_clear_packet() {
    let mut queue = PacketQueue::new();
    queue.push(text(1000, "Persistent"));
    queue.push(text(5000, ""));

    let mut engine = engine();
    engine.attach_source(queue);

    for at in [1000, 2000, 3000, 4000] {
        let report = engine.tick_at(ms(at));
        assert_eq!(subtitle(&report.snapshot), one("Persistent"), "at {at} ms");
    }

    let report = engine.tick_at(ms(5000));
    assert!(report.snapshot.is_empty());
}

#[test]
fn duration_bounds_plain_text() {
    let mut queue = PacketQueue::new();
    queue.push(text(1000, "Hello").with_duration(ms(2000)));

    let mut engine = engine();
    engine.attach_source(queue);

    assert!(engine.tick_at(ms(900)).snapshot.is_empty());
    assert_eq!(subtitle(&engine.tick_at(ms(1000)).snapshot), one("Hello"));
    assert_eq!(subtitle(&engine.tick_at(ms(2000)).snapshot), one("Hello"));
    assert_eq!(subtitle(&engine.tick_at(ms(2999)).snapshot), one("Hello"));
    assert!(engine.tick_at(ms(3000)).snapshot.is_empty());
}

// ── Clock discontinuities ────────────────────────────────────────

#[test]
fn seek_forward_resets_before_ingesting() {
    let mut queue = PacketQueue::new();
    queue.push(text(1000, "Before"));
    queue.push(text(9400, "After"));

    let mut engine = engine();
    engine.attach_source(queue);

    for at in [1000, 1050, 1100] {
        assert_eq!(subtitle(&engine.tick_at(ms(at)).snapshot), one("Before"));
    }

    let report = engine.tick_at(ms(9500));
    assert_eq!(
        report.observation,
        ClockObservation::Jump {
            from: ms(1100),
            to: ms(9500),
        }
    );
    assert_eq!(subtitle(&report.snapshot), one("After"));
    assert_eq!(engine.stats().resets, 1);
}

#[test]
fn seek_never_shows_pre_seek_overlays() {
    let mut queue = PacketQueue::new();
    queue.push(text(1000, "Before"));

    let mut engine = engine();
    engine.attach_source(queue);
    engine.tick_at(ms(1000));

    let report = engine.tick_at(ms(9500));
    assert!(report.observation.is_jump());
    assert!(report.snapshot.is_empty());

    for at in [9600, 9700, 9800] {
        assert!(engine.tick_at(ms(at)).snapshot.is_empty());
    }
}

#[test]
fn backwards_seek_resets() {
    let mut queue = PacketQueue::new();
    queue.push(text(5000, "Late"));

    let mut engine = engine();
    engine.attach_source(queue);
    assert_eq!(subtitle(&engine.tick_at(ms(5000)).snapshot), one("Late"));

    let report = engine.tick_at(ms(2000));
    assert!(report.observation.is_jump());
    assert!(report.snapshot.is_empty());
}

#[test]
fn jitter_is_a_no_op() {
    let mut queue = PacketQueue::new();
    queue.push(text(1000, "Steady"));

    let mut engine = engine();
    engine.attach_source(queue);
    let before = engine.tick_at(ms(2000)).snapshot;

    let report = engine.tick_at(ms(1980));
    assert_eq!(report.observation, ClockObservation::Regressed { by: ms(20) });
    assert!(!report.changed);
    assert!(Arc::ptr_eq(&before, &report.snapshot));
    assert_eq!(engine.stats().regressions, 1);
    assert_eq!(engine.stats().resets, 0);
}

#[test]
fn styled_fragment_is_dropped_after_seek() {
    let mut queue = PacketQueue::new();
    queue.push(dialogue(1000, "1,0,Default,,0,0,0,,Opening"));
    queue.push(dialogue(9450, "tail of the old caption"));

    let mut engine = engine();
    engine.attach_source(queue);
    assert_eq!(subtitle(&engine.tick_at(ms(1000)).snapshot), one("Opening"));

    let report = engine.tick_at(ms(9500));
    assert!(report.observation.is_jump());
    assert!(report.snapshot.get(SlotKind::Subtitle).is_none());
}

#[test]
fn file_source_repositions_on_jump() {
    let source = SubtitleFileSource::parse(
        "1\n00:00:01,000 --> 00:00:03,000\none\n\n\
         2\n00:00:05,000 --> 00:00:06,000\ntwo\n\n\
         3\n00:00:09,000 --> 00:00:12,000\nthree\n",
    )
    .unwrap();

    let mut engine = engine();
    engine.attach_source(source);
    assert_eq!(subtitle(&engine.tick_at(ms(1500)).snapshot), one("one"));

    let report = engine.tick_at(ms(5500));
    assert!(report.observation.is_jump());
    assert_eq!(subtitle(&report.snapshot), one("two"));
}

#[test]
fn explicit_seek() {
    let source = SubtitleFileSource::parse(
        "1\n00:00:01,000 --> 00:00:03,000\none\n\n\
         2\n00:00:09,000 --> 00:00:12,000\nthree\n",
    )
    .unwrap();

    let mut engine = engine();
    engine.attach_source(source);
    engine.tick_at(ms(1500));

    let snapshot = engine.seek(ms(10_000));
    assert!(snapshot.is_empty());
    assert_eq!(engine.stats().resets, 1);

    let report = engine.tick_at(ms(10_000));
    assert_eq!(report.observation, ClockObservation::Continue);
    assert_eq!(subtitle(&report.snapshot), one("three"));
}

// ── Publishing ───────────────────────────────────────────────────

#[test]
fn quiet_ticks_reuse_the_snapshot() {
    let mut queue = PacketQueue::new();
    queue.push(text(1000, "Hello"));

    let mut engine = engine();
    engine.attach_source(queue);

    let first = engine.tick_at(ms(1000));
    assert!(first.changed);
    assert_eq!(first.snapshot.version, 1);

    let second = engine.tick_at(ms(1040));
    assert!(!second.changed);
    assert!(Arc::ptr_eq(&first.snapshot, &second.snapshot));
    // The reused snapshot still records that it differed from version 0.
    assert!(second.snapshot.changed);
    assert_eq!(second.snapshot.version, first.snapshot.version);
}

#[test]
fn redraw_fires_only_on_change() {
    let counter = Arc::new(CountingRedraw::default());
    let options = EngineOptions::new().with_redraw(counter.clone());

    let mut queue = PacketQueue::new();
    queue.push(text(1000, "Blink").with_duration(ms(1000)));

    let mut engine = OverlayEngine::new(options).unwrap();
    engine.attach_source(queue);
    for at in [1000, 1100, 1500, 2000, 2100] {
        engine.tick_at(ms(at));
    }

    assert_eq!(counter.calls.load(Ordering::SeqCst), 2);
    assert_eq!(engine.stats().redraws, 2);
    assert_eq!(engine.stats().ticks, 5);
}

#[test]
fn versions_never_decrease() {
    let mut queue = PacketQueue::new();
    for (index, at) in (0..20u64).map(|i| (i, 500 + i * 300)) {
        queue.push(text(at, &format!("caption {index}")).with_duration(ms(200)));
    }

    let mut engine = engine();
    engine.attach_source(queue);

    let mut last_version = 0;
    for step in 0..80u64 {
        let report = engine.tick_at(ms(step * 100));
        let version = report.snapshot.version;
        assert!(version >= last_version);
        assert_eq!(report.changed, version != last_version);
        last_version = version;
    }
}

#[test]
fn tick_reads_presentation_clock() {
    let mut queue = PacketQueue::new();
    queue.push(text(1000, "Clocked"));

    let mut engine = engine();
    engine.attach_source(queue);

    let clock = ManualClock::new(ms(500));
    assert!(engine.tick(&clock).snapshot.is_empty());

    clock.advance(ms(500));
    let report = engine.tick(&clock);
    assert_eq!(report.time, ms(1000));
    assert_eq!(subtitle(&report.snapshot), one("Clocked"));
}

// ── Packet handling ──────────────────────────────────────────────

#[test]
fn bad_packets_are_dropped_and_counted() {
    let mut queue = PacketQueue::new();
    queue.push(RawPacket::new(ms(1000), b'm', vec![0x00]));
    queue.push(RawPacket::new(ms(1000), b'z', b"??".to_vec()));
    queue.push(text(1000, "Good"));

    let mut engine = engine();
    engine.attach_source(queue);

    let report = engine.tick_at(ms(1000));
    assert_eq!(report.packets, 3);
    assert_eq!(report.dropped, 2);
    assert_eq!(subtitle(&report.snapshot), one("Good"));

    let stats = engine.stats();
    assert_eq!(stats.malformed_packets, 1);
    assert_eq!(stats.unknown_packets, 1);
}

#[test]
fn huge_dialogue_timestamps_do_not_stop_playback() {
    let mut queue = PacketQueue::new();
    queue.push(dialogue(
        100,
        "Dialogue: 0,18446744073709551615:00:00.00,0:00:02.00,Default,,0,0,0,,Survives",
    ));

    let mut engine = engine();
    engine.attach_source(queue);

    let report = engine.tick_at(ms(200));
    assert_eq!(report.dropped, 0);
    assert_eq!(subtitle(&report.snapshot), one("Survives"));
}

#[test]
fn future_packets_stay_in_their_source() {
    let mut queue = PacketQueue::new();
    queue.push(text(1000, "now"));
    queue.push(text(4000, "later"));

    let mut engine = engine();
    engine.attach_source(queue);

    let report = engine.tick_at(ms(1000));
    assert_eq!(report.packets, 1);
    assert_eq!(engine.reconciler().deferred_len(), 0);
}

#[test]
fn subtitle_delay_shifts_display() {
    let options = EngineOptions::new().with_subtitle_delay_ms(500);
    let mut queue = PacketQueue::new();
    queue.push(text(1000, "Delayed").with_duration(ms(1000)));

    let mut engine = OverlayEngine::new(options).unwrap();
    engine.attach_source(queue);

    assert!(engine.tick_at(ms(1000)).snapshot.is_empty());
    assert!(engine.tick_at(ms(1400)).snapshot.is_empty());
    assert_eq!(subtitle(&engine.tick_at(ms(1500)).snapshot), one("Delayed"));
    assert_eq!(subtitle(&engine.tick_at(ms(2400)).snapshot), one("Delayed"));
    assert!(engine.tick_at(ms(2500)).snapshot.is_empty());
}

#[test]
fn negative_delay_shows_early() {
    let mut queue = PacketQueue::new();
    queue.push(text(2000, "Early"));

    let mut engine = engine();
    engine.set_subtitle_delay_ms(-500);
    engine.attach_source(queue);

    assert_eq!(subtitle(&engine.tick_at(ms(1500)).snapshot), one("Early"));
}

// ── Enable flags and sources ─────────────────────────────────────

#[test]
fn disabling_a_kind_clears_it_at_once() {
    let mut queue = PacketQueue::new();
    queue.push(text(1000, "Visible"));
    queue.push(text(1500, "Hidden"));
    queue.push(text(2500, "Back"));

    let mut engine = engine();
    engine.attach_source(queue);
    assert_eq!(subtitle(&engine.tick_at(ms(1000)).snapshot), one("Visible"));

    engine.set_kind_enabled(SourceKind::PlainText, false);
    assert!(engine.snapshot().is_empty());

    assert!(engine.tick_at(ms(1500)).snapshot.is_empty());
    assert_eq!(engine.stats().disabled_packets, 1);

    engine.set_kind_enabled(SourceKind::PlainText, true);
    assert_eq!(subtitle(&engine.tick_at(ms(2500)).snapshot), one("Back"));
}

#[test]
fn disabled_kind_rejects_external_events() {
    let options = EngineOptions::new().with_kind_enabled(SourceKind::Teletext, false);
    let mut engine = OverlayEngine::new(options).unwrap();

    let event = OverlayEvent::text(
        SourceKind::Teletext,
        ["page"],
        Duration::ZERO,
        EndTime::Unknown,
        SequenceId::new(1),
    );
    assert_eq!(engine.ingest_event(event), IngestOutcome::Stale);
}

#[test]
fn external_events_show_on_next_tick() {
    let mut engine = engine();
    engine.tick_at(ms(1000));

    let event = OverlayEvent::text(
        SourceKind::Teletext,
        ["external"],
        ms(500),
        EndTime::Unknown,
        SequenceId::new(1),
    );
    assert_eq!(engine.ingest_event(event), IngestOutcome::Activated);

    let report = engine.tick_at(ms(1100));
    assert_eq!(
        report.snapshot.lines(SlotKind::Teletext),
        Some(&["external".to_string()][..])
    );

    engine.set_teletext_page(0x777);
    assert!(engine.snapshot().get(SlotKind::Teletext).is_none());
}

#[test]
fn detaching_a_source_clears_its_slots() {
    let mut queue = PacketQueue::new();
    queue.push(text(1000, "Owned"));

    let mut engine = engine();
    let id = engine.attach_source(queue);
    assert_eq!(engine.source_count(), 1);
    engine.tick_at(ms(1000));

    assert!(engine.detach_source(id).is_some());
    assert_eq!(engine.source_count(), 0);
    assert!(engine.snapshot().is_empty());
    assert!(engine.detach_source(id).is_none());
}

#[test]
fn switching_tracks_shows_the_new_tracks_first_caption() {
    let mut old_track = PacketQueue::new();
    old_track.push(text(100, "old 1"));
    old_track.push(text(200, "old 2"));
    old_track.push(text(300, "old 3"));

    let mut engine = engine();
    let old_id = engine.attach_source(old_track);
    for at in [100, 200, 300] {
        engine.tick_at(ms(at));
    }
    assert_eq!(subtitle(&engine.snapshot()), one("old 3"));

    engine.detach_source(old_id);
    assert!(engine.snapshot().is_empty());

    let mut new_track = PacketQueue::new();
    new_track.push(text(500, "new track").with_duration(ms(400)));
    engine.attach_source(new_track);

    let report = engine.tick_at(ms(600));
    assert_eq!(subtitle(&report.snapshot), one("new track"));
}

#[test]
fn sequence_numbers_of_different_sources_are_not_compared() {
    let mut demuxed = PacketQueue::new();
    demuxed.push(text(100, "a1"));
    demuxed.push(text(200, "a2"));
    let external =
        SubtitleFileSource::parse("1\n00:00:00,300 --> 00:00:00,900\nfile cue\n").unwrap();

    let mut engine = engine();
    engine.attach_source(demuxed);
    engine.attach_source(external);

    assert_eq!(subtitle(&engine.tick_at(ms(100)).snapshot), one("a1"));
    assert_eq!(subtitle(&engine.tick_at(ms(200)).snapshot), one("a2"));
    engine.tick_at(ms(300));
    assert_eq!(subtitle(&engine.tick_at(ms(350)).snapshot), one("file cue"));
}

#[test]
fn other_sources_cannot_clear_or_detach_a_foreign_caption() {
    let mut demuxed = PacketQueue::new();
    demuxed.push(text(100, "demuxed"));
    demuxed.push(text(400, ""));
    let external =
        SubtitleFileSource::parse("1\n00:00:00,300 --> 00:00:00,900\nfile cue\n").unwrap();

    let mut engine = engine();
    let demuxed_id = engine.attach_source(demuxed);
    engine.attach_source(external);

    engine.tick_at(ms(100));
    assert_eq!(subtitle(&engine.tick_at(ms(300)).snapshot), one("file cue"));

    // The empty packet clears only what the demuxed track put up.
    assert_eq!(subtitle(&engine.tick_at(ms(450)).snapshot), one("file cue"));

    engine.detach_source(demuxed_id);
    assert_eq!(subtitle(&engine.snapshot()), one("file cue"));
    assert!(engine.tick_at(ms(900)).snapshot.is_empty());
}

#[test]
fn invalid_options_are_rejected() {
    let options = EngineOptions::new().with_jump_threshold(Duration::ZERO);
    assert!(matches!(
        OverlayEngine::new(options),
        Err(OverlayError::InvalidConfiguration(_))
    ));
}

// ── Bitmaps ──────────────────────────────────────────────────────

#[test]
fn subpicture_follows_its_commands() {
    let mut queue = PacketQueue::new();
    queue.push(RawPacket::new(ms(1000), b'v', SUBPICTURE_UNIT.to_vec()));

    let mut engine = engine();
    engine.attach_source(queue);

    let report = engine.tick_at(ms(1000));
    assert!(report.changed);
    assert!(report.snapshot.get(SlotKind::Bitmap).is_some());

    assert!(!engine.heartbeat(ms(2000)));
    assert!(engine.heartbeat(ms(3000)));
    assert!(engine.snapshot().get(SlotKind::Bitmap).is_none());
    // One heartbeat ran inside the tick.
    assert_eq!(engine.stats().heartbeats, 3);
}

#[test]
fn seek_hides_subpicture() {
    let mut queue = PacketQueue::new();
    queue.push(RawPacket::new(ms(1000), b'v', SUBPICTURE_UNIT.to_vec()));

    let mut engine = engine();
    engine.attach_source(queue);
    engine.tick_at(ms(1000));

    let snapshot = engine.seek(ms(60_000));
    assert!(snapshot.get(SlotKind::Bitmap).is_none());
    assert_eq!(engine.bitmaps().pending_len(), 0);
}

#[test]
fn split_subpicture_packets_assemble_across_ticks() {
    let mut queue = PacketQueue::new();
    queue.push(RawPacket::new(ms(1000), b'v', SUBPICTURE_UNIT[..16].to_vec()));
    queue.push(RawPacket::new(ms(1040), b'v', SUBPICTURE_UNIT[16..].to_vec()));

    let mut engine = engine();
    engine.attach_source(queue);

    assert!(engine.tick_at(ms(1000)).snapshot.is_empty());
    assert!(engine.tick_at(ms(1040)).snapshot.get(SlotKind::Bitmap).is_some());
}
