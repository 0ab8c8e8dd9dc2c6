//! Timeline reconciler state machine tests.

use std::time::Duration;

use overlaysync::{
    EndTime, IngestOutcome, OverlayEvent, SequenceId, SlotKind, SlotState, SourceKind,
    TimelineReconciler,
};

fn ms(value: u64) -> Duration {
    Duration::from_millis(value)
}

fn event(
    kind: SourceKind,
    caption: u64,
    start_ms: u64,
    end_ms: Option<u64>,
    text: &str,
) -> OverlayEvent {
    OverlayEvent::text(
        kind,
        [text],
        ms(start_ms),
        end_ms.map(ms).into(),
        SequenceId::new(caption),
    )
}

fn shown(reconciler: &TimelineReconciler, slot: SlotKind) -> Option<Vec<String>> {
    reconciler
        .active_set()
        .get(slot)
        .and_then(|event| event.payload.lines())
        .map(<[String]>::to_vec)
}

// ── Supersession ─────────────────────────────────────────────────

#[test]
fn newer_event_supersedes_active() {
    let mut reconciler = TimelineReconciler::new();

    let first = event(SourceKind::StyledText, 1, 1000, Some(3000), "A");
    assert_eq!(reconciler.ingest(first, ms(1000)), IngestOutcome::Activated);

    let second = event(SourceKind::StyledText, 2, 2500, Some(4000), "B");
    assert_eq!(reconciler.ingest(second, ms(2600)), IngestOutcome::Superseded);

    assert_eq!(shown(&reconciler, SlotKind::Subtitle), Some(vec!["B".to_string()]));
}

#[test]
fn older_event_arriving_late_is_stale() {
    let mut reconciler = TimelineReconciler::new();

    let newer = event(SourceKind::PlainText, 2, 1000, Some(5000), "newer");
    let older = event(SourceKind::PlainText, 1, 1000, Some(5000), "older");

    assert_eq!(reconciler.ingest(newer, ms(1000)), IngestOutcome::Activated);
    assert_eq!(reconciler.ingest(older, ms(1000)), IngestOutcome::Stale);
    assert_eq!(shown(&reconciler, SlotKind::Subtitle), Some(vec!["newer".to_string()]));
}

#[test]
fn duplicate_sequence_is_ignored() {
    let mut reconciler = TimelineReconciler::new();
    let original = event(SourceKind::PlainText, 7, 0, None, "once");

    assert_eq!(reconciler.ingest(original.clone(), ms(0)), IngestOutcome::Activated);
    assert_eq!(reconciler.ingest(original, ms(10)), IngestOutcome::Stale);
}

#[test]
fn highest_sequence_wins_in_any_arrival_order() {
    let orders: [[u64; 3]; 6] = [
        [1, 2, 3],
        [1, 3, 2],
        [2, 1, 3],
        [2, 3, 1],
        [3, 1, 2],
        [3, 2, 1],
    ];

    for order in orders {
        let mut reconciler = TimelineReconciler::new();
        for caption in order {
            let text = format!("caption {caption}");
            reconciler.ingest(
                event(SourceKind::Teletext, caption, 0, Some(10_000), &text),
                ms(100),
            );
        }
        assert_eq!(
            shown(&reconciler, SlotKind::Teletext),
            Some(vec!["caption 3".to_string()]),
            "arrival order {order:?}"
        );
    }
}

#[test]
fn recency_beats_longer_end_time() {
    let mut reconciler = TimelineReconciler::new();

    reconciler.ingest(event(SourceKind::PlainText, 1, 0, None, "open"), ms(0));
    reconciler.ingest(event(SourceKind::PlainText, 2, 500, Some(1000), "short"), ms(500));
    assert_eq!(shown(&reconciler, SlotKind::Subtitle), Some(vec!["short".to_string()]));

    reconciler.tick(ms(1000));
    assert!(reconciler.slot_state(SlotKind::Subtitle).is_empty());
}

// ── Expiry ───────────────────────────────────────────────────────

#[test]
fn event_expires_exactly_at_end_time() {
    let mut reconciler = TimelineReconciler::new();
    reconciler.ingest(event(SourceKind::PlainText, 1, 1000, Some(3000), "A"), ms(1000));

    reconciler.tick(ms(2999));
    assert!(reconciler.active_set().get(SlotKind::Subtitle).is_some());

    let transitions = reconciler.tick(ms(3000));
    assert_eq!(transitions, 1);
    assert_eq!(reconciler.slot_state(SlotKind::Subtitle), &SlotState::Empty);
}

#[test]
fn unknown_end_persists_until_cleared() {
    let mut reconciler = TimelineReconciler::new();
    reconciler.ingest(event(SourceKind::PlainText, 1, 1000, None, "persistent"), ms(1000));

    for second in 2..=4 {
        reconciler.tick(Duration::from_secs(second));
        assert!(reconciler.active_set().get(SlotKind::Subtitle).is_some());
    }

    assert!(reconciler.clear(SourceKind::PlainText));
    assert_eq!(reconciler.slot_state(SlotKind::Subtitle), &SlotState::PendingClear);
    assert!(reconciler.active_set().is_empty());

    reconciler.tick(ms(5000));
    assert_eq!(reconciler.slot_state(SlotKind::Subtitle), &SlotState::Empty);
}

#[test]
fn clear_from_other_kind_is_ignored() {
    let mut reconciler = TimelineReconciler::new();
    reconciler.ingest(event(SourceKind::StyledText, 1, 0, None, "styled"), ms(0));

    assert!(!reconciler.clear(SourceKind::PlainText));
    assert!(reconciler.active_set().get(SlotKind::Subtitle).is_some());
}

#[test]
fn expired_on_arrival_is_dropped() {
    let mut reconciler = TimelineReconciler::new();
    let late = event(SourceKind::PlainText, 1, 1000, Some(2000), "late");

    assert_eq!(reconciler.ingest(late, ms(2500)), IngestOutcome::Expired);
    assert!(reconciler.active_set().is_empty());
}

// ── Deferred events ──────────────────────────────────────────────

#[test]
fn future_event_waits_for_start() {
    let mut reconciler = TimelineReconciler::new();
    let future = event(SourceKind::PlainText, 1, 5000, Some(6000), "later");

    assert_eq!(reconciler.ingest(future, ms(1000)), IngestOutcome::Deferred);
    assert_eq!(reconciler.deferred_len(), 1);

    reconciler.tick(ms(4999));
    assert!(reconciler.active_set().is_empty());

    reconciler.tick(ms(5000));
    assert_eq!(shown(&reconciler, SlotKind::Subtitle), Some(vec!["later".to_string()]));
    assert_eq!(reconciler.deferred_len(), 0);
}

#[test]
fn deferred_older_event_does_not_replace_newer() {
    let mut reconciler = TimelineReconciler::new();
    reconciler.ingest(event(SourceKind::PlainText, 2, 5000, Some(9000), "older"), ms(1000));
    reconciler.ingest(event(SourceKind::PlainText, 3, 4000, Some(9000), "newer"), ms(1000));

    reconciler.tick(ms(4500));
    assert_eq!(shown(&reconciler, SlotKind::Subtitle), Some(vec!["newer".to_string()]));

    reconciler.tick(ms(5000));
    assert_eq!(shown(&reconciler, SlotKind::Subtitle), Some(vec!["newer".to_string()]));
}

// ── Mutual exclusion and merging ─────────────────────────────────

#[test]
fn styled_replaces_plain_in_subtitle_slot() {
    let mut reconciler = TimelineReconciler::new();
    reconciler.ingest(event(SourceKind::PlainText, 5, 0, None, "plain"), ms(0));

    let outcome = reconciler.ingest(event(SourceKind::StyledText, 1, 100, None, "styled"), ms(100));
    assert_eq!(outcome, IngestOutcome::Superseded);

    let active = reconciler.active_set();
    let shown_event = active.get(SlotKind::Subtitle).expect("subtitle slot empty");
    assert_eq!(shown_event.source_kind, SourceKind::StyledText);
    assert_eq!(active.len(), 1);
}

#[test]
fn continuation_is_merged_into_caption() {
    let mut reconciler = TimelineReconciler::new();
    reconciler.ingest(event(SourceKind::StyledText, 1, 1000, Some(2000), "first"), ms(1000));

    let fragment = OverlayEvent::text(
        SourceKind::StyledText,
        ["second"],
        ms(1100),
        EndTime::At(ms(2500)),
        SequenceId::fragment(1, 1),
    );
    assert_eq!(reconciler.ingest(fragment, ms(1100)), IngestOutcome::Merged);

    let merged = reconciler
        .active_set()
        .get(SlotKind::Subtitle)
        .expect("caption vanished")
        .clone();
    assert_eq!(merged.payload.lines(), Some(&["first".to_string(), "second".to_string()][..]));
    assert_eq!(merged.end_time, EndTime::At(ms(2500)));
    assert_eq!(merged.sequence_id, SequenceId::fragment(1, 1));
}

#[test]
fn orphan_continuation_is_dropped() {
    let mut reconciler = TimelineReconciler::new();
    reconciler.ingest(event(SourceKind::StyledText, 2, 0, None, "current"), ms(0));

    let orphan = OverlayEvent::text(
        SourceKind::StyledText,
        ["stray"],
        ms(10),
        EndTime::Unknown,
        SequenceId::fragment(1, 1),
    );
    assert_eq!(reconciler.ingest(orphan, ms(10)), IngestOutcome::Stale);
    assert_eq!(shown(&reconciler, SlotKind::Subtitle), Some(vec!["current".to_string()]));
}

// ── Reset and forced clears ──────────────────────────────────────

#[test]
fn reset_empties_everything() {
    let mut reconciler = TimelineReconciler::new();
    reconciler.ingest(event(SourceKind::PlainText, 4, 0, None, "text"), ms(0));
    reconciler.ingest(event(SourceKind::Teletext, 1, 0, None, "page"), ms(0));
    reconciler.ingest(event(SourceKind::PlainText, 5, 9000, None, "future"), ms(0));

    reconciler.reset();

    assert!(reconciler.active_set().is_empty());
    assert_eq!(reconciler.deferred_len(), 0);
    for slot in SlotKind::ALL {
        assert!(reconciler.slot_state(slot).is_empty());
    }

    // Sequence numbering may restart after a reset.
    let restarted = event(SourceKind::PlainText, 1, 0, None, "again");
    assert_eq!(reconciler.ingest(restarted, ms(0)), IngestOutcome::Activated);
}

#[test]
fn reset_never_redisplays_old_events() {
    let mut reconciler = TimelineReconciler::new();
    reconciler.ingest(event(SourceKind::PlainText, 1, 0, None, "before"), ms(0));
    reconciler.reset();

    for second in 0..5 {
        reconciler.tick(Duration::from_secs(second));
        assert!(reconciler.active_set().is_empty());
    }
}

#[test]
fn force_clear_kind_only_touches_that_kind() {
    let mut reconciler = TimelineReconciler::new();
    reconciler.ingest(event(SourceKind::StyledText, 1, 0, None, "styled"), ms(0));
    reconciler.ingest(event(SourceKind::Teletext, 1, 0, None, "page"), ms(0));

    reconciler.force_clear_kind(SourceKind::PlainText);
    assert_eq!(reconciler.active_set().len(), 2);

    reconciler.force_clear_kind(SourceKind::StyledText);
    assert!(reconciler.slot_state(SlotKind::Subtitle).is_empty());
    assert!(reconciler.active_set().get(SlotKind::Teletext).is_some());

    reconciler.force_clear(SlotKind::Teletext);
    assert!(reconciler.active_set().is_empty());
}

#[test]
fn forced_clear_forgets_sequence_history() {
    let mut reconciler = TimelineReconciler::new();
    reconciler.ingest(event(SourceKind::PlainText, 7, 0, None, "old track"), ms(0));
    reconciler.force_clear_kind(SourceKind::PlainText);

    let outcome = reconciler.ingest(event(SourceKind::PlainText, 1, 100, None, "new track"), ms(100));
    assert_eq!(outcome, IngestOutcome::Activated);
    assert_eq!(shown(&reconciler, SlotKind::Subtitle), Some(vec!["new track".to_string()]));

    reconciler.ingest(event(SourceKind::Teletext, 9, 100, None, "page 9"), ms(100));
    reconciler.force_clear(SlotKind::Teletext);
    let outcome = reconciler.ingest(event(SourceKind::Teletext, 1, 200, None, "page 1"), ms(200));
    assert_eq!(outcome, IngestOutcome::Activated);
}

#[test]
fn active_set_iterates_in_slot_order() {
    let mut reconciler = TimelineReconciler::new();
    reconciler.ingest(event(SourceKind::Teletext, 1, 0, None, "page"), ms(0));
    reconciler.ingest(event(SourceKind::PlainText, 1, 0, None, "text"), ms(0));

    let slots: Vec<SlotKind> = reconciler.active_set().iter().map(|(slot, _)| slot).collect();
    assert_eq!(slots, vec![SlotKind::Subtitle, SlotKind::Teletext]);
}
