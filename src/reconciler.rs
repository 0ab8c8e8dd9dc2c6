//! The timeline reconciler: which overlay each slot shows right now.
//!
//! Each [`SlotKind`] is a small state machine:
//!
//! ```text
//!            ingest (newer)            tick (end passed)
//!   Empty ─────────────────▶ Active ─────────────────────▶ Empty
//!                             │  ▲
//!                       clear │  │ ingest (newer)
//!                             ▼  │
//!                         PendingClear ── tick ──▶ Empty
//! ```
//!
//! Supersession is decided per source and kind with a high-water mark of
//! the largest [`SequenceId`] seen, so the newest event wins no matter in
//! which order events arrive. Sequence ids of different sources are never
//! compared: an event from another source simply takes the slot. Events
//! that start in the future wait in a deferred queue until a tick reaches
//! their start time.

use std::collections::BTreeMap;
use std::time::Duration;

use crate::engine::SourceId;
use crate::event::{OverlayEvent, SequenceId, SlotKind, SourceKind};

/// Where an event came from. `None` for events handed in directly.
type Origin = Option<SourceId>;

/// State of one display slot.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SlotState {
    /// Nothing to show.
    #[default]
    Empty,
    /// Showing an event.
    Active(OverlayEvent),
    /// Cleared; becomes `Empty` on the next tick.
    PendingClear,
}

impl SlotState {
    /// The active event, if any.
    pub fn event(&self) -> Option<&OverlayEvent> {
        match self {
            SlotState::Active(event) => Some(event),
            SlotState::Empty | SlotState::PendingClear => None,
        }
    }

    /// Whether the slot is `Empty`.
    pub fn is_empty(&self) -> bool {
        matches!(self, SlotState::Empty)
    }
}

/// What happened to an ingested event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// The event now occupies an empty slot.
    Activated,
    /// The event replaced an older one.
    Superseded,
    /// The event was a continuation and was appended to the active caption.
    Merged,
    /// The event starts later and waits for its start time.
    Deferred,
    /// A newer event of the same kind from the same source was already
    /// seen; ignored.
    Stale,
    /// The event had already ended; ignored.
    Expired,
}

/// Read-only view of the active overlays, one per occupied slot.
#[derive(Debug, Clone, Copy)]
pub struct ActiveOverlaySet<'a> {
    slots: &'a [SlotState; 3],
}

impl<'a> ActiveOverlaySet<'a> {
    /// The event shown in `slot`.
    pub fn get(&self, slot: SlotKind) -> Option<&'a OverlayEvent> {
        self.slots[slot.index()].event()
    }

    /// Iterate over occupied slots in rendering order.
    pub fn iter(&self) -> impl Iterator<Item = (SlotKind, &'a OverlayEvent)> + 'a {
        let slots = self.slots;
        SlotKind::ALL
            .into_iter()
            .filter_map(move |slot| slots[slot.index()].event().map(|event| (slot, event)))
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// Whether no slot shows anything.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug)]
struct Deferred {
    origin: Origin,
    event: OverlayEvent,
}

/// Owns the active overlay set and applies the slot transition rules.
#[derive(Debug, Default)]
pub struct TimelineReconciler {
    slots: [SlotState; 3],
    /// Source of the event in each slot.
    owners: [Origin; 3],
    /// Future events ordered by `(start_time, sequence_id)`.
    deferred: Vec<Deferred>,
    /// Largest sequence id activated per source and kind.
    high_water: BTreeMap<(Origin, SourceKind), SequenceId>,
}

impl TimelineReconciler {
    /// Create a reconciler with every slot empty.
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer a new event at presentation time `now`.
    ///
    /// The event is ordered against other directly ingested events only.
    pub fn ingest(&mut self, event: OverlayEvent, now: Duration) -> IngestOutcome {
        self.ingest_inner(None, event, now)
    }

    /// Offer an event decoded from the attached source `source`.
    pub fn ingest_from(
        &mut self,
        source: SourceId,
        event: OverlayEvent,
        now: Duration,
    ) -> IngestOutcome {
        self.ingest_inner(Some(source), event, now)
    }

    fn ingest_inner(
        &mut self,
        origin: Origin,
        event: OverlayEvent,
        now: Duration,
    ) -> IngestOutcome {
        if event.end_time.has_passed(now) {
            log::trace!(
                "Dropping expired {} event {} (now {now:?})",
                event.source_kind,
                event.sequence_id
            );
            return IngestOutcome::Expired;
        }

        if event.sequence_id.is_continuation() {
            return self.merge(origin, event);
        }

        if self.is_stale(origin, &event) {
            log::trace!(
                "Ignoring stale {} event {}",
                event.source_kind,
                event.sequence_id
            );
            return IngestOutcome::Stale;
        }

        if event.start_time > now {
            let position = self.deferred.partition_point(|queued| {
                (queued.event.start_time, queued.event.sequence_id)
                    <= (event.start_time, event.sequence_id)
            });
            log::trace!(
                "Deferring {} event {} until {:?}",
                event.source_kind,
                event.sequence_id,
                event.start_time
            );
            self.deferred.insert(position, Deferred { origin, event });
            return IngestOutcome::Deferred;
        }

        self.activate(origin, event)
    }

    /// Explicit end-of-caption signal for `kind`.
    ///
    /// Moves the slot to `PendingClear` if it shows an event of that kind,
    /// whichever source produced it.
    pub fn clear(&mut self, kind: SourceKind) -> bool {
        self.clear_inner(None, kind)
    }

    /// End-of-caption signal from the decoders of `source`. Only clears an
    /// event that source produced.
    pub fn clear_from(&mut self, source: SourceId, kind: SourceKind) -> bool {
        self.clear_inner(Some(source), kind)
    }

    fn clear_inner(&mut self, from: Option<SourceId>, kind: SourceKind) -> bool {
        let index = kind.slot().index();
        if from.is_some() && self.owners[index] != from {
            return false;
        }
        let slot = &mut self.slots[index];
        match slot {
            SlotState::Active(event) if event.source_kind == kind => {
                log::debug!("Clearing {} slot ({kind})", kind.slot());
                *slot = SlotState::PendingClear;
                true
            }
            _ => false,
        }
    }

    /// Empty `slot` immediately, drop its deferred events and forget the
    /// high-water marks of the kinds it holds.
    pub fn force_clear(&mut self, slot: SlotKind) {
        self.empty_slot(slot);
        self.deferred.retain(|queued| queued.event.slot() != slot);
        self.high_water.retain(|(_, kind), _| kind.slot() != slot);
    }

    /// Empty the slot if it shows an event of `kind`, drop deferred events
    /// of that kind and forget its high-water marks.
    pub fn force_clear_kind(&mut self, kind: SourceKind) {
        let slot = kind.slot();
        if self.slots[slot.index()]
            .event()
            .is_some_and(|event| event.source_kind == kind)
        {
            self.empty_slot(slot);
        }
        self.deferred.retain(|queued| queued.event.source_kind != kind);
        self.high_water.retain(|(_, marked), _| *marked != kind);
    }

    /// Drop everything `source` contributed: the slots it still occupies,
    /// its deferred events and its high-water marks.
    ///
    /// Returns the slots that were emptied.
    pub fn forget_source(&mut self, source: SourceId) -> Vec<SlotKind> {
        let origin = Some(source);
        let mut emptied = Vec::new();
        for slot in SlotKind::ALL {
            if self.owners[slot.index()] == origin && !self.slots[slot.index()].is_empty() {
                self.empty_slot(slot);
                emptied.push(slot);
            }
        }
        self.deferred.retain(|queued| queued.origin != origin);
        self.high_water.retain(|(marked, _), _| *marked != origin);
        emptied
    }

    /// Advance to `now`: activate due deferred events, then expire.
    ///
    /// Returns the number of slot transitions.
    pub fn tick(&mut self, now: Duration) -> usize {
        let mut transitions = 0;

        let due = self
            .deferred
            .partition_point(|queued| queued.event.start_time <= now);
        for Deferred { origin, event } in self.deferred.drain(..due).collect::<Vec<_>>() {
            if event.end_time.has_passed(now) {
                continue;
            }
            if self.is_stale(origin, &event) {
                continue;
            }
            if matches!(
                self.activate(origin, event),
                IngestOutcome::Activated | IngestOutcome::Superseded
            ) {
                transitions += 1;
            }
        }

        for slot in SlotKind::ALL {
            let state = &mut self.slots[slot.index()];
            let expired = match state {
                SlotState::Active(event) => event.end_time.has_passed(now),
                SlotState::PendingClear => true,
                SlotState::Empty => false,
            };
            if expired {
                log::trace!("{slot} slot empty at {now:?}");
                *state = SlotState::Empty;
                self.owners[slot.index()] = None;
                transitions += 1;
            }
        }

        transitions
    }

    /// Forget everything: every slot empty, no deferred events, no
    /// high-water marks.
    pub fn reset(&mut self) {
        log::debug!("Resetting timeline ({} deferred events dropped)", self.deferred.len());
        self.slots = Default::default();
        self.owners = Default::default();
        self.deferred.clear();
        self.high_water.clear();
    }

    /// The active overlay set.
    pub fn active_set(&self) -> ActiveOverlaySet<'_> {
        ActiveOverlaySet { slots: &self.slots }
    }

    /// The state of one slot.
    pub fn slot_state(&self, slot: SlotKind) -> &SlotState {
        &self.slots[slot.index()]
    }

    /// Number of events waiting for their start time.
    pub fn deferred_len(&self) -> usize {
        self.deferred.len()
    }

    fn empty_slot(&mut self, slot: SlotKind) {
        self.slots[slot.index()] = SlotState::Empty;
        self.owners[slot.index()] = None;
    }

    fn is_stale(&self, origin: Origin, event: &OverlayEvent) -> bool {
        self.high_water
            .get(&(origin, event.source_kind))
            .is_some_and(|newest| *newest >= event.sequence_id)
    }

    fn activate(&mut self, origin: Origin, event: OverlayEvent) -> IngestOutcome {
        self.high_water
            .insert((origin, event.source_kind), event.sequence_id);

        let slot = event.slot();
        self.owners[slot.index()] = origin;
        let state = &mut self.slots[slot.index()];
        let outcome = match state {
            SlotState::Active(old) => {
                if old.source_kind != event.source_kind {
                    log::debug!(
                        "{slot} slot switches from {} to {}",
                        old.source_kind,
                        event.source_kind
                    );
                }
                IngestOutcome::Superseded
            }
            SlotState::Empty | SlotState::PendingClear => IngestOutcome::Activated,
        };

        log::trace!(
            "{slot} slot shows {} event {} from {:?}",
            event.source_kind,
            event.sequence_id,
            event.start_time
        );
        *state = SlotState::Active(event);
        outcome
    }

    fn merge(&mut self, origin: Origin, fragment: OverlayEvent) -> IngestOutcome {
        let index = fragment.slot().index();
        let same_origin = self.owners[index] == origin;
        let state = &mut self.slots[index];
        match state {
            SlotState::Active(event)
                if same_origin
                    && event.source_kind == fragment.source_kind
                    && event.sequence_id.caption == fragment.sequence_id.caption
                    && event.sequence_id < fragment.sequence_id =>
            {
                self.high_water
                    .insert((origin, fragment.source_kind), fragment.sequence_id);
                event.absorb(fragment);
                IngestOutcome::Merged
            }
            _ => {
                log::debug!(
                    "Dropping orphan {} fragment {}",
                    fragment.source_kind,
                    fragment.sequence_id
                );
                IngestOutcome::Stale
            }
        }
    }
}
