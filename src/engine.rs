//! The overlay engine: owner of every component and the two update entry
//! points, [`tick`](OverlayEngine::tick) and
//! [`heartbeat`](OverlayEngine::heartbeat).
//!
//! Within one tick the order is fixed:
//!
//! 1. clock observation (and a full reset on a jump),
//! 2. packet ingestion from every attached source,
//! 3. expiry evaluation,
//! 4. bitmap heartbeat,
//! 5. publish, and a redraw notification if the snapshot changed.

use std::collections::BTreeSet;
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::sync::Arc;
use std::time::Duration;

use crate::bitmap_lifecycle::BitmapLifecycle;
use crate::clock::{ClockCoordinator, ClockObservation, PresentationClock};
use crate::configuration::EngineOptions;
use crate::decoder::{Decoded, DecoderSet};
use crate::error::OverlayError;
use crate::event::{OverlayEvent, SourceKind};
use crate::packet::PacketSource;
use crate::publisher::{OsdPublisher, OsdSnapshot};
use crate::reconciler::{IngestOutcome, TimelineReconciler};
use crate::redraw::EngineStats;

/// Handle to an attached packet source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SourceId(u64);

/// What a tick did.
#[derive(Debug, Clone)]
pub struct TickReport {
    /// Presentation time passed to the tick.
    pub time: Duration,
    /// How the clock moved.
    pub observation: ClockObservation,
    /// Packets pulled from sources.
    pub packets: usize,
    /// Packets dropped as malformed or unknown.
    pub dropped: usize,
    /// Slot transitions made by the expiry pass.
    pub transitions: usize,
    /// Whether a new snapshot was published.
    pub changed: bool,
    /// The snapshot in effect after the tick.
    pub snapshot: Arc<OsdSnapshot>,
}

struct AttachedSource {
    id: SourceId,
    source: Box<dyn PacketSource>,
    decoders: DecoderSet,
    /// Kinds this source has produced; cleared when it is detached.
    fed: BTreeSet<SourceKind>,
}

#[derive(Default)]
struct Ingestion {
    packets: usize,
    dropped: usize,
}

/// Synchronizes overlay sources against the presentation clock.
///
/// # Example
///
/// ```
/// use std::time::Duration;
///
/// use overlaysync::{EngineOptions, OverlayEngine, PacketQueue, RawPacket, SlotKind};
///
/// let mut queue = PacketQueue::new();
/// queue.push(
///     RawPacket::new(Duration::from_secs(1), b't', b"Hello".to_vec())
///         .with_duration(Duration::from_secs(2)),
/// );
///
/// let mut engine = OverlayEngine::new(EngineOptions::default())?;
/// engine.attach_source(queue);
///
/// let report = engine.tick_at(Duration::from_millis(1500));
/// assert_eq!(
///     report.snapshot.lines(SlotKind::Subtitle),
///     Some(&["Hello".to_string()][..])
/// );
///
/// let report = engine.tick_at(Duration::from_millis(3000));
/// assert!(report.snapshot.is_empty());
/// # Ok::<(), overlaysync::OverlayError>(())
/// ```
pub struct OverlayEngine {
    options: EngineOptions,
    clock: ClockCoordinator,
    reconciler: TimelineReconciler,
    bitmaps: BitmapLifecycle,
    publisher: OsdPublisher,
    sources: Vec<AttachedSource>,
    next_source: u64,
    stats: EngineStats,
}

impl Debug for OverlayEngine {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("OverlayEngine")
            .field("options", &self.options)
            .field("clock", &self.clock)
            .field("reconciler", &self.reconciler)
            .field("bitmaps", &self.bitmaps)
            .field("sources", &self.sources.len())
            .field("stats", &self.stats)
            .finish()
    }
}

impl OverlayEngine {
    /// Create an engine.
    ///
    /// # Errors
    ///
    /// [`OverlayError::InvalidConfiguration`] if the options do not
    /// validate.
    pub fn new(options: EngineOptions) -> Result<Self, OverlayError> {
        options.validate()?;
        log::debug!("Creating overlay engine with {options:?}");

        Ok(Self {
            clock: ClockCoordinator::new(options.jump_threshold, options.jitter_tolerance),
            reconciler: TimelineReconciler::new(),
            bitmaps: BitmapLifecycle::new(options.forced_subpictures_only),
            publisher: OsdPublisher::new(),
            sources: Vec::new(),
            next_source: 0,
            stats: EngineStats::default(),
            options,
        })
    }

    /// Attach a packet source. It is polled on every tick.
    pub fn attach_source<S>(&mut self, source: S) -> SourceId
    where
        S: PacketSource + 'static,
    {
        let id = SourceId(self.next_source);
        self.next_source += 1;
        self.sources.push(AttachedSource {
            id,
            source: Box::new(source),
            decoders: DecoderSet::new(&self.options),
            fed: BTreeSet::new(),
        });
        log::debug!("Attached overlay source {id:?}");
        id
    }

    /// Detach a source and immediately clear every slot it still occupies.
    ///
    /// Its supersession history is forgotten, so a source attached later
    /// starts with a clean slate.
    pub fn detach_source(&mut self, id: SourceId) -> Option<Box<dyn PacketSource>> {
        let index = self.sources.iter().position(|attached| attached.id == id)?;
        let attached = self.sources.remove(index);

        let emptied = self.reconciler.forget_source(id);
        if attached.fed.contains(&SourceKind::Bitmap) {
            self.bitmaps.reset();
        }
        log::debug!(
            "Detached overlay source {id:?} (fed {:?}, emptied {emptied:?})",
            attached.fed
        );
        self.publish();

        Some(attached.source)
    }

    /// Enable or disable a source kind. Disabling clears its slot at once.
    pub fn set_kind_enabled(&mut self, kind: SourceKind, enabled: bool) {
        self.options.enabled[crate::configuration::kind_index(kind)] = enabled;
        if enabled {
            return;
        }

        self.reconciler.force_clear_kind(kind);
        if kind == SourceKind::Bitmap {
            self.bitmaps.reset();
        }
        for attached in &mut self.sources {
            attached.decoders.reset_kind(kind);
        }
        self.publish();
    }

    /// Change the subtitle delay. Takes effect on the next tick.
    pub fn set_subtitle_delay_ms(&mut self, delay_ms: i64) {
        self.options.subtitle_delay_ms = delay_ms;
    }

    /// Select a different teletext page, clearing the teletext slot.
    pub fn set_teletext_page(&mut self, page: u16) {
        self.options.teletext_page = page;
        for attached in &mut self.sources {
            attached.decoders.set_teletext_page(page);
        }
        self.reconciler.force_clear_kind(SourceKind::Teletext);
        self.publish();
    }

    /// Offer an event decoded outside the engine.
    ///
    /// It is reconciled against the last observed presentation time and
    /// shows up in the snapshot on the next tick.
    pub fn ingest_event(&mut self, event: OverlayEvent) -> IngestOutcome {
        if !self.options.is_kind_enabled(event.source_kind) {
            self.stats.disabled_packets += 1;
            return IngestOutcome::Stale;
        }
        let now = self.now();
        self.reconciler.ingest(event, now)
    }

    /// Run one reconciliation pass at the clock's current time.
    pub fn tick(&mut self, clock: &dyn PresentationClock) -> TickReport {
        self.tick_at(clock.current_presentation_time())
    }

    /// Run one reconciliation pass at presentation time `time`.
    pub fn tick_at(&mut self, time: Duration) -> TickReport {
        self.stats.ticks += 1;

        let observation = self.clock.observe(time);
        match observation {
            ClockObservation::Continue => {}
            ClockObservation::Regressed { by } => {
                log::trace!("Clock regressed by {by:?}, skipping tick");
                self.stats.regressions += 1;
                return TickReport {
                    time,
                    observation,
                    packets: 0,
                    dropped: 0,
                    transitions: 0,
                    changed: false,
                    snapshot: self.publisher.current(),
                };
            }
            ClockObservation::Jump { from, to } => {
                log::debug!("Clock jumped {from:?} -> {to:?}, resetting overlays");
                self.discontinuity(to);
            }
        }

        let now = self.options.delayed(time);
        let ingestion = self.ingest_packets(now);
        let transitions = self.reconciler.tick(now);
        self.stats.heartbeats += 1;
        self.bitmaps.heartbeat(now);
        let (snapshot, changed) = self.publish();

        TickReport {
            time,
            observation,
            packets: ingestion.packets,
            dropped: ingestion.dropped,
            transitions,
            changed,
            snapshot,
        }
    }

    /// Drive bitmap subpictures only. Returns whether a new snapshot was
    /// published.
    pub fn heartbeat(&mut self, time: Duration) -> bool {
        self.stats.heartbeats += 1;
        if !self.bitmaps.heartbeat(self.options.delayed(time)) {
            return false;
        }
        self.publish().1
    }

    /// Explicit discontinuity: reset everything and reposition sources.
    pub fn seek(&mut self, position: Duration) -> Arc<OsdSnapshot> {
        log::debug!("Seeking overlays to {position:?}");
        self.clock.rebase(position);
        self.discontinuity(position);
        self.publish().0
    }

    /// The last published snapshot.
    pub fn snapshot(&self) -> Arc<OsdSnapshot> {
        self.publisher.current()
    }

    /// Counters since creation.
    pub fn stats(&self) -> EngineStats {
        self.stats
    }

    /// The reconciler, for inspection.
    pub fn reconciler(&self) -> &TimelineReconciler {
        &self.reconciler
    }

    /// The bitmap lifecycle manager, for inspection.
    pub fn bitmaps(&self) -> &BitmapLifecycle {
        &self.bitmaps
    }

    /// The engine options.
    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Number of attached sources.
    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    fn now(&self) -> Duration {
        self.clock
            .previous()
            .map_or(Duration::ZERO, |time| self.options.delayed(time))
    }

    fn discontinuity(&mut self, position: Duration) {
        self.stats.resets += 1;
        self.reconciler.reset();
        self.bitmaps.reset();

        let target = self.options.delayed(position);
        for attached in &mut self.sources {
            attached.decoders.reset_assembly();
            attached.source.seek(target);
        }
    }

    fn ingest_packets(&mut self, now: Duration) -> Ingestion {
        let mut ingestion = Ingestion::default();

        for attached in &mut self.sources {
            while attached
                .source
                .peek_timestamp()
                .is_some_and(|timestamp| timestamp <= now)
            {
                let Some(packet) = attached.source.pull() else {
                    break;
                };
                ingestion.packets += 1;
                self.stats.packets += 1;

                let kind = match packet.kind() {
                    Ok(kind) => kind.source_kind(),
                    Err(error) => {
                        log::warn!("Ignoring packet at {:?}: {error}", packet.timestamp);
                        ingestion.dropped += 1;
                        self.stats.unknown_packets += 1;
                        continue;
                    }
                };

                if !self.options.is_kind_enabled(kind) {
                    log::trace!("Skipping disabled {kind} packet at {:?}", packet.timestamp);
                    self.stats.disabled_packets += 1;
                    continue;
                }

                let outputs = match attached.decoders.decode(&packet) {
                    Ok(outputs) => outputs,
                    Err(error) => {
                        log::warn!("Dropping {kind} packet at {:?}: {error}", packet.timestamp);
                        ingestion.dropped += 1;
                        self.stats.malformed_packets += 1;
                        continue;
                    }
                };

                for output in outputs {
                    attached.fed.insert(output.source_kind());
                    match output {
                        Decoded::Overlay(event) => {
                            self.reconciler.ingest_from(attached.id, event, now);
                        }
                        Decoded::Clear { kind, at } => {
                            log::trace!("Clear for {kind} at {at:?}");
                            self.reconciler.clear_from(attached.id, kind);
                        }
                        Decoded::Subpicture(subpicture) => {
                            self.bitmaps.submit(subpicture);
                        }
                    }
                }
            }
        }

        ingestion
    }

    fn publish(&mut self) -> (Arc<OsdSnapshot>, bool) {
        let previous = self.publisher.current().version;
        let snapshot = self
            .publisher
            .publish(&self.reconciler.active_set(), self.bitmaps.visible());
        self.bitmaps.acknowledge();

        let changed = snapshot.version != previous;
        if changed {
            self.stats.redraws += 1;
            self.options.redraw.on_redraw(&snapshot);
        }
        (snapshot, changed)
    }
}
