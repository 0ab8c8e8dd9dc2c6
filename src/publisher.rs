//! Immutable render-ready snapshots of the OSD state.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::event::{RenderableOverlay, SlotKind};
use crate::reconciler::ActiveOverlaySet;

/// A published OSD state. Never mutated after publish.
///
/// A pass that changes nothing hands back the previous snapshot itself, so
/// consumers detect no-op passes by comparing `version` (or `Arc::ptr_eq`)
/// with the snapshot they last rendered; the engine reports the same thing
/// as [`TickReport::changed`](crate::TickReport::changed).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OsdSnapshot {
    /// Incremented on every real change.
    pub version: u64,
    /// Whether this snapshot differs from the one published before it.
    ///
    /// Fixed at publish time: it is `false` only for the initial empty
    /// snapshot and stays `true` when a later no-op pass returns this
    /// snapshot again. It does not say whether the latest pass changed
    /// anything.
    pub changed: bool,
    /// What each occupied slot shows.
    pub active: BTreeMap<SlotKind, RenderableOverlay>,
}

impl OsdSnapshot {
    /// The overlay in `slot`.
    pub fn get(&self, slot: SlotKind) -> Option<&RenderableOverlay> {
        self.active.get(&slot)
    }

    /// The text lines shown in `slot`, if it holds text.
    pub fn lines(&self, slot: SlotKind) -> Option<&[String]> {
        self.get(slot).and_then(RenderableOverlay::lines)
    }

    /// Whether nothing is shown.
    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }
}

/// Diffs the active overlay set against the last snapshot.
#[derive(Debug, Default)]
pub struct OsdPublisher {
    last: Arc<OsdSnapshot>,
    changes: u64,
}

impl OsdPublisher {
    /// Create a publisher holding an empty version-0 snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish the current state.
    ///
    /// `bitmap`, when present, takes the bitmap slot in place of whatever
    /// the reconciler holds there. If nothing differs from the previous
    /// snapshot, that same `Arc` is returned.
    pub fn publish(
        &mut self,
        active: &ActiveOverlaySet<'_>,
        bitmap: Option<&RenderableOverlay>,
    ) -> Arc<OsdSnapshot> {
        let mut current: Vec<(SlotKind, &RenderableOverlay)> = active
            .iter()
            .map(|(slot, event)| (slot, &event.payload))
            .collect();
        if let Some(bitmap) = bitmap {
            current.retain(|(slot, _)| *slot != SlotKind::Bitmap);
            current.push((SlotKind::Bitmap, bitmap));
            current.sort_by_key(|(slot, _)| *slot);
        }

        let unchanged = current.len() == self.last.active.len()
            && current
                .iter()
                .zip(&self.last.active)
                .all(|((slot, overlay), (last_slot, last_overlay))| {
                    slot == last_slot && overlay.same_as(last_overlay)
                });
        if unchanged {
            return Arc::clone(&self.last);
        }

        self.changes += 1;
        let snapshot = Arc::new(OsdSnapshot {
            version: self.last.version + 1,
            changed: true,
            active: current
                .into_iter()
                .map(|(slot, overlay)| (slot, overlay.clone()))
                .collect(),
        });
        log::debug!(
            "Published OSD version {} ({} slots)",
            snapshot.version,
            snapshot.active.len()
        );
        self.last = Arc::clone(&snapshot);
        snapshot
    }

    /// The last published snapshot.
    pub fn current(&self) -> Arc<OsdSnapshot> {
        Arc::clone(&self.last)
    }

    /// Number of real changes published.
    pub fn changes(&self) -> u64 {
        self.changes
    }
}
