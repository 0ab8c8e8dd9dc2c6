//! Heartbeat-driven visibility of bitmap subpictures.
//!
//! DVD subpictures describe their visibility as a command stream rather
//! than a `[start, end)` interval. [`BitmapLifecycle`] keeps the pending
//! commands of submitted subpictures and applies them as heartbeats report
//! the display time.

use std::time::Duration;

use crate::event::RenderableOverlay;
use crate::subpicture::{Subpicture, SubpictureAction, SubpictureImage};

#[derive(Debug, Clone)]
struct Scheduled {
    at: Duration,
    /// Submission order; breaks ties between commands at the same time.
    order: u64,
    sequence_id: u64,
    action: SubpictureAction,
    image: SubpictureImage,
}

#[derive(Debug, Clone)]
struct Visible {
    sequence_id: u64,
    overlay: RenderableOverlay,
}

/// Applies subpicture show/hide/palette commands on heartbeat.
#[derive(Debug, Default)]
pub struct BitmapLifecycle {
    pending: Vec<Scheduled>,
    visible: Option<Visible>,
    changed: bool,
    forced_only: bool,
    next_order: u64,
}

impl BitmapLifecycle {
    /// Create an empty manager.
    pub fn new(forced_only: bool) -> Self {
        Self {
            forced_only,
            ..Self::default()
        }
    }

    /// Only accept subpictures flagged as forced.
    pub fn set_forced_only(&mut self, forced_only: bool) {
        self.forced_only = forced_only;
    }

    /// Schedule a subpicture's commands.
    ///
    /// Pending commands of older subpictures at or after the new
    /// subpicture's first command are dropped. Returns `false` if the
    /// subpicture was discarded because it is not forced.
    pub fn submit(&mut self, subpicture: Subpicture) -> bool {
        if self.forced_only && !subpicture.forced {
            log::trace!(
                "Discarding non-forced subpicture {}",
                subpicture.sequence_id
            );
            return false;
        }

        if let Some(first) = subpicture.commands.iter().map(|command| command.at).min() {
            let sequence_id = subpicture.sequence_id;
            self.pending
                .retain(|scheduled| scheduled.sequence_id >= sequence_id || scheduled.at < first);
        }

        for command in subpicture.commands {
            let scheduled = Scheduled {
                at: command.at,
                order: self.next_order,
                sequence_id: subpicture.sequence_id,
                action: command.action,
                image: subpicture.image.clone(),
            };
            self.next_order += 1;

            let position = self
                .pending
                .partition_point(|queued| (queued.at, queued.order) <= (scheduled.at, scheduled.order));
            self.pending.insert(position, scheduled);
        }

        true
    }

    /// Apply every pending command due at `now`.
    ///
    /// Returns whether the visible state changed during this call.
    pub fn heartbeat(&mut self, now: Duration) -> bool {
        let due = self.pending.partition_point(|scheduled| scheduled.at <= now);
        if due == 0 {
            return false;
        }

        let mut changed = false;
        for scheduled in self.pending.drain(..due) {
            changed |= apply(&mut self.visible, scheduled);
        }
        self.changed |= changed;
        changed
    }

    /// Whether the visible state changed since the last
    /// [`acknowledge`](Self::acknowledge).
    pub fn changed(&self) -> bool {
        self.changed
    }

    /// Lower the dirty flag after publishing.
    pub fn acknowledge(&mut self) {
        self.changed = false;
    }

    /// The bitmap currently shown.
    pub fn visible(&self) -> Option<&RenderableOverlay> {
        self.visible.as_ref().map(|visible| &visible.overlay)
    }

    /// Number of commands not yet applied.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Drop pending commands and hide the current bitmap.
    pub fn reset(&mut self) {
        self.pending.clear();
        if self.visible.take().is_some() {
            log::debug!("Hiding subpicture on reset");
            self.changed = true;
        }
    }
}

fn apply(visible: &mut Option<Visible>, scheduled: Scheduled) -> bool {
    match scheduled.action {
        SubpictureAction::Show => {
            log::trace!("Showing subpicture {} at {:?}", scheduled.sequence_id, scheduled.at);
            let image = scheduled.image;
            *visible = Some(Visible {
                sequence_id: scheduled.sequence_id,
                overlay: RenderableOverlay::Bitmap {
                    pixels: image.pixels,
                    palette: image.palette,
                    rect: image.rect,
                },
            });
            true
        }
        SubpictureAction::Hide => {
            if visible
                .as_ref()
                .is_some_and(|shown| shown.sequence_id == scheduled.sequence_id)
            {
                log::trace!("Hiding subpicture {} at {:?}", scheduled.sequence_id, scheduled.at);
                *visible = None;
                true
            } else {
                false
            }
        }
        SubpictureAction::SetPalette(entries) => match visible {
            Some(Visible {
                sequence_id,
                overlay: RenderableOverlay::Bitmap { palette, .. },
            }) if *sequence_id == scheduled.sequence_id && *palette != entries => {
                *palette = entries;
                true
            }
            _ => false,
        },
    }
}
