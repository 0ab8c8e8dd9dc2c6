//! Presentation clock tracking and discontinuity detection.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::configuration::{DEFAULT_JITTER_TOLERANCE, DEFAULT_JUMP_THRESHOLD};

/// Source of the current video presentation time.
pub trait PresentationClock {
    /// The presentation time of the frame about to be shown.
    fn current_presentation_time(&self) -> Duration;
}

impl<F> PresentationClock for F
where
    F: Fn() -> Duration,
{
    fn current_presentation_time(&self) -> Duration {
        self()
    }
}

/// A clock set by hand. Useful for hosts that already know the frame time
/// and for tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    nanos: AtomicU64,
}

impl ManualClock {
    /// Create a clock at `position`.
    pub fn new(position: Duration) -> Self {
        let clock = Self::default();
        clock.set(position);
        clock
    }

    /// Move the clock to `position`. Positions past `u64::MAX`
    /// nanoseconds are clamped.
    pub fn set(&self, position: Duration) {
        self.nanos.store(saturating_nanos(position), Ordering::Relaxed);
    }

    /// Move the clock forward by `delta`, saturating at the maximum.
    pub fn advance(&self, delta: Duration) {
        let delta = saturating_nanos(delta);
        // The closure always returns `Some`, so the update cannot fail.
        let _ = self
            .nanos
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |nanos| {
                Some(nanos.saturating_add(delta))
            });
    }
}

impl PresentationClock for ManualClock {
    fn current_presentation_time(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::Relaxed))
    }
}

/// Result of observing a new clock position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockObservation {
    /// Normal forward progress (or the first observation).
    Continue,
    /// The clock moved backwards within the jitter tolerance. The tick is a
    /// no-op and the previous position is kept.
    Regressed {
        /// How far back the clock moved.
        by: Duration,
    },
    /// A discontinuity (seek, loop, stream switch).
    Jump {
        /// Previous position.
        from: Duration,
        /// New position.
        to: Duration,
    },
}

impl ClockObservation {
    /// Whether this observation requires a full reset.
    pub fn is_jump(&self) -> bool {
        matches!(self, ClockObservation::Jump { .. })
    }
}

/// Detects clock discontinuities.
///
/// Any movement larger than the jump threshold is a jump. Backwards
/// movement within the jitter tolerance is ignored; larger backwards
/// movement is a jump, since overlays already shown cannot be un-shown
/// correctly by expiry alone.
#[derive(Debug, Clone)]
pub struct ClockCoordinator {
    previous: Option<Duration>,
    jump_threshold: Duration,
    jitter_tolerance: Duration,
}

impl Default for ClockCoordinator {
    fn default() -> Self {
        Self::new(DEFAULT_JUMP_THRESHOLD, DEFAULT_JITTER_TOLERANCE)
    }
}

impl ClockCoordinator {
    /// Create a coordinator with the given thresholds.
    pub fn new(jump_threshold: Duration, jitter_tolerance: Duration) -> Self {
        Self {
            previous: None,
            jump_threshold,
            jitter_tolerance,
        }
    }

    /// Classify the move to `now` and remember it.
    pub fn observe(&mut self, now: Duration) -> ClockObservation {
        let Some(previous) = self.previous else {
            self.previous = Some(now);
            return ClockObservation::Continue;
        };

        if now >= previous {
            self.previous = Some(now);
            if now - previous > self.jump_threshold {
                return ClockObservation::Jump {
                    from: previous,
                    to: now,
                };
            }
            return ClockObservation::Continue;
        }

        let back = previous - now;
        if back <= self.jitter_tolerance {
            return ClockObservation::Regressed { by: back };
        }

        self.previous = Some(now);
        ClockObservation::Jump {
            from: previous,
            to: now,
        }
    }

    /// Set the last observed position without classifying it, e.g. after
    /// an explicit seek.
    pub fn rebase(&mut self, position: Duration) {
        self.previous = Some(position);
    }

    /// Forget the last position; the next observation is `Continue`.
    pub fn forget(&mut self) {
        self.previous = None;
    }

    /// The last accepted position.
    pub fn previous(&self) -> Option<Duration> {
        self.previous
    }

    /// The jump threshold.
    pub fn jump_threshold(&self) -> Duration {
        self.jump_threshold
    }
}

fn saturating_nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}
