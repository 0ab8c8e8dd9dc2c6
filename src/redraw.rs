//! Redraw notifications and engine counters.
//!
//! This module provides [`RedrawCallback`], the hook through which the
//! engine asks the renderer to draw a new [`OsdSnapshot`], and
//! [`EngineStats`], a running tally of what the engine has done.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use overlaysync::{EngineOptions, OsdSnapshot, RedrawCallback};
//!
//! struct PrintRedraw;
//!
//! impl RedrawCallback for PrintRedraw {
//!     fn on_redraw(&self, snapshot: &OsdSnapshot) {
//!         println!("OSD v{}: {} overlay(s)", snapshot.version, snapshot.active.len());
//!     }
//! }
//!
//! let options = EngineOptions::new().with_redraw(Arc::new(PrintRedraw));
//! ```

use crate::publisher::OsdSnapshot;

/// Trait for receiving redraw requests.
///
/// Implementations must be [`Send`] and [`Sync`] so a renderer living on
/// another thread can be handed the callback.
///
/// The callback fires only when the published snapshot actually changed,
/// never for no-op ticks.
pub trait RedrawCallback: Send + Sync {
    /// Called with the newly published snapshot.
    fn on_redraw(&self, snapshot: &OsdSnapshot);
}

/// A no-op implementation that discards all redraw requests.
///
/// This is the default when no callback is configured.
pub(crate) struct NoOpRedraw;

impl RedrawCallback for NoOpRedraw {
    fn on_redraw(&self, _snapshot: &OsdSnapshot) {}
}

/// Counters describing the engine's activity since construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// Reconciliation ticks processed.
    pub ticks: u64,
    /// Bitmap heartbeats processed (including those run by ticks).
    pub heartbeats: u64,
    /// Packets pulled from attached sources.
    pub packets: u64,
    /// Packets dropped as malformed.
    pub malformed_packets: u64,
    /// Packets ignored because of an unknown type tag.
    pub unknown_packets: u64,
    /// Packets or events ignored because their kind is disabled.
    pub disabled_packets: u64,
    /// Full resets caused by clock jumps or explicit seeks.
    pub resets: u64,
    /// Ticks skipped because the clock moved backwards within jitter.
    pub regressions: u64,
    /// Snapshots that differed from their predecessor.
    pub redraws: u64,
}
