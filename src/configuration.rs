//! Engine configuration.
//!
//! [`EngineOptions`] is a builder that threads per-kind enable flags, clock
//! thresholds, decoder settings and the redraw callback through the engine
//! without polluting every function signature.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//!
//! use overlaysync::{EngineOptions, SourceKind, UnknownEndPolicy};
//!
//! let options = EngineOptions::new()
//!     .with_jump_threshold(Duration::from_secs(2))
//!     .with_subtitle_delay_ms(-250)
//!     .with_unknown_text_end(UnknownEndPolicy::Fixed(Duration::from_secs(3)))
//!     .with_kind_enabled(SourceKind::Teletext, false);
//! assert!(options.validate().is_ok());
//! ```

use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::sync::Arc;
use std::time::Duration;

use crate::error::OverlayError;
use crate::event::SourceKind;
use crate::redraw::{NoOpRedraw, RedrawCallback};

/// Default clock jump threshold: anything above one second is a seek.
pub const DEFAULT_JUMP_THRESHOLD: Duration = Duration::from_secs(1);

/// Default tolerance for backwards clock jitter.
pub const DEFAULT_JITTER_TOLERANCE: Duration = Duration::from_millis(50);

/// Default cap on the number of subtitle lines kept per event.
pub const DEFAULT_MAX_TEXT_LINES: usize = 12;

/// Default teletext page carrying subtitles.
pub const DEFAULT_TELETEXT_PAGE: u16 = 0x888;

/// Default 16-entry subpicture colour lookup table (`0xRRGGBB`).
///
/// Used when the host has no palette from an IFO or `.idx` file.
pub const DEFAULT_SUBPICTURE_PALETTE: [u32; 16] = [
    0x000000, 0xffffff, 0x808080, 0x000000, 0xff0000, 0x00ff00, 0x0000ff, 0xffff00,
    0xff00ff, 0x00ffff, 0xc0c0c0, 0x404040, 0x800000, 0x008000, 0x000080, 0xe0e0e0,
];

/// What to do with a plain-text caption whose end time is unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnknownEndPolicy {
    /// Keep it until a clear packet or a newer caption arrives.
    #[default]
    UntilCleared,
    /// Give it a fixed display duration.
    Fixed(Duration),
}

/// Configuration for an [`OverlayEngine`](crate::OverlayEngine).
///
/// All fields have sensible defaults: every source kind enabled, a one
/// second jump threshold, no subtitle delay.
#[derive(Clone)]
pub struct EngineOptions {
    /// Per-kind enable flags, indexed like [`SourceKind::ALL`].
    pub(crate) enabled: [bool; 4],
    /// Clock movement beyond this is a discontinuity.
    pub(crate) jump_threshold: Duration,
    /// Backwards movement up to this is tolerated jitter.
    pub(crate) jitter_tolerance: Duration,
    /// Subtitle delay in milliseconds; positive shows subtitles later.
    pub(crate) subtitle_delay_ms: i64,
    /// End-time policy for plain text without a duration.
    pub(crate) unknown_text_end: UnknownEndPolicy,
    /// Maximum number of lines kept per text event.
    pub(crate) max_text_lines: usize,
    /// Teletext page to decode (`0x100`..=`0x8ff`).
    pub(crate) teletext_page: u16,
    /// Subpicture colour lookup table.
    pub(crate) subpicture_palette: [u32; 16],
    /// Only show subpictures flagged as forced.
    pub(crate) forced_subpictures_only: bool,
    /// Redraw callback. Defaults to a no-op.
    pub(crate) redraw: Arc<dyn RedrawCallback>,
}

impl Debug for EngineOptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("EngineOptions")
            .field("enabled", &self.enabled)
            .field("jump_threshold", &self.jump_threshold)
            .field("jitter_tolerance", &self.jitter_tolerance)
            .field("subtitle_delay_ms", &self.subtitle_delay_ms)
            .field("unknown_text_end", &self.unknown_text_end)
            .field("max_text_lines", &self.max_text_lines)
            .field("teletext_page", &format_args!("{:03x}", self.teletext_page))
            .field("forced_subpictures_only", &self.forced_subpictures_only)
            .field("has_redraw", &true)
            .finish()
    }
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineOptions {
    /// Create a new configuration with default settings.
    pub fn new() -> Self {
        Self {
            enabled: [true; 4],
            jump_threshold: DEFAULT_JUMP_THRESHOLD,
            jitter_tolerance: DEFAULT_JITTER_TOLERANCE,
            subtitle_delay_ms: 0,
            unknown_text_end: UnknownEndPolicy::UntilCleared,
            max_text_lines: DEFAULT_MAX_TEXT_LINES,
            teletext_page: DEFAULT_TELETEXT_PAGE,
            subpicture_palette: DEFAULT_SUBPICTURE_PALETTE,
            forced_subpictures_only: false,
            redraw: Arc::new(NoOpRedraw),
        }
    }

    /// Enable or disable a source kind.
    #[must_use]
    pub fn with_kind_enabled(mut self, kind: SourceKind, enabled: bool) -> Self {
        self.enabled[kind_index(kind)] = enabled;
        self
    }

    /// Set the clock jump threshold.
    #[must_use]
    pub fn with_jump_threshold(mut self, threshold: Duration) -> Self {
        self.jump_threshold = threshold;
        self
    }

    /// Set the tolerated backwards jitter.
    #[must_use]
    pub fn with_jitter_tolerance(mut self, tolerance: Duration) -> Self {
        self.jitter_tolerance = tolerance;
        self
    }

    /// Delay subtitles by `delay_ms` milliseconds (negative shows them
    /// earlier).
    #[must_use]
    pub fn with_subtitle_delay_ms(mut self, delay_ms: i64) -> Self {
        self.subtitle_delay_ms = delay_ms;
        self
    }

    /// Choose how plain-text captions without a duration end.
    #[must_use]
    pub fn with_unknown_text_end(mut self, policy: UnknownEndPolicy) -> Self {
        self.unknown_text_end = policy;
        self
    }

    /// Cap the number of lines per text event. Clamped to a minimum of 1.
    #[must_use]
    pub fn with_max_text_lines(mut self, lines: usize) -> Self {
        self.max_text_lines = lines.max(1);
        self
    }

    /// Select the teletext page to decode, e.g. `0x888`.
    #[must_use]
    pub fn with_teletext_page(mut self, page: u16) -> Self {
        self.teletext_page = page;
        self
    }

    /// Set the subpicture colour lookup table (`0xRRGGBB` entries).
    #[must_use]
    pub fn with_subpicture_palette(mut self, palette: [u32; 16]) -> Self {
        self.subpicture_palette = palette;
        self
    }

    /// Only display subpictures flagged as forced.
    #[must_use]
    pub fn with_forced_subpictures_only(mut self, forced_only: bool) -> Self {
        self.forced_subpictures_only = forced_only;
        self
    }

    /// Attach a redraw callback.
    #[must_use]
    pub fn with_redraw(mut self, callback: Arc<dyn RedrawCallback>) -> Self {
        self.redraw = callback;
        self
    }

    /// Whether a source kind is enabled.
    pub fn is_kind_enabled(&self, kind: SourceKind) -> bool {
        self.enabled[kind_index(kind)]
    }

    /// The configured jump threshold.
    pub fn jump_threshold(&self) -> Duration {
        self.jump_threshold
    }

    /// The configured jitter tolerance.
    pub fn jitter_tolerance(&self) -> Duration {
        self.jitter_tolerance
    }

    /// The configured subtitle delay in milliseconds.
    pub fn subtitle_delay_ms(&self) -> i64 {
        self.subtitle_delay_ms
    }

    /// The selected teletext page.
    pub fn teletext_page(&self) -> u16 {
        self.teletext_page
    }

    /// Check the options for contradictions.
    ///
    /// # Errors
    ///
    /// [`OverlayError::InvalidConfiguration`] if the jump threshold is zero,
    /// the jitter tolerance is not below the jump threshold, or the
    /// teletext page is outside `0x100..=0x8ff`.
    pub fn validate(&self) -> Result<(), OverlayError> {
        if self.jump_threshold.is_zero() {
            return Err(OverlayError::InvalidConfiguration(
                "jump threshold must be greater than zero".to_string(),
            ));
        }
        if self.jitter_tolerance >= self.jump_threshold {
            return Err(OverlayError::InvalidConfiguration(format!(
                "jitter tolerance ({:?}) must be below the jump threshold ({:?})",
                self.jitter_tolerance, self.jump_threshold
            )));
        }
        if !(0x100..=0x8ff).contains(&self.teletext_page) {
            return Err(OverlayError::InvalidConfiguration(format!(
                "teletext page {:x} is out of range",
                self.teletext_page
            )));
        }
        Ok(())
    }

    /// Shift a presentation time by the subtitle delay.
    ///
    /// Saturates at zero.
    pub(crate) fn delayed(&self, now: Duration) -> Duration {
        let delay = Duration::from_millis(self.subtitle_delay_ms.unsigned_abs());
        if self.subtitle_delay_ms >= 0 {
            now.saturating_sub(delay)
        } else {
            now.saturating_add(delay)
        }
    }
}

pub(crate) fn kind_index(kind: SourceKind) -> usize {
    match kind {
        SourceKind::PlainText => 0,
        SourceKind::StyledText => 1,
        SourceKind::Bitmap => 2,
        SourceKind::Teletext => 3,
    }
}
