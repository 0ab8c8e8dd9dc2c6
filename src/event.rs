//! Overlay events and the renderable payloads they carry.
//!
//! An [`OverlayEvent`] is a single timed caption, styled subtitle line,
//! bitmap subpicture or teletext page, produced by one of the source-type
//! decoders and consumed by the [`TimelineReconciler`](crate::TimelineReconciler).

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::sync::Arc;
use std::time::Duration;

use image::{Rgba, RgbaImage};

/// The kind of source an overlay event came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SourceKind {
    /// Plain-text subtitles (SubRip, MOV text, external files).
    PlainText,
    /// Styled script subtitles (ASS/SSA).
    StyledText,
    /// Bitmap subpictures (DVD/VOBSUB).
    Bitmap,
    /// Broadcast teletext pages.
    Teletext,
}

impl SourceKind {
    /// Every source kind, in slot order.
    pub const ALL: [SourceKind; 4] = [
        SourceKind::PlainText,
        SourceKind::StyledText,
        SourceKind::Bitmap,
        SourceKind::Teletext,
    ];

    /// The display slot this kind occupies.
    ///
    /// Plain and styled text are alternate representations of the same
    /// subtitle track and therefore share [`SlotKind::Subtitle`].
    pub fn slot(self) -> SlotKind {
        match self {
            SourceKind::PlainText | SourceKind::StyledText => SlotKind::Subtitle,
            SourceKind::Bitmap => SlotKind::Bitmap,
            SourceKind::Teletext => SlotKind::Teletext,
        }
    }
}

impl Display for SourceKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            SourceKind::PlainText => write!(f, "plain text"),
            SourceKind::StyledText => write!(f, "styled text"),
            SourceKind::Bitmap => write!(f, "bitmap"),
            SourceKind::Teletext => write!(f, "teletext"),
        }
    }
}

/// A display channel on the OSD. Each slot shows at most one overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SlotKind {
    /// The subtitle track (plain or styled text).
    Subtitle,
    /// Bitmap subpictures.
    Bitmap,
    /// Teletext pages.
    Teletext,
}

impl SlotKind {
    /// Every slot, in rendering order.
    pub const ALL: [SlotKind; 3] = [SlotKind::Subtitle, SlotKind::Bitmap, SlotKind::Teletext];

    pub(crate) fn index(self) -> usize {
        match self {
            SlotKind::Subtitle => 0,
            SlotKind::Bitmap => 1,
            SlotKind::Teletext => 2,
        }
    }
}

impl Display for SlotKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            SlotKind::Subtitle => write!(f, "subtitle"),
            SlotKind::Bitmap => write!(f, "bitmap"),
            SlotKind::Teletext => write!(f, "teletext"),
        }
    }
}

/// Ordering key for events of one source.
///
/// `caption` increases with every new caption a decoder produces.
/// `fragment` numbers the continuation packets of a single styled caption
/// and is zero for a fresh caption. Comparison is lexicographic, so a later
/// fragment of the same caption is newer than its predecessor but older
/// than the next caption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SequenceId {
    /// Per-source caption counter.
    pub caption: u64,
    /// Continuation index within the caption.
    pub fragment: u32,
}

impl SequenceId {
    /// A fresh caption with no continuation.
    pub fn new(caption: u64) -> Self {
        Self {
            caption,
            fragment: 0,
        }
    }

    /// The `fragment`-th continuation of `caption`.
    pub fn fragment(caption: u64, fragment: u32) -> Self {
        Self { caption, fragment }
    }

    /// Whether this identifies a continuation packet.
    pub fn is_continuation(&self) -> bool {
        self.fragment > 0
    }
}

impl Display for SequenceId {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        if self.fragment == 0 {
            write!(f, "#{}", self.caption)
        } else {
            write!(f, "#{}.{}", self.caption, self.fragment)
        }
    }
}

/// When an event stops being valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndTime {
    /// Valid until this presentation time (exclusive).
    At(Duration),
    /// Valid until explicitly cleared or superseded.
    Unknown,
}

impl EndTime {
    /// The concrete end time, if known.
    pub fn concrete(self) -> Option<Duration> {
        match self {
            EndTime::At(end) => Some(end),
            EndTime::Unknown => None,
        }
    }

    /// `true` once `now` has reached a concrete end time.
    pub fn has_passed(self, now: Duration) -> bool {
        matches!(self, EndTime::At(end) if now >= end)
    }
}

impl From<Option<Duration>> for EndTime {
    fn from(value: Option<Duration>) -> Self {
        value.map_or(EndTime::Unknown, EndTime::At)
    }
}

/// Rendering hints carried alongside subtitle text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StyleHints {
    /// Named style (ASS `Style` field).
    pub style: Option<String>,
    /// Stacking layer; higher layers draw on top.
    pub layer: i32,
    /// Numpad-style alignment (`\an1`..`\an9`), if overridden.
    pub alignment: Option<u8>,
    /// Whether the text was marked italic.
    pub italic: bool,
    /// Whether the text was marked bold.
    pub bold: bool,
    /// Left, right and vertical margins in script pixels.
    pub margins: Option<(u32, u32, u32)>,
}

/// Position and size of a bitmap overlay on the video frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OverlayRect {
    /// Left edge.
    pub x: u32,
    /// Top edge.
    pub y: u32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

/// An RGBA colour.
pub type PaletteEntry = [u8; 4];

/// A render-ready overlay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderableOverlay {
    /// Lines of text with rendering hints.
    Text {
        /// Display lines, top to bottom.
        lines: Vec<String>,
        /// Style information for the renderer.
        style_hints: StyleHints,
    },
    /// A paletted bitmap.
    Bitmap {
        /// One colour index (0..=3) per pixel, row-major, `rect.width`
        /// pixels per row.
        pixels: Arc<[u8]>,
        /// RGBA colour for each of the four indices.
        palette: [PaletteEntry; 4],
        /// Placement on the video frame.
        rect: OverlayRect,
    },
}

impl RenderableOverlay {
    /// Build a text overlay without style hints.
    pub fn text<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        RenderableOverlay::Text {
            lines: lines.into_iter().map(Into::into).collect(),
            style_hints: StyleHints::default(),
        }
    }

    /// The text lines, or `None` for bitmaps.
    pub fn lines(&self) -> Option<&[String]> {
        match self {
            RenderableOverlay::Text { lines, .. } => Some(lines),
            RenderableOverlay::Bitmap { .. } => None,
        }
    }

    /// Expand a bitmap overlay into an RGBA image.
    ///
    /// Returns `None` for text overlays or if the pixel buffer does not
    /// match the rectangle.
    pub fn to_rgba_image(&self) -> Option<RgbaImage> {
        let RenderableOverlay::Bitmap {
            pixels,
            palette,
            rect,
        } = self
        else {
            return None;
        };

        if rect.width == 0 || rect.height == 0 {
            return None;
        }
        if pixels.len() != (rect.width as usize) * (rect.height as usize) {
            return None;
        }

        Some(RgbaImage::from_fn(rect.width, rect.height, |x, y| {
            let index = pixels[(y * rect.width + x) as usize] as usize;
            Rgba(palette[index & 3])
        }))
    }

    /// Cheap equality check used for diffing snapshots.
    pub(crate) fn same_as(&self, other: &RenderableOverlay) -> bool {
        match (self, other) {
            (
                RenderableOverlay::Bitmap {
                    pixels: a,
                    palette: pa,
                    rect: ra,
                },
                RenderableOverlay::Bitmap {
                    pixels: b,
                    palette: pb,
                    rect: rb,
                },
            ) => pa == pb && ra == rb && (Arc::ptr_eq(a, b) || a == b),
            _ => self == other,
        }
    }
}

/// A single timed overlay unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlayEvent {
    /// Which decoder produced the event.
    pub source_kind: SourceKind,
    /// What to render.
    pub payload: RenderableOverlay,
    /// First presentation time at which the event is visible.
    pub start_time: Duration,
    /// When the event stops being visible.
    pub end_time: EndTime,
    /// Per-source ordering key; higher wins.
    pub sequence_id: SequenceId,
}

impl OverlayEvent {
    /// Create a text event.
    pub fn text<I, S>(
        source_kind: SourceKind,
        lines: I,
        start_time: Duration,
        end_time: EndTime,
        sequence_id: SequenceId,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            source_kind,
            payload: RenderableOverlay::text(lines),
            start_time,
            end_time,
            sequence_id,
        }
    }

    /// The slot this event occupies.
    pub fn slot(&self) -> SlotKind {
        self.source_kind.slot()
    }

    /// Whether the event is valid at `now`.
    pub fn covers(&self, now: Duration) -> bool {
        self.start_time <= now && !self.end_time.has_passed(now)
    }

    /// Append a continuation fragment in place.
    ///
    /// Text lines are concatenated and a later concrete end time extends
    /// the event.
    pub(crate) fn absorb(&mut self, fragment: OverlayEvent) {
        if let (
            RenderableOverlay::Text { lines, .. },
            RenderableOverlay::Text {
                lines: more_lines, ..
            },
        ) = (&mut self.payload, fragment.payload)
        {
            lines.extend(more_lines);
        }

        self.end_time = match (self.end_time, fragment.end_time) {
            (EndTime::At(current), EndTime::At(extra)) => EndTime::At(current.max(extra)),
            (current, _) => current,
        };
        self.sequence_id = fragment.sequence_id;
    }
}
