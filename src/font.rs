use crate::config::FontConfig;
use crate::text_metrics::TextMeasurer;
use glam::Vec2;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::debug;

pub type TextId = u32;

/// A packed rectangle in the atlas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AtlasRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Result of rasterizing one label's text.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GlyphRun {
    /// Size of the run in screen pixels.
    pub size: Vec2,
    pub region: AtlasRect,
}

/// A writable glyph buffer.
pub trait TextBuffer: Send + Sync + fmt::Debug {
    fn gen_text_id(&self) -> TextId;
    /// Rasterize `text` into the slot `id`; `None` when it cannot be stored.
    fn rasterize(&self, id: TextId, text: &str) -> Option<GlyphRun>;
}

/// Font/rasterization collaborator.
pub trait FontContext: Send + Sync {
    /// The buffer new text should go into, if any is bound.
    fn current_buffer(&self) -> Option<Arc<dyn TextBuffer>>;
}

/// Shelf packer over a fixed-size atlas.
#[derive(Debug)]
pub struct GlyphAtlas {
    width: u32,
    height: u32,
    padding: u32,
    cursor_x: u32,
    cursor_y: u32,
    row_height: u32,
    used_area: u64,
}

impl GlyphAtlas {
    pub fn new(width: u32, height: u32, padding: u32) -> Self {
        Self {
            width,
            height,
            padding,
            cursor_x: 0,
            cursor_y: 0,
            row_height: 0,
            used_area: 0,
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Fraction of the atlas area handed out so far.
    pub fn usage(&self) -> f32 {
        let total = self.width as u64 * self.height as u64;
        if total == 0 {
            return 1.0;
        }
        self.used_area as f32 / total as f32
    }

    /// Reserve a `width` x `height` region. Returns `None` when full.
    pub fn insert(&mut self, width: u32, height: u32) -> Option<AtlasRect> {
        let (Some(padded_w), Some(padded_h)) = (
            width.checked_add(self.padding),
            height.checked_add(self.padding),
        ) else {
            debug!(width, height, "Glyph run size overflows atlas coordinates");
            return None;
        };
        if padded_w > self.width || padded_h > self.height {
            debug!(width, height, atlas_width = self.width, "Glyph run larger than atlas");
            return None;
        }

        // Try to fit in current row
        if self.cursor_x.saturating_add(padded_w) > self.width {
            self.cursor_x = 0;
            self.cursor_y = self.cursor_y.saturating_add(self.row_height);
            self.row_height = 0;
        }

        if self.cursor_y.saturating_add(padded_h) > self.height {
            debug!("Glyph atlas full, cannot insert glyph run");
            return None;
        }

        let rect = AtlasRect {
            x: self.cursor_x,
            y: self.cursor_y,
            width,
            height,
        };
        self.cursor_x += padded_w;
        self.row_height = self.row_height.max(padded_h);
        self.used_area += padded_w as u64 * padded_h as u64;
        Some(rect)
    }

    pub fn reset(&mut self) {
        self.cursor_x = 0;
        self.cursor_y = 0;
        self.row_height = 0;
        self.used_area = 0;
    }
}

/// Text buffer backed by a shared [`GlyphAtlas`].
pub struct AtlasTextBuffer {
    atlas: Arc<Mutex<GlyphAtlas>>,
    measurer: Arc<Mutex<TextMeasurer>>,
    font_size: f32,
    line_height: f32,
    next_id: AtomicU32,
    runs: Mutex<HashMap<TextId, GlyphRun>>,
}

impl fmt::Debug for AtlasTextBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AtlasTextBuffer")
            .field("font_size", &self.font_size)
            .field("next_id", &self.next_id.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl AtlasTextBuffer {
    pub fn run(&self, id: TextId) -> Option<GlyphRun> {
        self.runs.lock().get(&id).copied()
    }

    pub fn run_count(&self) -> usize {
        self.runs.lock().len()
    }
}

impl TextBuffer for AtlasTextBuffer {
    fn gen_text_id(&self) -> TextId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn rasterize(&self, id: TextId, text: &str) -> Option<GlyphRun> {
        if text.trim().is_empty() {
            return None;
        }
        let width = self.measurer.lock().measure_width(text, self.font_size);
        let lines = text.lines().count().max(1) as f32;
        let size = Vec2::new(width, self.font_size * self.line_height * lines);
        let region = self
            .atlas
            .lock()
            .insert(size.x.ceil() as u32, size.y.ceil() as u32)?;
        let run = GlyphRun { size, region };
        self.runs.lock().insert(id, run);
        Some(run)
    }
}

/// Font context owning one glyph atlas.
///
/// No buffer is current until [`AtlasFontContext::bind_buffer`] is called.
pub struct AtlasFontContext {
    atlas: Arc<Mutex<GlyphAtlas>>,
    measurer: Arc<Mutex<TextMeasurer>>,
    font_size: f32,
    line_height: f32,
    current: RwLock<Option<Arc<AtlasTextBuffer>>>,
}

impl AtlasFontContext {
    pub fn new(config: &FontConfig) -> Self {
        let measurer = match config.family.as_deref() {
            Some(family) => TextMeasurer::from_family(family),
            None => TextMeasurer::fallback(),
        };
        Self::with_measurer(config, measurer)
    }

    pub fn with_measurer(config: &FontConfig, measurer: TextMeasurer) -> Self {
        Self {
            atlas: Arc::new(Mutex::new(GlyphAtlas::new(
                config.atlas_width,
                config.atlas_height,
                config.glyph_padding,
            ))),
            measurer: Arc::new(Mutex::new(measurer)),
            font_size: config.size,
            line_height: config.line_height,
            current: RwLock::new(None),
        }
    }

    /// Make a fresh buffer current and return it.
    pub fn bind_buffer(&self) -> Arc<AtlasTextBuffer> {
        let buffer = Arc::new(AtlasTextBuffer {
            atlas: Arc::clone(&self.atlas),
            measurer: Arc::clone(&self.measurer),
            font_size: self.font_size,
            line_height: self.line_height,
            next_id: AtomicU32::new(0),
            runs: Mutex::new(HashMap::new()),
        });
        *self.current.write() = Some(Arc::clone(&buffer));
        buffer
    }

    pub fn unbind_buffer(&self) {
        *self.current.write() = None;
    }

    pub fn atlas_usage(&self) -> f32 {
        self.atlas.lock().usage()
    }

    pub fn reset_atlas(&self) {
        self.atlas.lock().reset();
    }
}

impl FontContext for AtlasFontContext {
    fn current_buffer(&self) -> Option<Arc<dyn TextBuffer>> {
        let buffer: Arc<dyn TextBuffer> = self.current.read().clone()?;
        Some(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> FontConfig {
        FontConfig {
            family: None,
            size: 10.0,
            line_height: 1.2,
            atlas_width: 64,
            atlas_height: 24,
            glyph_padding: 0,
        }
    }

    #[test]
    fn atlas_packs_rows_then_fills() {
        let mut atlas = GlyphAtlas::new(32, 16, 0);
        let a = atlas.insert(20, 8).expect("first fits");
        let b = atlas.insert(20, 8).expect("wraps to second row");
        assert_eq!((a.x, a.y), (0, 0));
        assert_eq!((b.x, b.y), (0, 8));
        assert!(atlas.insert(20, 8).is_none());
        atlas.reset();
        assert!(atlas.insert(20, 8).is_some());
    }

    #[test]
    fn atlas_rejects_oversized_runs() {
        let mut atlas = GlyphAtlas::new(32, 32, 2);
        assert!(atlas.insert(31, 4).is_none());
        assert!(atlas.insert(30, 4).is_some());
    }

    #[test]
    fn atlas_rejects_sizes_that_overflow_with_padding() {
        let mut atlas = GlyphAtlas::new(512, 512, 2);
        assert!(atlas.insert(u32::MAX, 10).is_none());
        assert!(atlas.insert(10, u32::MAX - 1).is_none());
        assert!(atlas.insert(10, 10).is_some());
    }

    #[test]
    fn rasterize_rejects_runs_too_large_for_any_atlas() {
        let config = FontConfig {
            size: 1e10,
            ..small_config()
        };
        let fonts = AtlasFontContext::new(&config);
        let buffer = fonts.bind_buffer();
        assert!(buffer.rasterize(buffer.gen_text_id(), "abcd").is_none());
        assert_eq!(buffer.run_count(), 0);
    }

    #[test]
    fn no_buffer_until_bound() {
        let fonts = AtlasFontContext::new(&small_config());
        assert!(fonts.current_buffer().is_none());
        fonts.bind_buffer();
        assert!(fonts.current_buffer().is_some());
        fonts.unbind_buffer();
        assert!(fonts.current_buffer().is_none());
    }

    #[test]
    fn rasterize_records_runs_until_atlas_exhausted() {
        let fonts = AtlasFontContext::new(&small_config());
        let buffer = fonts.bind_buffer();
        let first = buffer.gen_text_id();
        let second = buffer.gen_text_id();
        assert_ne!(first, second);

        // "abcd" at 10px with fixed advances is 22.4 wide, 12 tall.
        let run = buffer.rasterize(first, "abcd").expect("fits");
        assert!((run.size.x - 22.4).abs() < 1e-3);
        assert_eq!(buffer.run(first), Some(run));

        let mut stored = 1;
        while buffer.rasterize(buffer.gen_text_id(), "abcd").is_some() {
            stored += 1;
        }
        assert_eq!(stored, buffer.run_count());
        assert!(fonts.atlas_usage() > 0.5);
    }

    #[test]
    fn rasterize_rejects_blank_text() {
        let fonts = AtlasFontContext::new(&small_config());
        let buffer = fonts.bind_buffer();
        assert!(buffer.rasterize(buffer.gen_text_id(), "  ").is_none());
    }
}
