use crate::config::LabelsConfig;
use crate::debug::{DebugCanvas, DebugFlags, DebugSettings};
use crate::font::FontContext;
use crate::isect::{self, Aabb};
use crate::label::{Label, LabelState, LabelTransform, LabelType};
use crate::tile::Tile;
use crate::unit::LabelUnit;
use crate::view::{FrameView, View};
use arc_swap::ArcSwap;
use glam::{UVec2, Vec2};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::trace;

/// How many zoom levels a tile may lag behind the current zoom before its
/// labels are discarded. Shrinks as the camera approaches `max_zoom`.
pub fn lod_discard(max_zoom: f32, zoom: f32, max_lod: i32) -> i32 {
    let base = max_zoom + 2.0;
    let distance = base - zoom;
    if base <= 1.0 || distance <= 0.0 {
        return 0;
    }
    let lod = (distance.ln() / base.ln() * max_zoom * 0.5).floor();
    lod.clamp(0.0, max_lod.max(0) as f32) as i32
}

/// Counters from the most recent [`Labels::update_occlusions`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FrameStats {
    /// Units moved from the pending buffer.
    pub merged: usize,
    /// Dead units removed.
    pub compacted: usize,
    /// Units left after compaction.
    pub live: usize,
    /// Live labels that took part in spatial testing.
    pub occluders: usize,
    /// Broad-phase candidate pairs.
    pub candidates: usize,
    /// Pairs confirmed by the narrow phase.
    pub occlusions: usize,
    /// Labels hidden by this frame's resolution.
    pub occluded: usize,
}

struct Shared {
    fonts: Arc<dyn FontContext>,
    frame: ArcSwap<FrameView>,
    pending: Mutex<Vec<LabelUnit>>,
    max_lod: i32,
}

/// Producer handle for tile workers. Cheap to clone; every clone feeds the
/// same registry.
#[derive(Clone)]
pub struct LabelSubmitter {
    shared: Arc<Shared>,
}

impl LabelSubmitter {
    fn discarded(&self, frame: &FrameView, tile: &dyn Tile) -> bool {
        let lod = lod_discard(frame.max_zoom, frame.zoom, self.shared.max_lod);
        frame.zoom - tile.id().z as f32 > lod as f32
    }

    /// Rasterize and register a text label. `None` when the tile is too far
    /// from the current zoom, no text buffer is bound, or the text could not
    /// be rasterized.
    pub fn add_text_label(
        &self,
        tile: &mut dyn Tile,
        style_name: &str,
        transform: LabelTransform,
        text: &str,
        label_type: LabelType,
    ) -> Option<Arc<Label>> {
        let frame = self.shared.frame.load_full();
        if self.discarded(&frame, tile) {
            return None;
        }

        let buffer = self.shared.fonts.current_buffer()?;
        let text_id = buffer.gen_text_id();
        let run = buffer.rasterize(text_id, text)?;

        let label = Arc::new(Label::text(
            transform,
            label_type,
            text.to_string(),
            text_id,
            buffer,
            run.size,
        ));
        self.add_label(&frame, tile, style_name, &label);
        Some(label)
    }

    /// Register an icon label. Only the zoom-distance discard can reject it.
    pub fn add_sprite_label(
        &self,
        tile: &mut dyn Tile,
        style_name: &str,
        transform: LabelTransform,
        size: Vec2,
    ) -> Option<Arc<Label>> {
        let frame = self.shared.frame.load_full();
        if self.discarded(&frame, tile) {
            return None;
        }

        let label = Arc::new(Label::sprite(transform, LabelType::Point, size));
        self.add_label(&frame, tile, style_name, &label);
        Some(label)
    }

    fn add_label(
        &self,
        frame: &FrameView,
        tile: &mut dyn Tile,
        style_name: &str,
        label: &Arc<Label>,
    ) {
        label.update(&(frame.view_projection * tile.model_matrix()), frame.screen_size);
        let unit = LabelUnit::new(label, tile.id(), style_name);
        tile.add_label(style_name, Arc::clone(label));

        self.shared.pending.lock().push(unit);
    }
}

/// Per-frame owner of the label units.
///
/// Tile workers submit through a [`LabelSubmitter`]; the render thread calls
/// [`Labels::update_occlusions`] once per frame, after the tiles have
/// re-projected their labels with [`crate::tile::MapTile::update_labels`].
pub struct Labels {
    view: Arc<dyn View>,
    config: LabelsConfig,
    submitter: LabelSubmitter,
    committed: Vec<LabelUnit>,
    // Swapped with the pending buffer on merge so neither side reallocates.
    spare: Vec<LabelUnit>,
    stats: FrameStats,
}

impl Labels {
    pub fn new(view: Arc<dyn View>, fonts: Arc<dyn FontContext>, config: LabelsConfig) -> Self {
        let frame = FrameView::capture(view.as_ref());
        let shared = Arc::new(Shared {
            fonts,
            frame: ArcSwap::from_pointee(frame),
            pending: Mutex::new(Vec::new()),
            max_lod: config.max_lod,
        });
        Self {
            view,
            config,
            submitter: LabelSubmitter { shared },
            committed: Vec::new(),
            spare: Vec::new(),
            stats: FrameStats::default(),
        }
    }

    pub fn submitter(&self) -> LabelSubmitter {
        self.submitter.clone()
    }

    pub fn add_text_label(
        &self,
        tile: &mut dyn Tile,
        style_name: &str,
        transform: LabelTransform,
        text: &str,
        label_type: LabelType,
    ) -> Option<Arc<Label>> {
        self.submitter.add_text_label(tile, style_name, transform, text, label_type)
    }

    pub fn add_sprite_label(
        &self,
        tile: &mut dyn Tile,
        style_name: &str,
        transform: LabelTransform,
        size: Vec2,
    ) -> Option<Arc<Label>> {
        self.submitter.add_sprite_label(tile, style_name, transform, size)
    }

    pub fn config(&self) -> &LabelsConfig {
        &self.config
    }

    /// Camera state captured at the last frame tick.
    pub fn frame(&self) -> FrameView {
        **self.submitter.shared.frame.load()
    }

    pub fn current_zoom(&self) -> f32 {
        self.frame().zoom
    }

    /// Units merged so far. May still contain dead units until the next pass.
    pub fn units(&self) -> &[LabelUnit] {
        &self.committed
    }

    pub fn len(&self) -> usize {
        self.committed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.committed.is_empty()
    }

    pub fn pending_len(&self) -> usize {
        self.submitter.shared.pending.lock().len()
    }

    pub fn last_frame_stats(&self) -> FrameStats {
        self.stats
    }

    fn grid_split(&self) -> UVec2 {
        UVec2::from_array(self.config.grid_split)
    }

    /// Resolve one frame of occlusion.
    pub fn update_occlusions(&mut self) {
        let frame = FrameView::capture(self.view.as_ref());
        self.submitter.shared.frame.store(Arc::new(frame));

        // The only point where the render thread meets the producers.
        {
            let mut pending = self.submitter.shared.pending.lock();
            std::mem::swap(&mut *pending, &mut self.spare);
        }
        let merged = self.spare.len();
        self.committed.append(&mut self.spare);

        let mut compacted = 0;
        let mut occluders: Vec<Arc<Label>> = Vec::new();
        let mut aabbs: Vec<Aabb> = Vec::new();
        let mut i = 0;
        while i < self.committed.len() {
            let Some(label) = self.committed[i].label() else {
                self.committed.swap_remove(i);
                compacted += 1;
                continue;
            };
            i += 1;
            if !label.can_occlude() {
                continue;
            }
            aabbs.push(label.aabb());
            occluders.push(label);
        }

        let candidates = isect::intersect(&aabbs, self.grid_split(), frame.screen_size);

        let mut occlusions: BTreeSet<(usize, usize)> = BTreeSet::new();
        for &(a, b) in &candidates {
            if a == b {
                continue;
            }
            if occluders[a].obb().intersects(&occluders[b].obb()) {
                occlusions.insert((a.min(b), a.max(b)));
            }
        }

        // No priorities: each overlapping pair hides at most one side.
        for &(a, b) in &occlusions {
            resolve_pair(&occluders[a], &occluders[b]);
        }
        let occluded = occluders.iter().filter(|label| label.is_occluded()).count();

        for unit in &self.committed {
            if let Some(label) = unit.label() {
                label.occlusion_solved();
            }
        }

        self.stats = FrameStats {
            merged,
            compacted,
            live: self.committed.len(),
            occluders: occluders.len(),
            candidates: candidates.len(),
            occlusions: occlusions.len(),
            occluded,
        };
        trace!(
            zoom = frame.zoom,
            merged,
            compacted,
            live = self.stats.live,
            candidates = self.stats.candidates,
            occlusions = self.stats.occlusions,
            occluded,
            "label occlusion resolved"
        );
    }

    /// Draw every occludable label's oriented box and the broad-phase grid.
    pub fn draw_debug(&self, settings: &DebugSettings, canvas: &mut dyn DebugCanvas) {
        if !settings.contains(DebugFlags::LABELS) {
            return;
        }

        let resolution = self.frame().screen_size;
        for unit in &self.committed {
            if let Some(label) = unit.label()
                && label.can_occlude()
            {
                canvas.draw_poly(label.obb().quad(), resolution);
            }
        }

        for cell in isect::grid_cells(self.grid_split(), resolution) {
            canvas.draw_rect(cell.min, cell.max, resolution);
        }
    }
}

/// Apply the pairwise rules to an overlapping pair, `first` being the
/// earlier of the two in registry order.
pub(crate) fn resolve_pair(first: &Label, second: &Label) {
    if !first.occluded_last_frame() && second.state() == LabelState::WaitOcc {
        second.set_occlusion(true);
    }
    if !second.occluded_last_frame() && first.state() == LabelState::WaitOcc {
        first.set_occlusion(true);
    }
    // TODO: this unconditional rule overrides the two above whenever `second`
    // was shown last frame; revisit once label priorities exist.
    if !second.occluded_last_frame() {
        first.set_occlusion(true);
    }
}
