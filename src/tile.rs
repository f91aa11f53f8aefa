use crate::label::Label;
use crate::unit::TileId;
use crate::view::FrameView;
use glam::{Mat4, Vec3};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Tile edge length in world units at zoom 0.
pub const TILE_SIZE: f32 = 256.0;

/// Tile collaborator: the owner of the labels built from its geometry.
pub trait Tile {
    fn id(&self) -> TileId;
    /// Maps tile-local coordinates into world space.
    fn model_matrix(&self) -> Mat4;
    /// Takes ownership of a label under a style bucket.
    fn add_label(&mut self, style_name: &str, label: Arc<Label>);
}

/// A map tile holding its labels per style bucket.
///
/// Tile-local coordinates span `[0, 1]`. Dropping the tile drops its labels,
/// which the registry notices on its next compaction.
#[derive(Debug)]
pub struct MapTile {
    id: TileId,
    model: Mat4,
    labels: BTreeMap<String, Vec<Arc<Label>>>,
}

impl MapTile {
    pub fn new(id: TileId) -> Self {
        let extent = TILE_SIZE / (id.z as f32).exp2();
        let origin = Vec3::new(id.x as f32 * extent, id.y as f32 * extent, 0.0);
        let model =
            Mat4::from_translation(origin) * Mat4::from_scale(Vec3::new(extent, extent, 1.0));
        Self::with_model(id, model)
    }

    pub fn with_model(id: TileId, model: Mat4) -> Self {
        Self {
            id,
            model,
            labels: BTreeMap::new(),
        }
    }

    pub fn labels(&self, style_name: &str) -> &[Arc<Label>] {
        self.labels.get(style_name).map_or(&[], Vec::as_slice)
    }

    pub fn styles(&self) -> impl Iterator<Item = &str> {
        self.labels.keys().map(String::as_str)
    }

    pub fn all_labels(&self) -> impl Iterator<Item = &Arc<Label>> {
        self.labels.values().flatten()
    }

    pub fn label_count(&self) -> usize {
        self.labels.values().map(Vec::len).sum()
    }

    /// Re-project every label for the current frame.
    pub fn update_labels(&self, frame: &FrameView) {
        let mvp = frame.view_projection * self.model;
        for label in self.all_labels() {
            label.update(&mvp, frame.screen_size);
        }
    }
}

impl Tile for MapTile {
    fn id(&self) -> TileId {
        self.id
    }

    fn model_matrix(&self) -> Mat4 {
        self.model
    }

    fn add_label(&mut self, style_name: &str, label: Arc<Label>) {
        self.labels
            .entry(style_name.to_string())
            .or_default()
            .push(label);
    }
}
