use crate::label::Label;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Weak};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TileId {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl TileId {
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }
}

impl fmt::Display for TileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.z, self.x, self.y)
    }
}

/// Registry-side record of a submitted label.
///
/// Holds the label weakly: the tile that produced it owns it, and once the
/// tile is evicted the unit is garbage to be compacted away.
#[derive(Debug, Clone)]
pub struct LabelUnit {
    label: Weak<Label>,
    tile_id: TileId,
    style_name: String,
}

impl LabelUnit {
    pub fn new(label: &Arc<Label>, tile_id: TileId, style_name: impl Into<String>) -> Self {
        Self {
            label: Arc::downgrade(label),
            tile_id,
            style_name: style_name.into(),
        }
    }

    /// The label, if its owner still holds it.
    pub fn label(&self) -> Option<Arc<Label>> {
        self.label.upgrade()
    }

    pub fn is_alive(&self) -> bool {
        self.label.strong_count() > 0
    }

    pub fn tile_id(&self) -> TileId {
        self.tile_id
    }

    pub fn style_name(&self) -> &str {
        &self.style_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::label::{LabelTransform, LabelType};
    use glam::Vec2;

    #[test]
    fn unit_dies_with_its_label() {
        let label = Arc::new(Label::sprite(
            LabelTransform::point(Vec2::ZERO),
            LabelType::Point,
            Vec2::splat(8.0),
        ));
        let unit = LabelUnit::new(&label, TileId::new(1, 2, 3), "pois");
        assert!(unit.is_alive());
        assert!(unit.label().is_some());
        assert_eq!(unit.style_name(), "pois");

        drop(label);
        assert!(!unit.is_alive());
        assert!(unit.label().is_none());
        assert_eq!(unit.tile_id(), TileId::new(1, 2, 3));
    }

    #[test]
    fn tile_id_display_is_zxy() {
        assert_eq!(TileId::new(4, 7, 12).to_string(), "12/4/7");
    }
}
