use crate::font::{TextBuffer, TextId};
use crate::isect::{Aabb, Obb};
use glam::{Mat4, Vec2, Vec4};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::f32::consts::{FRAC_PI_2, PI};
use std::sync::Arc;

/// Screen-space movement (pixels) below which a label keeps its resolved state.
const POSITION_EPSILON: f32 = 0.5;
const ROTATION_EPSILON: f32 = 1e-3;

/// Geometry a label was derived from. `Debug` markers never take part in
/// occlusion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LabelType {
    Point,
    Line,
    Polygon,
    Debug,
}

/// Anchor points in tile-local coordinates. Point labels use the same
/// position twice; line labels span a segment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LabelTransform {
    pub position1: Vec2,
    pub position2: Vec2,
}

impl LabelTransform {
    pub fn point(position: Vec2) -> Self {
        Self {
            position1: position,
            position2: position,
        }
    }

    pub fn segment(from: Vec2, to: Vec2) -> Self {
        Self {
            position1: from,
            position2: to,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ScreenTransform {
    pub position: Vec2,
    /// Radians, folded into `[-pi/2, pi/2]`.
    pub rotation: f32,
}

/// Occlusion lifecycle of a label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelState {
    /// Submitted but not yet through a resolution pass.
    NewPositionWait,
    /// Placed and eligible for an occlusion verdict.
    WaitOcc,
    /// Resolved and shown.
    Visible,
    /// Resolved and hidden.
    Sleep,
}

#[derive(Debug)]
pub enum LabelContent {
    Text {
        text: String,
        text_id: TextId,
        buffer: Arc<dyn TextBuffer>,
    },
    Sprite,
}

#[derive(Debug, Clone, Copy)]
struct Placement {
    screen: ScreenTransform,
    aabb: Aabb,
    obb: Obb,
    state: LabelState,
    occluded: bool,
    occluded_last_frame: bool,
}

/// A text or sprite annotation placed over a tile.
///
/// Tiles hold the strong references; the label registry only observes labels
/// through weak ones. Placement state sits behind a lock so the owning tile
/// and the render thread can both reach it through a shared handle.
#[derive(Debug)]
pub struct Label {
    label_type: LabelType,
    transform: LabelTransform,
    dimension: Vec2,
    content: LabelContent,
    placement: RwLock<Placement>,
}

impl Label {
    pub fn text(
        transform: LabelTransform,
        label_type: LabelType,
        text: String,
        text_id: TextId,
        buffer: Arc<dyn TextBuffer>,
        dimension: Vec2,
    ) -> Self {
        Self::with_content(
            transform,
            label_type,
            dimension,
            LabelContent::Text {
                text,
                text_id,
                buffer,
            },
        )
    }

    pub fn sprite(transform: LabelTransform, label_type: LabelType, size: Vec2) -> Self {
        Self::with_content(transform, label_type, size, LabelContent::Sprite)
    }

    fn with_content(
        transform: LabelTransform,
        label_type: LabelType,
        dimension: Vec2,
        content: LabelContent,
    ) -> Self {
        let obb = Obb::new(transform.position1, dimension * 0.5, 0.0);
        Self {
            label_type,
            transform,
            dimension,
            content,
            placement: RwLock::new(Placement {
                screen: ScreenTransform {
                    position: transform.position1,
                    rotation: 0.0,
                },
                aabb: obb.aabb(),
                obb,
                state: LabelState::NewPositionWait,
                occluded: false,
                occluded_last_frame: false,
            }),
        }
    }

    pub fn label_type(&self) -> LabelType {
        self.label_type
    }

    pub fn transform(&self) -> LabelTransform {
        self.transform
    }

    pub fn dimension(&self) -> Vec2 {
        self.dimension
    }

    pub fn content(&self) -> &LabelContent {
        &self.content
    }

    pub fn text_content(&self) -> Option<&str> {
        match &self.content {
            LabelContent::Text { text, .. } => Some(text),
            LabelContent::Sprite => None,
        }
    }

    pub fn can_occlude(&self) -> bool {
        self.label_type != LabelType::Debug
    }

    /// Re-project the label with `mvp` (view-projection times tile model) and
    /// rebuild its bounding boxes. A resolved label that moved goes back to
    /// waiting for an occlusion verdict.
    pub fn update(&self, mvp: &Mat4, screen_size: Vec2) {
        let screen = self.project(mvp, screen_size);
        let obb = Obb::new(screen.position, self.dimension * 0.5, screen.rotation);

        let mut placement = self.placement.write();
        let moved = placement.screen.position.distance(screen.position) > POSITION_EPSILON
            || (placement.screen.rotation - screen.rotation).abs() > ROTATION_EPSILON;
        placement.screen = screen;
        placement.obb = obb;
        placement.aabb = obb.aabb();
        if moved && matches!(placement.state, LabelState::Visible | LabelState::Sleep) {
            placement.state = LabelState::WaitOcc;
        }
    }

    fn project(&self, mvp: &Mat4, screen_size: Vec2) -> ScreenTransform {
        let p1 = world_to_screen(mvp, self.transform.position1, screen_size);
        match self.label_type {
            LabelType::Line => {
                let p2 = world_to_screen(mvp, self.transform.position2, screen_size);
                let dir = p2 - p1;
                let rotation = if dir.length_squared() > f32::EPSILON {
                    fold_rotation(dir.y.atan2(dir.x))
                } else {
                    0.0
                };
                ScreenTransform {
                    position: (p1 + p2) * 0.5,
                    rotation,
                }
            }
            LabelType::Point | LabelType::Polygon | LabelType::Debug => ScreenTransform {
                position: p1,
                rotation: 0.0,
            },
        }
    }

    pub fn screen_transform(&self) -> ScreenTransform {
        self.placement.read().screen
    }

    pub fn aabb(&self) -> Aabb {
        self.placement.read().aabb
    }

    pub fn obb(&self) -> Obb {
        self.placement.read().obb
    }

    pub fn state(&self) -> LabelState {
        self.placement.read().state
    }

    /// Occlusion decided in the last resolved frame.
    pub fn occluded_last_frame(&self) -> bool {
        self.placement.read().occluded_last_frame
    }

    /// Occlusion marked during the frame currently being resolved.
    pub fn is_occluded(&self) -> bool {
        self.placement.read().occluded
    }

    /// What the renderer should draw: placed at least once and not hidden.
    pub fn is_visible(&self) -> bool {
        let placement = self.placement.read();
        placement.state != LabelState::NewPositionWait && !placement.occluded_last_frame
    }

    /// Marks are sticky for the frame: once occluded, a later `false` does
    /// not clear it.
    pub fn set_occlusion(&self, occluded: bool) {
        if occluded {
            self.placement.write().occluded = true;
        }
    }

    /// Commit this frame's verdict so it becomes next frame's
    /// `occluded_last_frame`, and advance the state machine.
    pub fn occlusion_solved(&self) {
        let mut placement = self.placement.write();
        let occluded = placement.occluded;
        placement.occluded_last_frame = occluded;
        placement.occluded = false;
        placement.state = match placement.state {
            LabelState::NewPositionWait => LabelState::WaitOcc,
            _ if occluded => LabelState::Sleep,
            _ => LabelState::Visible,
        };
    }
}

/// Clip-space projection followed by the viewport transform. Screen y grows
/// downwards.
pub fn world_to_screen(mvp: &Mat4, position: Vec2, screen_size: Vec2) -> Vec2 {
    let clip = *mvp * Vec4::new(position.x, position.y, 0.0, 1.0);
    let w = if clip.w.abs() > f32::EPSILON { clip.w } else { 1.0 };
    let ndc = Vec2::new(clip.x / w, clip.y / w);
    Vec2::new(
        (ndc.x + 1.0) * 0.5 * screen_size.x,
        (1.0 - ndc.y) * 0.5 * screen_size.y,
    )
}

fn fold_rotation(mut angle: f32) -> f32 {
    if angle > FRAC_PI_2 {
        angle -= PI;
    } else if angle < -FRAC_PI_2 {
        angle += PI;
    }
    angle
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pixel_projection(w: f32, h: f32) -> Mat4 {
        Mat4::orthographic_rh(0.0, w, h, 0.0, -1.0, 1.0)
    }

    fn sprite_at(x: f32, y: f32, size: f32) -> Label {
        Label::sprite(
            LabelTransform::point(Vec2::new(x, y)),
            LabelType::Point,
            Vec2::splat(size),
        )
    }

    #[test]
    fn world_to_screen_identity_pixels() {
        let mvp = pixel_projection(800.0, 600.0);
        let p = world_to_screen(&mvp, Vec2::new(120.0, 40.0), Vec2::new(800.0, 600.0));
        assert!((p.x - 120.0).abs() < 1e-3);
        assert!((p.y - 40.0).abs() < 1e-3);
    }

    #[test]
    fn update_builds_centered_boxes() {
        let label = sprite_at(5.0, 5.0, 10.0);
        label.update(&pixel_projection(100.0, 100.0), Vec2::new(100.0, 100.0));
        let aabb = label.aabb();
        assert!(aabb.min.abs_diff_eq(Vec2::ZERO, 1e-3));
        assert!(aabb.max.abs_diff_eq(Vec2::splat(10.0), 1e-3));
    }

    #[test]
    fn line_labels_sit_on_segment_midpoint() {
        let label = Label::sprite(
            LabelTransform::segment(Vec2::new(0.0, 0.0), Vec2::new(20.0, 20.0)),
            LabelType::Line,
            Vec2::new(10.0, 2.0),
        );
        label.update(&pixel_projection(100.0, 100.0), Vec2::new(100.0, 100.0));
        let screen = label.screen_transform();
        assert!(screen.position.abs_diff_eq(Vec2::splat(10.0), 1e-3));
        assert!((screen.rotation - std::f32::consts::FRAC_PI_4).abs() < 1e-3);
    }

    #[test]
    fn backwards_lines_are_not_upside_down() {
        let label = Label::sprite(
            LabelTransform::segment(Vec2::new(20.0, 10.0), Vec2::new(0.0, 10.0)),
            LabelType::Line,
            Vec2::new(10.0, 2.0),
        );
        label.update(&pixel_projection(100.0, 100.0), Vec2::new(100.0, 100.0));
        assert!(label.screen_transform().rotation.abs() < 1e-3);
    }

    #[test]
    fn state_machine_first_frames() {
        let label = sprite_at(5.0, 5.0, 10.0);
        assert_eq!(label.state(), LabelState::NewPositionWait);
        assert!(!label.is_visible());

        label.occlusion_solved();
        assert_eq!(label.state(), LabelState::WaitOcc);
        assert!(label.is_visible());

        label.set_occlusion(true);
        label.occlusion_solved();
        assert_eq!(label.state(), LabelState::Sleep);
        assert!(label.occluded_last_frame());
        assert!(!label.is_visible());

        label.occlusion_solved();
        assert_eq!(label.state(), LabelState::Visible);
        assert!(!label.occluded_last_frame());
    }

    #[test]
    fn occlusion_mark_is_sticky_within_frame() {
        let label = sprite_at(5.0, 5.0, 10.0);
        label.set_occlusion(true);
        label.set_occlusion(false);
        assert!(label.is_occluded());
        label.occlusion_solved();
        assert!(!label.is_occluded());
        assert!(label.occluded_last_frame());
    }

    #[test]
    fn moving_resolved_label_waits_again() {
        let label = sprite_at(5.0, 5.0, 10.0);
        let screen = Vec2::new(100.0, 100.0);
        label.update(&pixel_projection(100.0, 100.0), screen);
        label.occlusion_solved();
        label.occlusion_solved();
        assert_eq!(label.state(), LabelState::Visible);

        // Same projection keeps the verdict.
        label.update(&pixel_projection(100.0, 100.0), screen);
        assert_eq!(label.state(), LabelState::Visible);

        let panned = pixel_projection(100.0, 100.0)
            * Mat4::from_translation(glam::Vec3::new(30.0, 0.0, 0.0));
        label.update(&panned, screen);
        assert_eq!(label.state(), LabelState::WaitOcc);
    }

    #[test]
    fn debug_markers_cannot_occlude() {
        let label = Label::sprite(
            LabelTransform::point(Vec2::ZERO),
            LabelType::Debug,
            Vec2::splat(4.0),
        );
        assert!(!label.can_occlude());
        assert!(sprite_at(0.0, 0.0, 4.0).can_occlude());
    }
}
