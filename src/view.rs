use glam::{Mat4, Vec2, Vec3};
use parking_lot::RwLock;

/// Camera collaborator. Polled once per frame by the label registry.
pub trait View: Send + Sync {
    fn zoom(&self) -> f32;
    fn max_zoom(&self) -> f32;
    fn width(&self) -> f32;
    fn height(&self) -> f32;
    fn view_projection_matrix(&self) -> Mat4;
}

/// Immutable per-frame copy of the camera, shared with tile workers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameView {
    pub zoom: f32,
    pub max_zoom: f32,
    pub view_projection: Mat4,
    pub screen_size: Vec2,
}

impl FrameView {
    pub fn capture(view: &dyn View) -> Self {
        Self {
            zoom: view.zoom(),
            max_zoom: view.max_zoom(),
            view_projection: view.view_projection_matrix(),
            screen_size: Vec2::new(view.width(), view.height()),
        }
    }
}

/// Pixel-space orthographic projection with y growing downwards.
pub fn screen_projection(width: f32, height: f32) -> Mat4 {
    Mat4::orthographic_rh(0.0, width.max(1.0), height.max(1.0), 0.0, -1.0, 1.0)
}

#[derive(Debug, Clone, Copy)]
struct MapViewState {
    position: Vec2,
    zoom: f32,
    width: f32,
    height: f32,
}

/// Pan/zoom map camera.
///
/// World units are pixels at zoom 0; each zoom level doubles the scale.
/// `position` is the world point shown at the viewport centre.
#[derive(Debug)]
pub struct MapView {
    max_zoom: f32,
    state: RwLock<MapViewState>,
}

impl MapView {
    pub fn new(width: f32, height: f32, max_zoom: f32) -> Self {
        Self {
            max_zoom: max_zoom.max(0.0),
            state: RwLock::new(MapViewState {
                position: Vec2::ZERO,
                zoom: 0.0,
                width,
                height,
            }),
        }
    }

    pub fn set_zoom(&self, zoom: f32) {
        self.state.write().zoom = zoom.clamp(0.0, self.max_zoom);
    }

    pub fn set_position(&self, position: Vec2) {
        self.state.write().position = position;
    }

    pub fn position(&self) -> Vec2 {
        self.state.read().position
    }

    pub fn set_size(&self, width: f32, height: f32) {
        let mut state = self.state.write();
        state.width = width;
        state.height = height;
    }

    /// Pan by a screen-space delta.
    pub fn pan(&self, dx: f32, dy: f32) {
        let mut state = self.state.write();
        let scale = state.zoom.exp2();
        state.position -= Vec2::new(dx, dy) / scale;
    }
}

impl View for MapView {
    fn zoom(&self) -> f32 {
        self.state.read().zoom
    }

    fn max_zoom(&self) -> f32 {
        self.max_zoom
    }

    fn width(&self) -> f32 {
        self.state.read().width
    }

    fn height(&self) -> f32 {
        self.state.read().height
    }

    fn view_projection_matrix(&self) -> Mat4 {
        let state = *self.state.read();
        let scale = state.zoom.exp2();
        screen_projection(state.width, state.height)
            * Mat4::from_translation(Vec3::new(state.width * 0.5, state.height * 0.5, 0.0))
            * Mat4::from_scale(Vec3::new(scale, scale, 1.0))
            * Mat4::from_translation(Vec3::new(-state.position.x, -state.position.y, 0.0))
    }
}

/// Screen-space view: world units are viewport pixels, independent of zoom.
#[derive(Debug)]
pub struct FixedView {
    width: f32,
    height: f32,
    max_zoom: f32,
    zoom: RwLock<f32>,
}

impl FixedView {
    pub fn new(width: f32, height: f32, zoom: f32, max_zoom: f32) -> Self {
        Self {
            width,
            height,
            max_zoom,
            zoom: RwLock::new(zoom),
        }
    }

    pub fn set_zoom(&self, zoom: f32) {
        *self.zoom.write() = zoom;
    }
}

impl View for FixedView {
    fn zoom(&self) -> f32 {
        *self.zoom.read()
    }

    fn max_zoom(&self) -> f32 {
        self.max_zoom
    }

    fn width(&self) -> f32 {
        self.width
    }

    fn height(&self) -> f32 {
        self.height
    }

    fn view_projection_matrix(&self) -> Mat4 {
        screen_projection(self.width, self.height)
    }
}
