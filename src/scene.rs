use crate::builder::{self, Geometry, Properties, TextParams};
use crate::config::Config;
use crate::font::AtlasFontContext;
use crate::label::{LabelState, LabelType};
use crate::labels::{FrameStats, Labels};
use crate::tile::{MapTile, Tile};
use crate::unit::TileId;
use crate::view::{FixedView, FrameView, MapView, View};
use glam::{Mat4, Vec2};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum SceneError {
    #[error("failed to read scene {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse scene: {0}")]
    Parse(String),
    #[error("scene has no tiles")]
    Empty,
    #[error("scene must run at least one frame")]
    NoFrames,
    #[error("worker building tile {0} panicked")]
    WorkerPanicked(TileId),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneView {
    pub width: f32,
    pub height: f32,
    pub zoom: f32,
    #[serde(default = "default_max_zoom")]
    pub max_zoom: f32,
    /// World position at the viewport centre. Without it the scene runs in
    /// screen space and feature coordinates are pixels.
    #[serde(default)]
    pub center: Option<[f32; 2]>,
}

fn default_max_zoom() -> f32 {
    18.0
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", content = "coordinates", rename_all = "lowercase")]
pub enum SceneGeometry {
    Point([f32; 2]),
    Line(Vec<[f32; 2]>),
    Polygon(Vec<Vec<[f32; 2]>>),
}

impl SceneGeometry {
    pub fn to_geometry(&self) -> Geometry {
        let v = |p: &[f32; 2]| Vec2::from_array(*p);
        match self {
            SceneGeometry::Point(p) => Geometry::Point(v(p)),
            SceneGeometry::Line(line) => Geometry::Line(line.iter().map(v).collect()),
            SceneGeometry::Polygon(rings) => {
                Geometry::Polygon(rings.iter().map(|ring| ring.iter().map(v).collect()).collect())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneFeature {
    pub style: String,
    pub geometry: SceneGeometry,
    #[serde(default)]
    pub properties: Properties,
    #[serde(default)]
    pub text: TextParams,
    /// Icon size in pixels; the feature becomes a sprite label instead of text.
    #[serde(default)]
    pub sprite: Option<[f32; 2]>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneTile {
    pub id: TileId,
    #[serde(default)]
    pub features: Vec<SceneFeature>,
    /// Drop the tile once this frame has been resolved.
    #[serde(default)]
    pub evict_after_frame: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scene {
    pub view: SceneView,
    #[serde(default)]
    pub tiles: Vec<SceneTile>,
    #[serde(default = "default_frames")]
    pub frames: u32,
}

fn default_frames() -> u32 {
    2
}

pub fn load_scene(path: &Path) -> Result<Scene, SceneError> {
    let contents = std::fs::read_to_string(path).map_err(|source| SceneError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_scene(&contents)
}

/// Parse a JSON (or JSON5) scene.
pub fn parse_scene(contents: &str) -> Result<Scene, SceneError> {
    match serde_json::from_str(contents) {
        Ok(scene) => Ok(scene),
        Err(json_err) => {
            json5::from_str(contents).map_err(|_| SceneError::Parse(json_err.to_string()))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelReport {
    pub tile: TileId,
    pub style: String,
    pub label_type: LabelType,
    pub text: Option<String>,
    pub position: [f32; 2],
    pub state: LabelState,
    pub visible: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneReport {
    pub frames: Vec<FrameStats>,
    pub labels: Vec<LabelReport>,
}

impl SceneReport {
    pub fn visible_count(&self) -> usize {
        self.labels.iter().filter(|label| label.visible).count()
    }
}

/// Registry and surviving tiles after a simulation. The tiles own the
/// labels, so they must outlive any rendering of `labels`.
pub struct SceneRun {
    pub labels: Labels,
    pub tiles: Vec<MapTile>,
    pub fonts: Arc<AtlasFontContext>,
    pub report: SceneReport,
}

fn build_view(view: &SceneView) -> Arc<dyn View> {
    match view.center {
        Some(center) => {
            let map = MapView::new(view.width, view.height, view.max_zoom);
            map.set_zoom(view.zoom);
            map.set_position(Vec2::from_array(center));
            Arc::new(map)
        }
        None => Arc::new(FixedView::new(view.width, view.height, view.zoom, view.max_zoom)),
    }
}

fn build_tile(scene: &Scene, tile: &SceneTile) -> MapTile {
    if scene.view.center.is_some() {
        MapTile::new(tile.id)
    } else {
        MapTile::with_model(tile.id, Mat4::IDENTITY)
    }
}

/// Build every tile on its own worker thread, then resolve `scene.frames`
/// frames, dropping tiles marked for eviction along the way.
pub fn run_scene(scene: &Scene, config: &Config) -> Result<SceneRun, SceneError> {
    if scene.tiles.is_empty() {
        return Err(SceneError::Empty);
    }
    if scene.frames == 0 {
        return Err(SceneError::NoFrames);
    }

    let view = build_view(&scene.view);
    let fonts = Arc::new(AtlasFontContext::new(&config.font));
    fonts.bind_buffer();
    let mut labels = Labels::new(Arc::clone(&view), fonts.clone(), config.labels.clone());

    info!(
        tiles = scene.tiles.len(),
        frames = scene.frames,
        zoom = scene.view.zoom,
        "running label scene"
    );

    let built: Vec<Result<MapTile, SceneError>> = std::thread::scope(|scope| {
        let handles: Vec<_> = scene
            .tiles
            .iter()
            .map(|scene_tile| {
                let submitter = labels.submitter();
                let handle = scope.spawn(move || {
                    let mut tile = build_tile(scene, scene_tile);
                    for feature in &scene_tile.features {
                        let geometry = feature.geometry.to_geometry();
                        match feature.sprite {
                            Some(size) => {
                                builder::build_sprite_labels(
                                    &submitter,
                                    &mut tile,
                                    &feature.style,
                                    &geometry,
                                    Vec2::from_array(size),
                                );
                            }
                            None => {
                                builder::build_text_labels(
                                    &submitter,
                                    &mut tile,
                                    &feature.style,
                                    &geometry,
                                    &feature.text,
                                    &feature.properties,
                                );
                            }
                        }
                    }
                    tile
                });
                (scene_tile.id, handle)
            })
            .collect();
        handles
            .into_iter()
            .map(|(id, handle)| handle.join().map_err(|_| SceneError::WorkerPanicked(id)))
            .collect()
    });

    let mut tiles: Vec<(Option<u32>, MapTile)> = Vec::with_capacity(built.len());
    for (scene_tile, tile) in scene.tiles.iter().zip(built) {
        tiles.push((scene_tile.evict_after_frame, tile?));
    }

    let mut report = SceneReport::default();
    for frame in 1..=scene.frames {
        let current = FrameView::capture(view.as_ref());
        for (_, tile) in &tiles {
            tile.update_labels(&current);
        }
        labels.update_occlusions();
        report.frames.push(labels.last_frame_stats());

        tiles.retain(|(evict_after, tile)| {
            let evict = *evict_after == Some(frame);
            if evict {
                info!(tile = %tile.id(), frame, "evicting tile");
            }
            !evict
        });
    }

    for unit in labels.units() {
        let Some(label) = unit.label() else {
            continue;
        };
        let position = label.screen_transform().position;
        report.labels.push(LabelReport {
            tile: unit.tile_id(),
            style: unit.style_name().to_string(),
            label_type: label.label_type(),
            text: label.text_content().map(str::to_string),
            position: position.to_array(),
            state: label.state(),
            visible: label.is_visible(),
        });
    }

    Ok(SceneRun {
        labels,
        tiles: tiles.into_iter().map(|(_, tile)| tile).collect(),
        fonts,
        report,
    })
}
