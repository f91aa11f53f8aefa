use crate::isect::MAX_GRID_SPLIT;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Upper bound of the zoom-distance label discard.
pub const MAX_LOD: i32 = 6;

/// Largest accepted font size in pixels.
pub const MAX_FONT_SIZE: f32 = 512.0;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelsConfig {
    /// Broad-phase grid resolution in cells (columns, rows).
    pub grid_split: [u32; 2],
    pub max_lod: i32,
}

impl Default for LabelsConfig {
    fn default() -> Self {
        Self {
            grid_split: [4, 4],
            max_lod: MAX_LOD,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FontConfig {
    /// CSS-like family list resolved against system fonts. `None` measures
    /// with fixed advances.
    pub family: Option<String>,
    pub size: f32,
    pub line_height: f32,
    pub atlas_width: u32,
    pub atlas_height: u32,
    pub glyph_padding: u32,
}

impl Default for FontConfig {
    fn default() -> Self {
        Self {
            family: None,
            size: 16.0,
            line_height: 1.2,
            atlas_width: 512,
            atlas_height: 512,
            glyph_padding: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderConfig {
    pub width: f32,
    pub height: f32,
    pub background: String,
    pub font_family: String,
    pub label_fill: String,
    pub label_stroke: String,
    pub text_color: String,
    pub occluded_stroke: String,
    pub debug_color: String,
    pub grid_color: String,
    /// Draw occluded labels as dashed outlines instead of omitting them.
    pub show_occluded: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            width: 800.0,
            height: 600.0,
            background: "#F4F1EA".to_string(),
            font_family: "Inter, Segoe UI, system-ui, sans-serif".to_string(),
            label_fill: "#FFFFFF".to_string(),
            label_stroke: "#5B6B82".to_string(),
            text_color: "#1C2430".to_string(),
            occluded_stroke: "#C0392B".to_string(),
            debug_color: "#00A3FF".to_string(),
            grid_color: "#9AA5B1".to_string(),
            show_occluded: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Config {
    pub labels: LabelsConfig,
    pub font: FontConfig,
    pub render: RenderConfig,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct LabelsConfigFile {
    grid_split: Option<[u32; 2]>,
    max_lod: Option<i32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct FontConfigFile {
    family: Option<String>,
    size: Option<f32>,
    line_height: Option<f32>,
    atlas_width: Option<u32>,
    atlas_height: Option<u32>,
    glyph_padding: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct RenderConfigFile {
    width: Option<f32>,
    height: Option<f32>,
    background: Option<String>,
    font_family: Option<String>,
    label_fill: Option<String>,
    label_stroke: Option<String>,
    text_color: Option<String>,
    occluded_stroke: Option<String>,
    debug_color: Option<String>,
    grid_color: Option<String>,
    show_occluded: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct ConfigFile {
    labels: Option<LabelsConfigFile>,
    font: Option<FontConfigFile>,
    render: Option<RenderConfigFile>,
}

pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let Some(path) = path else {
        return Ok(Config::default());
    };
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&contents)
}

/// Parse a JSON (or JSON5) config document, overlaying it on the defaults.
pub fn parse_config(contents: &str) -> Result<Config, ConfigError> {
    let parsed: ConfigFile = match serde_json::from_str(contents) {
        Ok(parsed) => parsed,
        Err(json_err) => json5::from_str(contents)
            .map_err(|_| ConfigError::Parse(json_err.to_string()))?,
    };

    let mut config = Config::default();

    if let Some(labels) = parsed.labels {
        if let Some(v) = labels.grid_split {
            config.labels.grid_split = v;
        }
        if let Some(v) = labels.max_lod {
            config.labels.max_lod = v;
        }
    }

    if let Some(font) = parsed.font {
        if font.family.is_some() {
            config.font.family = font.family;
        }
        if let Some(v) = font.size {
            config.font.size = v;
        }
        if let Some(v) = font.line_height {
            config.font.line_height = v;
        }
        if let Some(v) = font.atlas_width {
            config.font.atlas_width = v;
        }
        if let Some(v) = font.atlas_height {
            config.font.atlas_height = v;
        }
        if let Some(v) = font.glyph_padding {
            config.font.glyph_padding = v;
        }
    }

    if let Some(render) = parsed.render {
        if let Some(v) = render.width {
            config.render.width = v;
        }
        if let Some(v) = render.height {
            config.render.height = v;
        }
        if let Some(v) = render.background {
            config.render.background = v;
        }
        if let Some(v) = render.font_family {
            config.render.font_family = v;
        }
        if let Some(v) = render.label_fill {
            config.render.label_fill = v;
        }
        if let Some(v) = render.label_stroke {
            config.render.label_stroke = v;
        }
        if let Some(v) = render.text_color {
            config.render.text_color = v;
        }
        if let Some(v) = render.occluded_stroke {
            config.render.occluded_stroke = v;
        }
        if let Some(v) = render.debug_color {
            config.render.debug_color = v;
        }
        if let Some(v) = render.grid_color {
            config.render.grid_color = v;
        }
        if let Some(v) = render.show_occluded {
            config.render.show_occluded = v;
        }
    }

    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.labels.grid_split.contains(&0) {
        return Err(ConfigError::Invalid(
            "labels.gridSplit entries must be non-zero".to_string(),
        ));
    }
    if config.labels.grid_split.iter().any(|&n| n > MAX_GRID_SPLIT) {
        return Err(ConfigError::Invalid(format!(
            "labels.gridSplit entries must not exceed {MAX_GRID_SPLIT}"
        )));
    }
    if config.labels.max_lod < 0 {
        return Err(ConfigError::Invalid(
            "labels.maxLod must not be negative".to_string(),
        ));
    }
    if config.font.atlas_width == 0 || config.font.atlas_height == 0 {
        return Err(ConfigError::Invalid(
            "font atlas dimensions must be non-zero".to_string(),
        ));
    }
    if !(config.font.size > 0.0 && config.font.size <= MAX_FONT_SIZE) {
        return Err(ConfigError::Invalid(format!("font.size must be in (0, {MAX_FONT_SIZE}]")));
    }
    if !(config.font.line_height > 0.0 && config.font.line_height.is_finite()) {
        return Err(ConfigError::Invalid("font.lineHeight must be positive".to_string()));
    }
    Ok(())
}
