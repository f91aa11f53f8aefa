use crate::label::{Label, LabelTransform, LabelType};
use crate::labels::LabelSubmitter;
use crate::tile::Tile;
use glam::Vec2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Feature property holding the default label text.
pub const NAME_KEY: &str = "name";

/// Line segments shorter than this (tile units) get no label.
const MIN_SEGMENT_LENGTH: f32 = 0.15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextTransform {
    #[default]
    None,
    Capitalize,
    Uppercase,
    Lowercase,
}

impl TextTransform {
    pub fn apply(self, text: &str) -> String {
        match self {
            TextTransform::None => text.to_string(),
            TextTransform::Uppercase => text.to_uppercase(),
            TextTransform::Lowercase => text.to_lowercase(),
            TextTransform::Capitalize => capitalize(text),
        }
    }
}

fn capitalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut word_start = true;
    for ch in text.chars() {
        if word_start && ch.is_alphabetic() {
            out.extend(ch.to_uppercase());
        } else {
            out.push(ch);
        }
        word_start = ch.is_whitespace();
    }
    out
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TextParams {
    pub visible: bool,
    /// Literal text overriding the feature's `name` property.
    pub text_source: Option<String>,
    pub transform: TextTransform,
}

impl Default for TextParams {
    fn default() -> Self {
        Self {
            visible: true,
            text_source: None,
            transform: TextTransform::None,
        }
    }
}

/// String properties of a feature.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Properties {
    values: BTreeMap<String, String>,
}

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get_string(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }
}

/// Feature geometry in tile-local coordinates.
#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    Point(Vec2),
    Line(Vec<Vec2>),
    /// Rings; the first is the outer boundary.
    Polygon(Vec<Vec<Vec2>>),
}

fn label_text(params: &TextParams, props: &Properties) -> Option<String> {
    if !params.visible {
        return None;
    }
    let source = match params.text_source.as_deref() {
        Some(source) if !source.is_empty() => source,
        _ => props.get_string(NAME_KEY)?,
    };
    if source.is_empty() {
        return None;
    }
    Some(params.transform.apply(source))
}

fn centroid(rings: &[Vec<Vec2>]) -> Option<Vec2> {
    let mut sum = Vec2::ZERO;
    let mut n = 0usize;
    for point in rings.iter().flatten() {
        sum += *point;
        n += 1;
    }
    (n > 0).then(|| sum / n as f32)
}

/// Segments that carry a line label: sampled every `len / 2` vertices,
/// skipping very short ones.
fn line_segments(line: &[Vec2]) -> impl Iterator<Item = (Vec2, Vec2)> + '_ {
    let stride = (line.len() / 2).max(1);
    (0..line.len().saturating_sub(1))
        .step_by(stride)
        .map(|i| (line[i], line[i + 1]))
        .filter(|(p1, p2)| p1.distance(*p2) >= MIN_SEGMENT_LENGTH)
}

/// Build the text labels for one feature. Labels rejected by the registry
/// are left out of the result.
pub fn build_text_labels(
    submitter: &LabelSubmitter,
    tile: &mut dyn Tile,
    style_name: &str,
    geometry: &Geometry,
    params: &TextParams,
    props: &Properties,
) -> Vec<Arc<Label>> {
    let Some(text) = label_text(params, props) else {
        return Vec::new();
    };

    let mut out = Vec::new();
    match geometry {
        Geometry::Point(point) => {
            out.extend(submitter.add_text_label(
                tile,
                style_name,
                LabelTransform::point(*point),
                &text,
                LabelType::Point,
            ));
        }
        Geometry::Line(line) => {
            for (p1, p2) in line_segments(line) {
                out.extend(submitter.add_text_label(
                    tile,
                    style_name,
                    LabelTransform::segment(p1, p2),
                    &text,
                    LabelType::Line,
                ));
            }
        }
        Geometry::Polygon(rings) => {
            if let Some(center) = centroid(rings) {
                out.extend(submitter.add_text_label(
                    tile,
                    style_name,
                    LabelTransform::point(center),
                    &text,
                    LabelType::Polygon,
                ));
            }
        }
    }
    out
}

/// Build icon labels for one feature. Lines carry no icons.
pub fn build_sprite_labels(
    submitter: &LabelSubmitter,
    tile: &mut dyn Tile,
    style_name: &str,
    geometry: &Geometry,
    size: Vec2,
) -> Vec<Arc<Label>> {
    let anchor = match geometry {
        Geometry::Point(point) => Some(*point),
        Geometry::Polygon(rings) => centroid(rings),
        Geometry::Line(_) => None,
    };
    anchor
        .and_then(|at| {
            submitter.add_sprite_label(tile, style_name, LabelTransform::point(at), size)
        })
        .into_iter()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FontConfig, LabelsConfig};
    use crate::font::AtlasFontContext;
    use crate::labels::Labels;
    use crate::tile::MapTile;
    use crate::unit::TileId;
    use crate::view::FixedView;
    use glam::Mat4;

    fn registry() -> Labels {
        let view = Arc::new(FixedView::new(400.0, 400.0, 10.0, 18.0));
        let fonts = Arc::new(AtlasFontContext::new(&FontConfig::default()));
        fonts.bind_buffer();
        Labels::new(view, fonts, LabelsConfig::default())
    }

    fn tile() -> MapTile {
        MapTile::with_model(TileId::new(0, 0, 10), Mat4::IDENTITY)
    }

    fn named(name: &str) -> Properties {
        Properties::new().with(NAME_KEY, name)
    }

    #[test]
    fn text_transforms() {
        assert_eq!(TextTransform::Uppercase.apply("rua augusta"), "RUA AUGUSTA");
        assert_eq!(TextTransform::Lowercase.apply("Rua Augusta"), "rua augusta");
        assert_eq!(TextTransform::Capitalize.apply("rua  da prata"), "Rua  Da Prata");
        assert_eq!(TextTransform::None.apply("rua"), "rua");
    }

    #[test]
    fn text_source_overrides_name() {
        let params = TextParams {
            text_source: Some("Override".to_string()),
            ..TextParams::default()
        };
        assert_eq!(label_text(&params, &named("Name")).as_deref(), Some("Override"));
        assert_eq!(label_text(&TextParams::default(), &named("Name")).as_deref(), Some("Name"));
    }

    #[test]
    fn invisible_or_empty_builds_nothing() {
        let labels = registry();
        let submitter = labels.submitter();
        let mut tile = tile();
        let hidden = TextParams {
            visible: false,
            ..TextParams::default()
        };
        let point = Geometry::Point(Vec2::splat(50.0));
        assert!(
            build_text_labels(&submitter, &mut tile, "places", &point, &hidden, &named("A"))
                .is_empty()
        );
        let params = TextParams::default();
        let unnamed = Properties::new();
        assert!(
            build_text_labels(&submitter, &mut tile, "places", &point, &params, &unnamed)
                .is_empty()
        );
        assert!(
            build_text_labels(&submitter, &mut tile, "places", &point, &params, &named(""))
                .is_empty()
        );
        assert_eq!(tile.label_count(), 0);
    }

    #[test]
    fn line_labels_sample_every_other_segment() {
        let labels = registry();
        let submitter = labels.submitter();
        let mut tile = tile();
        let line = Geometry::Line(vec![
            Vec2::new(0.0, 0.0),
            Vec2::new(40.0, 0.0),
            Vec2::new(80.0, 0.0),
            Vec2::new(120.0, 0.0),
            Vec2::new(160.0, 0.0),
        ]);
        let built = build_text_labels(
            &submitter,
            &mut tile,
            "roads",
            &line,
            &TextParams::default(),
            &named("Main St"),
        );
        // Stride 2 over four segments picks segments 0 and 2.
        assert_eq!(built.len(), 2);
        assert!(built.iter().all(|l| l.label_type() == LabelType::Line));
        assert_eq!(built[1].transform().position1, Vec2::new(80.0, 0.0));
    }

    #[test]
    fn short_segments_are_skipped() {
        let segments: Vec<_> = line_segments(&[Vec2::ZERO, Vec2::new(0.1, 0.0)]).collect();
        assert!(segments.is_empty());
        assert_eq!(line_segments(&[Vec2::ZERO]).count(), 0);
        assert_eq!(line_segments(&[]).count(), 0);
    }

    #[test]
    fn polygon_label_sits_on_vertex_centroid() {
        let labels = registry();
        let submitter = labels.submitter();
        let mut tile = tile();
        let square = Geometry::Polygon(vec![vec![
            Vec2::new(0.0, 0.0),
            Vec2::new(100.0, 0.0),
            Vec2::new(100.0, 100.0),
            Vec2::new(0.0, 100.0),
        ]]);
        let built = build_text_labels(
            &submitter,
            &mut tile,
            "parks",
            &square,
            &TextParams::default(),
            &named("Park"),
        );
        assert_eq!(built.len(), 1);
        assert_eq!(built[0].label_type(), LabelType::Polygon);
        assert_eq!(built[0].transform().position1, Vec2::splat(50.0));
        assert!(build_text_labels(
            &submitter,
            &mut tile,
            "parks",
            &Geometry::Polygon(Vec::new()),
            &TextParams::default(),
            &named("Park"),
        )
        .is_empty());
    }

    #[test]
    fn sprites_skip_lines() {
        let labels = registry();
        let submitter = labels.submitter();
        let mut tile = tile();
        let size = Vec2::splat(12.0);
        let point = Geometry::Point(Vec2::splat(20.0));
        let line = Geometry::Line(vec![Vec2::ZERO, Vec2::splat(30.0)]);
        assert_eq!(build_sprite_labels(&submitter, &mut tile, "icons", &point, size).len(), 1);
        assert!(build_sprite_labels(&submitter, &mut tile, "icons", &line, size).is_empty());
        assert_eq!(labels.pending_len(), 1);
    }
}
