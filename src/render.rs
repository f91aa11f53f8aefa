use crate::config::RenderConfig;
use crate::debug::{DebugCanvas, DebugSettings};
use crate::label::{Label, LabelState};
use crate::labels::Labels;
use anyhow::Result;
use glam::Vec2;
use std::path::Path;

/// Debug canvas that collects SVG elements.
#[derive(Debug, Clone)]
pub struct SvgCanvas {
    poly_color: String,
    grid_color: String,
    markup: String,
}

impl SvgCanvas {
    pub fn new(poly_color: impl Into<String>, grid_color: impl Into<String>) -> Self {
        Self {
            poly_color: poly_color.into(),
            grid_color: grid_color.into(),
            markup: String::new(),
        }
    }

    pub fn markup(&self) -> &str {
        &self.markup
    }

    pub fn into_markup(self) -> String {
        self.markup
    }
}

impl DebugCanvas for SvgCanvas {
    fn draw_poly(&mut self, points: &[Vec2], _resolution: Vec2) {
        if points.is_empty() {
            return;
        }
        self.markup.push_str(&format!(
            "<polygon points=\"{}\" fill=\"none\" stroke=\"{}\" stroke-width=\"1\"/>",
            points_attr(points),
            self.poly_color
        ));
    }

    fn draw_rect(&mut self, min: Vec2, max: Vec2, _resolution: Vec2) {
        let size = max - min;
        self.markup.push_str(&format!(
            "<rect x=\"{:.2}\" y=\"{:.2}\" width=\"{:.2}\" height=\"{:.2}\" fill=\"none\" stroke=\"{}\" stroke-width=\"0.5\" stroke-dasharray=\"4 4\"/>",
            min.x, min.y, size.x, size.y, self.grid_color
        ));
    }
}

fn points_attr(points: &[Vec2]) -> String {
    points
        .iter()
        .map(|p| format!("{:.2},{:.2}", p.x, p.y))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Render the registry's labels as they would appear this frame.
///
/// Visible labels are drawn as boxes with their text; occluded ones become
/// dashed outlines when `show_occluded` is set. `overlay` adds the debug
/// geometry if its label flag is on.
pub fn render_labels_svg(
    labels: &Labels,
    config: &RenderConfig,
    overlay: Option<&DebugSettings>,
) -> String {
    let resolution = labels.frame().screen_size;
    let width = if resolution.x > 0.0 { resolution.x } else { config.width };
    let height = if resolution.y > 0.0 { resolution.y } else { config.height };

    let mut svg = String::new();
    svg.push_str(&format!(
        "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{width}\" height=\"{height}\" viewBox=\"0 0 {width} {height}\">",
    ));
    svg.push_str(&format!(
        "<rect width=\"100%\" height=\"100%\" fill=\"{}\"/>",
        config.background
    ));

    for unit in labels.units() {
        let Some(label) = unit.label() else {
            continue;
        };
        if !label.can_occlude() {
            let center = label.screen_transform().position;
            svg.push_str(&format!(
                "<circle cx=\"{:.2}\" cy=\"{:.2}\" r=\"2\" fill=\"{}\"/>",
                center.x, center.y, config.debug_color
            ));
        } else if label.is_visible() {
            svg.push_str(&label_svg(&label, config));
        } else if config.show_occluded && label.state() != LabelState::NewPositionWait {
            svg.push_str(&format!(
                "<polygon points=\"{}\" fill=\"none\" stroke=\"{}\" stroke-width=\"1\" stroke-dasharray=\"3 3\"/>",
                points_attr(label.obb().quad()),
                config.occluded_stroke
            ));
        }
    }

    if let Some(settings) = overlay {
        let mut canvas = SvgCanvas::new(&config.debug_color, &config.grid_color);
        labels.draw_debug(settings, &mut canvas);
        svg.push_str(canvas.markup());
    }

    svg.push_str("</svg>");
    svg
}

fn label_svg(label: &Label, config: &RenderConfig) -> String {
    let obb = label.obb();
    let mut out = format!(
        "<polygon points=\"{}\" fill=\"{}\" stroke=\"{}\" stroke-width=\"1\"/>",
        points_attr(obb.quad()),
        config.label_fill,
        config.label_stroke
    );

    let Some(text) = label.text_content() else {
        return out;
    };
    let center = obb.center();
    let degrees = obb.angle().to_degrees();
    let lines: Vec<&str> = text.lines().collect();
    // Run height includes line spacing, so this is only approximate.
    let font_size = label.dimension().y / lines.len().max(1) as f32 * 0.8;
    let line_step = label.dimension().y / lines.len().max(1) as f32;
    let start_y = center.y - line_step * (lines.len().saturating_sub(1)) as f32 / 2.0;

    out.push_str(&format!(
        "<text x=\"{:.2}\" y=\"{start_y:.2}\" transform=\"rotate({degrees:.2} {:.2} {:.2})\" text-anchor=\"middle\" dominant-baseline=\"central\" font-family=\"{}\" font-size=\"{font_size:.2}\" fill=\"{}\">",
        center.x,
        center.x,
        center.y,
        escape_xml(&config.font_family),
        config.text_color
    ));
    for (idx, line) in lines.iter().enumerate() {
        let dy = if idx == 0 { 0.0 } else { line_step };
        out.push_str(&format!(
            "<tspan x=\"{:.2}\" dy=\"{dy:.2}\">{}</tspan>",
            center.x,
            escape_xml(line)
        ));
    }
    out.push_str("</text>");
    out
}

pub fn write_output_svg(svg: &str, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, svg)?;
        }
        None => {
            print!("{}", svg);
        }
    }
    Ok(())
}

#[cfg(feature = "png")]
pub fn write_output_png(svg: &str, output: &Path, render_cfg: &RenderConfig) -> Result<()> {
    let mut opt = usvg::Options::default();
    opt.fontdb_mut().load_system_fonts();
    if let Some(family) = render_cfg.font_family.split(',').next() {
        opt.font_family = family.trim().trim_matches('"').to_string();
    }
    opt.default_size = usvg::Size::from_wh(render_cfg.width, render_cfg.height)
        .or_else(|| usvg::Size::from_wh(800.0, 600.0))
        .ok_or_else(|| anyhow::anyhow!("Invalid default canvas size"))?;

    let tree = usvg::Tree::from_str(svg, &opt)?;
    let size = tree.size().to_int_size();
    let mut pixmap = resvg::tiny_skia::Pixmap::new(size.width(), size.height())
        .ok_or_else(|| anyhow::anyhow!("Failed to allocate pixmap"))?;

    let mut pixmap_mut = pixmap.as_mut();
    resvg::render(&tree, resvg::tiny_skia::Transform::default(), &mut pixmap_mut);
    pixmap.save_png(output)?;
    Ok(())
}

fn escape_xml(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
