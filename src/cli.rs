use crate::config::load_config;
use crate::debug::{DebugFlags, DebugSettings};
use crate::render::{render_labels_svg, write_output_svg};
#[cfg(feature = "png")]
use crate::render::write_output_png;
use crate::scene::{Scene, load_scene, parse_scene, run_scene};
use anyhow::Result;
use clap::{Parser, ValueEnum};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "labelsim", version, about = "Simulate map label occlusion for a tile scene")]
pub struct Args {
    /// Scene file (JSON/JSON5) or '-' for stdin
    #[arg(short = 'i', long = "input")]
    pub input: Option<PathBuf>,

    /// Output file (svg/png). Defaults to stdout for SVG if omitted.
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,

    /// Output format
    #[arg(short = 'e', long = "outputFormat", value_enum, default_value = "svg")]
    pub output_format: OutputFormat,

    /// Config JSON file (grid, font atlas, colours)
    #[arg(short = 'c', long = "configFile")]
    pub config: Option<PathBuf>,

    /// Number of frames to resolve, overriding the scene
    #[arg(short = 'f', long = "frames")]
    pub frames: Option<u32>,

    /// Draw label boxes and the broad-phase grid
    #[arg(long = "debug")]
    pub debug: bool,

    /// Print a JSON report instead of rendering
    #[arg(long = "report")]
    pub report: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum OutputFormat {
    Svg,
    Png,
}

pub fn run() -> Result<()> {
    let args = Args::parse();
    let config = load_config(args.config.as_deref())?;

    let mut scene = read_scene(args.input.as_deref())?;
    if let Some(frames) = args.frames {
        scene.frames = frames;
    }

    let run = run_scene(&scene, &config)?;
    info!(
        labels = run.report.labels.len(),
        visible = run.report.visible_count(),
        atlas_usage = run.fonts.atlas_usage(),
        "scene resolved"
    );

    if args.report {
        println!("{}", serde_json::to_string_pretty(&run.report)?);
        return Ok(());
    }

    let overlay = args.debug.then(|| DebugSettings::new(DebugFlags::LABELS));
    let mut render_config = config.render.clone();
    render_config.width = scene.view.width;
    render_config.height = scene.view.height;
    let svg = render_labels_svg(&run.labels, &render_config, overlay.as_ref());

    match args.output_format {
        OutputFormat::Svg => {
            write_output_svg(&svg, args.output.as_deref())?;
        }
        OutputFormat::Png => {
            let output = ensure_output(&args.output, "png")?;
            write_png(&svg, &output, &render_config)?;
        }
    }
    Ok(())
}

#[cfg(feature = "png")]
fn write_png(svg: &str, output: &Path, render_config: &crate::config::RenderConfig) -> Result<()> {
    write_output_png(svg, output, render_config)
}

#[cfg(not(feature = "png"))]
fn write_png(
    _svg: &str,
    _output: &Path,
    _render_config: &crate::config::RenderConfig,
) -> Result<()> {
    Err(anyhow::anyhow!("PNG output requires the `png` feature"))
}

fn read_scene(path: Option<&Path>) -> Result<Scene> {
    match path {
        Some(path) if path != Path::new("-") => Ok(load_scene(path)?),
        _ => {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf)?;
            Ok(parse_scene(&buf)?)
        }
    }
}

fn ensure_output(output: &Option<PathBuf>, ext: &str) -> Result<PathBuf> {
    if let Some(path) = output {
        return Ok(path.clone());
    }
    Err(anyhow::anyhow!("Output path required for {} output", ext))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flags() {
        let args = Args::parse_from([
            "labelsim", "-i", "scene.json", "-e", "png", "-o", "out.png", "-f", "4", "--debug",
        ]);
        assert_eq!(args.input.as_deref(), Some(Path::new("scene.json")));
        assert!(matches!(args.output_format, OutputFormat::Png));
        assert_eq!(args.frames, Some(4));
        assert!(args.debug);
        assert!(!args.report);
    }

    #[test]
    fn png_needs_output_path() {
        assert!(ensure_output(&None, "png").is_err());
        let path = PathBuf::from("a.png");
        assert_eq!(ensure_output(&Some(path.clone()), "png").ok(), Some(path));
    }
}
