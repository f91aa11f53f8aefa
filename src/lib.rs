pub mod builder;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod debug;
pub mod font;
pub mod isect;
pub mod label;
pub mod labels;
pub mod render;
pub mod scene;
pub mod text_metrics;
pub mod tile;
pub mod unit;
pub mod view;

#[cfg(feature = "cli")]
pub use cli::run;
pub use labels::{FrameStats, LabelSubmitter, Labels, lod_discard};
