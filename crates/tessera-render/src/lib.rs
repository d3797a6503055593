//! Minimal CPU path tracer that renders progressively into a tiled frame buffer.
//!
//! [`PathTracer`] produces one sample per pixel per generation for a tile, and
//! [`ProgressiveRenderer`] schedules tiles over a [`tessera_fb::FrameBuffer`],
//! skipping tiles whose error estimate is already below the threshold.

pub mod bvh;
pub mod camera;
pub mod error;
pub mod geometry;
pub mod image_out;
pub mod integrator;
pub mod light;
pub mod material;
pub mod math;
pub mod progressive;
pub mod scene;

pub use error::{RenderError, Result};
pub use integrator::{PathTracer, PixelSample, TileRenderer, TraceSettings};
pub use progressive::{FrameReport, ProgressiveRenderer, ProgressiveSettings, RenderSummary, StopReason};
pub use scene::Scene;

use image::RgbaImage;
use std::sync::atomic::AtomicBool;
use tessera_fb::{Channels, ColorFormat, Extent, FrameBuffer};
use tessera_model::SceneFile;

/// One-shot render settings for [`render_scene`].
#[derive(Debug, Clone, Copy)]
pub struct RenderSettings {
    pub width: u32,
    pub height: u32,
    pub frames: u32,
    pub error_threshold: f32,
    pub max_depth: u32,
    pub seed: u64,
    pub threads: usize,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            width: 320,
            height: 240,
            frames: 16,
            error_threshold: 0.0,
            max_depth: TraceSettings::default().max_depth,
            seed: 1,
            threads: 0,
        }
    }
}

/// Renders a scene into an accumulating RGBA32F frame buffer and returns the
/// quantized color.
pub fn render_scene(file: &SceneFile, settings: &RenderSettings) -> Result<RgbaImage> {
    let scene = Scene::from_file(file)?;
    let extent = Extent::new(settings.width, settings.height);
    let fb = FrameBuffer::new(
        extent,
        ColorFormat::Rgba32f,
        Channels::ACCUM | Channels::VARIANCE | Channels::DEPTH,
    )?;
    let tracer = PathTracer::new(
        &scene,
        extent,
        TraceSettings {
            seed: settings.seed,
            max_depth: settings.max_depth,
        },
    );
    let renderer = ProgressiveRenderer::new(
        &fb,
        tracer,
        ProgressiveSettings {
            max_frames: settings.frames,
            error_threshold: settings.error_threshold,
            threads: settings.threads,
        },
    );
    renderer.run(&AtomicBool::new(false), |_| {})?;
    image_out::color_image(&fb)
}
