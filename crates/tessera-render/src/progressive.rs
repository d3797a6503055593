use crate::error::Result;
use crate::integrator::TileRenderer;
use rayon::prelude::*;
use rayon::ThreadPool;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tessera_fb::{FrameBuffer, Tile, TileCoord};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy)]
pub struct ProgressiveSettings {
    pub max_frames: u32,
    /// Tiles whose error is at or below this are skipped. 0 renders every tile.
    pub error_threshold: f32,
    /// Worker threads; 0 uses the global rayon pool.
    pub threads: usize,
}

impl Default for ProgressiveSettings {
    fn default() -> Self {
        Self {
            max_frames: 64,
            error_threshold: 0.0,
            threads: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameReport {
    /// Zero-based index of the finished frame.
    pub frame: u32,
    pub tiles_rendered: usize,
    /// Largest tile error after the frame.
    pub frame_error: f32,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    FrameLimit,
    Converged,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderSummary {
    pub frames: u32,
    pub tiles_rendered: usize,
    pub frame_error: f32,
    pub stop: StopReason,
    pub elapsed: Duration,
}

/// Drives a [`TileRenderer`] over a frame buffer one frame at a time.
pub struct ProgressiveRenderer<'a, 'ext, R> {
    fb: &'a FrameBuffer<'ext>,
    renderer: R,
    settings: ProgressiveSettings,
}

impl<'a, 'ext, R: TileRenderer> ProgressiveRenderer<'a, 'ext, R> {
    pub fn new(fb: &'a FrameBuffer<'ext>, renderer: R, settings: ProgressiveSettings) -> Self {
        Self {
            fb,
            renderer,
            settings,
        }
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    /// Whether tiles below the error threshold are skipped.
    pub fn is_adaptive(&self) -> bool {
        self.settings.error_threshold > 0.0 && self.fb.has_variance()
    }

    /// Tiles the next frame will render.
    pub fn pending_tiles(&self) -> Vec<TileCoord> {
        let adaptive = self.is_adaptive();
        self.fb
            .grid()
            .coords()
            .filter(|&coord| !adaptive || self.fb.tile_error(coord) > self.settings.error_threshold)
            .collect()
    }

    /// Renders and submits one frame, then closes it with `end_frame`.
    pub fn render_frame(&self, frame: u32, cancel: &AtomicBool) -> FrameReport {
        let start = Instant::now();
        let pending = self.pending_tiles();
        let extent = self.fb.extent();
        let rendered = AtomicUsize::new(0);

        pending.par_iter().for_each_init(
            || None::<Tile>,
            |scratch, &coord| {
                if cancel.load(Ordering::Relaxed) {
                    return;
                }
                let tile = scratch.get_or_insert_with(|| Tile::new(coord, extent));
                tile.reset(coord);
                tile.accum_id = self.fb.accum_id(coord);
                self.renderer.render_tile(tile);
                self.fb.set_tile(tile);
                rendered.fetch_add(1, Ordering::Relaxed);
            },
        );

        let frame_error = self.fb.end_frame();
        FrameReport {
            frame,
            tiles_rendered: rendered.into_inner(),
            frame_error,
            elapsed: start.elapsed(),
        }
    }

    /// Renders frames until the frame limit, convergence or cancellation.
    pub fn run<F>(&self, cancel: &AtomicBool, mut on_frame: F) -> Result<RenderSummary>
    where
        F: FnMut(&FrameReport),
    {
        let pool = thread_pool(self.settings.threads)?;
        let start = Instant::now();
        let max_frames = self.settings.max_frames.max(1);
        let mut summary = RenderSummary {
            frames: 0,
            tiles_rendered: 0,
            frame_error: self.fb.accum_index().max_error(),
            stop: StopReason::FrameLimit,
            elapsed: Duration::ZERO,
        };

        debug!(
            tiles = self.fb.grid().tile_count(),
            max_frames,
            threshold = self.settings.error_threshold,
            adaptive = self.is_adaptive(),
            "progressive render starting"
        );

        for frame in 0..max_frames {
            if cancel.load(Ordering::Relaxed) {
                summary.stop = StopReason::Cancelled;
                break;
            }
            if self.is_adaptive() && self.pending_tiles().is_empty() {
                summary.stop = StopReason::Converged;
                break;
            }

            let report = install(pool.as_ref(), || self.render_frame(frame, cancel));
            summary.frames += 1;
            summary.tiles_rendered += report.tiles_rendered;
            summary.frame_error = report.frame_error;

            let elapsed = start.elapsed().as_secs_f64();
            let done = frame + 1;
            let remaining = elapsed / done as f64 * (max_frames - done) as f64;
            info!(
                "render: frame {}/{} tiles {} error {:.4} elapsed {:.1}s eta {:.1}s",
                done, max_frames, report.tiles_rendered, report.frame_error, elapsed, remaining
            );
            on_frame(&report);
        }

        if summary.stop == StopReason::FrameLimit && cancel.load(Ordering::Relaxed) {
            summary.stop = StopReason::Cancelled;
        }
        summary.elapsed = start.elapsed();
        info!(
            "render: stopped after {} frames ({:?}) error {:.4}",
            summary.frames, summary.stop, summary.frame_error
        );
        Ok(summary)
    }
}

fn thread_pool(threads: usize) -> Result<Option<ThreadPool>> {
    if threads == 0 {
        return Ok(None);
    }
    let pool = rayon::ThreadPoolBuilder::new().num_threads(threads).build()?;
    Ok(Some(pool))
}

fn install<T: Send>(pool: Option<&ThreadPool>, f: impl FnOnce() -> T + Send) -> T {
    match pool {
        Some(pool) => pool.install(f),
        None => f(),
    }
}
