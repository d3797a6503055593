use rayon::prelude::*;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error};

use crate::accum::{TileAccumIndex, TileClaims};
use crate::error::{FrameBufferError, Result};
use crate::format::{Channels, ColorFormat, Extent};
use crate::mapped::{BufferKind, MappedBuffer, MappedView};
use crate::pixel_op::PixelOp;
use crate::storage::{AtomicF32, PackedRgba, Storage, Vec4Cell};
use crate::tile::{Tile, TileCoord, TileGrid};

/// Floats cleared by one parallel task. Must stay a multiple of 16 so that a block
/// never splits the channels of a pixel.
pub const CLEAR_BLOCK_SIZE: usize = 32 * 1024;

const _: () = assert!(CLEAR_BLOCK_SIZE % 16 == 0);

const CLEAR_BLOCK_PIXELS: usize = CLEAR_BLOCK_SIZE / 4;

/// Pixels whose accumulated brightness is below this add nothing to the tile error.
const MIN_ERROR_BRIGHTNESS: f32 = 1e-8;

/// A caller-owned color buffer lent to a frame buffer for its whole lifetime.
#[derive(Debug, Clone, Copy)]
pub enum ExternalColor<'ext> {
    Rgba8(&'ext [PackedRgba]),
    Rgba32f(&'ext [Vec4Cell]),
}

impl ExternalColor<'_> {
    fn format(&self) -> ColorFormat {
        match self {
            ExternalColor::Rgba8(_) => ColorFormat::Rgba8,
            ExternalColor::Rgba32f(_) => ColorFormat::Rgba32f,
        }
    }

    fn len(&self) -> usize {
        match self {
            ExternalColor::Rgba8(pixels) => pixels.len(),
            ExternalColor::Rgba32f(pixels) => pixels.len(),
        }
    }
}

enum ColorStorage<'ext> {
    None,
    Rgba8(Storage<'ext, PackedRgba>),
    Rgba32f(Storage<'ext, Vec4Cell>),
}

/// Pixel storage for one image plus the per-tile accumulation state.
///
/// Workers merge tiles through `&self`. Tiles submitted within one frame must cover
/// disjoint regions; a tile submitted while another submission of the same tile is
/// still running panics rather than racing.
pub struct FrameBuffer<'ext> {
    extent: Extent,
    grid: TileGrid,
    format: ColorFormat,
    channels: Channels,
    color: ColorStorage<'ext>,
    depth: Option<Box<[AtomicF32]>>,
    accum: Option<Box<[Vec4Cell]>>,
    variance: Option<Box<[Vec4Cell]>>,
    normal: Option<Box<[Vec4Cell]>>,
    albedo: Option<Box<[Vec4Cell]>>,
    index: TileAccumIndex,
    claims: TileClaims,
    pixel_op: Option<Arc<dyn PixelOp>>,
    map_refs: AtomicUsize,
}

impl FrameBuffer<'static> {
    pub fn new(extent: Extent, format: ColorFormat, channels: Channels) -> Result<Self> {
        Self::build(extent, format, channels, None)
    }

    /// Like [`FrameBuffer::new`], with the color format given as a raw enumerant.
    pub fn with_raw_format(extent: Extent, raw_format: u32, channels: Channels) -> Result<Self> {
        let format = ColorFormat::try_from(raw_format)?;
        Self::new(extent, format, channels)
    }
}

impl<'ext> FrameBuffer<'ext> {
    /// Builds a frame buffer that writes color into `external` instead of allocating.
    /// The buffer must hold exactly one element per pixel.
    pub fn with_external_color(
        extent: Extent,
        channels: Channels,
        external: ExternalColor<'ext>,
    ) -> Result<Self> {
        Self::build(extent, external.format(), channels, Some(external))
    }

    fn build(
        extent: Extent,
        format: ColorFormat,
        requested: Channels,
        external: Option<ExternalColor<'ext>>,
    ) -> Result<Self> {
        if extent.is_empty() {
            return Err(FrameBufferError::EmptyExtent {
                width: extent.width,
                height: extent.height,
            });
        }
        let pixels = extent.pixel_count();

        let color = match (format, external) {
            (ColorFormat::None, None) => ColorStorage::None,
            (ColorFormat::Rgba8, None) => ColorStorage::Rgba8(Storage::allocate(pixels)),
            (ColorFormat::Rgba32f, None) => ColorStorage::Rgba32f(Storage::allocate(pixels)),
            (_, Some(external)) if external.len() != pixels => {
                return Err(FrameBufferError::ExternalBufferSize {
                    expected: pixels,
                    actual: external.len(),
                });
            }
            (_, Some(ExternalColor::Rgba8(buffer))) => {
                ColorStorage::Rgba8(Storage::External(buffer))
            }
            (_, Some(ExternalColor::Rgba32f(buffer))) => {
                ColorStorage::Rgba32f(Storage::External(buffer))
            }
        };

        let mut channels = requested - Channels::COLOR;
        if format != ColorFormat::None {
            channels |= Channels::COLOR;
        }
        if channels.contains(Channels::VARIANCE) && !channels.contains(Channels::ACCUM) {
            debug!(extent = %extent, "variance buffer without accumulation buffer; tile errors stay unmeasured");
        }

        let float_buffer = |channel: Channels| {
            channels
                .contains(channel)
                .then(|| (0..pixels).map(|_| Vec4Cell::default()).collect::<Box<[_]>>())
        };

        let grid = TileGrid::new(extent);
        let frame_buffer = Self {
            extent,
            grid,
            format,
            channels,
            color,
            depth: channels
                .contains(Channels::DEPTH)
                .then(|| (0..pixels).map(|_| AtomicF32::new(f32::INFINITY)).collect()),
            accum: float_buffer(Channels::ACCUM),
            variance: float_buffer(Channels::VARIANCE),
            normal: float_buffer(Channels::NORMAL),
            albedo: float_buffer(Channels::ALBEDO),
            index: TileAccumIndex::new(grid, channels.contains(Channels::VARIANCE)),
            claims: TileClaims::new(grid),
            pixel_op: None,
            map_refs: AtomicUsize::new(0),
        };

        debug!(
            extent = %extent,
            format = %format,
            channels = ?channels,
            tiles = grid.tile_count(),
            external_color = frame_buffer.color_is_external(),
            "allocated frame buffer"
        );
        Ok(frame_buffer)
    }

    pub fn extent(&self) -> Extent {
        self.extent
    }

    pub fn grid(&self) -> TileGrid {
        self.grid
    }

    pub fn color_format(&self) -> ColorFormat {
        self.format
    }

    /// Channels actually allocated.
    pub fn channels(&self) -> Channels {
        self.channels
    }

    pub fn has_accum(&self) -> bool {
        self.accum.is_some()
    }

    pub fn has_variance(&self) -> bool {
        self.variance.is_some()
    }

    pub fn color_is_external(&self) -> bool {
        match &self.color {
            ColorStorage::None => false,
            ColorStorage::Rgba8(storage) => storage.is_external(),
            ColorStorage::Rgba32f(storage) => storage.is_external(),
        }
    }

    /// Installs or removes the pixel operation applied inside `set_tile`.
    pub fn set_pixel_op(&mut self, op: Option<Arc<dyn PixelOp>>) {
        self.pixel_op = op;
    }

    pub fn accum_id(&self, coord: TileCoord) -> i32 {
        self.index.accum_id(coord)
    }

    /// Error estimate of a tile: +inf until measured, 0 when variance is not tracked.
    pub fn tile_error(&self, coord: TileCoord) -> f32 {
        self.index.tile_error(coord)
    }

    pub fn accum_index(&self) -> &TileAccumIndex {
        &self.index
    }

    /// Resets accumulation state when `mask` contains [`Channels::ACCUM`]. Color and
    /// depth are left alone; the next pass rewrites every pixel anyway.
    pub fn clear(&self, mask: Channels) {
        if !mask.contains(Channels::ACCUM) {
            return;
        }
        let start = Instant::now();
        for buffer in [&self.accum, &self.variance].into_iter().flatten() {
            buffer.par_chunks(CLEAR_BLOCK_PIXELS).for_each(|block| {
                for cell in block {
                    cell.store([0.0; 4]);
                }
            });
        }
        self.index.reset();
        self.claims.clear_touched();
        debug!(
            extent = %self.extent,
            elapsed_us = start.elapsed().as_micros() as u64,
            "cleared accumulation"
        );
    }

    /// Merges a rendered tile: pre-accumulation op, accumulation and variance update,
    /// post-accumulation op, then conversion into the color buffer.
    ///
    /// Accumulated values are written back into `tile`.
    ///
    /// # Panics
    ///
    /// Panics if the tile was made for an image of another size, or if the same tile
    /// is concurrently being merged by another caller.
    pub fn set_tile(&self, tile: &mut Tile) {
        assert_eq!(
            tile.fb_extent(),
            self.extent,
            "tile built for a {} image submitted to a {} frame buffer",
            tile.fb_extent(),
            self.extent
        );
        let tile_index = self.grid.index(tile.coord());
        let _claim = self.claims.claim(tile_index);

        if let Some(op) = &self.pixel_op {
            op.pre_accum(tile);
        }
        if let Some(accum) = &self.accum {
            self.accumulate_tile(accum, tile, tile_index);
        }
        if let Some(op) = &self.pixel_op {
            op.post_accum(tile);
        }
        self.write_tile(tile);
    }

    fn pixel_index(&self, x: u32, y: u32) -> usize {
        y as usize * self.extent.width as usize + x as usize
    }

    fn accumulate_tile(&self, accum: &[Vec4Cell], tile: &mut Tile, tile_index: usize) {
        let generation = tile.accum_id.max(0);
        let weight = 1.0 / (generation as f32 + 1.0);
        // Odd generations also feed a second mean built from half the samples.
        let odd_samples = self.variance.as_deref().filter(|_| generation & 1 == 1);
        let odd_weight = 1.0 / ((generation / 2) as f32 + 1.0);
        let mut error_sum = 0.0_f64;

        let region = tile.region();
        for y in region.y0..region.y1 {
            for x in region.x0..region.x1 {
                let pixel = self.pixel_index(x, y);
                let slot = tile.slot(x, y);
                let sample = tile.rgba[slot];

                let mean = if generation == 0 {
                    sample
                } else {
                    running_mean(accum[pixel].load(), sample, weight)
                };
                accum[pixel].store(mean);

                if let Some(variance) = odd_samples {
                    let odd_mean = if generation == 1 {
                        sample
                    } else {
                        running_mean(variance[pixel].load(), sample, odd_weight)
                    };
                    variance[pixel].store(odd_mean);
                    error_sum += f64::from(pixel_error(mean, odd_mean));
                }
                tile.rgba[slot] = mean;

                if let Some(normal) = &self.normal {
                    let previous = normal[pixel].load3();
                    tile.normal[slot] = running_mean3(previous, tile.normal[slot], generation, weight);
                }
                if let Some(albedo) = &self.albedo {
                    let previous = albedo[pixel].load3();
                    tile.albedo[slot] = running_mean3(previous, tile.albedo[slot], generation, weight);
                }
            }
        }

        if odd_samples.is_some() {
            let error = (error_sum / region.pixel_count() as f64) as f32;
            // Non-finite samples leave the tile unconverged.
            let error = if error.is_finite() { error } else { f32::INFINITY };
            self.index.set_error(tile_index, error);
        }
    }

    fn write_tile(&self, tile: &Tile) {
        match &self.color {
            ColorStorage::None => {}
            ColorStorage::Rgba8(buffer) => {
                for (x, y, slot) in tile.pixels() {
                    buffer[self.pixel_index(x, y)].store(quantize_rgba8(tile.rgba[slot]));
                }
            }
            ColorStorage::Rgba32f(buffer) => {
                for (x, y, slot) in tile.pixels() {
                    buffer[self.pixel_index(x, y)].store(tile.rgba[slot]);
                }
            }
        }
        if let Some(depth) = &self.depth {
            for (x, y, slot) in tile.pixels() {
                depth[self.pixel_index(x, y)].store(tile.depth[slot]);
            }
        }
        if let Some(normal) = &self.normal {
            for (x, y, slot) in tile.pixels() {
                normal[self.pixel_index(x, y)].store3(tile.normal[slot]);
            }
        }
        if let Some(albedo) = &self.albedo {
            for (x, y, slot) in tile.pixels() {
                albedo[self.pixel_index(x, y)].store3(tile.albedo[slot]);
            }
        }
    }

    /// Closes a progressive frame: advances the generation of every tile merged since
    /// the previous call (or the shared slot once) and returns the largest tile error.
    pub fn end_frame(&self) -> f32 {
        let touched = self.claims.take_touched();
        if self.index.tracks_error() {
            for &tile_index in &touched {
                self.index.advance(tile_index);
            }
        } else if !touched.is_empty() {
            self.index.advance(0);
        }
        self.index.max_error()
    }

    /// Maps a buffer for reading. Returns `None` when the buffer was not allocated.
    pub fn map_buffer(&self, kind: BufferKind) -> Option<MappedBuffer<'_>> {
        let view = match kind {
            BufferKind::Color => match &self.color {
                ColorStorage::None => return None,
                ColorStorage::Rgba8(buffer) => MappedView::Rgba8(buffer),
                ColorStorage::Rgba32f(buffer) => MappedView::Rgba32f(buffer),
            },
            BufferKind::Depth => MappedView::Depth(self.depth.as_deref()?),
            BufferKind::Normal => MappedView::Vec3(self.normal.as_deref()?),
            BufferKind::Albedo => MappedView::Vec3(self.albedo.as_deref()?),
        };
        Some(MappedBuffer::new(&self.map_refs, kind, self.extent, view))
    }

    /// Releases a mapping. A mapping produced by another frame buffer is rejected;
    /// it still releases its own frame buffer's count when dropped.
    pub fn unmap(&self, mapping: MappedBuffer<'_>) -> Result<()> {
        if !mapping.is_owned_by(&self.map_refs) {
            error!(kind = ?mapping.kind(), "unmap called with a mapping from another frame buffer");
            return Err(FrameBufferError::ForeignMapping);
        }
        drop(mapping);
        Ok(())
    }

    /// Number of live mappings.
    pub fn mapped_count(&self) -> usize {
        self.map_refs.load(Ordering::Acquire)
    }
}

impl fmt::Debug for FrameBuffer<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameBuffer")
            .field("extent", &self.extent)
            .field("format", &self.format)
            .field("channels", &self.channels)
            .field("external_color", &self.color_is_external())
            .field("pixel_op", &self.pixel_op.is_some())
            .field("mapped", &self.mapped_count())
            .finish()
    }
}

#[inline]
fn running_mean(previous: [f32; 4], sample: [f32; 4], weight: f32) -> [f32; 4] {
    std::array::from_fn(|c| previous[c] + (sample[c] - previous[c]) * weight)
}

#[inline]
fn running_mean3(previous: [f32; 3], sample: [f32; 3], generation: i32, weight: f32) -> [f32; 3] {
    if generation == 0 {
        return sample;
    }
    std::array::from_fn(|c| previous[c] + (sample[c] - previous[c]) * weight)
}

/// Relative difference between the full mean and the odd-sample mean of a pixel.
#[inline]
fn pixel_error(mean: [f32; 4], odd_mean: [f32; 4]) -> f32 {
    let brightness = mean[0] + mean[1] + mean[2];
    if brightness <= MIN_ERROR_BRIGHTNESS {
        return 0.0;
    }
    let diff = (mean[0] - odd_mean[0]).abs()
        + (mean[1] - odd_mean[1]).abs()
        + (mean[2] - odd_mean[2]).abs();
    diff / brightness.sqrt()
}

/// Clamps each channel to [0, 1] and scales to 8 bits, truncating.
#[inline]
pub fn quantize_rgba8(rgba: [f32; 4]) -> [u8; 4] {
    rgba.map(|c| (c.clamp(0.0, 1.0) * 255.0) as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantize_clamps_and_truncates() {
        assert_eq!(quantize_rgba8([0.0, 1.0, 0.5, 2.0]), [0, 255, 127, 255]);
        assert_eq!(quantize_rgba8([-1.0, f32::NAN, 0.999, 0.004]), [0, 0, 254, 1]);
    }

    #[test]
    fn running_mean_of_constant_is_exact() {
        let value = [0.3, 0.6, 0.9, 1.0];
        let mut mean = value;
        for generation in 1..1000 {
            mean = running_mean(mean, value, 1.0 / (generation as f32 + 1.0));
        }
        assert_eq!(mean, value);
    }

    #[test]
    fn pixel_error_ignores_black_pixels() {
        assert_eq!(pixel_error([0.0; 4], [1.0; 4]), 0.0);
        let error = pixel_error([1.0, 1.0, 2.0, 1.0], [1.0, 1.0, 1.0, 1.0]);
        assert!((error - 0.5).abs() < 1e-6);
    }

    #[test]
    fn clear_block_keeps_pixels_whole() {
        assert_eq!(CLEAR_BLOCK_SIZE % 4, 0);
        assert_eq!(CLEAR_BLOCK_PIXELS * 4, CLEAR_BLOCK_SIZE);
    }
}
