//! Tiled frame buffer with progressive accumulation and per-tile convergence tracking.

pub mod accum;
pub mod error;
pub mod format;
pub mod framebuffer;
pub mod mapped;
pub mod pixel_op;
pub mod storage;
pub mod tile;

pub use accum::TileAccumIndex;
pub use error::{FrameBufferError, Result};
pub use format::{Channels, ColorFormat, Extent};
pub use framebuffer::{quantize_rgba8, ExternalColor, FrameBuffer, CLEAR_BLOCK_SIZE};
pub use mapped::{BufferKind, MappedBuffer, MappedView};
pub use pixel_op::{PixelOp, ToneMapper};
pub use storage::{external_rgba32f, external_rgba8, AtomicF32, PackedRgba, Vec4Cell};
pub use tile::{Region, Tile, TileCoord, TileGrid, TILE_PIXELS, TILE_SIZE};
