use std::sync::atomic::{AtomicUsize, Ordering};

use crate::format::Extent;
use crate::storage::{AtomicF32, PackedRgba, Vec4Cell};

/// Buffers that can be mapped for reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferKind {
    Color,
    Depth,
    Normal,
    Albedo,
}

/// Borrowed pixels of a mapped buffer, one element per pixel in row-major order.
#[derive(Debug, Clone, Copy)]
pub enum MappedView<'a> {
    Rgba8(&'a [PackedRgba]),
    Rgba32f(&'a [Vec4Cell]),
    Depth(&'a [AtomicF32]),
    /// Normal or albedo; the fourth channel is unused.
    Vec3(&'a [Vec4Cell]),
}

impl MappedView<'_> {
    pub fn len(&self) -> usize {
        match self {
            MappedView::Rgba8(pixels) => pixels.len(),
            MappedView::Rgba32f(pixels) | MappedView::Vec3(pixels) => pixels.len(),
            MappedView::Depth(pixels) => pixels.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Read access to a frame buffer channel. The frame buffer's map count stays
/// incremented until the mapping is dropped or passed to `FrameBuffer::unmap`.
#[derive(Debug)]
pub struct MappedBuffer<'a> {
    refs: &'a AtomicUsize,
    kind: BufferKind,
    extent: Extent,
    view: MappedView<'a>,
}

impl<'a> MappedBuffer<'a> {
    pub(crate) fn new(
        refs: &'a AtomicUsize,
        kind: BufferKind,
        extent: Extent,
        view: MappedView<'a>,
    ) -> Self {
        refs.fetch_add(1, Ordering::AcqRel);
        Self {
            refs,
            kind,
            extent,
            view,
        }
    }

    pub(crate) fn is_owned_by(&self, refs: &AtomicUsize) -> bool {
        std::ptr::eq(self.refs, refs)
    }

    pub fn kind(&self) -> BufferKind {
        self.kind
    }

    pub fn extent(&self) -> Extent {
        self.extent
    }

    pub fn view(&self) -> MappedView<'a> {
        self.view
    }

    /// Snapshot of the buffer as 8-bit RGBA bytes. Float channels are clamped to
    /// [0, 1]; depth is written as grey with alpha 255.
    pub fn to_rgba8(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.view.len() * 4);
        match self.view {
            MappedView::Rgba8(pixels) => {
                for pixel in pixels {
                    bytes.extend_from_slice(&pixel.load());
                }
            }
            MappedView::Rgba32f(pixels) => {
                for pixel in pixels {
                    bytes.extend_from_slice(&crate::quantize_rgba8(pixel.load()));
                }
            }
            MappedView::Vec3(pixels) => {
                for pixel in pixels {
                    let [r, g, b] = pixel.load3();
                    bytes.extend_from_slice(&crate::quantize_rgba8([r, g, b, 1.0]));
                }
            }
            MappedView::Depth(pixels) => {
                for pixel in pixels {
                    let value = crate::quantize_rgba8([pixel.load(); 4])[0];
                    bytes.extend_from_slice(&[value, value, value, 255]);
                }
            }
        }
        bytes
    }

    /// Snapshot as floats, four per pixel (depth repeats its value, packed colors
    /// are divided by 255).
    pub fn to_rgba32f(&self) -> Vec<f32> {
        let mut values = Vec::with_capacity(self.view.len() * 4);
        match self.view {
            MappedView::Rgba8(pixels) => {
                for pixel in pixels {
                    values.extend(pixel.load().map(|c| c as f32 / 255.0));
                }
            }
            MappedView::Rgba32f(pixels) => {
                for pixel in pixels {
                    values.extend(pixel.load());
                }
            }
            MappedView::Vec3(pixels) => {
                for pixel in pixels {
                    let [x, y, z] = pixel.load3();
                    values.extend([x, y, z, 1.0]);
                }
            }
            MappedView::Depth(pixels) => {
                for pixel in pixels {
                    values.extend([pixel.load(); 4]);
                }
            }
        }
        values
    }
}

impl Drop for MappedBuffer<'_> {
    fn drop(&mut self) {
        self.refs.fetch_sub(1, Ordering::AcqRel);
    }
}
