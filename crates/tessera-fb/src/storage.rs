//! Pixel storage shared between render workers.
//!
//! Every cell is built from relaxed atomics so that workers holding `&FrameBuffer`
//! can write disjoint tiles while an output thread reads a mapped view. Readers may
//! observe a pixel mid-update, never undefined behaviour.

use std::ops::Deref;
use std::sync::atomic::{AtomicU32, Ordering};

/// `f32` stored as its bit pattern in an `AtomicU32`.
#[derive(Debug, Default)]
#[repr(transparent)]
pub struct AtomicF32(AtomicU32);

impl AtomicF32 {
    pub fn new(value: f32) -> Self {
        Self(AtomicU32::new(value.to_bits()))
    }

    #[inline]
    pub fn load(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn store(&self, value: f32) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }
}

/// Four float channels, aligned to 16 bytes for SIMD loads.
#[derive(Debug, Default)]
#[repr(C, align(16))]
pub struct Vec4Cell([AtomicF32; 4]);

impl Vec4Cell {
    pub fn new(value: [f32; 4]) -> Self {
        Self(value.map(AtomicF32::new))
    }

    #[inline]
    pub fn load(&self) -> [f32; 4] {
        [
            self.0[0].load(),
            self.0[1].load(),
            self.0[2].load(),
            self.0[3].load(),
        ]
    }

    #[inline]
    pub fn store(&self, value: [f32; 4]) {
        for (cell, v) in self.0.iter().zip(value) {
            cell.store(v);
        }
    }

    /// Loads the first three channels.
    #[inline]
    pub fn load3(&self) -> [f32; 3] {
        [self.0[0].load(), self.0[1].load(), self.0[2].load()]
    }

    #[inline]
    pub fn store3(&self, value: [f32; 3]) {
        self.store([value[0], value[1], value[2], 0.0]);
    }
}

/// Packed 8-bit RGBA pixel.
#[derive(Debug, Default)]
#[repr(transparent)]
pub struct PackedRgba(AtomicU32);

impl PackedRgba {
    pub fn new(rgba: [u8; 4]) -> Self {
        Self(AtomicU32::new(u32::from_le_bytes(rgba)))
    }

    #[inline]
    pub fn load(&self) -> [u8; 4] {
        self.0.load(Ordering::Relaxed).to_le_bytes()
    }

    #[inline]
    pub fn store(&self, rgba: [u8; 4]) {
        self.0.store(u32::from_le_bytes(rgba), Ordering::Relaxed);
    }

    /// Raw packed value: red in the low byte.
    #[inline]
    pub fn load_packed(&self) -> u32 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Either a buffer owned by the frame buffer or one borrowed from the caller.
#[derive(Debug)]
pub(crate) enum Storage<'ext, T> {
    Owned(Box<[T]>),
    External(&'ext [T]),
}

impl<T: Default> Storage<'_, T> {
    pub(crate) fn allocate(len: usize) -> Self {
        Storage::Owned((0..len).map(|_| T::default()).collect())
    }
}

impl<T> Storage<'_, T> {
    pub(crate) fn is_external(&self) -> bool {
        matches!(self, Storage::External(_))
    }
}

impl<T> Deref for Storage<'_, T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        match self {
            Storage::Owned(values) => values,
            Storage::External(values) => values,
        }
    }
}

/// Allocates a caller-owned color buffer that can be lent to a frame buffer.
pub fn external_rgba8(pixels: usize) -> Box<[PackedRgba]> {
    (0..pixels).map(|_| PackedRgba::default()).collect()
}

/// Allocates a caller-owned float color buffer that can be lent to a frame buffer.
pub fn external_rgba32f(pixels: usize) -> Box<[Vec4Cell]> {
    (0..pixels).map(|_| Vec4Cell::default()).collect()
}
