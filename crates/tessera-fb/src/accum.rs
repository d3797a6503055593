//! Per-tile accumulation bookkeeping.

use std::sync::atomic::{AtomicI32, AtomicU8, Ordering};

use crate::storage::AtomicF32;
use crate::tile::{TileCoord, TileGrid};

/// Generation counters and error estimates for the tiles of one image.
///
/// Without error tracking the index keeps a single generation slot shared by every
/// tile and reports an error of zero.
#[derive(Debug)]
pub struct TileAccumIndex {
    grid: TileGrid,
    generations: Box<[AtomicI32]>,
    errors: Option<Box<[AtomicF32]>>,
}

impl TileAccumIndex {
    pub fn new(grid: TileGrid, track_error: bool) -> Self {
        let tiles = grid.tile_count();
        let slots = if track_error { tiles } else { 1 };
        Self {
            grid,
            generations: (0..slots).map(|_| AtomicI32::new(0)).collect(),
            errors: track_error
                .then(|| (0..tiles).map(|_| AtomicF32::new(f32::INFINITY)).collect()),
        }
    }

    pub fn tracks_error(&self) -> bool {
        self.errors.is_some()
    }

    pub fn slot_count(&self) -> usize {
        self.generations.len()
    }

    fn slot(&self, coord: TileCoord) -> usize {
        if self.tracks_error() {
            self.grid.index(coord)
        } else {
            0
        }
    }

    pub fn accum_id(&self, coord: TileCoord) -> i32 {
        self.generations[self.slot(coord)].load(Ordering::Relaxed)
    }

    pub fn tile_error(&self, coord: TileCoord) -> f32 {
        match &self.errors {
            Some(errors) => errors[self.grid.index(coord)].load(),
            None => 0.0,
        }
    }

    pub(crate) fn set_error(&self, tile_index: usize, error: f32) {
        if let Some(errors) = &self.errors {
            errors[tile_index].store(error);
        }
    }

    /// Advances the generation of a tile, or the shared slot.
    pub(crate) fn advance(&self, tile_index: usize) {
        let slot = if self.tracks_error() { tile_index } else { 0 };
        self.generations[slot].fetch_add(1, Ordering::Relaxed);
    }

    /// Largest tile error, or zero without error tracking.
    pub fn max_error(&self) -> f32 {
        self.errors
            .as_ref()
            .map(|errors| errors.iter().map(AtomicF32::load).fold(0.0, f32::max))
            .unwrap_or(0.0)
    }

    pub(crate) fn reset(&self) {
        for generation in self.generations.iter() {
            generation.store(0, Ordering::Relaxed);
        }
        if let Some(errors) = &self.errors {
            for error in errors.iter() {
                error.store(f32::INFINITY);
            }
        }
    }
}

const CLAIMED: u8 = 1 << 0;
const TOUCHED: u8 = 1 << 1;

/// Per-tile submission state: whether a worker is merging the tile right now, and
/// whether it was merged since the last `end_frame`.
#[derive(Debug)]
pub(crate) struct TileClaims {
    grid: TileGrid,
    states: Box<[AtomicU8]>,
}

impl TileClaims {
    pub(crate) fn new(grid: TileGrid) -> Self {
        Self {
            grid,
            states: (0..grid.tile_count()).map(|_| AtomicU8::new(0)).collect(),
        }
    }

    /// # Panics
    ///
    /// Panics if another worker is still merging the same tile.
    pub(crate) fn claim(&self, tile_index: usize) -> TileClaim<'_> {
        let previous = self.states[tile_index].fetch_or(CLAIMED, Ordering::Acquire);
        if previous & CLAIMED != 0 {
            let coord = self.grid.coord(tile_index);
            panic!(
                "tile ({}, {}) submitted while another submission of it is in flight; \
                 tiles of one frame must not overlap",
                coord.x, coord.y
            );
        }
        TileClaim {
            state: &self.states[tile_index],
        }
    }

    /// Clears the touched marks and returns the indices that carried one.
    pub(crate) fn take_touched(&self) -> Vec<usize> {
        self.states
            .iter()
            .enumerate()
            .filter_map(|(index, state)| {
                let previous = state.fetch_and(!TOUCHED, Ordering::AcqRel);
                (previous & TOUCHED != 0).then_some(index)
            })
            .collect()
    }

    pub(crate) fn clear_touched(&self) {
        for state in self.states.iter() {
            state.fetch_and(!TOUCHED, Ordering::AcqRel);
        }
    }
}

/// Held while a tile is being merged.
pub(crate) struct TileClaim<'a> {
    state: &'a AtomicU8,
}

impl Drop for TileClaim<'_> {
    fn drop(&mut self) {
        self.state
            .fetch_update(Ordering::Release, Ordering::Relaxed, |state| {
                Some((state & !CLAIMED) | TOUCHED)
            })
            .ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::Extent;

    fn grid() -> TileGrid {
        TileGrid::new(Extent::new(200, 100))
    }

    #[test]
    fn starts_unconverged_with_generation_zero() {
        let index = TileAccumIndex::new(grid(), true);
        assert_eq!(index.slot_count(), 8);
        for coord in grid().coords() {
            assert_eq!(index.accum_id(coord), 0);
            assert_eq!(index.tile_error(coord), f32::INFINITY);
        }
    }

    #[test]
    fn without_error_tracking_every_tile_shares_slot_zero() {
        let index = TileAccumIndex::new(grid(), false);
        assert_eq!(index.slot_count(), 1);
        index.advance(5);
        assert_eq!(index.accum_id(TileCoord::new(0, 0)), 1);
        assert_eq!(index.accum_id(TileCoord::new(3, 1)), 1);
        assert_eq!(index.tile_error(TileCoord::new(3, 1)), 0.0);
        assert_eq!(index.max_error(), 0.0);
    }

    #[test]
    fn reset_restores_initial_state() {
        let index = TileAccumIndex::new(grid(), true);
        index.advance(3);
        index.set_error(3, 0.5);
        index.reset();
        let coord = grid().coord(3);
        assert_eq!(index.accum_id(coord), 0);
        assert_eq!(index.tile_error(coord), f32::INFINITY);
    }

    #[test]
    fn released_claim_marks_tile_touched() {
        let claims = TileClaims::new(grid());
        drop(claims.claim(2));
        drop(claims.claim(2));
        assert_eq!(claims.take_touched(), vec![2]);
        assert!(claims.take_touched().is_empty());
    }

    #[test]
    #[should_panic(expected = "in flight")]
    fn overlapping_claim_panics() {
        let claims = TileClaims::new(grid());
        let _first = claims.claim(1);
        let _second = claims.claim(1);
    }
}
