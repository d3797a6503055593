use crate::tile::Tile;

/// Transform applied to a tile around its merge into the accumulation buffer.
///
/// `pre_accum` sees the raw contribution, `post_accum` sees the accumulated result
/// that is about to be written to the color buffer. Both run synchronously on the
/// worker that calls `set_tile`.
pub trait PixelOp: Send + Sync {
    fn pre_accum(&self, _tile: &mut Tile) {}

    fn post_accum(&self, _tile: &mut Tile) {}
}

/// Exposure, Reinhard curve and gamma, applied after accumulation so that the
/// accumulation buffer stays linear.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToneMapper {
    pub exposure: f32,
    pub gamma: f32,
}

impl Default for ToneMapper {
    fn default() -> Self {
        Self {
            exposure: 1.0,
            gamma: 2.2,
        }
    }
}

impl ToneMapper {
    pub fn map(&self, value: f32) -> f32 {
        let exposed = (value * self.exposure).max(0.0);
        let curved = exposed / (1.0 + exposed);
        curved.powf(1.0 / self.gamma)
    }
}

impl PixelOp for ToneMapper {
    fn post_accum(&self, tile: &mut Tile) {
        let slots: Vec<usize> = tile.pixels().map(|(_, _, slot)| slot).collect();
        for slot in slots {
            let [r, g, b, a] = tile.rgba[slot];
            tile.rgba[slot] = [self.map(r), self.map(g), self.map(b), a];
        }
    }
}
