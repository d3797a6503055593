use crate::format::Extent;

/// Edge length of a tile in pixels.
pub const TILE_SIZE: u32 = 64;

/// Pixel slots carried by every tile, including the ones clipped away at image edges.
pub const TILE_PIXELS: usize = (TILE_SIZE * TILE_SIZE) as usize;

/// Position of a tile in the tile grid (not in pixels).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileCoord {
    pub x: u32,
    pub y: u32,
}

impl TileCoord {
    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }
}

/// Half-open pixel rectangle `[x0, x1) x [y0, y1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub x0: u32,
    pub y0: u32,
    pub x1: u32,
    pub y1: u32,
}

impl Region {
    pub fn width(&self) -> u32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> u32 {
        self.y1 - self.y0
    }

    pub fn pixel_count(&self) -> usize {
        self.width() as usize * self.height() as usize
    }

    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x0 && x < self.x1 && y >= self.y0 && y < self.y1
    }
}

/// Tile grid covering an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileGrid {
    extent: Extent,
    tiles_x: u32,
    tiles_y: u32,
}

impl TileGrid {
    pub fn new(extent: Extent) -> Self {
        Self {
            extent,
            tiles_x: extent.width.div_ceil(TILE_SIZE),
            tiles_y: extent.height.div_ceil(TILE_SIZE),
        }
    }

    pub fn extent(&self) -> Extent {
        self.extent
    }

    pub fn tiles_x(&self) -> u32 {
        self.tiles_x
    }

    pub fn tiles_y(&self) -> u32 {
        self.tiles_y
    }

    pub fn tile_count(&self) -> usize {
        self.tiles_x as usize * self.tiles_y as usize
    }

    pub fn contains(&self, coord: TileCoord) -> bool {
        coord.x < self.tiles_x && coord.y < self.tiles_y
    }

    /// Row-major index of `coord`.
    ///
    /// # Panics
    ///
    /// Panics if `coord` lies outside the grid.
    pub fn index(&self, coord: TileCoord) -> usize {
        assert!(
            self.contains(coord),
            "tile ({}, {}) outside {}x{} tile grid",
            coord.x,
            coord.y,
            self.tiles_x,
            self.tiles_y
        );
        coord.y as usize * self.tiles_x as usize + coord.x as usize
    }

    pub fn coord(&self, index: usize) -> TileCoord {
        let tiles_x = self.tiles_x as usize;
        TileCoord::new((index % tiles_x) as u32, (index / tiles_x) as u32)
    }

    /// Pixel region of a tile, clipped to the image.
    pub fn region(&self, coord: TileCoord) -> Region {
        let x0 = coord.x * TILE_SIZE;
        let y0 = coord.y * TILE_SIZE;
        Region {
            x0,
            y0,
            x1: (x0 + TILE_SIZE).min(self.extent.width),
            y1: (y0 + TILE_SIZE).min(self.extent.height),
        }
    }

    pub fn coords(&self) -> impl Iterator<Item = TileCoord> + '_ {
        (0..self.tile_count()).map(move |index| self.coord(index))
    }
}

/// Raw contributions for one tile of the image.
///
/// Every channel holds exactly [`TILE_PIXELS`] slots, addressed row-major with a
/// fixed stride of [`TILE_SIZE`]; slots outside the clipped region are carried but
/// never read by the frame buffer.
#[derive(Debug, Clone)]
pub struct Tile {
    coord: TileCoord,
    region: Region,
    fb_extent: Extent,
    /// Generation this tile was rendered at, normally read from `FrameBuffer::accum_id`.
    pub accum_id: i32,
    pub rgba: Box<[[f32; 4]; TILE_PIXELS]>,
    pub depth: Box<[f32; TILE_PIXELS]>,
    pub normal: Box<[[f32; 3]; TILE_PIXELS]>,
    pub albedo: Box<[[f32; 3]; TILE_PIXELS]>,
}

impl Tile {
    /// Creates a zeroed tile for `coord` in an image of `fb_extent`.
    ///
    /// # Panics
    ///
    /// Panics if `coord` lies outside the image's tile grid.
    pub fn new(coord: TileCoord, fb_extent: Extent) -> Self {
        let grid = TileGrid::new(fb_extent);
        assert!(
            grid.contains(coord),
            "tile ({}, {}) outside image {}",
            coord.x,
            coord.y,
            fb_extent
        );
        Self {
            coord,
            region: grid.region(coord),
            fb_extent,
            accum_id: 0,
            rgba: Box::new([[0.0; 4]; TILE_PIXELS]),
            depth: Box::new([f32::INFINITY; TILE_PIXELS]),
            normal: Box::new([[0.0; 3]; TILE_PIXELS]),
            albedo: Box::new([[0.0; 3]; TILE_PIXELS]),
        }
    }

    /// Moves an existing allocation to another tile of the same image.
    pub fn reset(&mut self, coord: TileCoord) {
        let grid = TileGrid::new(self.fb_extent);
        assert!(grid.contains(coord), "tile ({}, {}) outside image", coord.x, coord.y);
        self.coord = coord;
        self.region = grid.region(coord);
        self.accum_id = 0;
    }

    pub fn coord(&self) -> TileCoord {
        self.coord
    }

    pub fn region(&self) -> Region {
        self.region
    }

    pub fn fb_extent(&self) -> Extent {
        self.fb_extent
    }

    /// Slot of the pixel at image coordinates `(x, y)`.
    #[inline]
    pub fn slot(&self, x: u32, y: u32) -> usize {
        debug_assert!(self.region.contains(x, y));
        ((y - self.region.y0) * TILE_SIZE + (x - self.region.x0)) as usize
    }

    /// Image coordinates of every pixel in the region, with its slot.
    pub fn pixels(&self) -> impl Iterator<Item = (u32, u32, usize)> + '_ {
        let region = self.region;
        (region.y0..region.y1).flat_map(move |y| {
            (region.x0..region.x1).map(move |x| (x, y, self.slot(x, y)))
        })
    }

    /// Sets every in-region pixel to the same color.
    pub fn fill(&mut self, rgba: [f32; 4]) {
        let slots: Vec<usize> = self.pixels().map(|(_, _, slot)| slot).collect();
        for slot in slots {
            self.rgba[slot] = rgba;
        }
    }
}
