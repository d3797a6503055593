use rayon::prelude::*;
use std::sync::Barrier;
use tessera_fb::{BufferKind, Channels, ColorFormat, Extent, FrameBuffer, Tile, TileCoord};

fn tile_color(coord: TileCoord) -> [f32; 4] {
    [coord.x as f32 / 8.0, coord.y as f32 / 8.0, 0.5, 1.0]
}

#[test]
fn disjoint_tiles_merge_in_parallel() {
    let extent = Extent::new(500, 300);
    let fb = FrameBuffer::new(
        extent,
        ColorFormat::Rgba32f,
        Channels::ACCUM | Channels::VARIANCE | Channels::DEPTH,
    )
    .unwrap();
    let coords: Vec<TileCoord> = fb.grid().coords().collect();

    for _ in 0..4 {
        coords.par_iter().for_each(|&coord| {
            let mut tile = Tile::new(coord, extent);
            tile.fill(tile_color(coord));
            tile.accum_id = fb.accum_id(coord);
            fb.set_tile(&mut tile);
        });
        fb.end_frame();
    }

    let values = fb.map_buffer(BufferKind::Color).unwrap().to_rgba32f();
    for coord in &coords {
        assert_eq!(fb.accum_id(*coord), 4);
        assert_eq!(fb.tile_error(*coord), 0.0);
        let region = fb.grid().region(*coord);
        for y in region.y0..region.y1 {
            for x in region.x0..region.x1 {
                let pixel = (y * extent.width + x) as usize * 4;
                assert_eq!(&values[pixel..pixel + 4], &tile_color(*coord));
            }
        }
    }
}

#[test]
fn parallel_clear_resets_large_buffers() {
    let extent = Extent::new(1024, 600);
    let fb = FrameBuffer::new(extent, ColorFormat::Rgba8, Channels::ACCUM | Channels::VARIANCE).unwrap();
    let coords: Vec<TileCoord> = fb.grid().coords().collect();
    coords.par_iter().for_each(|&coord| {
        let mut tile = Tile::new(coord, extent);
        tile.fill([1.0; 4]);
        fb.set_tile(&mut tile);
    });
    fb.end_frame();

    fb.clear(Channels::ACCUM);
    // With the accumulation reset, a half-bright generation-0 tile is not blended.
    let mut tile = Tile::new(TileCoord::new(15, 9), extent);
    tile.fill([0.5, 0.5, 0.5, 1.0]);
    tile.accum_id = fb.accum_id(tile.coord());
    assert_eq!(tile.accum_id, 0);
    fb.set_tile(&mut tile);
    let bytes = fb.map_buffer(BufferKind::Color).unwrap().to_rgba8();
    let pixel = (599 * extent.width + 1023) as usize * 4;
    assert_eq!(&bytes[pixel..pixel + 4], &[127, 127, 127, 255]);
}

#[test]
fn concurrent_submission_of_one_tile_is_reported() {
    use tessera_fb::PixelOp;

    // Parks the first submission inside set_tile while the tile is claimed.
    struct Park {
        entered: Barrier,
        release: Barrier,
    }

    impl PixelOp for Park {
        fn pre_accum(&self, _tile: &mut Tile) {
            self.entered.wait();
            self.release.wait();
        }
    }

    let extent = Extent::new(64, 64);
    let mut fb = FrameBuffer::new(extent, ColorFormat::Rgba8, Channels::ACCUM).unwrap();
    let park = std::sync::Arc::new(Park {
        entered: Barrier::new(2),
        release: Barrier::new(2),
    });
    fb.set_pixel_op(Some(park.clone()));

    let fb = &fb;
    let outcome = std::thread::scope(|scope| {
        let first = scope.spawn(move || {
            let mut tile = Tile::new(TileCoord::new(0, 0), extent);
            fb.set_tile(&mut tile);
        });
        let second = scope.spawn(move || {
            park.entered.wait();
            let mut tile = Tile::new(TileCoord::new(0, 0), extent);
            // Panics at the claim, before reaching the pixel op.
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                fb.set_tile(&mut tile);
            }));
            park.release.wait();
            result
        });
        first.join().unwrap();
        second.join().unwrap()
    });
    assert!(outcome.is_err());

    // The submission that held the claim still completed.
    fb.end_frame();
    assert_eq!(fb.accum_id(TileCoord::new(0, 0)), 1);
}
