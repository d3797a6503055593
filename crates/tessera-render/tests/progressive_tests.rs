use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tessera_fb::{BufferKind, Channels, ColorFormat, Extent, FrameBuffer, Tile, TileCoord};
use tessera_model::{demo_scene, CameraDesc, LightDesc, SceneFile, SphereSet, SCENE_VERSION};
use tessera_render::{
    render_scene, PathTracer, ProgressiveRenderer, ProgressiveSettings, RenderSettings, Scene,
    StopReason, TileRenderer, TraceSettings,
};

fn sky_only(radiance: f32) -> SceneFile {
    SceneFile {
        version: SCENE_VERSION,
        camera: CameraDesc {
            position: [0.0, 0.0, 5.0],
            look_at: [0.0, 0.0, 0.0],
            up: [0.0, 1.0, 0.0],
            fovy: 45.0,
        },
        spheres: SphereSet::default(),
        materials: Vec::new(),
        lights: vec![LightDesc::Ambient {
            color: [1.0; 3],
            intensity: radiance,
            visible: true,
        }],
    }
}

fn accumulating(extent: Extent) -> FrameBuffer<'static> {
    FrameBuffer::new(
        extent,
        ColorFormat::Rgba32f,
        Channels::ACCUM | Channels::VARIANCE | Channels::DEPTH,
    )
    .unwrap()
}

#[test]
fn render_scene_outputs_image() {
    let settings = RenderSettings {
        width: 48,
        height: 32,
        frames: 3,
        ..RenderSettings::default()
    };
    let image = render_scene(&demo_scene(), &settings).unwrap();
    assert_eq!(image.width(), settings.width);
    assert_eq!(image.height(), settings.height);
    assert!(image.pixels().any(|pixel| pixel.0[..3].iter().any(|&c| c > 0)));
}

#[test]
fn noiseless_scene_converges_and_stops_early() {
    let scene = Scene::from_file(&sky_only(0.5)).unwrap();
    let extent = Extent::new(100, 70);
    let fb = accumulating(extent);
    let tracer = PathTracer::new(&scene, extent, TraceSettings::default());
    let renderer = ProgressiveRenderer::new(
        &fb,
        tracer,
        ProgressiveSettings {
            max_frames: 10,
            error_threshold: 0.01,
            threads: 2,
        },
    );
    assert!(renderer.is_adaptive());

    let mut reports = Vec::new();
    let summary = renderer
        .run(&AtomicBool::new(false), |report| reports.push(*report))
        .unwrap();

    assert_eq!(summary.stop, StopReason::Converged);
    assert_eq!(summary.frames, 2);
    assert_eq!(summary.tiles_rendered, 2 * fb.grid().tile_count());
    assert_eq!(reports[0].frame_error, f32::INFINITY);
    assert_eq!(reports[1].frame_error, 0.0);
    for coord in fb.grid().coords() {
        assert_eq!(fb.accum_id(coord), 2);
    }

    let color = fb.map_buffer(BufferKind::Color).unwrap().to_rgba32f();
    assert!(color.chunks(4).all(|pixel| pixel == [0.5, 0.5, 0.5, 1.0]));
}

#[test]
fn zero_threshold_renders_every_frame() {
    let scene = Scene::from_file(&sky_only(0.5)).unwrap();
    let extent = Extent::new(64, 64);
    let fb = accumulating(extent);
    let renderer = ProgressiveRenderer::new(
        &fb,
        PathTracer::new(&scene, extent, TraceSettings::default()),
        ProgressiveSettings {
            max_frames: 4,
            ..ProgressiveSettings::default()
        },
    );
    assert!(!renderer.is_adaptive());
    let summary = renderer.run(&AtomicBool::new(false), |_| {}).unwrap();
    assert_eq!(summary.stop, StopReason::FrameLimit);
    assert_eq!(summary.frames, 4);
    assert_eq!(fb.accum_id(TileCoord::new(0, 0)), 4);
}

#[test]
fn threshold_is_ignored_without_variance() {
    let scene = Scene::from_file(&sky_only(0.5)).unwrap();
    let extent = Extent::new(64, 64);
    let fb = FrameBuffer::new(extent, ColorFormat::Rgba8, Channels::ACCUM).unwrap();
    let renderer = ProgressiveRenderer::new(
        &fb,
        PathTracer::new(&scene, extent, TraceSettings::default()),
        ProgressiveSettings {
            max_frames: 3,
            error_threshold: 0.5,
            threads: 0,
        },
    );
    assert!(!renderer.is_adaptive());
    let summary = renderer.run(&AtomicBool::new(false), |_| {}).unwrap();
    assert_eq!(summary.frames, 3);
    assert_eq!(summary.frame_error, 0.0);
}

#[test]
fn cancel_flag_stops_dispatch() {
    let scene = Scene::from_file(&demo_scene()).unwrap();
    let extent = Extent::new(64, 48);
    let fb = accumulating(extent);
    let renderer = ProgressiveRenderer::new(
        &fb,
        PathTracer::new(&scene, extent, TraceSettings::default()),
        ProgressiveSettings {
            max_frames: 50,
            ..ProgressiveSettings::default()
        },
    );

    let cancel = AtomicBool::new(true);
    let summary = renderer.run(&cancel, |_| {}).unwrap();
    assert_eq!(summary.stop, StopReason::Cancelled);
    assert_eq!(summary.frames, 0);
    assert_eq!(fb.accum_id(TileCoord::new(0, 0)), 0);

    let cancel = AtomicBool::new(false);
    let summary = renderer
        .run(&cancel, |report| {
            if report.frame == 1 {
                cancel.store(true, Ordering::Relaxed);
            }
        })
        .unwrap();
    assert_eq!(summary.stop, StopReason::Cancelled);
    assert_eq!(summary.frames, 2);
}

/// Records which generation each tile was asked to render.
#[derive(Default)]
struct Recorder {
    seen: Mutex<HashMap<TileCoord, Vec<i32>>>,
}

impl TileRenderer for Recorder {
    fn render_tile(&self, tile: &mut Tile) {
        self.seen
            .lock()
            .unwrap()
            .entry(tile.coord())
            .or_default()
            .push(tile.accum_id);
        tile.fill([0.25, 0.25, 0.25, 1.0]);
    }
}

#[test]
fn every_tile_sees_each_generation_once() {
    let extent = Extent::new(200, 130);
    let fb = accumulating(extent);
    let renderer = ProgressiveRenderer::new(
        &fb,
        Recorder::default(),
        ProgressiveSettings {
            max_frames: 3,
            error_threshold: 0.0,
            threads: 3,
        },
    );
    renderer.run(&AtomicBool::new(false), |_| {}).unwrap();

    let report = renderer.render_frame(3, &AtomicBool::new(false));
    assert_eq!(report.tiles_rendered, fb.grid().tile_count());
    assert_eq!(report.frame_error, 0.0);

    let seen = renderer.renderer().seen.lock().unwrap();
    assert_eq!(seen.len(), fb.grid().tile_count());
    for generations in seen.values() {
        assert_eq!(generations, &[0, 1, 2, 3]);
    }
}

struct NanRenderer;

impl TileRenderer for NanRenderer {
    fn render_tile(&self, tile: &mut Tile) {
        tile.fill([f32::NAN, 0.2, 0.2, 1.0]);
    }
}

#[test]
fn tiles_with_nan_samples_are_never_skipped() {
    let extent = Extent::new(64, 64);
    let fb = accumulating(extent);
    let renderer = ProgressiveRenderer::new(
        &fb,
        NanRenderer,
        ProgressiveSettings {
            max_frames: 4,
            error_threshold: 0.01,
            threads: 1,
        },
    );
    let summary = renderer.run(&AtomicBool::new(false), |_| {}).unwrap();
    assert_eq!(summary.stop, StopReason::FrameLimit);
    assert_eq!(summary.frames, 4);
    assert_eq!(summary.frame_error, f32::INFINITY);
    assert_eq!(renderer.pending_tiles(), vec![TileCoord::new(0, 0)]);
}
