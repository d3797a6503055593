use crate::camera::Camera;
use crate::light::escaped_radiance;
use crate::math::{Ray, Rng, Vec3};
use crate::scene::Scene;
use tessera_fb::{Extent, Tile};

const RAY_EPSILON: f32 = 1e-3;

/// Produces the samples for one tile of one generation.
///
/// Implementations read `tile.accum_id` to pick the generation being rendered and
/// must fill every pixel of `tile.region()`.
pub trait TileRenderer: Send + Sync {
    fn render_tile(&self, tile: &mut Tile);
}

#[derive(Debug, Clone, Copy)]
pub struct TraceSettings {
    pub seed: u64,
    /// Path vertices after the camera ray, including the first hit.
    pub max_depth: u32,
}

impl Default for TraceSettings {
    fn default() -> Self {
        Self {
            seed: 1,
            max_depth: 4,
        }
    }
}

/// Unidirectional path tracer over a sphere scene, one sample per pixel per generation.
pub struct PathTracer<'s> {
    scene: &'s Scene,
    camera: Camera,
    extent: Extent,
    settings: TraceSettings,
}

/// What a camera path saw, split into the channels a tile carries.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelSample {
    pub radiance: Vec3,
    pub alpha: f32,
    pub depth: f32,
    pub normal: Vec3,
    pub albedo: Vec3,
}

impl<'s> PathTracer<'s> {
    pub fn new(scene: &'s Scene, extent: Extent, settings: TraceSettings) -> Self {
        let aspect = extent.width as f32 / extent.height.max(1) as f32;
        Self {
            scene,
            camera: Camera::from_desc(&scene.camera, aspect),
            extent,
            settings,
        }
    }

    pub fn sample(&self, x: u32, y: u32, generation: u32) -> PixelSample {
        let mut rng = Rng::for_sample(self.settings.seed, x, y, generation);
        let s = (x as f32 + rng.next_f32()) / self.extent.width as f32;
        let t = (y as f32 + rng.next_f32()) / self.extent.height as f32;
        self.trace(self.camera.ray(s, t), &mut rng)
    }

    fn trace(&self, camera_ray: Ray, rng: &mut Rng) -> PixelSample {
        let scene = self.scene;
        let background = escaped_radiance(&scene.lights, true);
        let mut sample = PixelSample {
            radiance: Vec3::ZERO,
            alpha: if background.max_elem() > 0.0 { 1.0 } else { 0.0 },
            depth: f32::INFINITY,
            normal: Vec3::ZERO,
            albedo: Vec3::ZERO,
        };

        let mut ray = camera_ray;
        let mut throughput = Vec3::ONE;
        for depth in 0..self.settings.max_depth.max(1) {
            let Some(hit) = scene.bvh.hit(&ray, RAY_EPSILON, f32::INFINITY) else {
                sample.radiance += throughput * escaped_radiance(&scene.lights, depth == 0);
                break;
            };
            let material = &scene.materials[hit.material as usize];
            if depth == 0 {
                sample.alpha = 1.0;
                sample.depth = hit.t;
                sample.normal = hit.normal;
                sample.albedo = material.albedo();
            }
            sample.radiance += throughput * material.emitted();

            let Some(scatter) = material.scatter(&ray, &hit, rng) else {
                break;
            };
            throughput = throughput * scatter.attenuation;
            if throughput.max_elem() <= 0.0 {
                break;
            }
            ray = Ray::new(hit.point + hit.normal * RAY_EPSILON, scatter.direction);
        }
        sample
    }
}

impl TileRenderer for PathTracer<'_> {
    fn render_tile(&self, tile: &mut Tile) {
        debug_assert_eq!(tile.fb_extent(), self.extent);
        let generation = tile.accum_id.max(0) as u32;
        let region = tile.region();
        for y in region.y0..region.y1 {
            for x in region.x0..region.x1 {
                let sample = self.sample(x, y, generation);
                let slot = tile.slot(x, y);
                let [r, g, b] = sample.radiance.to_array();
                tile.rgba[slot] = [r, g, b, sample.alpha];
                tile.depth[slot] = sample.depth;
                tile.normal[slot] = sample.normal.to_array();
                tile.albedo[slot] = sample.albedo.to_array();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_fb::TileCoord;
    use tessera_model::{CameraDesc, LightDesc, MaterialDesc, SceneFile, SphereSet, SCENE_VERSION};

    fn one_sphere(lights: Vec<LightDesc>) -> Scene {
        let file = SceneFile {
            version: SCENE_VERSION,
            camera: CameraDesc {
                position: [0.0, 0.0, 5.0],
                look_at: [0.0, 0.0, 0.0],
                up: [0.0, 1.0, 0.0],
                fovy: 30.0,
            },
            spheres: SphereSet {
                radius: 1.0,
                positions: vec![[0.0, 0.0, 0.0]],
                radii: None,
                materials: None,
            },
            materials: vec![MaterialDesc::Emissive {
                color: [1.0, 0.5, 0.25],
                intensity: 2.0,
            }],
            lights,
        };
        Scene::from_file(&file).unwrap()
    }

    #[test]
    fn center_pixel_sees_the_emitter() {
        let scene = one_sphere(Vec::new());
        let extent = Extent::new(33, 33);
        let tracer = PathTracer::new(&scene, extent, TraceSettings::default());

        let sample = tracer.sample(16, 16, 0);
        assert_eq!(sample.radiance, Vec3::new(2.0, 1.0, 0.5));
        assert_eq!(sample.alpha, 1.0);
        assert!((sample.depth - 4.0).abs() < 0.01, "{}", sample.depth);
        assert!(sample.normal.z > 0.99);
    }

    #[test]
    fn misses_take_visible_background_only() {
        let hidden = one_sphere(vec![LightDesc::Ambient {
            color: [1.0; 3],
            intensity: 1.0,
            visible: false,
        }]);
        let extent = Extent::new(33, 33);
        let sample = PathTracer::new(&hidden, extent, TraceSettings::default()).sample(0, 0, 0);
        assert_eq!(sample.radiance, Vec3::ZERO);
        assert_eq!(sample.alpha, 0.0);
        assert_eq!(sample.depth, f32::INFINITY);

        let shown = one_sphere(vec![LightDesc::Ambient {
            color: [0.5; 3],
            intensity: 1.0,
            visible: true,
        }]);
        let sample = PathTracer::new(&shown, extent, TraceSettings::default()).sample(0, 0, 0);
        assert_eq!(sample.radiance, Vec3::splat(0.5));
        assert_eq!(sample.alpha, 1.0);
    }

    #[test]
    fn render_tile_is_deterministic_per_generation() {
        let scene = Scene::from_file(&tessera_model::demo_scene()).unwrap();
        let extent = Extent::new(80, 48);
        let tracer = PathTracer::new(&scene, extent, TraceSettings::default());
        let coord = TileCoord::new(1, 0);

        let render = |generation: i32| {
            let mut tile = Tile::new(coord, extent);
            tile.accum_id = generation;
            tracer.render_tile(&mut tile);
            tile
        };
        let a = render(3);
        let b = render(3);
        let c = render(4);
        assert_eq!(a.rgba, b.rgba);
        assert_ne!(a.rgba, c.rgba);
        for (_, _, slot) in a.pixels() {
            assert!(a.rgba[slot].iter().all(|v| v.is_finite()));
        }
    }
}
