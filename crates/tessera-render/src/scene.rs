use crate::bvh::Bvh;
use crate::error::{RenderError, Result};
use crate::geometry::Sphere;
use crate::light::AmbientLight;
use crate::material::Material;
use crate::math::Vec3;
use tessera_model::{CameraDesc, SceneFile, SCENE_VERSION};
use tracing::debug;

/// Scene ready for tracing.
pub struct Scene {
    pub bvh: Bvh,
    pub materials: Vec<Material>,
    pub lights: Vec<AmbientLight>,
    pub camera: CameraDesc,
}

impl Scene {
    pub fn from_file(file: &SceneFile) -> Result<Self> {
        if file.version != SCENE_VERSION {
            return Err(RenderError::SceneVersion {
                found: file.version,
                expected: SCENE_VERSION,
            });
        }

        let materials: Vec<Material> = file.materials.iter().map(Material::from_desc).collect();
        let set = &file.spheres;
        let mut spheres = Vec::with_capacity(set.len());
        for (index, position) in set.positions.iter().enumerate() {
            let radius = set.radius_of(index);
            if !(radius.is_finite() && radius > 0.0) {
                return Err(RenderError::InvalidRadius {
                    sphere: index,
                    radius,
                });
            }
            let material = set.material_of(index);
            if material as usize >= materials.len() {
                return Err(RenderError::MaterialOutOfRange {
                    sphere: index,
                    material,
                    count: materials.len(),
                });
            }
            spheres.push(Sphere::new(Vec3::from_array(*position), radius, material));
        }

        let bvh = Bvh::new(spheres);
        debug!(
            spheres = set.len(),
            nodes = bvh.node_count(),
            materials = materials.len(),
            lights = file.lights.len(),
            "scene built"
        );

        Ok(Self {
            bvh,
            materials,
            lights: file.lights.iter().map(AmbientLight::from_desc).collect(),
            camera: file.camera.clone(),
        })
    }
}
