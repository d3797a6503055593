use crate::geometry::Hit;
use crate::math::{Ray, Rng, Vec3};
use tessera_model::MaterialDesc;

#[derive(Debug, Clone, PartialEq)]
pub enum Material {
    Diffuse {
        albedo: Vec3,
    },
    /// Conductor with reflectance at normal incidence `f0`.
    Metal {
        f0: Vec3,
        roughness: f32,
    },
    Emissive {
        radiance: Vec3,
    },
}

/// Outgoing direction and the throughput it carries.
pub struct Scatter {
    pub direction: Vec3,
    pub attenuation: Vec3,
}

impl Material {
    pub fn from_desc(desc: &MaterialDesc) -> Self {
        match desc {
            MaterialDesc::Diffuse { albedo } => Material::Diffuse {
                albedo: Vec3::from_array(*albedo),
            },
            MaterialDesc::Metal { eta, k, roughness } => Material::Metal {
                f0: conductor_f0(Vec3::from_array(*eta), Vec3::from_array(*k)),
                roughness: roughness.clamp(0.0, 1.0),
            },
            MaterialDesc::Emissive { color, intensity } => Material::Emissive {
                radiance: Vec3::from_array(*color) * *intensity,
            },
        }
    }

    pub fn emitted(&self) -> Vec3 {
        match self {
            Material::Emissive { radiance } => *radiance,
            _ => Vec3::ZERO,
        }
    }

    /// Surface color reported in the albedo channel.
    pub fn albedo(&self) -> Vec3 {
        match self {
            Material::Diffuse { albedo } => *albedo,
            Material::Metal { f0, .. } => *f0,
            Material::Emissive { radiance } => radiance.map(|c| c.min(1.0)),
        }
    }

    pub fn scatter(&self, ray: &Ray, hit: &Hit, rng: &mut Rng) -> Option<Scatter> {
        match self {
            Material::Diffuse { albedo } => {
                let direction = (hit.normal + rng.unit_vector()).normalized();
                let direction = if direction.dot(hit.normal) <= 1e-4 {
                    hit.normal
                } else {
                    direction
                };
                Some(Scatter {
                    direction,
                    attenuation: *albedo,
                })
            }
            Material::Metal { f0, roughness } => {
                let incoming = ray.direction.normalized();
                let reflected = incoming.reflect(hit.normal);
                let direction = (reflected + rng.unit_vector() * *roughness).normalized();
                if direction.dot(hit.normal) <= 0.0 {
                    return None;
                }
                let cos_theta = (-incoming.dot(hit.normal)).clamp(0.0, 1.0);
                Some(Scatter {
                    direction,
                    attenuation: schlick(*f0, cos_theta),
                })
            }
            Material::Emissive { .. } => None,
        }
    }
}

/// Reflectance of a conductor at normal incidence from its complex index of refraction.
pub fn conductor_f0(eta: Vec3, k: Vec3) -> Vec3 {
    let channel = |eta: f32, k: f32| {
        let k2 = k * k;
        ((eta - 1.0) * (eta - 1.0) + k2) / ((eta + 1.0) * (eta + 1.0) + k2)
    };
    Vec3::new(channel(eta.x, k.x), channel(eta.y, k.y), channel(eta.z, k.z))
}

fn schlick(f0: Vec3, cos_theta: f32) -> Vec3 {
    let m = (1.0 - cos_theta).powi(5);
    f0 + (Vec3::ONE - f0) * m
}
