use crate::math::Vec3;
use tessera_model::LightDesc;

/// Constant light reaching every ray that leaves the scene.
#[derive(Debug, Clone, PartialEq)]
pub struct AmbientLight {
    pub radiance: Vec3,
    /// Whether camera rays see the light directly.
    pub visible: bool,
}

impl AmbientLight {
    pub fn from_desc(desc: &LightDesc) -> Self {
        match desc {
            LightDesc::Ambient {
                color,
                intensity,
                visible,
            } => Self {
                radiance: Vec3::from_array(*color) * *intensity,
                visible: *visible,
            },
        }
    }
}

/// Radiance carried by a ray that escapes the scene.
pub fn escaped_radiance(lights: &[AmbientLight], camera_ray: bool) -> Vec3 {
    lights
        .iter()
        .filter(|light| light.visible || !camera_ray)
        .fold(Vec3::ZERO, |sum, light| sum + light.radiance)
}
