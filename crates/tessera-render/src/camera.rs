use crate::math::{Ray, Vec3};
use tessera_model::CameraDesc;

/// Pinhole camera. Screen coordinates run from (0, 0) at the top-left corner to
/// (1, 1) at the bottom-right.
pub struct Camera {
    origin: Vec3,
    top_left: Vec3,
    horizontal: Vec3,
    vertical: Vec3,
}

impl Camera {
    pub fn new(position: Vec3, look_at: Vec3, up: Vec3, fovy_deg: f32, aspect: f32) -> Self {
        let half_height = (fovy_deg.to_radians() * 0.5).tan();
        let half_width = aspect * half_height;

        let forward = (look_at - position).normalized();
        let right = forward.cross(up).normalized();
        let true_up = right.cross(forward);

        let horizontal = right * (2.0 * half_width);
        let vertical = -true_up * (2.0 * half_height);
        let top_left = position + forward - horizontal * 0.5 - vertical * 0.5;

        Self {
            origin: position,
            top_left,
            horizontal,
            vertical,
        }
    }

    pub fn from_desc(desc: &CameraDesc, aspect: f32) -> Self {
        Self::new(
            Vec3::from_array(desc.position),
            Vec3::from_array(desc.look_at),
            Vec3::from_array(desc.up),
            desc.fovy,
            aspect,
        )
    }

    pub fn ray(&self, s: f32, t: f32) -> Ray {
        let target = self.top_left + self.horizontal * s + self.vertical * t;
        Ray::new(self.origin, (target - self.origin).normalized())
    }
}
