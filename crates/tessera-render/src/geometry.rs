use crate::math::{Ray, Vec3};

#[derive(Debug, Clone, Copy)]
pub struct Hit {
    pub t: f32,
    pub point: Vec3,
    /// Unit normal facing against the incoming ray.
    pub normal: Vec3,
    pub material: u32,
}

#[derive(Debug, Clone)]
pub struct Sphere {
    pub center: Vec3,
    pub radius: f32,
    pub material: u32,
}

impl Sphere {
    pub fn new(center: Vec3, radius: f32, material: u32) -> Self {
        Self {
            center,
            radius,
            material,
        }
    }

    pub fn bounds(&self) -> (Vec3, Vec3) {
        let r = Vec3::splat(self.radius);
        (self.center - r, self.center + r)
    }

    pub fn hit(&self, ray: &Ray, t_min: f32, t_max: f32) -> Option<Hit> {
        let oc = ray.origin - self.center;
        let a = ray.direction.dot(ray.direction);
        let half_b = oc.dot(ray.direction);
        let c = oc.dot(oc) - self.radius * self.radius;
        let discriminant = half_b * half_b - a * c;
        if discriminant < 0.0 {
            return None;
        }
        let sqrt_d = discriminant.sqrt();

        let near = (-half_b - sqrt_d) / a;
        let t = if near > t_min && near < t_max {
            near
        } else {
            let far = (-half_b + sqrt_d) / a;
            if far <= t_min || far >= t_max {
                return None;
            }
            far
        };

        let point = ray.at(t);
        let outward = (point - self.center) / self.radius;
        let normal = if outward.dot(ray.direction) > 0.0 {
            -outward
        } else {
            outward
        };
        Some(Hit {
            t,
            point,
            normal,
            material: self.material,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normal_faces_the_ray_from_inside_and_outside() {
        let sphere = Sphere::new(Vec3::ZERO, 1.0, 0);
        let outside = Ray::new(Vec3::new(0.0, 0.0, 5.0), Vec3::new(0.0, 0.0, -1.0));
        let hit = sphere.hit(&outside, 1e-3, f32::INFINITY).unwrap();
        assert!((hit.t - 4.0).abs() < 1e-5);
        assert!(hit.normal.z > 0.99);

        let inside = Ray::new(Vec3::ZERO, Vec3::new(0.0, 0.0, 1.0));
        let hit = sphere.hit(&inside, 1e-3, f32::INFINITY).unwrap();
        assert!((hit.t - 1.0).abs() < 1e-5);
        assert!(hit.normal.z < -0.99);
    }
}
