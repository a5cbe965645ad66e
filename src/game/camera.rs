//! Chase camera and screen-space picking

use glam::{Quat, Vec3};

use super::physics::Ray;

/// Camera offsets and projection
#[derive(Debug, Clone, Copy)]
pub struct Camera {
    pub position: Vec3,
    /// Rotation about the world x axis, radians; negative looks down
    pub pitch: f32,
    pub fov_y_deg: f32,
    pub viewport: (u32, u32),
    pub height: f32,
    pub trail: f32,
}

impl Camera {
    pub fn new(viewport: (u32, u32)) -> Self {
        Self {
            position: Vec3::new(0.0, 20.0, 30.0),
            pitch: -0.5,
            fov_y_deg: 75.0,
            viewport,
            height: 20.0,
            trail: 30.0,
        }
    }

    /// Sit above and behind the target
    pub fn follow(&mut self, target: Vec3) {
        self.position = Vec3::new(target.x, self.height, target.z + self.trail);
    }

    pub fn aspect(&self) -> f32 {
        let (w, h) = self.viewport;
        w.max(1) as f32 / h.max(1) as f32
    }

    /// World-space ray through a pixel, origin at the camera
    pub fn screen_ray(&self, sx: f32, sy: f32) -> Ray {
        let (w, h) = self.viewport;
        let ndc_x = 2.0 * sx / w.max(1) as f32 - 1.0;
        let ndc_y = 1.0 - 2.0 * sy / h.max(1) as f32;

        let tan_half = (self.fov_y_deg.to_radians() * 0.5).tan();
        let view = Vec3::new(ndc_x * tan_half * self.aspect(), ndc_y * tan_half, -1.0);
        Ray::new(self.position, Quat::from_rotation_x(self.pitch) * view)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn follows_player_from_above_and_behind() {
        let mut camera = Camera::new((1280, 720));
        camera.follow(Vec3::new(4.0, 3.0, -2.0));
        assert_eq!(camera.position, Vec3::new(4.0, 20.0, 28.0));
    }

    #[test]
    fn centre_pixel_looks_along_pitch() {
        let camera = Camera::new((1280, 720));
        let ray = camera.screen_ray(640.0, 360.0);
        let expected = Quat::from_rotation_x(-0.5) * Vec3::NEG_Z;
        assert!((ray.direction - expected).length() < 1e-5);
        assert!(ray.direction.y < 0.0);
    }

    #[test]
    fn right_edge_pixel_leans_right() {
        let camera = Camera::new((1280, 720));
        let ray = camera.screen_ray(1280.0, 360.0);
        assert!(ray.direction.x > 0.0);
        assert!((ray.direction.length() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn centre_ray_reaches_the_ground_ahead() {
        let camera = Camera::new((1280, 720));
        let ray = camera.screen_ray(640.0, 360.0);
        // Walk to the ground top at y = 5
        let t = (5.0 - ray.origin.y) / ray.direction.y;
        let hit = ray.at(t);
        assert!(hit.z < camera.position.z);
        assert!(hit.x.abs() < 1e-4);
    }
}
