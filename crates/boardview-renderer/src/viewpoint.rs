use glam::{Mat4, Vec2, Vec3};
use serde::{Deserialize, Serialize};

use boardview_core::BoardDimensions;

/// Camera state for the board canvas. The board plane is x/z with +y out of
/// the top copper; pointer coordinates are canvas pixels, origin top-left.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewpoint {
    pub eye: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    /// Vertical field of view in degrees.
    pub fov_y: f32,
    pub near: f32,
    pub far: f32,
    /// Canvas width in pixels.
    pub canvas_width: f32,
    /// Canvas height in pixels.
    pub canvas_height: f32,
}

impl Default for Viewpoint {
    fn default() -> Self {
        Self::top_down(Vec3::ZERO, 150.0, 1280.0, 720.0)
    }
}

impl Viewpoint {
    /// Looking straight down the -y axis at `target`. +x is right on screen
    /// and +z is down, matching pointer coordinates.
    pub fn top_down(target: Vec3, distance: f32, canvas_width: f32, canvas_height: f32) -> Self {
        Self {
            eye: target + Vec3::Y * distance,
            target,
            up: Vec3::NEG_Z,
            fov_y: 45.0,
            near: 0.1,
            far: distance * 4.0,
            canvas_width,
            canvas_height,
        }
    }

    pub fn look_at(eye: Vec3, target: Vec3, canvas_width: f32, canvas_height: f32) -> Self {
        let distance = eye.distance(target);
        Self {
            eye,
            target,
            up: Vec3::Y,
            fov_y: 45.0,
            near: 0.1,
            far: (distance * 4.0).max(1.0),
            canvas_width,
            canvas_height,
        }
    }

    pub fn resize(&mut self, canvas_width: f32, canvas_height: f32) {
        if canvas_width > 0.0 && canvas_height > 0.0 {
            self.canvas_width = canvas_width;
            self.canvas_height = canvas_height;
        }
    }

    pub fn aspect_ratio(&self) -> f32 {
        if self.canvas_height > 0.0 {
            self.canvas_width / self.canvas_height
        } else {
            1.0
        }
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.eye, self.target, self.up)
    }

    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov_y.to_radians(), self.aspect_ratio(), self.near, self.far)
    }

    pub fn view_projection(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    /// Convert canvas pixels to normalised device coordinates.
    pub fn pointer_to_ndc(&self, pointer: Vec2) -> Vec2 {
        Vec2::new(
            2.0 * pointer.x / self.canvas_width - 1.0,
            1.0 - 2.0 * pointer.y / self.canvas_height,
        )
    }

    /// World-space ray under a pointer position.
    pub fn ray(&self, pointer: Vec2) -> Ray {
        let ndc = self.pointer_to_ndc(pointer);
        let inverse = self.view_projection().inverse();
        let near = inverse.project_point3(Vec3::new(ndc.x, ndc.y, 0.0));
        let far = inverse.project_point3(Vec3::new(ndc.x, ndc.y, 1.0));
        Ray::new(near, far - near)
    }

    /// Project a world point to canvas pixels. `None` behind the camera.
    pub fn world_to_screen(&self, point: Vec3) -> Option<Vec2> {
        let clip = self.view_projection() * point.extend(1.0);
        if clip.w <= 0.0 {
            return None;
        }
        let ndc = Vec2::new(clip.x, clip.y) / clip.w;
        Some(Vec2::new(
            (ndc.x + 1.0) * 0.5 * self.canvas_width,
            (1.0 - ndc.y) * 0.5 * self.canvas_height,
        ))
    }

    /// Centre a top-down view on the board with a 10% margin.
    pub fn fit_board(&mut self, dimensions: &BoardDimensions) {
        let half_fov = (self.fov_y.to_radians() / 2.0).tan();
        let span_z = dimensions.height as f32 * 1.1;
        let span_x = dimensions.width as f32 * 1.1 / self.aspect_ratio();
        let distance = span_z.max(span_x) / 2.0 / half_fov + dimensions.thickness as f32;
        *self = Self::top_down(Vec3::ZERO, distance, self.canvas_width, self.canvas_height);
    }
}

/// A half-line in world space. `direction` is unit length.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
}

impl Ray {
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self {
            origin,
            direction: direction.normalize_or_zero(),
        }
    }

    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }

    /// Distance along the ray to the horizontal plane at `y`, if it is
    /// crossed in front of the origin.
    pub fn intersect_plane_y(&self, y: f32) -> Option<f32> {
        if self.direction.y.abs() < f32::EPSILON {
            return None;
        }
        let t = (y - self.origin.y) / self.direction.y;
        (t >= 0.0).then_some(t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_center_pointer_hits_target() {
        let vp = Viewpoint::top_down(Vec3::new(5.0, 0.0, -3.0), 50.0, 800.0, 600.0);
        let ray = vp.ray(Vec2::new(400.0, 300.0));
        let t = ray.intersect_plane_y(0.0).unwrap();
        let hit = ray.at(t);
        assert!((hit - Vec3::new(5.0, 0.0, -3.0)).length() < 1e-3);
    }

    #[test]
    fn test_screen_axes_match_board_axes() {
        let vp = Viewpoint::top_down(Vec3::ZERO, 50.0, 800.0, 600.0);
        let right = vp.world_to_screen(Vec3::new(10.0, 0.0, 0.0)).unwrap();
        let down = vp.world_to_screen(Vec3::new(0.0, 0.0, 10.0)).unwrap();
        assert!(right.x > 400.0);
        assert!((right.y - 300.0).abs() < 1e-2);
        assert!(down.y > 300.0);
    }

    #[test]
    fn test_project_then_unproject() {
        let vp = Viewpoint::look_at(Vec3::new(20.0, 40.0, 30.0), Vec3::ZERO, 1024.0, 768.0);
        let world = Vec3::new(3.0, 0.8, -2.0);
        let screen = vp.world_to_screen(world).unwrap();
        let ray = vp.ray(screen);
        let hit = ray.at(ray.intersect_plane_y(0.8).unwrap());
        assert!((hit - world).length() < 1e-2);
    }

    #[test]
    fn test_fit_board_sees_corners() {
        let mut vp = Viewpoint::default();
        let dims = BoardDimensions::default();
        vp.fit_board(&dims);
        let corner = Vec3::new(dims.width as f32 / 2.0, 0.0, dims.height as f32 / 2.0);
        let screen = vp.world_to_screen(corner).unwrap();
        assert!(screen.x > 0.0 && screen.x < vp.canvas_width);
        assert!(screen.y > 0.0 && screen.y < vp.canvas_height);
    }

    #[test]
    fn test_parallel_ray_misses_plane() {
        let ray = Ray::new(Vec3::ZERO, Vec3::X);
        assert!(ray.intersect_plane_y(1.0).is_none());
    }
}
