use glam::{Mat4, Vec3};

use crate::error::ArchiveError;
use crate::persistence::{ArchiveReader, ArchiveWriter};
use crate::render::CameraParams;
use crate::transform::Transform;

use super::UpdateContext;

/// Perspective camera looking down its owner's −Z axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    pub fov_degrees: f32,
    pub near: f32,
    pub far: f32,
    view: Mat4,
    position: Vec3,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            fov_degrees: 60.0,
            near: 0.1,
            far: 100.0,
            view: Mat4::IDENTITY,
            position: Vec3::ZERO,
        }
    }
}

impl Camera {
    pub fn new(fov_degrees: f32, near: f32, far: f32) -> Self {
        Self {
            fov_degrees,
            near,
            far,
            ..Self::default()
        }
    }

    /// View matrix as of the last update.
    pub fn view(&self) -> Mat4 {
        self.view
    }

    pub fn projection(&self, aspect: f32) -> Mat4 {
        Mat4::perspective_rh_gl(
            self.fov_degrees.to_radians(),
            aspect.max(0.01),
            self.near,
            self.far,
        )
    }

    pub fn params(&self, aspect: f32) -> CameraParams {
        CameraParams {
            view: self.view,
            projection: self.projection(aspect),
            position: self.position,
        }
    }

    pub(crate) fn follow(&mut self, transform: &Transform) {
        let forward = transform.forward();
        let up = transform.up();
        self.position = transform.position;
        self.view = if forward.length_squared() > f32::EPSILON {
            Mat4::look_at_rh(transform.position, transform.position + forward, up)
        } else {
            Mat4::look_at_rh(transform.position, Vec3::ZERO, Vec3::Y)
        };
    }

    pub(crate) fn update(&mut self, ctx: &mut UpdateContext<'_>) {
        self.follow(ctx.transform);
    }

    pub(crate) fn save(&self, writer: &mut dyn ArchiveWriter) {
        writer.write_f32("fov", self.fov_degrees);
        writer.write_f32("near", self.near);
        writer.write_f32("far", self.far);
    }

    pub(crate) fn load(reader: &mut dyn ArchiveReader) -> Result<Self, ArchiveError> {
        Ok(Self::new(
            reader.read_f32("fov")?,
            reader.read_f32("near")?,
            reader.read_f32("far")?,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn view_tracks_owner_transform() {
        let mut camera = Camera::default();
        let transform = Transform::from_position(Vec3::new(0.0, 0.0, 5.0));
        camera.follow(&transform);
        let origin_in_view = camera.view().transform_point3(Vec3::ZERO);
        assert!((origin_in_view - Vec3::new(0.0, 0.0, -5.0)).length() < 1e-5);
    }

    #[test]
    fn yawed_camera_looks_along_rotated_axis() {
        let mut camera = Camera::default();
        let transform = Transform::new().with_euler(Vec3::new(0.0, 90.0, 0.0));
        camera.follow(&transform);
        let ahead = camera.view().transform_point3(Vec3::new(-1.0, 0.0, 0.0));
        assert!((ahead - Vec3::new(0.0, 0.0, -1.0)).length() < 1e-5);
    }
}
