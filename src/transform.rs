use glam::{EulerRot, Mat4, Quat, Vec3};

use crate::error::ArchiveError;
use crate::persistence::{ArchiveReader, ArchiveWriter};

/// Pose of an entity (or a collider offset) and its cached world matrix.
///
/// The world matrix is `T(position) · R(rotation) · S(overall_scale · scale)`. It is only
/// refreshed by [`Transform::update`], which the scene calls once per tick before any
/// component of the owning entity runs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    /// Local Euler angles in degrees.
    pub euler_angles: Vec3,
    pub scale: Vec3,
    pub overall_scale: f32,
    rotation: Quat,
    world: Mat4,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            euler_angles: Vec3::ZERO,
            scale: Vec3::ONE,
            overall_scale: 1.0,
            rotation: Quat::IDENTITY,
            world: Mat4::IDENTITY,
        }
    }
}

impl Transform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_position(position: Vec3) -> Self {
        let mut transform = Self {
            position,
            ..Self::default()
        };
        transform.update();
        transform
    }

    pub fn with_euler(mut self, degrees: Vec3) -> Self {
        self.euler_angles = degrees;
        self.update();
        self
    }

    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self.update();
        self
    }

    /// Re-derives the rotation quaternion and the cached world matrix.
    pub fn update(&mut self) {
        self.rotation = euler_to_quat(self.euler_angles);
        self.world = self.compose();
    }

    /// Builds the world matrix from the current fields without touching the cache.
    pub fn compose(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(
            self.total_scale(),
            euler_to_quat(self.euler_angles),
            self.position,
        )
    }

    pub fn world_matrix(&self) -> Mat4 {
        self.world
    }

    pub fn rotation(&self) -> Quat {
        self.rotation
    }

    pub fn total_scale(&self) -> Vec3 {
        self.scale * self.overall_scale
    }

    /// Local X/Y/Z axes in world space for the current Euler angles.
    pub fn axes(&self) -> [Vec3; 3] {
        let rotation = euler_to_quat(self.euler_angles);
        [rotation * Vec3::X, rotation * Vec3::Y, rotation * Vec3::Z]
    }

    pub fn forward(&self) -> Vec3 {
        euler_to_quat(self.euler_angles) * Vec3::NEG_Z
    }

    pub fn up(&self) -> Vec3 {
        euler_to_quat(self.euler_angles) * Vec3::Y
    }

    /// Wraps every Euler angle into (-180, 180].
    pub fn normalize_euler(&mut self) {
        self.euler_angles = Vec3::new(
            wrap_degrees(self.euler_angles.x),
            wrap_degrees(self.euler_angles.y),
            wrap_degrees(self.euler_angles.z),
        );
    }

    pub(crate) fn save(&self, writer: &mut dyn ArchiveWriter) {
        writer.write_vec3("position", self.position);
        writer.write_vec3("euler", self.euler_angles);
        writer.write_vec3("scale", self.scale);
        writer.write_f32("overall_scale", self.overall_scale);
    }

    pub(crate) fn load(reader: &mut dyn ArchiveReader) -> Result<Self, ArchiveError> {
        let mut transform = Self {
            position: reader.read_vec3("position")?,
            euler_angles: reader.read_vec3("euler")?,
            scale: reader.read_vec3("scale")?,
            overall_scale: reader.read_f32("overall_scale")?,
            ..Self::default()
        };
        transform.update();
        Ok(transform)
    }
}

/// Converts Euler degrees to a quaternion applying Z, then Y, then X.
pub fn euler_to_quat(degrees: Vec3) -> Quat {
    Quat::from_euler(
        EulerRot::ZYX,
        degrees.z.to_radians(),
        degrees.y.to_radians(),
        degrees.x.to_radians(),
    )
}

pub fn wrap_degrees(angle: f32) -> f32 {
    let mut wrapped = angle % 360.0;
    if wrapped <= -180.0 {
        wrapped += 360.0;
    } else if wrapped > 180.0 {
        wrapped -= 360.0;
    }
    wrapped
}
