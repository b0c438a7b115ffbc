use glam::Vec3;

use crate::error::ArchiveError;
use crate::persistence::{ArchiveReader, ArchiveWriter};
use crate::render::LightParams;

/// Point light. The first active light of the scene feeds the renderer's light uniforms.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Light {
    pub color: Vec3,
    pub intensity: f32,
}

impl Default for Light {
    fn default() -> Self {
        Self {
            color: Vec3::ONE,
            intensity: 1.0,
        }
    }
}

impl Light {
    pub fn new(color: Vec3, intensity: f32) -> Self {
        Self { color, intensity }
    }

    pub fn params(&self, position: Vec3) -> LightParams {
        LightParams {
            position,
            color: self.color,
            intensity: self.intensity.max(0.1),
        }
    }

    pub(crate) fn save(&self, writer: &mut dyn ArchiveWriter) {
        writer.write_vec3("color", self.color);
        writer.write_f32("intensity", self.intensity);
    }

    pub(crate) fn load(reader: &mut dyn ArchiveReader) -> Result<Self, ArchiveError> {
        Ok(Self::new(
            reader.read_vec3("color")?,
            reader.read_f32("intensity")?,
        ))
    }
}
