//! Engine configuration, read from a JSON file.

use std::fs;
use std::path::Path;

use glam::{Vec3, Vec4};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Loop, physics and presentation settings. Missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Seconds simulated by one physics tick.
    pub fixed_delta: f32,
    /// Physics ticks run per frame at most; older backlog is dropped.
    pub max_catch_up_steps: u32,
    pub gravity: Vec3,
    pub max_substeps: usize,
    pub undo_capacity: usize,
    pub worker_threads: usize,
    pub clear_color: Vec4,
    pub viewport: Viewport,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn aspect(&self) -> f32 {
        if self.height == 0 {
            1.0
        } else {
            self.width as f32 / self.height as f32
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fixed_delta: 1.0 / 60.0,
            max_catch_up_steps: 5,
            gravity: Vec3::new(0.0, -9.81, 0.0),
            max_substeps: 5,
            undo_capacity: 64,
            worker_threads: 2,
            clear_color: Vec4::new(0.1, 0.1, 0.12, 1.0),
            viewport: Viewport {
                width: 1280,
                height: 720,
            },
        }
    }
}

impl EngineConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.fixed_delta.is_finite() && self.fixed_delta > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "fixed_delta must be positive, got {}",
                self.fixed_delta
            )));
        }
        if self.max_substeps == 0 {
            return Err(ConfigError::Invalid("max_substeps must be at least 1".into()));
        }
        if self.undo_capacity == 0 {
            return Err(ConfigError::Invalid("undo_capacity must be at least 1".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn missing_fields_default() {
        let config = EngineConfig::from_json(r#"{ "max_catch_up_steps": 2 }"#).unwrap();
        assert_eq!(config.max_catch_up_steps, 2);
        assert_eq!(config.gravity, Vec3::new(0.0, -9.81, 0.0));
        assert_eq!(config.viewport.width, 1280);
    }

    #[test]
    fn loads_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "gravity": [0.0, -1.0, 0.0], "viewport": {{ "width": 800, "height": 600 }} }}"#
        )
        .unwrap();
        let config = EngineConfig::load(file.path()).unwrap();
        assert_eq!(config.gravity, Vec3::new(0.0, -1.0, 0.0));
        assert!((config.viewport.aspect() - 800.0 / 600.0).abs() < 1e-6);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            EngineConfig::from_json(r#"{ "fixed_delta": 0.0 }"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            EngineConfig::from_json("{ not json"),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            EngineConfig::load("/definitely/not/here.json"),
            Err(ConfigError::Io(_))
        ));
    }

    #[test]
    fn survives_a_json_round_trip() {
        let config = EngineConfig {
            undo_capacity: 3,
            ..EngineConfig::default()
        };
        let back = EngineConfig::from_json(&config.to_json().unwrap()).unwrap();
        assert_eq!(back, config);
    }
}
