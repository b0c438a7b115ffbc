//! Mesh rendering and skeletal animation sampling.
//!
//! Mesh import lives outside the engine; a [`MeshInfo`] is the ready-to-draw result it
//! hands over.

use std::collections::HashMap;
use std::sync::Arc;

use glam::{Mat4, Quat, Vec3};
use slotmap::Key;

use crate::error::ArchiveError;
use crate::persistence::{ArchiveReader, ArchiveWriter};
use crate::render::RenderCommand;
use crate::resources::{DrawableHandle, MaterialHandle, Resources};

use super::UpdateContext;

/// Imported mesh: drawable sub-meshes with parallel materials and a local bound.
#[derive(Debug, Clone, Default)]
pub struct MeshInfo {
    /// Library path the mesh was registered under.
    pub source: String,
    pub submeshes: Vec<DrawableHandle>,
    pub materials: Vec<MaterialHandle>,
    pub bound_min: Vec3,
    pub bound_max: Vec3,
    pub skeleton: Option<Skeleton>,
    pub animations: Vec<AnimationClip>,
}

impl MeshInfo {
    /// Empty mesh substituted when `source` cannot be resolved.
    pub fn placeholder(source: &str) -> Self {
        Self {
            source: source.to_string(),
            ..Self::default()
        }
    }

    /// Single sub-mesh unit cube using the built-in geometry and default material.
    pub fn cube(source: &str, resources: &Resources) -> Self {
        Self {
            source: source.to_string(),
            submeshes: vec![resources.cube()],
            materials: vec![resources.default_material()],
            bound_min: Vec3::splat(-0.5),
            bound_max: Vec3::splat(0.5),
            skeleton: None,
            animations: Vec::new(),
        }
    }

    pub fn has_bound(&self) -> bool {
        self.bound_max.cmpgt(self.bound_min).all()
    }

    pub fn animation(&self, name: &str) -> Option<&AnimationClip> {
        self.animations.iter().find(|clip| clip.name == name)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Skeleton {
    pub bone_offsets: Vec<Mat4>,
    pub bone_names: HashMap<String, usize>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keyframe<T> {
    pub time: f32,
    pub value: T,
}

#[derive(Debug, Clone, Default)]
pub struct BoneTrack {
    pub bone: String,
    pub positions: Vec<Keyframe<Vec3>>,
    pub rotations: Vec<Keyframe<Quat>>,
    pub scales: Vec<Keyframe<Vec3>>,
}

impl BoneTrack {
    /// Local bone transform at `tick`.
    pub fn sample(&self, tick: f32) -> Mat4 {
        let position = sample_keys(&self.positions, tick, Vec3::ZERO, Vec3::lerp);
        let rotation = sample_keys(&self.rotations, tick, Quat::IDENTITY, Quat::slerp);
        let scale = sample_keys(&self.scales, tick, Vec3::ONE, Vec3::lerp);
        Mat4::from_scale_rotation_translation(scale, rotation, position)
    }
}

fn sample_keys<T: Copy>(
    keys: &[Keyframe<T>],
    tick: f32,
    default: T,
    blend: impl Fn(T, T, f32) -> T,
) -> T {
    let Some(first) = keys.first() else {
        return default;
    };
    if keys.len() == 1 || tick <= first.time {
        return first.value;
    }
    for pair in keys.windows(2) {
        let (from, to) = (&pair[0], &pair[1]);
        if tick < to.time {
            let span = to.time - from.time;
            let factor = if span > f32::EPSILON {
                (tick - from.time) / span
            } else {
                0.0
            };
            return blend(from.value, to.value, factor);
        }
    }
    keys[keys.len() - 1].value
}

/// Named clip. `duration` is measured in ticks.
#[derive(Debug, Clone, Default)]
pub struct AnimationClip {
    pub name: String,
    pub duration: f32,
    pub ticks_per_second: f32,
    pub tracks: Vec<BoneTrack>,
}

impl AnimationClip {
    /// Tick position for `seconds` of playback, wrapped into the clip.
    pub fn tick_at(&self, seconds: f32) -> f32 {
        let ticks_per_second = if self.ticks_per_second > 0.0 {
            self.ticks_per_second
        } else {
            25.0
        };
        if self.duration <= 0.0 {
            return 0.0;
        }
        (seconds * ticks_per_second).rem_euclid(self.duration)
    }

    /// Skinning palette (`sampled · bone offset`) for every bone of `skeleton`.
    pub fn palette(&self, skeleton: &Skeleton, seconds: f32) -> Vec<Mat4> {
        let tick = self.tick_at(seconds);
        let mut palette = vec![Mat4::IDENTITY; skeleton.bone_offsets.len()];
        for track in &self.tracks {
            if let Some(&bone) = skeleton.bone_names.get(&track.bone) {
                if let Some(slot) = palette.get_mut(bone) {
                    *slot = track.sample(tick) * skeleton.bone_offsets[bone];
                }
            }
        }
        palette
    }
}

/// Draws a [`MeshInfo`] at its owner's transform, optionally playing one clip.
#[derive(Debug, Clone)]
pub struct MeshRenderer {
    pub mesh: Arc<MeshInfo>,
    animation: Option<String>,
    elapsed: f32,
    palette: Option<Arc<[Mat4]>>,
}

impl Default for MeshRenderer {
    fn default() -> Self {
        Self::new(Arc::new(MeshInfo::default()))
    }
}

impl MeshRenderer {
    pub fn new(mesh: Arc<MeshInfo>) -> Self {
        Self {
            mesh,
            animation: None,
            elapsed: 0.0,
            palette: None,
        }
    }

    pub fn play(&mut self, clip: impl Into<String>) {
        self.animation = Some(clip.into());
        self.elapsed = 0.0;
    }

    pub fn stop(&mut self) {
        self.animation = None;
        self.palette = None;
    }

    pub fn animation(&self) -> Option<&str> {
        self.animation.as_deref()
    }

    pub fn palette(&self) -> Option<&[Mat4]> {
        self.palette.as_deref()
    }

    pub(crate) fn update(&mut self, ctx: &mut UpdateContext<'_>) {
        self.elapsed += ctx.delta_time;
        self.animate();

        let world = ctx.transform.world_matrix();
        for (index, drawable) in self.mesh.submeshes.iter().enumerate() {
            let material = self
                .mesh
                .materials
                .get(index)
                .copied()
                .filter(|material| !material.is_null())
                .unwrap_or_else(|| ctx.resources.default_material());
            let mut command = RenderCommand::new(material, *drawable, world);
            if let Some(palette) = &self.palette {
                command = command.with_bones(Arc::clone(palette));
            }
            ctx.queue.submit(command);
        }
    }

    fn animate(&mut self) {
        let (Some(name), Some(skeleton)) = (&self.animation, &self.mesh.skeleton) else {
            return;
        };
        if let Some(clip) = self.mesh.animation(name) {
            self.palette = Some(clip.palette(skeleton, self.elapsed).into());
        }
    }

    pub(crate) fn save(&self, writer: &mut dyn ArchiveWriter) {
        writer.write_str("mesh", &self.mesh.source);
        writer.write_str("animation", self.animation.as_deref().unwrap_or_default());
    }

    pub(crate) fn load(
        reader: &mut dyn ArchiveReader,
        resources: &Resources,
    ) -> Result<Self, ArchiveError> {
        let mesh = resources.mesh_or_placeholder(&reader.read_str("mesh")?);
        let mut renderer = Self::new(mesh);
        let animation = reader.read_str("animation")?;
        if !animation.is_empty() {
            renderer.play(animation);
        }
        Ok(renderer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn swinging_clip() -> (Skeleton, AnimationClip) {
        let skeleton = Skeleton {
            bone_offsets: vec![Mat4::from_translation(Vec3::new(0.0, -1.0, 0.0))],
            bone_names: HashMap::from([("arm".to_string(), 0)]),
        };
        let clip = AnimationClip {
            name: "swing".into(),
            duration: 10.0,
            ticks_per_second: 10.0,
            tracks: vec![BoneTrack {
                bone: "arm".into(),
                positions: vec![
                    Keyframe {
                        time: 0.0,
                        value: Vec3::ZERO,
                    },
                    Keyframe {
                        time: 10.0,
                        value: Vec3::new(10.0, 0.0, 0.0),
                    },
                ],
                ..BoneTrack::default()
            }],
        };
        (skeleton, clip)
    }

    #[test]
    fn keys_are_interpolated_between_frames() {
        let (_, clip) = swinging_clip();
        let sampled = clip.tracks[0].sample(2.5);
        assert!((sampled.w_axis.x - 2.5).abs() < 1e-5);
    }

    #[test]
    fn playback_time_wraps_around_duration() {
        let (_, clip) = swinging_clip();
        assert!((clip.tick_at(0.25) - 2.5).abs() < 1e-5);
        assert!((clip.tick_at(1.25) - 2.5).abs() < 1e-4);
    }

    #[test]
    fn palette_applies_bone_offset() {
        let (skeleton, clip) = swinging_clip();
        let palette = clip.palette(&skeleton, 0.5);
        let point = palette[0].transform_point3(Vec3::ZERO);
        assert!((point - Vec3::new(5.0, -1.0, 0.0)).length() < 1e-4);
    }
}
