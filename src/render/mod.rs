//! Deferred render submission and the two-pass renderer that drains it.

mod backend;
#[cfg(feature = "gpu")]
pub mod gpu;
mod queue;

use std::sync::Arc;

use glam::{Mat4, Vec3, Vec4};
use log::{debug, error};

use crate::error::RenderError;
use crate::resources::{MaterialHandle, Resources, ShaderStatus};

pub use backend::{BackendCall, GraphicsBackend, MaterialBinding, RecordingBackend};
pub use queue::{RenderCommand, RenderQueue};

/// Camera parameters consumed by the renderer's uniform buffer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraParams {
    pub view: Mat4,
    pub projection: Mat4,
    pub position: Vec3,
}

impl CameraParams {
    pub fn view_proj(&self) -> Mat4 {
        self.projection * self.view
    }
}

impl Default for CameraParams {
    fn default() -> Self {
        let position = Vec3::new(0.0, 2.0, 6.0);
        Self {
            view: Mat4::look_at_rh(position, Vec3::ZERO, Vec3::Y),
            projection: Mat4::perspective_rh_gl(60f32.to_radians(), 16.0 / 9.0, 0.1, 100.0),
            position,
        }
    }
}

/// Lighting state consumed by the renderer's uniform buffer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightParams {
    pub position: Vec3,
    pub color: Vec3,
    pub intensity: f32,
}

impl Default for LightParams {
    fn default() -> Self {
        Self {
            position: Vec3::new(3.0, 5.0, -3.0),
            color: Vec3::ONE,
            intensity: 1.0,
        }
    }
}

/// Per-frame values shared by every draw.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameGlobals {
    pub camera: CameraParams,
    pub light: LightParams,
}

/// Uniforms set before each draw: world/view/projection, camera position and light.
#[derive(Debug, Clone)]
pub struct StandardUniforms {
    pub world: Mat4,
    pub view: Mat4,
    pub projection: Mat4,
    pub camera_position: Vec3,
    pub light: LightParams,
    pub color: Vec4,
    pub bones: Option<Arc<[Mat4]>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub draws: usize,
    pub error_shader_draws: usize,
    pub skybox: bool,
}

/// Two-pass consumer of the render queue.
pub struct Renderer<B: GraphicsBackend> {
    backend: B,
    clear_color: Vec4,
    last_stats: FrameStats,
}

impl<B: GraphicsBackend> Renderer<B> {
    pub fn new(backend: B, clear_color: Vec4) -> Self {
        Self {
            backend,
            clear_color,
            last_stats: FrameStats::default(),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn last_stats(&self) -> FrameStats {
        self.last_stats
    }

    /// Compiles every pending shader. A failure is logged and marks the shader failed so
    /// its materials draw with the error shader.
    pub fn prepare(&mut self, resources: &mut Resources) {
        for (handle, shader) in resources.shaders.iter_mut() {
            if shader.status != ShaderStatus::Pending {
                continue;
            }
            shader.status = match self.backend.compile_shader(handle, shader) {
                Ok(()) => ShaderStatus::Compiled,
                Err(err) => {
                    error!("{err}; falling back to the error shader");
                    ShaderStatus::Failed(err.to_string())
                }
            };
        }
    }

    /// Draws and removes every queued command in submission order, then the skybox, then
    /// runs the post-process pass.
    pub fn render(
        &mut self,
        queue: &mut RenderQueue,
        resources: &Resources,
        globals: &FrameGlobals,
        skybox: Option<MaterialHandle>,
    ) -> Result<FrameStats, RenderError> {
        let mut stats = FrameStats::default();
        self.backend.begin_scene_pass(self.clear_color)?;

        while let Some(command) = queue.pop() {
            let binding = material_binding(resources, command.material);
            self.backend.bind_material(&binding);
            self.backend.set_uniforms(&StandardUniforms {
                world: command.world,
                view: globals.camera.view,
                projection: globals.camera.projection,
                camera_position: globals.camera.position,
                light: globals.light,
                color: binding.color,
                bones: command.bones.clone(),
            });
            if let Some(material) = resources.materials.get(binding.material) {
                for (slot, slot_binding) in &material.bindings {
                    self.backend.bind_slot(*slot, slot_binding);
                }
            }
            self.backend
                .draw(command.drawable, resources.geometry.get(command.drawable));
            stats.draws += 1;
            if binding.uses_error_shader() {
                stats.error_shader_draws += 1;
            }
        }

        if let Some(skybox) = skybox {
            let binding = material_binding(resources, skybox);
            self.backend.draw_skybox(&binding, globals);
            stats.skybox = true;
        }

        self.backend.end_scene_pass();
        self.backend.post_process()?;
        debug!(
            "rendered {} draws ({} with the error shader)",
            stats.draws, stats.error_shader_draws
        );
        self.last_stats = stats;
        Ok(stats)
    }
}

/// Resolves the shader a material draws with. Stale materials use the default material;
/// shaders that are not compiled use the error shader.
fn material_binding(resources: &Resources, material: MaterialHandle) -> MaterialBinding {
    let (material, data) = match resources.materials.get(material) {
        Some(data) => (material, Some(data)),
        None => {
            let fallback = resources.default_material();
            (fallback, resources.materials.get(fallback))
        }
    };
    let shader = data
        .map(|data| data.shader)
        .filter(|shader| {
            resources
                .shaders
                .get(*shader)
                .is_some_and(|shader| shader.is_compiled())
        });
    MaterialBinding {
        material,
        shader,
        color: data.map(|data| data.color).unwrap_or(Vec4::ONE),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::{Material, Shader, SlotBinding, Texture};

    fn prepared(backend: RecordingBackend) -> (Renderer<RecordingBackend>, Resources) {
        let mut resources = Resources::new();
        let mut renderer = Renderer::new(backend, Vec4::ZERO);
        renderer.prepare(&mut resources);
        (renderer, resources)
    }

    #[test]
    fn drains_queue_in_submission_order() {
        let (mut renderer, resources) = prepared(RecordingBackend::new());
        let mut queue = RenderQueue::new();
        let mut expected = Vec::new();
        for i in 0..5 {
            let world = Mat4::from_translation(Vec3::new(i as f32, 0.0, 0.0));
            queue.submit(RenderCommand::new(
                resources.default_material(),
                resources.cube(),
                world,
            ));
            expected.push(world);
        }

        let stats = renderer
            .render(&mut queue, &resources, &FrameGlobals::default(), None)
            .unwrap();
        assert_eq!(stats.draws, 5);
        assert!(queue.is_empty());

        let worlds: Vec<Mat4> = renderer
            .backend()
            .calls()
            .iter()
            .filter_map(|call| match call {
                BackendCall::SetUniforms { world } => Some(*world),
                _ => None,
            })
            .collect();
        assert_eq!(worlds, expected);
        let calls = renderer.backend().calls();
        assert_eq!(calls.first(), Some(&BackendCall::CompileShader("builtin/solid".into())));
        assert_eq!(calls.last(), Some(&BackendCall::PostProcess));
    }

    #[test]
    fn failed_shader_draws_with_error_shader() {
        let mut resources = Resources::new();
        let broken = resources.shaders.insert("shaders/broken", Shader::new("shaders/broken", "??"));
        let material = resources
            .materials
            .insert("materials/broken", Material::new("materials/broken", broken));
        let mut renderer = Renderer::new(
            RecordingBackend::with_failing_shaders(["shaders/broken"]),
            Vec4::ZERO,
        );
        renderer.prepare(&mut resources);
        assert!(matches!(
            resources.shaders.get(broken).unwrap().status,
            ShaderStatus::Failed(_)
        ));

        let mut queue = RenderQueue::new();
        queue.submit(RenderCommand::new(material, resources.cube(), Mat4::IDENTITY));
        queue.submit(RenderCommand::new(
            resources.default_material(),
            resources.cube(),
            Mat4::IDENTITY,
        ));
        let stats = renderer
            .render(&mut queue, &resources, &FrameGlobals::default(), None)
            .unwrap();
        assert_eq!(stats.draws, 2);
        assert_eq!(stats.error_shader_draws, 1);
        assert!(renderer.backend().calls().contains(&BackendCall::BindMaterial {
            material,
            error_shader: true,
        }));
    }

    #[test]
    fn skybox_follows_opaque_draws_and_slots_are_bound() {
        let (mut renderer, mut resources) = prepared(RecordingBackend::new());
        let texture = resources.textures.insert("textures/sky.png", Texture::missing("sky"));
        let solid = resources.solid_shader().unwrap();
        let textured = resources.materials.insert(
            "materials/sky",
            Material::new("materials/sky", solid).with_texture(2, texture),
        );
        assert_eq!(
            resources.materials.get(textured).unwrap().bindings[0].1,
            SlotBinding::Texture(texture)
        );

        let mut queue = RenderQueue::new();
        queue.submit(RenderCommand::new(textured, resources.cube(), Mat4::IDENTITY));
        let stats = renderer
            .render(&mut queue, &resources, &FrameGlobals::default(), Some(textured))
            .unwrap();
        assert!(stats.skybox);

        let calls = renderer.backend().calls();
        let draw = calls
            .iter()
            .position(|call| matches!(call, BackendCall::Draw(_)))
            .unwrap();
        let slot = calls
            .iter()
            .position(|call| call == &BackendCall::BindSlot(2))
            .unwrap();
        let sky = calls
            .iter()
            .position(|call| call == &BackendCall::DrawSkybox(textured))
            .unwrap();
        assert!(slot < draw && draw < sky);
    }
}
