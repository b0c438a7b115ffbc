use std::collections::HashSet;

use glam::{Mat4, Vec4};

use crate::error::RenderError;
use crate::resources::{
    DrawableHandle, Geometry, MaterialHandle, Shader, ShaderHandle, SlotBinding,
};

use super::{FrameGlobals, StandardUniforms};

/// Material as seen by a backend. `shader` is `None` when the material's shader did not
/// compile and the backend's fixed error shader must be used instead.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaterialBinding {
    pub material: MaterialHandle,
    pub shader: Option<ShaderHandle>,
    pub color: Vec4,
}

impl MaterialBinding {
    pub fn uses_error_shader(&self) -> bool {
        self.shader.is_none()
    }
}

/// Graphics device operations the renderer drives, in the order it drives them.
pub trait GraphicsBackend {
    fn compile_shader(&mut self, handle: ShaderHandle, shader: &Shader) -> Result<(), RenderError>;

    /// Binds and clears the off-screen target.
    fn begin_scene_pass(&mut self, clear_color: Vec4) -> Result<(), RenderError>;

    fn bind_material(&mut self, binding: &MaterialBinding);

    fn set_uniforms(&mut self, uniforms: &StandardUniforms);

    fn bind_slot(&mut self, slot: u32, binding: &SlotBinding);

    /// Issues one draw. `geometry` is `None` for drawables the resource cache does not know.
    fn draw(&mut self, drawable: DrawableHandle, geometry: Option<&Geometry>);

    /// Fills untouched depth with the skybox (depth compare less-or-equal).
    fn draw_skybox(&mut self, binding: &MaterialBinding, globals: &FrameGlobals);

    fn end_scene_pass(&mut self);

    /// Samples the off-screen target onto the final target through the post-process material.
    fn post_process(&mut self) -> Result<(), RenderError>;
}

/// A call observed by [`RecordingBackend`].
#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    CompileShader(String),
    BeginScenePass,
    BindMaterial {
        material: MaterialHandle,
        error_shader: bool,
    },
    SetUniforms {
        world: Mat4,
    },
    BindSlot(u32),
    Draw(DrawableHandle),
    DrawSkybox(MaterialHandle),
    EndScenePass,
    PostProcess,
}

/// Headless backend that records every call. Used by tests and `--summary-only` runs.
#[derive(Debug, Default)]
pub struct RecordingBackend {
    calls: Vec<BackendCall>,
    failing_shaders: HashSet<String>,
    passes: usize,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `compile_shader` fail for shaders with any of these names.
    pub fn with_failing_shaders<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            failing_shaders: names.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> &[BackendCall] {
        &self.calls
    }

    pub fn draws(&self) -> Vec<DrawableHandle> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                BackendCall::Draw(drawable) => Some(*drawable),
                _ => None,
            })
            .collect()
    }

    pub fn passes(&self) -> usize {
        self.passes
    }

    pub fn clear(&mut self) {
        self.calls.clear();
    }
}

impl GraphicsBackend for RecordingBackend {
    fn compile_shader(&mut self, _handle: ShaderHandle, shader: &Shader) -> Result<(), RenderError> {
        self.calls.push(BackendCall::CompileShader(shader.name.clone()));
        if self.failing_shaders.contains(&shader.name) {
            return Err(RenderError::ShaderCompile {
                name: shader.name.clone(),
                message: "rejected by recording backend".into(),
            });
        }
        Ok(())
    }

    fn begin_scene_pass(&mut self, _clear_color: Vec4) -> Result<(), RenderError> {
        self.calls.push(BackendCall::BeginScenePass);
        Ok(())
    }

    fn bind_material(&mut self, binding: &MaterialBinding) {
        self.calls.push(BackendCall::BindMaterial {
            material: binding.material,
            error_shader: binding.uses_error_shader(),
        });
    }

    fn set_uniforms(&mut self, uniforms: &StandardUniforms) {
        self.calls.push(BackendCall::SetUniforms {
            world: uniforms.world,
        });
    }

    fn bind_slot(&mut self, slot: u32, _binding: &SlotBinding) {
        self.calls.push(BackendCall::BindSlot(slot));
    }

    fn draw(&mut self, drawable: DrawableHandle, _geometry: Option<&Geometry>) {
        self.calls.push(BackendCall::Draw(drawable));
    }

    fn draw_skybox(&mut self, binding: &MaterialBinding, _globals: &FrameGlobals) {
        self.calls.push(BackendCall::DrawSkybox(binding.material));
    }

    fn end_scene_pass(&mut self) {
        self.calls.push(BackendCall::EndScenePass);
    }

    fn post_process(&mut self) -> Result<(), RenderError> {
        self.calls.push(BackendCall::PostProcess);
        self.passes += 1;
        Ok(())
    }
}
