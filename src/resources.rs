//! Path-keyed resource caches and the opaque handles the core passes around.
//!
//! The first request for a path loads and caches the resource; later requests for the
//! same path return the same handle. A failed load is logged and a placeholder is cached
//! in its place so the frame loop never has to deal with a missing resource.

use std::collections::HashMap;
use std::sync::Arc;

use glam::{Vec3, Vec4};
use log::{error, warn};
use slotmap::{new_key_type, Key, SecondaryMap, SlotMap};

use crate::component::mesh::MeshInfo;
use crate::error::ResourceError;

new_key_type! {
    pub struct ShaderHandle;
    pub struct MaterialHandle;
    pub struct TextureHandle;
    pub struct DrawableHandle;
    pub struct MeshHandle;
}

/// Cache of resources of one kind, keyed by logical path.
#[derive(Debug)]
pub struct Library<K: Key, T> {
    label: &'static str,
    items: SlotMap<K, T>,
    by_path: HashMap<String, K>,
    paths: SecondaryMap<K, String>,
}

impl<K: Key, T> Library<K, T> {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            items: SlotMap::with_key(),
            by_path: HashMap::new(),
            paths: SecondaryMap::new(),
        }
    }

    /// Stores `item` under `path`, replacing whatever the path held before.
    pub fn insert(&mut self, path: impl Into<String>, item: T) -> K {
        let path = path.into();
        if let Some(&key) = self.by_path.get(&path) {
            if let Some(slot) = self.items.get_mut(key) {
                *slot = item;
                return key;
            }
        }
        let key = self.items.insert(item);
        self.paths.insert(key, path.clone());
        self.by_path.insert(path, key);
        key
    }

    /// Returns the cached handle for `path`, loading it on first request.
    pub fn load_with<L, F>(&mut self, path: &str, loader: L, fallback: F) -> K
    where
        L: FnOnce(&str) -> anyhow::Result<T>,
        F: FnOnce() -> T,
    {
        if let Some(&key) = self.by_path.get(path) {
            return key;
        }
        let item = match loader(path) {
            Ok(item) => item,
            Err(err) => {
                error!("failed to load {} {path}: {err:?}", self.label);
                fallback()
            }
        };
        self.insert(path, item)
    }

    pub fn get(&self, key: K) -> Option<&T> {
        self.items.get(key)
    }

    pub fn get_mut(&mut self, key: K) -> Option<&mut T> {
        self.items.get_mut(key)
    }

    pub fn handle(&self, path: &str) -> Option<K> {
        self.by_path.get(path).copied()
    }

    /// Looks up `path`, reporting a typed error when it has never been loaded.
    pub fn require(&self, path: &str) -> Result<K, ResourceError> {
        self.handle(path)
            .ok_or_else(|| ResourceError::NotFound(path.to_string()))
    }

    pub fn path(&self, key: K) -> Option<&str> {
        self.paths.get(key).map(String::as_str)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (K, &mut T)> {
        self.items.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Compile state of a shader as reported by the graphics backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShaderStatus {
    Pending,
    Compiled,
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct Shader {
    pub name: String,
    pub source: String,
    pub status: ShaderStatus,
}

impl Shader {
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            status: ShaderStatus::Pending,
        }
    }

    pub fn is_compiled(&self) -> bool {
        self.status == ShaderStatus::Compiled
    }
}

/// Resource bound to a numbered material slot.
#[derive(Debug, Clone, PartialEq)]
pub enum SlotBinding {
    Texture(TextureHandle),
    Uniforms(Vec<f32>),
}

#[derive(Debug, Clone)]
pub struct Material {
    pub name: String,
    pub shader: ShaderHandle,
    pub color: Vec4,
    pub bindings: Vec<(u32, SlotBinding)>,
}

impl Material {
    pub fn new(name: impl Into<String>, shader: ShaderHandle) -> Self {
        Self {
            name: name.into(),
            shader,
            color: Vec4::ONE,
            bindings: Vec::new(),
        }
    }

    pub fn with_color(mut self, color: Vec4) -> Self {
        self.color = color;
        self
    }

    pub fn with_texture(mut self, slot: u32, texture: TextureHandle) -> Self {
        self.bindings.push((slot, SlotBinding::Texture(texture)));
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Texture {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl Texture {
    /// Magenta/black checker substituted for textures that fail to load.
    pub fn missing(name: &str) -> Self {
        let magenta = [255, 0, 255, 255];
        let black = [0, 0, 0, 255];
        let pixels = [magenta, black, black, magenta].concat();
        Self {
            name: name.to_string(),
            width: 2,
            height: 2,
            pixels,
        }
    }
}

/// Interleaved `position.xyz normal.xyz` vertices plus triangle indices.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Geometry {
    pub vertices: Vec<f32>,
    pub indices: Vec<u32>,
}

impl Geometry {
    pub fn unit_cube() -> Self {
        Self {
            vertices: CUBE_VERTICES.to_vec(),
            indices: CUBE_INDICES.to_vec(),
        }
    }

    pub fn bounds(&self) -> (Vec3, Vec3) {
        let mut min = Vec3::splat(f32::MAX);
        let mut max = Vec3::splat(f32::MIN);
        for vertex in self.vertices.chunks_exact(6) {
            let position = Vec3::new(vertex[0], vertex[1], vertex[2]);
            min = min.min(position);
            max = max.max(position);
        }
        if self.vertices.is_empty() {
            (Vec3::ZERO, Vec3::ZERO)
        } else {
            (min, max)
        }
    }
}

pub const SOLID_SHADER: &str = "builtin/solid";
pub const DEFAULT_MATERIAL: &str = "builtin/default";
pub const CUBE_DRAWABLE: &str = "builtin/cube";

/// Every cache the engine core reads from.
#[derive(Debug)]
pub struct Resources {
    pub shaders: Library<ShaderHandle, Shader>,
    pub materials: Library<MaterialHandle, Material>,
    pub textures: Library<TextureHandle, Texture>,
    pub geometry: Library<DrawableHandle, Geometry>,
    pub meshes: Library<MeshHandle, Arc<MeshInfo>>,
    default_material: MaterialHandle,
    cube: DrawableHandle,
}

impl Default for Resources {
    fn default() -> Self {
        Self::new()
    }
}

impl Resources {
    pub fn new() -> Self {
        let mut shaders = Library::new("shader");
        let mut materials = Library::new("material");
        let mut geometry = Library::new("geometry");
        let solid = shaders.insert(SOLID_SHADER, Shader::new(SOLID_SHADER, SOLID_SHADER_SOURCE));
        let default_material = materials.insert(
            DEFAULT_MATERIAL,
            Material::new(DEFAULT_MATERIAL, solid).with_color(Vec4::new(0.8, 0.8, 0.8, 1.0)),
        );
        let cube = geometry.insert(CUBE_DRAWABLE, Geometry::unit_cube());
        Self {
            shaders,
            materials,
            textures: Library::new("texture"),
            geometry,
            meshes: Library::new("mesh"),
            default_material,
            cube,
        }
    }

    pub fn default_material(&self) -> MaterialHandle {
        self.default_material
    }

    pub fn cube(&self) -> DrawableHandle {
        self.cube
    }

    pub fn solid_shader(&self) -> Option<ShaderHandle> {
        self.shaders.handle(SOLID_SHADER)
    }

    pub fn load_texture<L>(&mut self, path: &str, loader: L) -> TextureHandle
    where
        L: FnOnce(&str) -> anyhow::Result<Texture>,
    {
        self.textures
            .load_with(path, loader, || Texture::missing(path))
    }

    pub fn load_shader<L>(&mut self, path: &str, loader: L) -> ShaderHandle
    where
        L: FnOnce(&str) -> anyhow::Result<String>,
    {
        self.shaders.load_with(
            path,
            |path| loader(path).map(|source| Shader::new(path, source)),
            || {
                let mut shader = Shader::new(path, "");
                shader.status = ShaderStatus::Failed("source unavailable".into());
                shader
            },
        )
    }

    /// Resolves a material by path, falling back to the default material.
    pub fn material_or_default(&self, path: &str) -> MaterialHandle {
        if path.is_empty() {
            return self.default_material;
        }
        match self.materials.handle(path) {
            Some(handle) => handle,
            None => {
                warn!("material {path} is not loaded; using the default material");
                self.default_material
            }
        }
    }

    pub fn material_path(&self, handle: MaterialHandle) -> &str {
        self.materials.path(handle).unwrap_or_default()
    }

    pub fn register_mesh(&mut self, info: MeshInfo) -> Arc<MeshInfo> {
        let info = Arc::new(info);
        self.meshes.insert(info.source.clone(), Arc::clone(&info));
        info
    }

    /// Returns the mesh registered under `path`, or an empty placeholder that keeps the path.
    pub fn mesh_or_placeholder(&self, path: &str) -> Arc<MeshInfo> {
        match self
            .meshes
            .require(path)
            .ok()
            .and_then(|handle| self.meshes.get(handle))
        {
            Some(info) => Arc::clone(info),
            None => {
                if !path.is_empty() {
                    warn!("mesh {path} is not registered; substituting an empty mesh");
                }
                Arc::new(MeshInfo::placeholder(path))
            }
        }
    }
}

const SOLID_SHADER_SOURCE: &str = r#"
struct GlobalUniform {
    view_proj: mat4x4<f32>,
    camera_position: vec4<f32>,
    light_position: vec4<f32>,
    light_color: vec4<f32>,
}

struct ObjectConstants {
    model: mat4x4<f32>,
    normal: mat3x4<f32>,
    color: vec4<f32>,
}

@group(0) @binding(0)
var<uniform> globals: GlobalUniform;

@group(1) @binding(0)
var<uniform> object: ObjectConstants;

struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
}

struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) world_pos: vec3<f32>,
    @location(1) normal: vec3<f32>,
}

@vertex
fn vs_main(input: VertexInput) -> VertexOutput {
    var out: VertexOutput;
    let world_position = object.model * vec4<f32>(input.position, 1.0);
    out.position = globals.view_proj * world_position;
    out.world_pos = world_position.xyz;
    let world_normal = mat3x3<f32>(
        object.normal[0].xyz,
        object.normal[1].xyz,
        object.normal[2].xyz
    ) * input.normal;
    out.normal = normalize(world_normal);
    return out;
}

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    let light_dir = normalize(globals.light_position.xyz - input.world_pos);
    let normal = normalize(input.normal);
    let diffuse = max(dot(normal, light_dir), 0.0);
    let lit = (0.15 + diffuse * globals.light_color.w) * object.color.rgb * globals.light_color.xyz;
    return vec4<f32>(lit, object.color.a);
}
"#;

const CUBE_VERTICES: &[f32] = &[
    // positions        // normals
    -0.5, -0.5, 0.5, 0.0, 0.0, 1.0, 0.5, -0.5, 0.5, 0.0, 0.0, 1.0, 0.5, 0.5, 0.5, 0.0, 0.0, 1.0,
    -0.5, 0.5, 0.5, 0.0, 0.0, 1.0, -0.5, -0.5, -0.5, 0.0, 0.0, -1.0, 0.5, -0.5, -0.5, 0.0, 0.0,
    -1.0, 0.5, 0.5, -0.5, 0.0, 0.0, -1.0, -0.5, 0.5, -0.5, 0.0, 0.0, -1.0, -0.5, -0.5, -0.5, -1.0,
    0.0, 0.0, -0.5, -0.5, 0.5, -1.0, 0.0, 0.0, -0.5, 0.5, 0.5, -1.0, 0.0, 0.0, -0.5, 0.5, -0.5,
    -1.0, 0.0, 0.0, 0.5, -0.5, -0.5, 1.0, 0.0, 0.0, 0.5, -0.5, 0.5, 1.0, 0.0, 0.0, 0.5, 0.5, 0.5,
    1.0, 0.0, 0.0, 0.5, 0.5, -0.5, 1.0, 0.0, 0.0, -0.5, -0.5, -0.5, 0.0, -1.0, 0.0, 0.5, -0.5,
    -0.5, 0.0, -1.0, 0.0, 0.5, -0.5, 0.5, 0.0, -1.0, 0.0, -0.5, -0.5, 0.5, 0.0, -1.0, 0.0, -0.5,
    0.5, -0.5, 0.0, 1.0, 0.0, 0.5, 0.5, -0.5, 0.0, 1.0, 0.0, 0.5, 0.5, 0.5, 0.0, 1.0, 0.0, -0.5,
    0.5, 0.5, 0.0, 1.0, 0.0,
];

const CUBE_INDICES: &[u32] = &[
    0, 1, 2, 0, 2, 3, // front
    4, 6, 5, 4, 7, 6, // back
    8, 9, 10, 8, 10, 11, // left
    12, 14, 13, 12, 15, 14, // right
    16, 18, 17, 16, 19, 18, // bottom
    20, 21, 22, 20, 22, 23, // top
];

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn same_path_returns_same_handle() {
        let mut resources = Resources::new();
        let mut loads = 0;
        let first = resources.load_shader("shaders/lit.wgsl", |_| {
            loads += 1;
            Ok("source".to_string())
        });
        let second = resources.load_shader("shaders/lit.wgsl", |_| {
            Ok("other".to_string())
        });
        assert_eq!(first, second);
        assert_eq!(loads, 1);
        assert_eq!(resources.shaders.get(first).unwrap().source, "source");
    }

    #[test]
    fn failed_texture_load_caches_placeholder() {
        let mut resources = Resources::new();
        let handle = resources.load_texture("textures/absent.png", |path| {
            Err(anyhow!("{path} does not exist"))
        });
        let texture = resources.textures.get(handle).unwrap();
        assert_eq!(texture, &Texture::missing("textures/absent.png"));
        assert_eq!(resources.textures.path(handle), Some("textures/absent.png"));
    }

    #[test]
    fn builtins_are_available() {
        let resources = Resources::new();
        assert!(!resources.default_material().is_null());
        let cube = resources.geometry.get(resources.cube()).unwrap();
        assert_eq!(cube.indices.len(), 36);
        assert_eq!(cube.bounds(), (Vec3::splat(-0.5), Vec3::splat(0.5)));
        assert_eq!(
            resources.material_or_default("materials/unknown"),
            resources.default_material()
        );
    }
}
