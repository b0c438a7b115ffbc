//! Scene save/load over a framing-agnostic reader/writer pair.
//!
//! The archive mirrors the entity tree one to one. A node block holds the transform, the
//! ordered child names followed by one block per child, then the ordered component tags
//! followed by one block per component. Loading a component that fails to parse leaves a
//! default-initialised component in its place and never aborts the rest of the scene.

mod archive;
mod json;

use std::fs;
use std::path::Path;

use glam::{Vec3, Vec4};
use log::{info, warn};

use crate::component::{ComponentData, ComponentKind};
use crate::error::{ArchiveError, SceneError};
use crate::game_object::GameObjectId;
use crate::resources::Resources;
use crate::scene::Scene;
use crate::transform::Transform;

pub use archive::{BinaryReader, BinaryWriter, MAGIC, VERSION};
pub use json::{JsonReader, JsonWriter};

/// Keyed sink for one archive. Binary framing ignores keys and relies on field order.
pub trait ArchiveWriter {
    fn begin_block(&mut self, key: &str);
    fn end_block(&mut self);
    fn write_bool(&mut self, key: &str, value: bool);
    fn write_u32(&mut self, key: &str, value: u32);
    fn write_f32(&mut self, key: &str, value: f32);
    fn write_vec3(&mut self, key: &str, value: Vec3);
    fn write_vec4(&mut self, key: &str, value: Vec4);
    fn write_str(&mut self, key: &str, value: &str);
    fn write_names(&mut self, key: &str, names: &[String]);
}

/// Source for one archive. Fields must be requested in the order they were written.
pub trait ArchiveReader {
    fn begin_block(&mut self, key: &str) -> Result<(), ArchiveError>;
    /// Leaves the current block, skipping any field that was not read.
    fn end_block(&mut self) -> Result<(), ArchiveError>;
    /// Number of blocks currently open.
    fn depth(&self) -> usize;
    fn read_bool(&mut self, key: &str) -> Result<bool, ArchiveError>;
    fn read_u32(&mut self, key: &str) -> Result<u32, ArchiveError>;
    fn read_f32(&mut self, key: &str) -> Result<f32, ArchiveError>;
    fn read_vec3(&mut self, key: &str) -> Result<Vec3, ArchiveError>;
    fn read_vec4(&mut self, key: &str) -> Result<Vec4, ArchiveError>;
    fn read_str(&mut self, key: &str) -> Result<String, ArchiveError>;
    fn read_names(&mut self, key: &str) -> Result<Vec<String>, ArchiveError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneFormat {
    Json,
    Binary,
}

impl SceneFormat {
    /// `.embs` and `.bin` files use the binary framing, anything else is JSON.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("embs") || ext.eq_ignore_ascii_case("bin") => {
                Self::Binary
            }
            _ => Self::Json,
        }
    }
}

/// Writes every live root of `scene` and the scene-level settings.
pub fn save_scene(scene: &Scene, resources: &Resources, writer: &mut dyn ArchiveWriter) {
    writer.begin_block("scene");
    let skybox = scene
        .skybox()
        .map(|handle| resources.material_path(handle))
        .unwrap_or_default();
    writer.write_str("skybox", skybox);
    let roots = live_children(scene, scene.roots());
    writer.write_names("roots", &names_of(scene, &roots));
    for (index, root) in roots.iter().enumerate() {
        writer.begin_block(&format!("root_{index}"));
        save_node(scene, resources, *root, writer);
        writer.end_block();
    }
    writer.end_block();
}

fn live_children(scene: &Scene, ids: &[GameObjectId]) -> Vec<GameObjectId> {
    ids.iter()
        .copied()
        .filter(|id| {
            scene
                .object(*id)
                .is_some_and(|object| !object.is_virtually_deleted())
        })
        .collect()
}

fn names_of(scene: &Scene, ids: &[GameObjectId]) -> Vec<String> {
    ids.iter()
        .filter_map(|id| scene.object(*id).map(|object| object.name.clone()))
        .collect()
}

fn save_node(
    scene: &Scene,
    resources: &Resources,
    id: GameObjectId,
    writer: &mut dyn ArchiveWriter,
) {
    let Some(object) = scene.object(id) else {
        return;
    };
    writer.begin_block("transform");
    object.transform.save(writer);
    writer.end_block();

    let children = live_children(scene, object.children());
    writer.write_names("children", &names_of(scene, &children));
    for (index, child) in children.iter().enumerate() {
        writer.begin_block(&format!("child_{index}"));
        save_node(scene, resources, *child, writer);
        writer.end_block();
    }

    let components: Vec<_> = object
        .components()
        .iter()
        .filter_map(|component_id| scene.component(*component_id))
        .filter(|component| !component.is_virtually_deleted())
        .collect();
    let tags: Vec<String> = components
        .iter()
        .map(|component| component.kind().tag().to_string())
        .collect();
    writer.write_names("components", &tags);
    for (index, component) in components.iter().enumerate() {
        writer.begin_block(&format!("component_{index}"));
        writer.write_bool("enabled", component.enabled);
        component.data.save(writer, resources);
        writer.end_block();
    }
}

/// Rebuilds the archived roots inside `scene`, appending them after any existing roots.
///
/// On error every object created by this call is destroyed again, so the scene keeps only
/// what it held before.
pub fn load_into(
    scene: &mut Scene,
    resources: &Resources,
    reader: &mut dyn ArchiveReader,
) -> Result<Vec<GameObjectId>, SceneError> {
    reader.begin_block("scene")?;
    let skybox = reader.read_str("skybox")?;
    if !skybox.is_empty() {
        scene.set_skybox(Some(resources.material_or_default(&skybox)));
    }
    let names = reader.read_names("roots")?;
    let mut roots = Vec::with_capacity(names.len());
    let loaded = load_roots(scene, resources, reader, names, &mut roots)
        .and_then(|()| reader.end_block().map_err(SceneError::from));
    if let Err(err) = loaded {
        for id in roots {
            scene.destroy_game_object(id)?;
        }
        return Err(err);
    }
    Ok(roots)
}

fn load_roots(
    scene: &mut Scene,
    resources: &Resources,
    reader: &mut dyn ArchiveReader,
    names: Vec<String>,
    roots: &mut Vec<GameObjectId>,
) -> Result<(), SceneError> {
    for (index, name) in names.into_iter().enumerate() {
        let id = scene.create_game_object(name);
        roots.push(id);
        scene.add_game_object(id)?;
        reader.begin_block(&format!("root_{index}"))?;
        load_node(scene, resources, id, reader)?;
        reader.end_block()?;
    }
    Ok(())
}

fn load_node(
    scene: &mut Scene,
    resources: &Resources,
    id: GameObjectId,
    reader: &mut dyn ArchiveReader,
) -> Result<(), SceneError> {
    reader.begin_block("transform")?;
    let transform = Transform::load(reader)?;
    reader.end_block()?;
    scene.set_transform(id, transform)?;

    let names = reader.read_names("children")?;
    for (index, name) in names.into_iter().enumerate() {
        let child = scene.create_game_object(name);
        scene.add_child(id, child)?;
        reader.begin_block(&format!("child_{index}"))?;
        load_node(scene, resources, child, reader)?;
        reader.end_block()?;
    }

    let tags = reader.read_names("components")?;
    for (index, tag) in tags.iter().enumerate() {
        reader.begin_block(&format!("component_{index}"))?;
        let Some(kind) = ComponentKind::from_tag(tag) else {
            warn!("skipping component with unknown tag {tag:?}");
            reader.end_block()?;
            continue;
        };
        let depth = reader.depth();
        let (enabled, data) = match read_component(kind, reader, resources) {
            Ok(loaded) => loaded,
            Err(err) => {
                while reader.depth() > depth {
                    reader.end_block()?;
                }
                warn!("{tag} component failed to load ({err}); using defaults");
                (true, ComponentData::default_for(kind))
            }
        };
        reader.end_block()?;
        attach_loaded(scene, id, kind, enabled, data)?;
    }
    Ok(())
}

fn read_component(
    kind: ComponentKind,
    reader: &mut dyn ArchiveReader,
    resources: &Resources,
) -> Result<(bool, ComponentData), ArchiveError> {
    let enabled = reader.read_bool("enabled")?;
    Ok((enabled, ComponentData::load(kind, reader, resources)?))
}

fn attach_loaded(
    scene: &mut Scene,
    owner: GameObjectId,
    kind: ComponentKind,
    enabled: bool,
    data: ComponentData,
) -> Result<(), SceneError> {
    if let (ComponentData::Rigidbody(loaded), Some(existing)) =
        (&data, scene.first_component(owner, ComponentKind::Rigidbody))
    {
        // A Light attached earlier already created the body.
        if let Some(body) = scene.rigid_body_mut(existing) {
            body.absorb(loaded.clone());
        }
        scene.set_component_enabled(existing, enabled)?;
        return Ok(());
    }
    match scene.add_component(owner, data)? {
        Some(component) => scene.set_component_enabled(component, enabled)?,
        None => warn!("duplicate {} component dropped while loading", kind.tag()),
    }
    Ok(())
}

/// Serialises `scene` to a file, choosing the framing from the extension when `format` is
/// not given.
pub fn save_to_path(
    scene: &Scene,
    resources: &Resources,
    path: impl AsRef<Path>,
    format: Option<SceneFormat>,
) -> Result<(), ArchiveError> {
    let path = path.as_ref();
    let format = format.unwrap_or_else(|| SceneFormat::from_path(path));
    let bytes = match format {
        SceneFormat::Json => {
            let mut writer = JsonWriter::new();
            save_scene(scene, resources, &mut writer);
            writer.finish_pretty()?.into_bytes()
        }
        SceneFormat::Binary => {
            let mut writer = BinaryWriter::new();
            save_scene(scene, resources, &mut writer);
            writer.finish()?
        }
    };
    fs::write(path, bytes)?;
    info!("saved scene to {} ({format:?})", path.display());
    Ok(())
}

/// Loads a file written by [`save_to_path`], detecting the framing from its header.
pub fn load_from_path(
    scene: &mut Scene,
    resources: &Resources,
    path: impl AsRef<Path>,
) -> Result<Vec<GameObjectId>, SceneError> {
    let path = path.as_ref();
    let bytes = fs::read(path).map_err(ArchiveError::from)?;
    let roots = if BinaryReader::is_binary(&bytes) {
        let mut reader = BinaryReader::new(bytes)?;
        load_into(scene, resources, &mut reader)?
    } else {
        let text = String::from_utf8(bytes).map_err(|err| ArchiveError::InvalidValue {
            key: path.display().to_string(),
            message: err.to_string(),
        })?;
        let mut reader = JsonReader::parse(&text)?;
        load_into(scene, resources, &mut reader)?
    };
    info!("loaded {} root objects from {}", roots.len(), path.display());
    Ok(roots)
}
