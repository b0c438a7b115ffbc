//! Behaviour units attached to game objects.
//!
//! The set of component kinds is closed. [`ComponentData`] carries one variant per kind and
//! [`ComponentVariant`] gives typed access to a variant without a dynamic cast.

pub mod camera;
pub mod light;
pub mod mesh;
pub mod particle;
pub mod script;

use std::sync::Arc;

use slotmap::new_key_type;

use crate::audio::{AudioDevice, AudioListener, AudioSource};
use crate::error::ArchiveError;
use crate::game_object::GameObjectId;
use crate::input::InputState;
use crate::persistence::{ArchiveReader, ArchiveWriter};
use crate::physics::RigidBody;
use crate::render::RenderQueue;
use crate::resources::Resources;
use crate::scripting::ScriptBridge;
use crate::transform::Transform;

use self::camera::Camera;
use self::light::Light;
use self::mesh::MeshRenderer;
use self::particle::ParticleEmitter;
use self::script::ScriptComponent;

new_key_type! {
    /// Generation-checked handle to a [`Component`] stored in a scene.
    pub struct ComponentId;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ComponentKind {
    Mesh,
    Camera,
    Light,
    AudioSource,
    AudioListener,
    Particle,
    Rigidbody,
    Script,
}

impl ComponentKind {
    pub const COUNT: usize = 8;

    pub const ALL: [ComponentKind; Self::COUNT] = [
        Self::Mesh,
        Self::Camera,
        Self::Light,
        Self::AudioSource,
        Self::AudioListener,
        Self::Particle,
        Self::Rigidbody,
        Self::Script,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Tag written to archives.
    pub fn tag(self) -> &'static str {
        match self {
            Self::Mesh => "Mesh",
            Self::Camera => "Camera",
            Self::Light => "Light",
            Self::AudioSource => "AudioSource",
            Self::AudioListener => "AudioListener",
            Self::Particle => "Particle",
            Self::Rigidbody => "Rigidbody",
            Self::Script => "Script",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.tag() == tag)
    }

    /// Kinds an entity may carry at most once.
    pub fn is_unique(self) -> bool {
        matches!(self, Self::Mesh | Self::Rigidbody)
    }
}

#[derive(Debug)]
pub enum ComponentData {
    Mesh(MeshRenderer),
    Camera(Camera),
    Light(Light),
    AudioSource(AudioSource),
    AudioListener(AudioListener),
    Particle(ParticleEmitter),
    Rigidbody(RigidBody),
    Script(ScriptComponent),
}

impl ComponentData {
    pub fn kind(&self) -> ComponentKind {
        match self {
            Self::Mesh(_) => ComponentKind::Mesh,
            Self::Camera(_) => ComponentKind::Camera,
            Self::Light(_) => ComponentKind::Light,
            Self::AudioSource(_) => ComponentKind::AudioSource,
            Self::AudioListener(_) => ComponentKind::AudioListener,
            Self::Particle(_) => ComponentKind::Particle,
            Self::Rigidbody(_) => ComponentKind::Rigidbody,
            Self::Script(_) => ComponentKind::Script,
        }
    }

    /// Factory used by deserialisation before the fields are populated.
    pub fn default_for(kind: ComponentKind) -> Self {
        match kind {
            ComponentKind::Mesh => Self::Mesh(MeshRenderer::default()),
            ComponentKind::Camera => Self::Camera(Camera::default()),
            ComponentKind::Light => Self::Light(Light::default()),
            ComponentKind::AudioSource => Self::AudioSource(AudioSource::default()),
            ComponentKind::AudioListener => Self::AudioListener(AudioListener),
            ComponentKind::Particle => Self::Particle(ParticleEmitter::default()),
            ComponentKind::Rigidbody => Self::Rigidbody(RigidBody::default()),
            ComponentKind::Script => Self::Script(ScriptComponent::default()),
        }
    }

    pub(crate) fn update(&mut self, ctx: &mut UpdateContext<'_>) {
        match self {
            Self::Mesh(mesh) => mesh.update(ctx),
            Self::Camera(camera) => camera.update(ctx),
            Self::Light(_) => {}
            Self::AudioSource(source) => source.update(ctx),
            Self::AudioListener(listener) => listener.update(ctx),
            Self::Particle(emitter) => emitter.update(ctx),
            Self::Rigidbody(body) => body.sync_colliders(ctx.transform),
            Self::Script(script) => script.update(ctx),
        }
    }

    pub(crate) fn save(&self, writer: &mut dyn ArchiveWriter, resources: &Resources) {
        match self {
            Self::Mesh(mesh) => mesh.save(writer),
            Self::Camera(camera) => camera.save(writer),
            Self::Light(light) => light.save(writer),
            Self::AudioSource(source) => source.save(writer),
            Self::AudioListener(_) => {}
            Self::Particle(emitter) => emitter.save(writer, resources),
            Self::Rigidbody(body) => body.save(writer),
            Self::Script(script) => script.save(writer),
        }
    }

    pub(crate) fn load(
        kind: ComponentKind,
        reader: &mut dyn ArchiveReader,
        resources: &Resources,
    ) -> Result<Self, ArchiveError> {
        Ok(match kind {
            ComponentKind::Mesh => Self::Mesh(MeshRenderer::load(reader, resources)?),
            ComponentKind::Camera => Self::Camera(Camera::load(reader)?),
            ComponentKind::Light => Self::Light(Light::load(reader)?),
            ComponentKind::AudioSource => Self::AudioSource(AudioSource::load(reader)?),
            ComponentKind::AudioListener => Self::AudioListener(AudioListener),
            ComponentKind::Particle => Self::Particle(ParticleEmitter::load(reader, resources)?),
            ComponentKind::Rigidbody => Self::Rigidbody(RigidBody::load(reader)?),
            ComponentKind::Script => Self::Script(ScriptComponent::load(reader)?),
        })
    }
}

/// A component slot in the scene arena.
#[derive(Debug)]
pub struct Component {
    pub(crate) owner: GameObjectId,
    pub enabled: bool,
    pub(crate) virtually_deleted: bool,
    pub data: ComponentData,
}

impl Component {
    pub(crate) fn new(owner: GameObjectId, data: ComponentData) -> Self {
        Self {
            owner,
            enabled: true,
            virtually_deleted: false,
            data,
        }
    }

    pub fn owner(&self) -> GameObjectId {
        self.owner
    }

    pub fn kind(&self) -> ComponentKind {
        self.data.kind()
    }

    pub fn is_virtually_deleted(&self) -> bool {
        self.virtually_deleted
    }

    /// Rigid bodies keep their bookkeeping running while disabled.
    pub(crate) fn should_update(&self) -> bool {
        !self.virtually_deleted && (self.enabled || self.kind() == ComponentKind::Rigidbody)
    }

    pub fn get<T: ComponentVariant>(&self) -> Option<&T> {
        T::from_data(&self.data)
    }

    pub fn get_mut<T: ComponentVariant>(&mut self) -> Option<&mut T> {
        T::from_data_mut(&mut self.data)
    }
}

/// Typed view of one [`ComponentData`] variant.
pub trait ComponentVariant: Sized + Into<ComponentData> {
    const KIND: ComponentKind;

    fn from_data(data: &ComponentData) -> Option<&Self>;
    fn from_data_mut(data: &mut ComponentData) -> Option<&mut Self>;
}

macro_rules! component_variant {
    ($ty:ty, $variant:ident) => {
        impl ComponentVariant for $ty {
            const KIND: ComponentKind = ComponentKind::$variant;

            fn from_data(data: &ComponentData) -> Option<&Self> {
                match data {
                    ComponentData::$variant(inner) => Some(inner),
                    _ => None,
                }
            }

            fn from_data_mut(data: &mut ComponentData) -> Option<&mut Self> {
                match data {
                    ComponentData::$variant(inner) => Some(inner),
                    _ => None,
                }
            }
        }

        impl From<$ty> for ComponentData {
            fn from(value: $ty) -> Self {
                ComponentData::$variant(value)
            }
        }
    };
}

component_variant!(MeshRenderer, Mesh);
component_variant!(Camera, Camera);
component_variant!(Light, Light);
component_variant!(AudioSource, AudioSource);
component_variant!(AudioListener, AudioListener);
component_variant!(ParticleEmitter, Particle);
component_variant!(RigidBody, Rigidbody);
component_variant!(ScriptComponent, Script);

/// Everything a component may touch during its per-frame update.
pub struct UpdateContext<'a> {
    pub delta_time: f32,
    pub owner: GameObjectId,
    pub owner_name: &'a str,
    /// Working copy of the owner's transform, written back after all its components ran.
    pub transform: &'a mut Transform,
    pub queue: &'a mut RenderQueue,
    pub resources: &'a Resources,
    pub audio: &'a mut dyn AudioDevice,
    pub input: &'a Arc<InputState>,
    pub bridge: &'a Arc<ScriptBridge>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_round_trip_for_every_kind() {
        for kind in ComponentKind::ALL {
            assert_eq!(ComponentKind::from_tag(kind.tag()), Some(kind));
            assert_eq!(ComponentData::default_for(kind).kind(), kind);
        }
        assert_eq!(ComponentKind::from_tag("Collider"), None);
    }

    #[test]
    fn only_mesh_and_rigidbody_are_unique() {
        let unique: Vec<_> = ComponentKind::ALL
            .into_iter()
            .filter(|kind| kind.is_unique())
            .collect();
        assert_eq!(unique, [ComponentKind::Mesh, ComponentKind::Rigidbody]);
    }

    #[test]
    fn typed_access_matches_variant() {
        let mut component = Component::new(GameObjectId::default(), Camera::default().into());
        assert!(component.get::<Camera>().is_some());
        assert!(component.get::<Light>().is_none());
        component.get_mut::<Camera>().unwrap().fov_degrees = 75.0;
        assert_eq!(component.get::<Camera>().unwrap().fov_degrees, 75.0);
    }
}
