//! The scene arena: entity tree, component storage, update traversal and the physics tick.

use std::sync::Arc;

use glam::Vec3;
use log::{debug, warn};
use slotmap::SlotMap;

use crate::audio::AudioDevice;
use crate::component::camera::Camera;
use crate::component::light::Light;
use crate::component::mesh::MeshRenderer;
use crate::component::script::ScriptComponent;
use crate::component::{
    Component, ComponentData, ComponentId, ComponentKind, ComponentVariant, UpdateContext,
};
use crate::error::SceneError;
use crate::game_object::{GameObject, GameObjectId};
use crate::input::InputState;
use crate::physics::{
    BodyProperties, ColliderShape, CollisionEvent, PhysicsSystem, RigidBody,
};
use crate::render::{FrameGlobals, RenderQueue};
use crate::resources::{MaterialHandle, Resources};
use crate::scripting::{DirectoryEntry, ScriptBridge, ScriptRequest};
use crate::transform::Transform;

/// Attempts made by [`Scene::unique_child_name`] before giving up.
pub const UNIQUE_NAME_LIMIT: usize = 1000;

/// Engine services a frame update hands to components.
pub struct FrameServices<'a> {
    pub queue: &'a mut RenderQueue,
    pub resources: &'a Resources,
    pub audio: &'a mut dyn AudioDevice,
    pub input: &'a Arc<InputState>,
}

pub struct Scene {
    objects: SlotMap<GameObjectId, GameObject>,
    components: SlotMap<ComponentId, Component>,
    roots: Vec<GameObjectId>,
    physics: PhysicsSystem,
    skybox: Option<MaterialHandle>,
    primary_camera: Option<ComponentId>,
    collision_events: Vec<CollisionEvent>,
    bridge: Arc<ScriptBridge>,
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

impl Scene {
    pub fn new() -> Self {
        Self::with_physics(PhysicsSystem::default())
    }

    pub fn with_physics(physics: PhysicsSystem) -> Self {
        Self {
            objects: SlotMap::with_key(),
            components: SlotMap::with_key(),
            roots: Vec::new(),
            physics,
            skybox: None,
            primary_camera: None,
            collision_events: Vec::new(),
            bridge: Arc::new(ScriptBridge::new()),
        }
    }

    pub fn physics(&self) -> &PhysicsSystem {
        &self.physics
    }

    pub fn physics_mut(&mut self) -> &mut PhysicsSystem {
        &mut self.physics
    }

    pub fn bridge(&self) -> &Arc<ScriptBridge> {
        &self.bridge
    }

    pub fn skybox(&self) -> Option<MaterialHandle> {
        self.skybox
    }

    pub fn set_skybox(&mut self, skybox: Option<MaterialHandle>) {
        self.skybox = skybox;
    }

    pub fn roots(&self) -> &[GameObjectId] {
        &self.roots
    }

    /// Number of objects in the arena, attached or not.
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    pub fn object(&self, id: GameObjectId) -> Option<&GameObject> {
        self.objects.get(id)
    }

    /// Mutable access to the name and transform. Links stay under the scene's control.
    pub fn object_mut(&mut self, id: GameObjectId) -> Option<&mut GameObject> {
        self.objects.get_mut(id)
    }

    pub fn component(&self, id: ComponentId) -> Option<&Component> {
        self.components.get(id)
    }

    pub fn component_mut(&mut self, id: ComponentId) -> Option<&mut Component> {
        self.components.get_mut(id)
    }

    // ---- tree -------------------------------------------------------------------------

    /// Allocates a detached object. It joins the tree through [`Scene::add_game_object`] or
    /// [`Scene::add_child`].
    pub fn create_game_object(&mut self, name: impl Into<String>) -> GameObjectId {
        self.objects.insert(GameObject::new(name))
    }

    /// Makes `id` a scene root, detaching it from any parent first.
    pub fn add_game_object(&mut self, id: GameObjectId) -> Result<(), SceneError> {
        if !self.objects.contains_key(id) {
            return Err(SceneError::UnknownGameObject);
        }
        self.detach(id);
        if let Some(object) = self.objects.get_mut(id) {
            object.is_root = true;
        }
        self.roots.push(id);
        Ok(())
    }

    /// Takes a root out of the root list without destroying it.
    pub fn remove_game_object(&mut self, id: GameObjectId) -> Result<bool, SceneError> {
        let object = self.objects.get(id).ok_or(SceneError::UnknownGameObject)?;
        if !object.is_root {
            return Ok(false);
        }
        self.detach(id);
        Ok(true)
    }

    /// Moves `child` under `parent`, detaching it from wherever it was.
    pub fn add_child(&mut self, parent: GameObjectId, child: GameObjectId) -> Result<(), SceneError> {
        if !self.objects.contains_key(parent) || !self.objects.contains_key(child) {
            return Err(SceneError::UnknownGameObject);
        }
        if parent == child || self.is_ancestor(child, parent) {
            return Err(SceneError::Cycle);
        }
        self.detach(child);
        if let Some(object) = self.objects.get_mut(child) {
            object.parent = Some(parent);
        }
        if let Some(object) = self.objects.get_mut(parent) {
            object.children.push(child);
        }
        Ok(())
    }

    /// Detaches `child` from `parent` without destroying it. Returns false if it was not a
    /// child of `parent`.
    pub fn remove_child(&mut self, parent: GameObjectId, child: GameObjectId) -> Result<bool, SceneError> {
        let object = self.objects.get(parent).ok_or(SceneError::UnknownGameObject)?;
        if !object.children.contains(&child) {
            return Ok(false);
        }
        self.detach(child);
        Ok(true)
    }

    /// Destroys `id`, every descendant and all their components.
    pub fn destroy_game_object(&mut self, id: GameObjectId) -> Result<(), SceneError> {
        let subtree = self.subtree(id)?;
        self.detach(id);
        for object_id in subtree {
            let Some(object) = self.objects.remove(object_id) else {
                continue;
            };
            for component in object.components {
                self.physics.unregister(component);
                self.components.remove(component);
            }
        }
        self.refresh_primary_camera();
        Ok(())
    }

    fn detach(&mut self, id: GameObjectId) {
        let Some(object) = self.objects.get_mut(id) else {
            return;
        };
        let parent = object.parent.take();
        let was_root = std::mem::take(&mut object.is_root);
        if let Some(parent) = parent.and_then(|parent| self.objects.get_mut(parent)) {
            parent.children.retain(|child| *child != id);
        }
        if was_root {
            self.roots.retain(|root| *root != id);
        }
    }

    fn is_ancestor(&self, ancestor: GameObjectId, of: GameObjectId) -> bool {
        let mut current = self.objects.get(of).and_then(|object| object.parent);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.objects.get(id).and_then(|object| object.parent);
        }
        false
    }

    /// `id` and its descendants, parents before children.
    pub fn subtree(&self, id: GameObjectId) -> Result<Vec<GameObjectId>, SceneError> {
        if !self.objects.contains_key(id) {
            return Err(SceneError::UnknownGameObject);
        }
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            let Some(object) = self.objects.get(next) else {
                continue;
            };
            out.push(next);
            stack.extend(object.children.iter().rev());
        }
        Ok(out)
    }

    /// Every object reachable from the roots, in update order.
    pub fn walk(&self) -> Vec<GameObjectId> {
        self.roots
            .iter()
            .filter_map(|root| self.subtree(*root).ok())
            .flatten()
            .collect()
    }

    /// First live object called `name`, in tree order.
    pub fn find_by_name(&self, name: &str) -> Option<GameObjectId> {
        self.walk().into_iter().find(|id| {
            self.objects
                .get(*id)
                .is_some_and(|object| object.name == name && !object.virtually_deleted)
        })
    }

    pub fn rename(&mut self, id: GameObjectId, name: impl Into<String>) -> Result<(), SceneError> {
        let object = self.objects.get_mut(id).ok_or(SceneError::UnknownGameObject)?;
        object.name = name.into();
        Ok(())
    }

    /// `base`, or `base (n)` for the smallest `n` no sibling under `parent` uses.
    pub fn unique_child_name(
        &self,
        parent: Option<GameObjectId>,
        base: &str,
    ) -> Result<String, SceneError> {
        let siblings = match parent {
            Some(parent) => {
                &self
                    .objects
                    .get(parent)
                    .ok_or(SceneError::UnknownGameObject)?
                    .children
            }
            None => &self.roots,
        };
        let taken = |candidate: &str| {
            siblings.iter().any(|id| {
                self.objects
                    .get(*id)
                    .is_some_and(|object| object.name == candidate)
            })
        };
        if !taken(base) {
            return Ok(base.to_string());
        }
        (1..=UNIQUE_NAME_LIMIT)
            .map(|n| format!("{base} ({n})"))
            .find(|candidate| !taken(candidate))
            .ok_or(SceneError::SearchExhausted {
                limit: UNIQUE_NAME_LIMIT,
            })
    }

    pub fn transform(&self, id: GameObjectId) -> Option<Transform> {
        self.objects.get(id).map(|object| object.transform)
    }

    /// Replaces the pose of `id` and refreshes its world matrix.
    pub fn set_transform(&mut self, id: GameObjectId, mut transform: Transform) -> Result<(), SceneError> {
        let object = self.objects.get_mut(id).ok_or(SceneError::UnknownGameObject)?;
        transform.update();
        object.transform = transform;
        Ok(())
    }

    // ---- components -------------------------------------------------------------------

    /// Attaches `data` to `owner` and runs its attach hook.
    ///
    /// Returns `Ok(None)` without touching the scene if `owner` already has a Mesh or a
    /// Rigidbody and `data` is another one.
    pub fn add_component(
        &mut self,
        owner: GameObjectId,
        data: impl Into<ComponentData>,
    ) -> Result<Option<ComponentId>, SceneError> {
        let data = data.into();
        let kind = data.kind();
        let object = self.objects.get(owner).ok_or(SceneError::UnknownGameObject)?;
        if kind.is_unique() && object.first_of_kind(kind).is_some() {
            debug!("{} already has a {} component", object.name, kind.tag());
            return Ok(None);
        }

        let id = self.components.insert(Component::new(owner, data));
        if let Some(object) = self.objects.get_mut(owner) {
            object.components.push(id);
            object.first_of_kind[kind.index()].get_or_insert(id);
        }
        self.on_attach(id)?;
        Ok(Some(id))
    }

    fn on_attach(&mut self, id: ComponentId) -> Result<(), SceneError> {
        let Some(component) = self.components.get(id) else {
            return Ok(());
        };
        let owner = component.owner;
        match component.kind() {
            ComponentKind::Light => {
                if let Some(body) = self.add_component(owner, RigidBody::default())? {
                    self.set_component_enabled(body, false)?;
                }
            }
            ComponentKind::Rigidbody => {
                self.refresh_implicit_bound(owner);
                self.sync_registration(id);
            }
            ComponentKind::Mesh => self.refresh_implicit_bound(owner),
            ComponentKind::Camera => {
                if !self.primary_camera.is_some_and(|camera| self.is_active(camera)) {
                    self.primary_camera = Some(id);
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Sizes the owner's implicit collider from its mesh bound, or a unit cube.
    fn refresh_implicit_bound(&mut self, owner: GameObjectId) {
        let Some(object) = self.objects.get(owner) else {
            return;
        };
        let Some(body) = object.first_of_kind(ComponentKind::Rigidbody) else {
            return;
        };
        let (min, max) = object
            .first_of_kind(ComponentKind::Mesh)
            .and_then(|mesh| self.components.get(mesh))
            .and_then(|component| component.get::<MeshRenderer>())
            .filter(|renderer| renderer.mesh.has_bound())
            .map(|renderer| (renderer.mesh.bound_min, renderer.mesh.bound_max))
            .unwrap_or((Vec3::splat(-0.5), Vec3::splat(0.5)));
        let transform = object.transform;
        if let Some(body) = self.rigid_body_mut(body) {
            body.set_implicit_bound(min, max);
            body.sync_colliders(&transform);
        }
    }

    /// Detaches and returns a component. Its first-of-kind slot passes to the next one.
    pub fn remove_component(&mut self, id: ComponentId) -> Result<Component, SceneError> {
        let component = self.components.remove(id).ok_or(SceneError::UnknownComponent)?;
        self.physics.unregister(id);
        let kind = component.kind();
        if let Some(owner) = self.objects.get_mut(component.owner) {
            owner.components.retain(|other| *other != id);
            if owner.first_of_kind[kind.index()] == Some(id) {
                owner.first_of_kind[kind.index()] = owner
                    .components
                    .iter()
                    .copied()
                    .find(|other| self.components.get(*other).is_some_and(|c| c.kind() == kind));
            }
        }
        if self.primary_camera == Some(id) {
            self.primary_camera = None;
            self.refresh_primary_camera();
        }
        Ok(component)
    }

    /// First component of `kind` on `owner`.
    pub fn first_component(&self, owner: GameObjectId, kind: ComponentKind) -> Option<ComponentId> {
        self.objects.get(owner)?.first_of_kind(kind)
    }

    pub fn get_component<T: ComponentVariant>(&self, owner: GameObjectId) -> Option<&T> {
        let id = self.first_component(owner, T::KIND)?;
        self.components.get(id)?.get::<T>()
    }

    pub fn get_component_mut<T: ComponentVariant>(&mut self, owner: GameObjectId) -> Option<&mut T> {
        let id = self.first_component(owner, T::KIND)?;
        self.components.get_mut(id)?.get_mut::<T>()
    }

    pub fn component_enabled(&self, id: ComponentId) -> Option<bool> {
        self.components.get(id).map(|component| component.enabled)
    }

    /// Disabled rigid bodies stay registered as static obstacles.
    pub fn set_component_enabled(&mut self, id: ComponentId, enabled: bool) -> Result<(), SceneError> {
        let component = self.components.get_mut(id).ok_or(SceneError::UnknownComponent)?;
        component.enabled = enabled;
        Ok(())
    }

    pub fn rigid_body_mut(&mut self, id: ComponentId) -> Option<&mut RigidBody> {
        self.components.get_mut(id)?.get_mut::<RigidBody>()
    }

    pub fn body_properties(&self, id: ComponentId) -> Option<BodyProperties> {
        self.components
            .get(id)?
            .get::<RigidBody>()
            .map(|body| body.properties)
    }

    pub fn set_body_properties(&mut self, id: ComponentId, properties: BodyProperties) -> Result<(), SceneError> {
        let body = self.rigid_body_mut(id).ok_or(SceneError::UnknownComponent)?;
        body.properties = properties;
        Ok(())
    }

    pub fn collider_shape(&self, id: ComponentId) -> Option<ColliderShape> {
        self.components.get(id)?.get::<RigidBody>()?.collider_shape()
    }

    pub fn set_collider_shape(&mut self, id: ComponentId, shape: ColliderShape) -> Result<(), SceneError> {
        let owner = self
            .components
            .get(id)
            .ok_or(SceneError::UnknownComponent)?
            .owner;
        let transform = self.transform(owner).unwrap_or_default();
        let body = self.rigid_body_mut(id).ok_or(SceneError::UnknownComponent)?;
        body.set_collider_shape(shape);
        body.sync_colliders(&transform);
        Ok(())
    }

    // ---- virtual delete ---------------------------------------------------------------

    /// Soft-deletes `id` and its subtree: nothing in it updates, collides or saves.
    pub fn virtual_delete(&mut self, id: GameObjectId) -> Result<(), SceneError> {
        self.set_subtree_deleted(id, true)
    }

    /// Reverses [`Scene::virtual_delete`].
    pub fn virtual_create(&mut self, id: GameObjectId) -> Result<(), SceneError> {
        self.set_subtree_deleted(id, false)
    }

    fn set_subtree_deleted(&mut self, id: GameObjectId, deleted: bool) -> Result<(), SceneError> {
        for object_id in self.subtree(id)? {
            let Some(object) = self.objects.get_mut(object_id) else {
                continue;
            };
            object.virtually_deleted = deleted;
            for component in object.components.clone() {
                self.sync_registration(component);
            }
        }
        self.refresh_primary_camera();
        Ok(())
    }

    pub fn virtual_delete_component(&mut self, id: ComponentId) -> Result<(), SceneError> {
        self.set_component_deleted(id, true)
    }

    pub fn virtual_create_component(&mut self, id: ComponentId) -> Result<(), SceneError> {
        self.set_component_deleted(id, false)
    }

    fn set_component_deleted(&mut self, id: ComponentId, deleted: bool) -> Result<(), SceneError> {
        let component = self.components.get_mut(id).ok_or(SceneError::UnknownComponent)?;
        component.virtually_deleted = deleted;
        self.sync_registration(id);
        self.refresh_primary_camera();
        Ok(())
    }

    /// Neither the component nor its owner is soft-deleted.
    pub fn is_active(&self, id: ComponentId) -> bool {
        self.components.get(id).is_some_and(|component| {
            !component.virtually_deleted
                && self
                    .objects
                    .get(component.owner)
                    .is_some_and(|owner| !owner.virtually_deleted)
        })
    }

    fn sync_registration(&mut self, id: ComponentId) {
        let is_body = self
            .components
            .get(id)
            .is_some_and(|component| component.kind() == ComponentKind::Rigidbody);
        if is_body && self.is_active(id) {
            self.physics.register(id);
        } else {
            self.physics.unregister(id);
        }
    }

    // ---- cameras and lights -----------------------------------------------------------

    pub fn primary_camera(&self) -> Option<ComponentId> {
        self.primary_camera
    }

    /// Keeps the primary camera if it is still active, otherwise elects the first active
    /// camera in tree order.
    fn refresh_primary_camera(&mut self) {
        if self.primary_camera.is_some_and(|camera| self.is_active(camera)) {
            return;
        }
        self.primary_camera = self.walk().into_iter().find_map(|id| {
            self.objects.get(id)?.components.iter().copied().find(|component| {
                self.is_active(*component)
                    && self
                        .components
                        .get(*component)
                        .is_some_and(|c| c.kind() == ComponentKind::Camera)
            })
        });
    }

    /// Camera and light uniforms for the frame: the primary camera and the first enabled
    /// light in tree order, or defaults.
    pub fn frame_globals(&self, aspect: f32) -> FrameGlobals {
        let camera = self
            .primary_camera
            .filter(|camera| self.is_active(*camera))
            .and_then(|id| {
                let component = self.components.get(id)?;
                let mut camera = *component.get::<Camera>()?;
                camera.follow(&self.objects.get(component.owner)?.transform);
                Some(camera.params(aspect))
            })
            .unwrap_or_default();
        let light = self
            .walk()
            .into_iter()
            .find_map(|id| {
                let object = self.objects.get(id).filter(|o| !o.virtually_deleted)?;
                let component = self
                    .components
                    .get(object.first_of_kind(ComponentKind::Light)?)
                    .filter(|c| c.enabled && !c.virtually_deleted)?;
                Some(component.get::<Light>()?.params(object.transform.position))
            })
            .unwrap_or_default();
        FrameGlobals { camera, light }
    }

    // ---- frame ------------------------------------------------------------------------

    /// Variable-rate update: every live object, parents before children, components in
    /// attach order. Script requests are applied once the traversal is over.
    pub fn update(&mut self, delta_time: f32, services: &mut FrameServices<'_>) {
        self.refresh_bridge();
        for root in self.roots.clone() {
            self.update_object(root, delta_time, services);
        }
        self.apply_script_requests();
    }

    fn update_object(&mut self, id: GameObjectId, delta_time: f32, services: &mut FrameServices<'_>) {
        let Some(object) = self.objects.get_mut(id) else {
            return;
        };
        if object.virtually_deleted {
            return;
        }
        object.transform.update();
        let mut transform = object.transform;
        let name = object.name.clone();
        let components = object.components.clone();
        let children = object.children.clone();
        let bridge = Arc::clone(&self.bridge);

        for component_id in components {
            let Some(component) = self.components.get_mut(component_id) else {
                continue;
            };
            if !component.should_update() {
                continue;
            }
            let mut ctx = UpdateContext {
                delta_time,
                owner: id,
                owner_name: &name,
                transform: &mut transform,
                queue: &mut *services.queue,
                resources: services.resources,
                audio: &mut *services.audio,
                input: services.input,
                bridge: &bridge,
            };
            component.data.update(&mut ctx);
        }

        if let Some(object) = self.objects.get_mut(id) {
            object.transform = transform;
        }
        for child in children {
            self.update_object(child, delta_time, services);
        }
    }

    /// One fixed physics tick. Collision events are delivered to the scripts of both
    /// objects and queued for [`Scene::drain_collision_events`].
    pub fn fixed_update(&mut self, fixed_delta: f32) -> usize {
        let events = self
            .physics
            .step(fixed_delta, &mut self.objects, &mut self.components);
        for event in &events {
            self.dispatch_collision(event);
        }
        let count = events.len();
        self.collision_events.extend(events);
        self.apply_script_requests();
        count
    }

    fn dispatch_collision(&mut self, event: &CollisionEvent) {
        let other = self
            .objects
            .get(event.other)
            .map(|object| object.name.clone())
            .unwrap_or_default();
        let Some(object) = self.objects.get(event.object).filter(|o| !o.virtually_deleted) else {
            return;
        };
        let name = object.name.clone();
        let mut transform = object.transform;
        for component_id in object.components.clone() {
            let Some(component) = self
                .components
                .get_mut(component_id)
                .filter(|c| c.enabled && !c.virtually_deleted)
            else {
                continue;
            };
            if let Some(script) = component.get_mut::<ScriptComponent>() {
                script.notify(event.phase.hook(), &name, &other, &mut transform);
            }
        }
        if let Some(object) = self.objects.get_mut(event.object) {
            transform.update();
            object.transform = transform;
        }
    }

    pub fn drain_collision_events(&mut self) -> Vec<CollisionEvent> {
        std::mem::take(&mut self.collision_events)
    }

    fn refresh_bridge(&self) {
        let entries = self
            .walk()
            .into_iter()
            .filter_map(|id| {
                let object = self.objects.get(id).filter(|o| !o.virtually_deleted)?;
                Some(DirectoryEntry {
                    id,
                    name: object.name.clone(),
                    position: object.transform.position,
                })
            })
            .collect();
        self.bridge.refresh(entries);
    }

    fn apply_script_requests(&mut self) {
        for request in self.bridge.take_requests() {
            match request {
                ScriptRequest::Spawn { name, position } => {
                    if let Err(err) = self.spawn(&name, position) {
                        warn!("script could not spawn {name:?}: {err}");
                    }
                }
                ScriptRequest::SetPosition { name, position } => {
                    match self.find_by_name(&name).and_then(|id| self.objects.get_mut(id)) {
                        Some(object) => {
                            object.transform.position = position;
                            object.transform.update();
                        }
                        None => warn!("script moved unknown object {name:?}"),
                    }
                }
                ScriptRequest::Destroy { name } => match self.find_by_name(&name) {
                    Some(id) => self.destroy_game_object(id).unwrap_or_else(|err| {
                        warn!("script could not destroy {name:?}: {err}");
                    }),
                    None => warn!("script destroyed unknown object {name:?}"),
                },
            }
        }
    }

    /// Creates a root named uniquely after `name` at `position`.
    pub fn spawn(&mut self, name: &str, position: Vec3) -> Result<GameObjectId, SceneError> {
        let name = self.unique_child_name(None, name)?;
        let id = self.create_game_object(name);
        self.set_transform(id, Transform::from_position(position))?;
        self.add_game_object(id)?;
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::NullAudio;
    use crate::component::mesh::MeshInfo;
    use crate::physics::CollisionPhase;
    use glam::Mat4;

    struct Harness {
        queue: RenderQueue,
        resources: Resources,
        audio: NullAudio,
        input: Arc<InputState>,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                queue: RenderQueue::new(),
                resources: Resources::new(),
                audio: NullAudio::new(),
                input: Arc::new(InputState::new()),
            }
        }

        fn update(&mut self, scene: &mut Scene, delta_time: f32) {
            let mut services = FrameServices {
                queue: &mut self.queue,
                resources: &self.resources,
                audio: &mut self.audio,
                input: &self.input,
            };
            scene.update(delta_time, &mut services);
        }
    }

    fn root(scene: &mut Scene, name: &str) -> GameObjectId {
        let id = scene.create_game_object(name);
        scene.add_game_object(id).unwrap();
        id
    }

    #[test]
    fn child_parent_links_stay_consistent() {
        let mut scene = Scene::new();
        let a = root(&mut scene, "A");
        let b = root(&mut scene, "B");
        let child = scene.create_game_object("Child");

        scene.add_child(a, child).unwrap();
        assert_eq!(scene.object(child).unwrap().parent(), Some(a));
        assert_eq!(scene.object(a).unwrap().children(), [child]);

        // Reparenting removes it from the old parent.
        scene.add_child(b, child).unwrap();
        assert!(scene.object(a).unwrap().children().is_empty());
        assert_eq!(scene.object(child).unwrap().parent(), Some(b));

        assert!(scene.remove_child(b, child).unwrap());
        assert_eq!(scene.object(child).unwrap().parent(), None);
        assert!(scene.object(child).is_some());
        assert!(!scene.remove_child(b, child).unwrap());
    }

    #[test]
    fn parenting_under_a_descendant_is_rejected() {
        let mut scene = Scene::new();
        let a = root(&mut scene, "A");
        let b = scene.create_game_object("B");
        scene.add_child(a, b).unwrap();
        assert!(matches!(scene.add_child(b, a), Err(SceneError::Cycle)));
        assert!(matches!(scene.add_child(a, a), Err(SceneError::Cycle)));
    }

    #[test]
    fn adding_a_child_root_removes_it_from_roots() {
        let mut scene = Scene::new();
        let a = root(&mut scene, "A");
        let b = root(&mut scene, "B");
        scene.add_child(a, b).unwrap();
        assert_eq!(scene.roots(), [a]);
        assert!(!scene.object(b).unwrap().is_root());
    }

    #[test]
    fn unique_components_reject_duplicates() {
        let mut scene = Scene::new();
        let id = root(&mut scene, "Crate");
        assert!(scene.add_component(id, RigidBody::default()).unwrap().is_some());
        assert!(scene.add_component(id, RigidBody::default()).unwrap().is_none());
        assert!(scene.add_component(id, MeshRenderer::default()).unwrap().is_some());
        assert!(scene.add_component(id, MeshRenderer::default()).unwrap().is_none());
        assert!(scene.add_component(id, Camera::default()).unwrap().is_some());
        assert!(scene.add_component(id, Camera::default()).unwrap().is_some());
        assert_eq!(scene.object(id).unwrap().components().len(), 4);
    }

    #[test]
    fn light_brings_a_disabled_body() {
        let mut scene = Scene::new();
        let lamp = root(&mut scene, "Lamp");
        scene.add_component(lamp, Light::default()).unwrap();
        let body = scene.first_component(lamp, ComponentKind::Rigidbody).unwrap();
        assert_eq!(scene.component_enabled(body), Some(false));
        assert!(scene.physics().is_registered(body));
        let implicit = scene.component(body).unwrap().get::<RigidBody>().unwrap().implicit_collider();
        assert_eq!(implicit.map(|c| c.max), Some(Vec3::splat(0.5)));
    }

    #[test]
    fn body_bound_follows_mesh_bound() {
        let mut scene = Scene::new();
        let resources = Resources::new();
        let id = root(&mut scene, "Statue");
        let mut info = MeshInfo::cube("statue", &resources);
        info.bound_min = Vec3::new(-1.0, 0.0, -1.0);
        info.bound_max = Vec3::new(1.0, 4.0, 1.0);
        scene.add_component(id, MeshRenderer::new(Arc::new(info))).unwrap();
        let body = scene.add_component(id, RigidBody::default()).unwrap().unwrap();
        let implicit = scene.component(body).unwrap().get::<RigidBody>().unwrap().implicit_collider().cloned();
        assert_eq!(implicit.map(|c| c.max), Some(Vec3::new(1.0, 4.0, 1.0)));
    }

    #[test]
    fn removing_first_of_kind_promotes_the_next() {
        let mut scene = Scene::new();
        let id = root(&mut scene, "Rig");
        let wide = scene.add_component(id, Camera::new(90.0, 0.1, 50.0)).unwrap().unwrap();
        scene.add_component(id, Camera::new(30.0, 0.1, 50.0)).unwrap();
        assert_eq!(scene.get_component::<Camera>(id).unwrap().fov_degrees, 90.0);
        assert_eq!(scene.primary_camera(), Some(wide));

        scene.remove_component(wide).unwrap();
        assert_eq!(scene.get_component::<Camera>(id).unwrap().fov_degrees, 30.0);
        assert_eq!(
            scene.primary_camera(),
            scene.first_component(id, ComponentKind::Camera)
        );
    }

    #[test]
    fn virtual_delete_elects_next_camera_in_tree_order() {
        let mut scene = Scene::new();
        let first = root(&mut scene, "First");
        let second = root(&mut scene, "Second");
        let a = scene.add_component(first, Camera::default()).unwrap().unwrap();
        let b = scene.add_component(second, Camera::default()).unwrap().unwrap();
        assert_eq!(scene.primary_camera(), Some(a));

        scene.virtual_delete(first).unwrap();
        assert_eq!(scene.primary_camera(), Some(b));
        scene.virtual_create(first).unwrap();
        assert_eq!(scene.primary_camera(), Some(b));
    }

    #[test]
    fn virtual_delete_unregisters_bodies_in_subtree() {
        let mut scene = Scene::new();
        let parent = root(&mut scene, "Parent");
        let child = scene.create_game_object("Child");
        scene.add_child(parent, child).unwrap();
        let body = scene.add_component(child, RigidBody::default()).unwrap().unwrap();

        scene.virtual_delete(parent).unwrap();
        assert!(!scene.physics().is_registered(body));
        assert!(scene.object(child).unwrap().is_virtually_deleted());
        assert_eq!(scene.find_by_name("Child"), None);

        scene.virtual_create(parent).unwrap();
        assert!(scene.physics().is_registered(body));
        assert_eq!(scene.find_by_name("Child"), Some(child));
    }

    #[test]
    fn destroy_is_recursive() {
        let mut scene = Scene::new();
        let parent = root(&mut scene, "Parent");
        let child = scene.create_game_object("Child");
        scene.add_child(parent, child).unwrap();
        let body = scene.add_component(child, RigidBody::default()).unwrap().unwrap();
        let camera = scene.add_component(parent, Camera::default()).unwrap().unwrap();

        scene.destroy_game_object(parent).unwrap();
        assert!(scene.object(parent).is_none());
        assert!(scene.object(child).is_none());
        assert!(scene.component(body).is_none());
        assert!(scene.component(camera).is_none());
        assert!(!scene.physics().is_registered(body));
        assert_eq!(scene.primary_camera(), None);
        assert!(scene.roots().is_empty());
        assert!(matches!(
            scene.destroy_game_object(parent),
            Err(SceneError::UnknownGameObject)
        ));
    }

    #[test]
    fn unique_names_count_up_and_give_up() {
        let mut scene = Scene::new();
        assert_eq!(scene.unique_child_name(None, "Cube").unwrap(), "Cube");
        root(&mut scene, "Cube");
        assert_eq!(scene.unique_child_name(None, "Cube").unwrap(), "Cube (1)");
        root(&mut scene, "Cube (1)");
        assert_eq!(scene.unique_child_name(None, "Cube").unwrap(), "Cube (2)");

        for n in 2..=UNIQUE_NAME_LIMIT {
            root(&mut scene, &format!("Cube ({n})"));
        }
        assert!(matches!(
            scene.unique_child_name(None, "Cube"),
            Err(SceneError::SearchExhausted { limit: UNIQUE_NAME_LIMIT })
        ));
    }

    #[test]
    fn update_submits_parents_before_children() {
        let mut harness = Harness::new();
        let mut scene = Scene::new();
        let cube = Arc::new(MeshInfo::cube("cube", &harness.resources));

        let parent = root(&mut scene, "Parent");
        let child = scene.create_game_object("Child");
        scene.add_child(parent, child).unwrap();
        let other = root(&mut scene, "Other");
        for (id, x) in [(parent, 1.0), (child, 2.0), (other, 3.0)] {
            scene
                .set_transform(id, Transform::from_position(Vec3::new(x, 0.0, 0.0)))
                .unwrap();
            scene.add_component(id, MeshRenderer::new(Arc::clone(&cube))).unwrap();
        }
        let hidden = root(&mut scene, "Hidden");
        scene.add_component(hidden, MeshRenderer::new(Arc::clone(&cube))).unwrap();
        scene.virtual_delete(hidden).unwrap();

        harness.update(&mut scene, 0.016);
        let xs: Vec<f32> = harness
            .queue
            .iter()
            .map(|command| command.world.w_axis.x)
            .collect();
        assert_eq!(xs, [1.0, 2.0, 3.0]);
        assert_eq!(
            harness.queue.iter().next().unwrap().world,
            Mat4::from_translation(Vec3::new(1.0, 0.0, 0.0))
        );
    }

    #[test]
    fn frame_globals_use_primary_camera_and_first_light() {
        let mut scene = Scene::new();
        let eye = root(&mut scene, "Eye");
        scene
            .set_transform(eye, Transform::from_position(Vec3::new(0.0, 1.0, 5.0)))
            .unwrap();
        scene.add_component(eye, Camera::default()).unwrap();
        let lamp = root(&mut scene, "Lamp");
        scene
            .set_transform(lamp, Transform::from_position(Vec3::new(2.0, 8.0, 0.0)))
            .unwrap();
        scene.add_component(lamp, Light::new(Vec3::X, 3.0)).unwrap();

        let globals = scene.frame_globals(1.0);
        assert_eq!(globals.camera.position, Vec3::new(0.0, 1.0, 5.0));
        assert_eq!(globals.light.position, Vec3::new(2.0, 8.0, 0.0));
        assert_eq!(globals.light.intensity, 3.0);
    }

    fn drop_scene() -> (Scene, GameObjectId, GameObjectId) {
        let mut scene = Scene::with_physics(PhysicsSystem::new(Vec3::new(0.0, -0.0981, 0.0), 5));
        let floor = root(&mut scene, "Floor");
        scene
            .set_transform(floor, Transform::new().with_scale(Vec3::new(20.0, 1.0, 20.0)))
            .unwrap();
        let floor_body = scene.add_component(floor, RigidBody::default()).unwrap().unwrap();
        scene.set_component_enabled(floor_body, false).unwrap();

        let ball = root(&mut scene, "Ball");
        scene
            .set_transform(ball, Transform::from_position(Vec3::new(0.0, 1.2, 0.0)))
            .unwrap();
        let body = scene
            .add_component(ball, RigidBody::default().with_velocity(Vec3::new(0.0, -0.4, 0.0)))
            .unwrap()
            .unwrap();
        scene
            .set_body_properties(
                body,
                BodyProperties {
                    restitution: 0.0,
                    linear_damping: 100.0,
                    angular_damping: 100.0,
                    ..BodyProperties::default()
                },
            )
            .unwrap();
        (scene, floor, ball)
    }

    #[test]
    fn falling_body_lands_on_static_floor() {
        let (mut scene, floor, ball) = drop_scene();

        let count = scene.fixed_update(1.0);
        assert_eq!(count, 4);
        let events = scene.drain_collision_events();
        let phases: Vec<_> = events.iter().map(|event| event.phase).collect();
        assert_eq!(
            phases,
            [
                CollisionPhase::Enter,
                CollisionPhase::Collide,
                CollisionPhase::Enter,
                CollisionPhase::Collide
            ]
        );
        assert!(events.iter().any(|e| e.object == ball && e.other == floor));
        assert!(events.iter().any(|e| e.object == floor && e.other == ball));

        let velocity = scene.get_component::<RigidBody>(ball).unwrap().velocity;
        assert!(velocity.y >= 0.0);

        for _ in 0..30 {
            scene.fixed_update(1.0);
            let y = scene.transform(ball).unwrap().position.y;
            assert!(y >= 1.0 - 1e-4, "ball sank to {y}");
        }
        // The floor never moves.
        assert_eq!(scene.transform(floor).unwrap().position, Vec3::ZERO);
    }

    #[test]
    fn resting_contact_overlaps_every_tick_until_it_leaves() {
        let (mut scene, floor, ball) = drop_scene();
        let phases = |events: &[CollisionEvent]| -> Vec<CollisionPhase> {
            events.iter().map(|event| event.phase).collect()
        };
        let both_sides = |events: &[CollisionEvent]| {
            events.iter().any(|e| e.object == ball && e.other == floor)
                && events.iter().any(|e| e.object == floor && e.other == ball)
        };

        scene.fixed_update(1.0);
        let landing = scene.drain_collision_events();
        assert_eq!(
            phases(&landing),
            [
                CollisionPhase::Enter,
                CollisionPhase::Collide,
                CollisionPhase::Enter,
                CollisionPhase::Collide
            ]
        );

        for tick in 0..5 {
            scene.fixed_update(1.0);
            let resting = scene.drain_collision_events();
            assert_eq!(
                phases(&resting),
                [CollisionPhase::Overlap, CollisionPhase::Overlap],
                "tick {tick}"
            );
            assert!(both_sides(&resting));
        }

        let body = scene.first_component(ball, ComponentKind::Rigidbody).unwrap();
        scene.rigid_body_mut(body).unwrap().velocity = Vec3::new(0.0, 2.0, 0.0);
        scene.fixed_update(1.0);
        let leaving = scene.drain_collision_events();
        assert_eq!(phases(&leaving), [CollisionPhase::Leave, CollisionPhase::Leave]);
        assert!(both_sides(&leaving));

        for _ in 0..3 {
            scene.fixed_update(1.0);
            assert!(scene.drain_collision_events().is_empty());
        }
    }

    #[test]
    fn collision_hooks_reach_scripts() {
        let mut harness = Harness::new();
        let (mut scene, _floor, ball) = drop_scene();
        scene
            .add_component(
                ball,
                ScriptComponent::new(
                    "ball.lua",
                    r#"
                    function OnEnter(other)
                        scene.spawn("Hit " .. other)
                    end
                "#,
                ),
            )
            .unwrap();
        // The interpreter starts on the first frame update.
        harness.update(&mut scene, 0.0);
        scene.fixed_update(1.0);
        assert!(scene.find_by_name("Hit Floor").is_some());
    }

    #[test]
    fn script_requests_apply_after_traversal() {
        let mut harness = Harness::new();
        let mut scene = Scene::new();
        let mover = root(&mut scene, "Mover");
        let target = root(&mut scene, "Target");
        scene
            .add_component(
                mover,
                ScriptComponent::new(
                    "mover.lua",
                    r#"
                    function OnUpdate(dt)
                        local target = scene.find("Target")
                        target.position = Vector3.new(0, 7, 0)
                        scene.destroy("Mover")
                    end
                "#,
                ),
            )
            .unwrap();

        harness.update(&mut scene, 0.016);
        assert_eq!(
            scene.transform(target).unwrap().position,
            Vec3::new(0.0, 7.0, 0.0)
        );
        assert!(scene.object(mover).is_none());
    }

    #[test]
    fn script_errors_stay_on_the_component() {
        let mut harness = Harness::new();
        let mut scene = Scene::new();
        let id = root(&mut scene, "Broken");
        scene
            .add_component(id, ScriptComponent::new("broken.lua", "function OnUpdate() error('nope') end"))
            .unwrap();
        harness.update(&mut scene, 0.016);
        harness.update(&mut scene, 0.016);
        let script = scene.get_component::<ScriptComponent>(id).unwrap();
        assert!(script.error.as_deref().is_some_and(|e| e.contains("nope")));
    }
}
