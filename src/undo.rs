//! Undo and redo for scene edits.
//!
//! Every edit is a [`Command`] holding the value before and after. Deletions are soft: the
//! object or component is virtually deleted so undo can bring it back, and destroyed for
//! real once the command falls out of history.

use std::collections::VecDeque;

use log::{debug, warn};

use crate::component::ComponentId;
use crate::error::SceneError;
use crate::game_object::GameObjectId;
use crate::physics::{BodyProperties, ColliderShape};
use crate::scene::Scene;
use crate::transform::Transform;

pub trait Command {
    /// Applies the forward change.
    fn exec(&mut self, scene: &mut Scene) -> Result<(), SceneError>;
    /// Restores the state captured before [`Command::exec`].
    fn undo(&mut self, scene: &mut Scene) -> Result<(), SceneError>;
    fn description(&self) -> &str;
    /// Called once when the command leaves history for good.
    fn discard(&mut self, _scene: &mut Scene) {}
}

type Apply<K, T> = fn(&mut Scene, K, T) -> Result<(), SceneError>;

/// Replaces one value on one target, remembering the previous value.
pub struct EditCommand<K, T> {
    target: K,
    before: T,
    after: T,
    description: String,
    apply: Apply<K, T>,
}

impl<K: Copy, T: Clone> EditCommand<K, T> {
    fn new(target: K, before: T, after: T, description: String, apply: Apply<K, T>) -> Self {
        Self {
            target,
            before,
            after,
            description,
            apply,
        }
    }

    pub fn target(&self) -> K {
        self.target
    }
}

impl<K: Copy, T: Clone> Command for EditCommand<K, T> {
    fn exec(&mut self, scene: &mut Scene) -> Result<(), SceneError> {
        (self.apply)(scene, self.target, self.after.clone())
    }

    fn undo(&mut self, scene: &mut Scene) -> Result<(), SceneError> {
        (self.apply)(scene, self.target, self.before.clone())
    }

    fn description(&self) -> &str {
        &self.description
    }
}

impl EditCommand<GameObjectId, Transform> {
    pub fn transform(object: GameObjectId, before: Transform, after: Transform) -> Self {
        Self::new(object, before, after, "Edit transform".into(), Scene::set_transform)
    }
}

impl EditCommand<GameObjectId, String> {
    pub fn rename(object: GameObjectId, before: impl Into<String>, after: impl Into<String>) -> Self {
        let after = after.into();
        let description = format!("Rename to {after}");
        Self::new(object, before.into(), after, description, |scene, id, name| {
            scene.rename(id, name)
        })
    }
}

impl EditCommand<ComponentId, bool> {
    pub fn enabled(component: ComponentId, before: bool, after: bool) -> Self {
        let description = if after { "Enable component" } else { "Disable component" };
        Self::new(
            component,
            before,
            after,
            description.into(),
            Scene::set_component_enabled,
        )
    }
}

impl EditCommand<ComponentId, BodyProperties> {
    pub fn body_properties(component: ComponentId, before: BodyProperties, after: BodyProperties) -> Self {
        Self::new(
            component,
            before,
            after,
            "Edit rigid body".into(),
            Scene::set_body_properties,
        )
    }
}

impl EditCommand<ComponentId, ColliderShape> {
    pub fn collider_shape(component: ComponentId, before: ColliderShape, after: ColliderShape) -> Self {
        let description = format!("Change collider to {}", after.tag());
        Self::new(component, before, after, description, Scene::set_collider_shape)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    Object(GameObjectId),
    Component(ComponentId),
}

/// Creation or deletion of an object subtree or a component, done with virtual delete.
///
/// The target must already exist in the scene when the command is built. A creation is
/// recorded with [`UndoStack::push`] after the fact; a deletion goes through
/// [`UndoStack::execute`].
pub struct ExistenceCommand {
    target: Target,
    creates: bool,
    /// Whether the forward change is currently in effect.
    applied: bool,
    description: String,
}

impl ExistenceCommand {
    pub fn create_object(object: GameObjectId) -> Self {
        Self::new(Target::Object(object), true, "Create object")
    }

    pub fn delete_object(object: GameObjectId) -> Self {
        Self::new(Target::Object(object), false, "Delete object")
    }

    pub fn add_component(component: ComponentId) -> Self {
        Self::new(Target::Component(component), true, "Add component")
    }

    pub fn remove_component(component: ComponentId) -> Self {
        Self::new(Target::Component(component), false, "Remove component")
    }

    fn new(target: Target, creates: bool, description: &str) -> Self {
        Self {
            target,
            creates,
            applied: creates,
            description: description.into(),
        }
    }

    fn set_present(&self, scene: &mut Scene, present: bool) -> Result<(), SceneError> {
        match (self.target, present) {
            (Target::Object(id), true) => scene.virtual_create(id),
            (Target::Object(id), false) => scene.virtual_delete(id),
            (Target::Component(id), true) => scene.virtual_create_component(id),
            (Target::Component(id), false) => scene.virtual_delete_component(id),
        }
    }
}

impl Command for ExistenceCommand {
    fn exec(&mut self, scene: &mut Scene) -> Result<(), SceneError> {
        self.set_present(scene, self.creates)?;
        self.applied = true;
        Ok(())
    }

    fn undo(&mut self, scene: &mut Scene) -> Result<(), SceneError> {
        self.set_present(scene, !self.creates)?;
        self.applied = false;
        Ok(())
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn discard(&mut self, scene: &mut Scene) {
        // Only a target that is currently soft-deleted is owned by history.
        if self.applied == self.creates {
            return;
        }
        let result = match self.target {
            Target::Object(id) => scene.destroy_game_object(id),
            Target::Component(id) => scene.remove_component(id).map(drop),
        };
        if let Err(err) = result {
            debug!("discarded {} target was already gone: {err}", self.description);
        }
    }
}

/// Bounded undo history with an unbounded redo stack.
///
/// When the undo side is full the oldest command is dropped. Recording a new command clears
/// the redo side.
pub struct UndoStack {
    capacity: usize,
    undo: VecDeque<Box<dyn Command>>,
    redo: Vec<Box<dyn Command>>,
}

impl UndoStack {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            undo: VecDeque::new(),
            redo: Vec::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Applies `command` and records it.
    pub fn execute(&mut self, scene: &mut Scene, mut command: Box<dyn Command>) -> Result<(), SceneError> {
        command.exec(scene)?;
        self.push(scene, command);
        Ok(())
    }

    /// Records a command whose change has already been applied.
    pub fn push(&mut self, scene: &mut Scene, command: Box<dyn Command>) {
        for mut stale in self.redo.drain(..) {
            stale.discard(scene);
        }
        self.push_undo(scene, command);
    }

    fn push_undo(&mut self, scene: &mut Scene, command: Box<dyn Command>) {
        if self.undo.len() == self.capacity {
            if let Some(mut oldest) = self.undo.pop_front() {
                debug!("undo history full, dropping {}", oldest.description());
                oldest.discard(scene);
            }
        }
        self.undo.push_back(command);
    }

    /// Reverts the most recent command. Returns `Ok(false)` if there is nothing to undo.
    ///
    /// A command whose target no longer exists is dropped from history.
    pub fn undo(&mut self, scene: &mut Scene) -> Result<bool, SceneError> {
        let Some(mut command) = self.undo.pop_back() else {
            return Ok(false);
        };
        if let Err(err) = command.undo(scene) {
            warn!("cannot undo {}: {err}", command.description());
            command.discard(scene);
            return Err(err);
        }
        self.redo.push(command);
        Ok(true)
    }

    /// Re-applies the most recently undone command.
    pub fn redo(&mut self, scene: &mut Scene) -> Result<bool, SceneError> {
        let Some(mut command) = self.redo.pop() else {
            return Ok(false);
        };
        if let Err(err) = command.exec(scene) {
            warn!("cannot redo {}: {err}", command.description());
            command.discard(scene);
            return Err(err);
        }
        self.push_undo(scene, command);
        Ok(true)
    }

    pub fn undos_remaining(&self) -> usize {
        self.undo.len()
    }

    pub fn redos_remaining(&self) -> usize {
        self.redo.len()
    }

    pub fn undo_description(&self) -> Option<&str> {
        self.undo.back().map(|command| command.description())
    }

    pub fn redo_description(&self) -> Option<&str> {
        self.redo.last().map(|command| command.description())
    }

    /// Forgets all history, discarding every command.
    pub fn clear(&mut self, scene: &mut Scene) {
        for mut command in self.undo.drain(..).chain(self.redo.drain(..)) {
            command.discard(scene);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::camera::Camera;
    use crate::component::ComponentKind;
    use crate::physics::RigidBody;
    use glam::Vec3;

    fn scene_with(name: &str) -> (Scene, GameObjectId) {
        let mut scene = Scene::new();
        let id = scene.create_game_object(name);
        scene.add_game_object(id).unwrap();
        (scene, id)
    }

    fn moved(scene: &Scene, id: GameObjectId, x: f32) -> Box<dyn Command> {
        let before = scene.transform(id).unwrap();
        let mut after = before;
        after.position.x = x;
        after.update();
        Box::new(EditCommand::transform(id, before, after))
    }

    #[test]
    fn transform_round_trips_exactly() {
        let (mut scene, id) = scene_with("Crate");
        let before = scene.transform(id).unwrap();
        let after = Transform::from_position(Vec3::new(1.5, -2.0, 0.25)).with_euler(Vec3::new(0.0, 45.0, 0.0));
        let mut command = EditCommand::transform(id, before, after);

        command.exec(&mut scene).unwrap();
        command.undo(&mut scene).unwrap();
        assert_eq!(scene.transform(id).unwrap(), before);
        command.exec(&mut scene).unwrap();
        assert_eq!(scene.transform(id).unwrap(), after);
    }

    #[test]
    fn full_buffer_drops_oldest_and_redo_replays() {
        let (mut scene, id) = scene_with("Crate");
        let mut stack = UndoStack::new(2);
        for x in [1.0, 2.0, 3.0] {
            let command = moved(&scene, id, x);
            stack.execute(&mut scene, command).unwrap();
        }
        assert_eq!(stack.undos_remaining(), 2);

        assert!(stack.undo(&mut scene).unwrap());
        assert!(stack.undo(&mut scene).unwrap());
        // The first edit fell out of history, so undo stops at x = 1.
        assert!(!stack.undo(&mut scene).unwrap());
        assert_eq!(scene.transform(id).unwrap().position.x, 1.0);
        assert_eq!(stack.redos_remaining(), 2);

        assert!(stack.redo(&mut scene).unwrap());
        assert_eq!(scene.transform(id).unwrap().position.x, 2.0);
        assert!(stack.redo(&mut scene).unwrap());
        assert_eq!(scene.transform(id).unwrap().position.x, 3.0);
        assert!(!stack.redo(&mut scene).unwrap());
    }

    #[test]
    fn new_command_clears_redo() {
        let (mut scene, id) = scene_with("Crate");
        let mut stack = UndoStack::new(8);
        let command = moved(&scene, id, 1.0);
        stack.execute(&mut scene, command).unwrap();
        stack.undo(&mut scene).unwrap();
        assert_eq!(stack.redos_remaining(), 1);

        let rename = EditCommand::rename(id, "Crate", "Barrel");
        stack.execute(&mut scene, Box::new(rename)).unwrap();
        assert_eq!(stack.redos_remaining(), 0);
        assert_eq!(stack.undo_description(), Some("Rename to Barrel"));
        assert_eq!(scene.object(id).unwrap().name, "Barrel");
    }

    #[test]
    fn deleted_object_comes_back_on_undo() {
        let (mut scene, id) = scene_with("Crate");
        let body = scene.add_component(id, RigidBody::default()).unwrap().unwrap();
        let mut stack = UndoStack::new(4);

        stack
            .execute(&mut scene, Box::new(ExistenceCommand::delete_object(id)))
            .unwrap();
        assert_eq!(scene.find_by_name("Crate"), None);
        assert!(!scene.physics().is_registered(body));

        stack.undo(&mut scene).unwrap();
        assert_eq!(scene.find_by_name("Crate"), Some(id));
        assert!(scene.physics().is_registered(body));
    }

    #[test]
    fn delete_leaving_history_destroys_for_real() {
        let (mut scene, id) = scene_with("Crate");
        let mut stack = UndoStack::new(1);
        stack
            .execute(&mut scene, Box::new(ExistenceCommand::delete_object(id)))
            .unwrap();
        assert!(scene.object(id).is_some());

        stack.push(&mut scene, Box::new(EditCommand::rename(id, "Crate", "Crate")));
        assert!(scene.object(id).is_none());
    }

    #[test]
    fn undone_creation_is_destroyed_when_redo_is_cleared() {
        let (mut scene, anchor) = scene_with("Anchor");
        let spawned = scene.spawn("Spawned", Vec3::ZERO).unwrap();
        let mut stack = UndoStack::new(4);
        stack.push(&mut scene, Box::new(ExistenceCommand::create_object(spawned)));

        stack.undo(&mut scene).unwrap();
        assert!(scene.object(spawned).unwrap().is_virtually_deleted());

        let rename = EditCommand::rename(anchor, "Anchor", "Pivot");
        stack.execute(&mut scene, Box::new(rename)).unwrap();
        assert!(scene.object(spawned).is_none());
    }

    #[test]
    fn component_edits_undo() {
        let (mut scene, id) = scene_with("Rig");
        let camera = scene.add_component(id, Camera::default()).unwrap().unwrap();
        let body = scene.add_component(id, RigidBody::default()).unwrap().unwrap();
        let mut stack = UndoStack::new(8);

        stack
            .execute(&mut scene, Box::new(EditCommand::enabled(camera, true, false)))
            .unwrap();
        let before = scene.body_properties(body).unwrap();
        let after = BodyProperties {
            mass: 5.0,
            ..before
        };
        stack
            .execute(&mut scene, Box::new(EditCommand::body_properties(body, before, after)))
            .unwrap();
        stack
            .execute(
                &mut scene,
                Box::new(EditCommand::collider_shape(body, ColliderShape::Aabb, ColliderShape::Box)),
            )
            .unwrap();
        stack
            .execute(&mut scene, Box::new(ExistenceCommand::remove_component(camera)))
            .unwrap();

        assert_eq!(scene.primary_camera(), None);
        assert_eq!(scene.collider_shape(body), Some(ColliderShape::Box));
        assert_eq!(scene.body_properties(body).unwrap().mass, 5.0);

        while stack.undo(&mut scene).unwrap() {}
        assert_eq!(scene.component_enabled(camera), Some(true));
        assert_eq!(scene.primary_camera(), Some(camera));
        assert_eq!(scene.collider_shape(body), Some(ColliderShape::Aabb));
        assert_eq!(scene.body_properties(body), Some(before));
        assert_eq!(scene.first_component(id, ComponentKind::Camera), Some(camera));
    }

    #[test]
    fn undo_of_vanished_target_reports_error() {
        let (mut scene, id) = scene_with("Crate");
        let mut stack = UndoStack::new(4);
        let command = moved(&scene, id, 4.0);
        stack.execute(&mut scene, command).unwrap();
        scene.destroy_game_object(id).unwrap();

        assert!(matches!(
            stack.undo(&mut scene),
            Err(SceneError::UnknownGameObject)
        ));
        assert_eq!(stack.undos_remaining(), 0);
    }
}
