use std::collections::VecDeque;
use std::sync::Arc;

use glam::Mat4;
use slotmap::Key;

use crate::resources::{DrawableHandle, MaterialHandle};

/// One deferred draw: what to draw, with which material, where.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderCommand {
    pub material: MaterialHandle,
    pub drawable: DrawableHandle,
    pub world: Mat4,
    /// Skinning palette for animated meshes.
    pub bones: Option<Arc<[Mat4]>>,
}

impl RenderCommand {
    pub fn new(material: MaterialHandle, drawable: DrawableHandle, world: Mat4) -> Self {
        Self {
            material,
            drawable,
            world,
            bones: None,
        }
    }

    pub fn with_bones(mut self, bones: Arc<[Mat4]>) -> Self {
        self.bones = Some(bones);
        self
    }
}

/// FIFO of draw submissions filled during update and drained by the renderer.
///
/// There is no sorting: draw order is submission order.
#[derive(Debug, Default)]
pub struct RenderQueue {
    commands: VecDeque<RenderCommand>,
}

impl RenderQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a command.
    ///
    /// # Panics
    ///
    /// Panics if the command has no material. Components resolve a material (falling back to
    /// the default one) before submitting, so a null handle here is a programming error.
    pub fn submit(&mut self, command: RenderCommand) {
        assert!(
            !command.material.is_null(),
            "render command submitted without a material"
        );
        self.commands.push_back(command);
    }

    pub fn pop(&mut self) -> Option<RenderCommand> {
        self.commands.pop_front()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RenderCommand> {
        self.commands.iter()
    }

    pub fn clear(&mut self) {
        self.commands.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::Resources;

    #[test]
    fn pops_in_submission_order() {
        let resources = Resources::new();
        let mut queue = RenderQueue::new();
        for x in 0..3 {
            queue.submit(RenderCommand::new(
                resources.default_material(),
                resources.cube(),
                Mat4::from_translation(glam::Vec3::X * x as f32),
            ));
        }
        assert_eq!(queue.len(), 3);
        let order: Vec<f32> = std::iter::from_fn(|| queue.pop())
            .map(|command| command.world.w_axis.x)
            .collect();
        assert_eq!(order, [0.0, 1.0, 2.0]);
        assert!(queue.is_empty());
    }

    #[test]
    #[should_panic(expected = "without a material")]
    fn null_material_is_rejected() {
        let resources = Resources::new();
        let mut queue = RenderQueue::new();
        queue.submit(RenderCommand::new(
            MaterialHandle::null(),
            resources.cube(),
            Mat4::IDENTITY,
        ));
    }
}
