use slotmap::{new_key_type, Key};

use crate::component::{ComponentId, ComponentKind};
use crate::transform::Transform;

new_key_type! {
    /// Generation-checked handle to a [`GameObject`] stored in a scene.
    pub struct GameObjectId;
}

impl GameObjectId {
    /// Stable 64-bit identity for UI and debug output. Not a content hash.
    pub fn identity(self) -> u64 {
        self.data().as_ffi()
    }
}

/// Entity node of the scene tree.
///
/// Links to the parent, the children and the components are arena keys owned by the
/// [`Scene`](crate::scene::Scene); only the scene mutates them so the parent/child invariant
/// cannot be broken from outside.
#[derive(Debug, Clone)]
pub struct GameObject {
    pub name: String,
    pub transform: Transform,
    pub(crate) components: Vec<ComponentId>,
    pub(crate) first_of_kind: [Option<ComponentId>; ComponentKind::COUNT],
    pub(crate) parent: Option<GameObjectId>,
    pub(crate) children: Vec<GameObjectId>,
    pub(crate) virtually_deleted: bool,
    pub(crate) is_root: bool,
}

impl GameObject {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            transform: Transform::default(),
            components: Vec::new(),
            first_of_kind: [None; ComponentKind::COUNT],
            parent: None,
            children: Vec::new(),
            virtually_deleted: false,
            is_root: false,
        }
    }

    /// Components in attach order.
    pub fn components(&self) -> &[ComponentId] {
        &self.components
    }

    pub fn children(&self) -> &[GameObjectId] {
        &self.children
    }

    pub fn parent(&self) -> Option<GameObjectId> {
        self.parent
    }

    pub fn is_root(&self) -> bool {
        self.is_root
    }

    pub fn is_virtually_deleted(&self) -> bool {
        self.virtually_deleted
    }

    /// First attached component of `kind`, if any.
    pub fn first_of_kind(&self, kind: ComponentKind) -> Option<ComponentId> {
        self.first_of_kind[kind.index()]
    }
}
