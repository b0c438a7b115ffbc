//! Embedded Lua scripting.
//!
//! Every script component owns its own [`ScriptHost`]. Scripts never touch the scene arena
//! directly: they read a [`ScriptBridge`] directory refreshed before each update and queue
//! [`ScriptRequest`]s that the scene applies once the traversal is over.

mod bindings;
mod host;

use glam::Vec3;
use parking_lot::{Mutex, RwLock};

use crate::game_object::GameObjectId;

pub use host::ScriptHost;

/// One scene object as scripts see it.
#[derive(Debug, Clone, PartialEq)]
pub struct DirectoryEntry {
    pub id: GameObjectId,
    pub name: String,
    pub position: Vec3,
}

/// Scene mutation requested by a script, applied after the update traversal.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptRequest {
    Spawn { name: String, position: Vec3 },
    SetPosition { name: String, position: Vec3 },
    Destroy { name: String },
}

/// State shared between the scene and every script host.
#[derive(Debug, Default)]
pub struct ScriptBridge {
    directory: RwLock<Vec<DirectoryEntry>>,
    requests: Mutex<Vec<ScriptRequest>>,
}

impl ScriptBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the directory with a fresh snapshot, in tree order.
    pub fn refresh(&self, entries: Vec<DirectoryEntry>) {
        *self.directory.write() = entries;
    }

    /// First object called `name` in tree order.
    pub fn find(&self, name: &str) -> Option<DirectoryEntry> {
        self.directory
            .read()
            .iter()
            .find(|entry| entry.name == name)
            .cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.directory
            .read()
            .iter()
            .map(|entry| entry.name.clone())
            .collect()
    }

    pub fn request(&self, request: ScriptRequest) {
        self.requests.lock().push(request);
    }

    /// Drains pending requests in the order scripts made them.
    pub fn take_requests(&self) -> Vec<ScriptRequest> {
        std::mem::take(&mut *self.requests.lock())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requests_drain_in_order() {
        let bridge = ScriptBridge::new();
        bridge.request(ScriptRequest::Destroy { name: "a".into() });
        bridge.request(ScriptRequest::Spawn {
            name: "b".into(),
            position: Vec3::ONE,
        });
        let drained = bridge.take_requests();
        assert_eq!(drained.len(), 2);
        assert!(matches!(drained[0], ScriptRequest::Destroy { .. }));
        assert!(bridge.take_requests().is_empty());
    }

    #[test]
    fn find_returns_first_match() {
        let bridge = ScriptBridge::new();
        bridge.refresh(vec![
            DirectoryEntry {
                id: GameObjectId::default(),
                name: "Crate".into(),
                position: Vec3::X,
            },
            DirectoryEntry {
                id: GameObjectId::default(),
                name: "Crate".into(),
                position: Vec3::Y,
            },
        ]);
        assert_eq!(bridge.find("Crate").map(|e| e.position), Some(Vec3::X));
        assert_eq!(bridge.find("Floor"), None);
        assert_eq!(bridge.names(), ["Crate", "Crate"]);
    }
}
