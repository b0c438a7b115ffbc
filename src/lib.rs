//! Core of the Ember runtime: the scene tree and its components, render submission,
//! rigid-body physics, persistence, undo and Lua scripting.
//!
//! Platform integration stays outside the library. The headless [`RecordingBackend`] is
//! enough to drive a full [`Application`] frame loop in tests and tools; the `gpu` feature
//! adds a wgpu backend for windowed runs.

pub mod app;
pub mod audio;
pub mod component;
pub mod config;
pub mod error;
pub mod game_object;
pub mod input;
pub mod jobs;
pub mod persistence;
pub mod physics;
pub mod render;
pub mod resources;
pub mod scene;
pub mod scripting;
pub mod transform;
pub mod undo;

pub use app::{Application, EngineContext, FrameReport};
pub use component::{Component, ComponentData, ComponentId, ComponentKind, ComponentVariant};
pub use config::EngineConfig;
pub use error::{ArchiveError, RenderError, SceneError};
pub use game_object::{GameObject, GameObjectId};
pub use input::{InputState, KeyCode, MouseButton, NamedKey};
pub use persistence::{load_from_path, save_to_path, SceneFormat};
pub use physics::{CollisionEvent, CollisionPhase, PhysicsSystem, RigidBody};
pub use render::{RecordingBackend, Renderer};
pub use resources::Resources;
pub use scene::Scene;
pub use transform::Transform;
pub use undo::{Command, UndoStack};
