//! Discrete rigid-body physics: bodies, box colliders, sub-stepped resolution and the
//! enter/overlap/leave pair tracking that feeds collision callbacks.

mod body;
mod collider;
mod resolve;
mod system;

pub use body::{BodyProperties, InteractionMode, RigidBody};
pub use collider::{Collider, ColliderGeometry, ColliderShape};
pub use resolve::{face_normal, step_body, PartnerSnapshot, StepReport, StepSettings};
pub use system::{CollisionEvent, CollisionPair, CollisionPhase, PhysicsSystem};
