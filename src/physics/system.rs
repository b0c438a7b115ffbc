use std::collections::BTreeMap;

use glam::Vec3;
use log::debug;
use slotmap::SlotMap;

use crate::component::{Component, ComponentId};
use crate::game_object::{GameObject, GameObjectId};

use super::body::{InteractionMode, RigidBody};
use super::resolve::{step_body, PartnerSnapshot, StepSettings};

/// Unordered pair of rigid bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CollisionPair {
    first: ComponentId,
    second: ComponentId,
}

impl CollisionPair {
    pub fn new(a: ComponentId, b: ComponentId) -> Self {
        if a <= b {
            Self { first: a, second: b }
        } else {
            Self { first: b, second: a }
        }
    }

    pub fn first(&self) -> ComponentId {
        self.first
    }

    pub fn second(&self) -> ComponentId {
        self.second
    }

    pub fn contains(&self, body: ComponentId) -> bool {
        self.first == body || self.second == body
    }
}

#[derive(Debug, Clone, Copy)]
struct PairInfo {
    /// Owners of `first` and `second`, in pair order.
    owners: (GameObjectId, GameObjectId),
    overlap_only: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollisionPhase {
    Enter,
    Collide,
    Overlap,
    Leave,
}

impl CollisionPhase {
    /// Script function invoked for this phase.
    pub fn hook(self) -> &'static str {
        match self {
            Self::Enter => "OnEnter",
            Self::Collide => "OnCollide",
            Self::Overlap => "OnOverlap",
            Self::Leave => "OnLeave",
        }
    }
}

/// One callback owed to `object` about its contact with `other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollisionEvent {
    pub phase: CollisionPhase,
    pub object: GameObjectId,
    pub other: GameObjectId,
    /// Either party is in [`InteractionMode::Overlap`]. Resolution does not consult it.
    pub overlap_only: bool,
}

/// Registry of active rigid bodies and the per-tick collision state machine.
#[derive(Debug)]
pub struct PhysicsSystem {
    bodies: Vec<ComponentId>,
    previous: BTreeMap<CollisionPair, PairInfo>,
    gravity: Vec3,
    max_substeps: usize,
}

impl Default for PhysicsSystem {
    fn default() -> Self {
        Self::new(Vec3::new(0.0, -9.81, 0.0), 5)
    }
}

impl PhysicsSystem {
    pub fn new(gravity: Vec3, max_substeps: usize) -> Self {
        Self {
            bodies: Vec::new(),
            previous: BTreeMap::new(),
            gravity,
            max_substeps: max_substeps.max(1),
        }
    }

    pub fn gravity(&self) -> Vec3 {
        self.gravity
    }

    pub fn set_gravity(&mut self, gravity: Vec3) {
        self.gravity = gravity;
    }

    pub fn max_substeps(&self) -> usize {
        self.max_substeps
    }

    pub fn set_max_substeps(&mut self, max_substeps: usize) {
        self.max_substeps = max_substeps.max(1);
    }

    /// Active bodies in registration order, which is also step order.
    pub fn bodies(&self) -> &[ComponentId] {
        &self.bodies
    }

    pub fn is_registered(&self, body: ComponentId) -> bool {
        self.bodies.contains(&body)
    }

    pub fn register(&mut self, body: ComponentId) {
        if !self.is_registered(body) {
            self.bodies.push(body);
        }
    }

    /// Removes `body` and forgets its contacts without firing leave callbacks.
    pub fn unregister(&mut self, body: ComponentId) {
        self.bodies.retain(|id| *id != body);
        self.previous.retain(|pair, _| !pair.contains(body));
    }

    /// Pairs that were in contact at the end of the last tick.
    pub fn contacts(&self) -> impl Iterator<Item = CollisionPair> + '_ {
        self.previous.keys().copied()
    }

    /// Runs one fixed tick over every simulating body in registration order and returns the
    /// collision callbacks it produced.
    pub fn step(
        &mut self,
        fixed_delta: f32,
        objects: &mut SlotMap<GameObjectId, GameObject>,
        components: &mut SlotMap<ComponentId, Component>,
    ) -> Vec<CollisionEvent> {
        let settings = StepSettings {
            fixed_delta,
            gravity: self.gravity,
            max_substeps: self.max_substeps,
        };
        let mut current = BTreeMap::new();

        for id in self.bodies.clone() {
            let Some(component) = components.get(id) else {
                continue;
            };
            if !component.enabled || component.virtually_deleted {
                continue;
            }
            let owner = component.owner;
            let Some(body) = component.get::<RigidBody>() else {
                continue;
            };
            let Some(object) = objects.get(owner).filter(|object| !object.virtually_deleted)
            else {
                continue;
            };
            let mut body = body.clone();
            let mut transform = object.transform;

            let partners: Vec<PartnerSnapshot> = if body.properties.mode == InteractionMode::Ignore
            {
                Vec::new()
            } else {
                self.bodies
                    .iter()
                    .filter(|other| **other != id)
                    .filter_map(|other| snapshot(*other, objects, components))
                    .collect()
            };

            let report = step_body(&mut body, &mut transform, &partners, &settings);
            debug!(
                "body {:?}: {} iterations, {:.3}s travelled, {} hits",
                id,
                report.iterations,
                report.travelled,
                report.hits.len()
            );

            for (index, delta) in &report.partner_impulses {
                if let Some(partner) = components
                    .get_mut(partners[*index].body)
                    .and_then(|component| component.get_mut::<RigidBody>())
                {
                    partner.velocity += *delta;
                }
            }
            for index in &report.hits {
                let partner = &partners[*index];
                let pair = CollisionPair::new(id, partner.body);
                let owners = if pair.first() == id {
                    (owner, partner.owner)
                } else {
                    (partner.owner, owner)
                };
                let overlap_only = body.properties.mode == InteractionMode::Overlap
                    || partner.mode == InteractionMode::Overlap;
                current.insert(
                    pair,
                    PairInfo {
                        owners,
                        overlap_only,
                    },
                );
            }

            if let Some(slot) = components
                .get_mut(id)
                .and_then(|component| component.get_mut::<RigidBody>())
            {
                *slot = body;
            }
            if let Some(object) = objects.get_mut(owner) {
                object.transform = transform;
            }
        }

        let events = transition(&self.previous, &current);
        self.previous = current;
        events
    }
}

fn snapshot(
    id: ComponentId,
    objects: &SlotMap<GameObjectId, GameObject>,
    components: &SlotMap<ComponentId, Component>,
) -> Option<PartnerSnapshot> {
    let component = components.get(id).filter(|c| !c.virtually_deleted)?;
    let body = component.get::<RigidBody>()?;
    if body.properties.mode == InteractionMode::Ignore {
        return None;
    }
    let object = objects
        .get(component.owner)
        .filter(|object| !object.virtually_deleted)?;

    let mut body = body.clone();
    body.sync_colliders(&object.transform);
    let bound = body
        .implicit_collider()
        .or_else(|| body.colliders().first())
        .map(|collider| *collider.geometry())?;
    let colliders = body
        .colliders()
        .iter()
        .filter(|collider| collider.enabled)
        .map(|collider| *collider.geometry())
        .collect();
    Some(PartnerSnapshot {
        body: id,
        owner: component.owner,
        position: object.transform.position,
        bound,
        colliders,
        velocity: body.velocity,
        mass: body.properties.mass,
        simulating: component.enabled,
        mode: body.properties.mode,
    })
}

fn transition(
    previous: &BTreeMap<CollisionPair, PairInfo>,
    current: &BTreeMap<CollisionPair, PairInfo>,
) -> Vec<CollisionEvent> {
    let mut events = Vec::new();
    let mut push_both = |phases: &[CollisionPhase], info: &PairInfo| {
        let (a, b) = info.owners;
        for (object, other) in [(a, b), (b, a)] {
            for phase in phases {
                events.push(CollisionEvent {
                    phase: *phase,
                    object,
                    other,
                    overlap_only: info.overlap_only,
                });
            }
        }
    };
    for (pair, info) in current {
        if previous.contains_key(pair) {
            push_both(&[CollisionPhase::Overlap], info);
        } else {
            push_both(&[CollisionPhase::Enter, CollisionPhase::Collide], info);
        }
    }
    for (pair, info) in previous {
        if !current.contains_key(pair) {
            push_both(&[CollisionPhase::Leave], info);
        }
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::KeyData;

    fn body(raw: u64) -> ComponentId {
        ComponentId::from(KeyData::from_ffi(raw))
    }

    fn info() -> PairInfo {
        PairInfo {
            owners: (
                GameObjectId::from(KeyData::from_ffi(1)),
                GameObjectId::from(KeyData::from_ffi(2)),
            ),
            overlap_only: false,
        }
    }

    #[test]
    fn pairs_are_unordered() {
        assert_eq!(
            CollisionPair::new(body(1), body(2)),
            CollisionPair::new(body(2), body(1))
        );
    }

    #[test]
    fn enter_overlap_leave_sequence() {
        let pair = CollisionPair::new(body(1), body(2));
        let empty = BTreeMap::new();
        let touching = BTreeMap::from([(pair, info())]);

        let phases = |events: Vec<CollisionEvent>| -> Vec<CollisionPhase> {
            events.into_iter().map(|event| event.phase).collect()
        };
        use CollisionPhase::*;
        assert_eq!(
            phases(transition(&empty, &touching)),
            [Enter, Collide, Enter, Collide]
        );
        assert_eq!(phases(transition(&touching, &touching)), [Overlap, Overlap]);
        assert_eq!(phases(transition(&touching, &empty)), [Leave, Leave]);
        assert!(transition(&empty, &empty).is_empty());
    }

    #[test]
    fn events_are_delivered_to_both_sides() {
        let pair = CollisionPair::new(body(1), body(2));
        let touching = BTreeMap::from([(pair, info())]);
        let events = transition(&BTreeMap::new(), &touching);
        let (a, b) = info().owners;
        assert_eq!((events[0].object, events[0].other), (a, b));
        assert_eq!((events[2].object, events[2].other), (b, a));
    }
}
