//! Per-body physics step: speculative sub-stepping, collision response and leftover travel.

use glam::Vec3;

use crate::component::ComponentId;
use crate::game_object::GameObjectId;
use crate::transform::Transform;

use super::body::{BodyProperties, InteractionMode, RigidBody};
use super::collider::ColliderGeometry;

/// Forward push applied to a body whose centre ended up inside its partner (units/s).
const EMBED_PUSH_SPEED: f32 = 1.0;
/// Spin injected per unit of centre displacement when embedded (deg/s).
const EMBED_SPIN_GAIN: f32 = 30.0;
/// Angular correction for a landing on a tilted face (deg/s at full misalignment).
const LANDING_GAIN: f32 = 90.0;
const ANTI_PARALLEL_TOLERANCE: f32 = 1e-3;
/// Angular velocity decay when a tick sees no collision.
const FREE_SPIN_DECAY: f32 = 0.9;
const ANGULAR_REST_EPSILON: f32 = 1e-3;
const MIN_MASS: f32 = 1e-3;
/// Pairs that are already separating keep their velocities. Without this a resting body
/// would be kicked by its own rebound on every tick it stays in contact.
const IMPULSE_ONLY_WHILE_CLOSING: bool = true;

/// Another body as seen by the body being stepped.
#[derive(Debug, Clone)]
pub struct PartnerSnapshot {
    pub body: ComponentId,
    pub owner: GameObjectId,
    pub position: Vec3,
    /// Implicit bounding box in world space.
    pub bound: ColliderGeometry,
    /// Every enabled collider in world space.
    pub colliders: Vec<ColliderGeometry>,
    pub velocity: Vec3,
    pub mass: f32,
    /// Disabled bodies do not simulate and behave as if infinitely heavy.
    pub simulating: bool,
    pub mode: InteractionMode,
}

#[derive(Debug, Clone, Copy)]
pub struct StepSettings {
    pub fixed_delta: f32,
    pub gravity: Vec3,
    pub max_substeps: usize,
}

/// Outcome of one body's step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepReport {
    /// Indices into the partner slice, deduplicated, in first-hit order.
    pub hits: Vec<usize>,
    /// Velocity changes owed to simulating partners.
    pub partner_impulses: Vec<(usize, Vec3)>,
    pub iterations: usize,
    /// Seconds of the tick advanced without collision.
    pub travelled: f32,
    pub embedded: bool,
}

#[derive(Clone, Copy)]
struct Saved {
    velocity: Vec3,
    angular_velocity: Vec3,
    transform: Transform,
}

/// Advances `body` by one fixed tick against `partners`.
pub fn step_body(
    body: &mut RigidBody,
    transform: &mut Transform,
    partners: &[PartnerSnapshot],
    settings: &StepSettings,
) -> StepReport {
    let mut report = StepReport::default();
    let budget = settings.fixed_delta;
    let start_euler = transform.euler_angles;

    body.sync_colliders(transform);

    let mut step = budget;
    for _ in 0..settings.max_substeps {
        let remaining = budget - report.travelled;
        if remaining <= f32::EPSILON {
            break;
        }
        report.iterations += 1;
        let dt = step.min(remaining);
        let saved = Saved {
            velocity: body.velocity,
            angular_velocity: body.angular_velocity,
            transform: *transform,
        };

        integrate(body, transform, dt, settings.gravity);
        body.sync_colliders(transform);

        // Any intersection rolls the sub-step back, including one carried over from the
        // previous tick. Embedded bodies leave through the push applied in resolution.
        let mut blocked = false;
        for (index, partner) in partners.iter().enumerate() {
            if !overlaps(body, partner) {
                continue;
            }
            if !report.hits.contains(&index) {
                report.hits.push(index);
            }
            blocked = true;
        }

        if blocked {
            body.velocity = saved.velocity;
            body.angular_velocity = saved.angular_velocity;
            *transform = saved.transform;
            body.sync_colliders(transform);
        } else {
            report.travelled += dt;
        }
        step *= 0.5;
    }

    body.acceleration = Vec3::ZERO;

    for index in report.hits.clone() {
        resolve_against(body, transform, &partners[index], index, &mut report);
    }
    if report.hits.is_empty() {
        body.angular_velocity *= FREE_SPIN_DECAY;
    }

    // Leftover travel skips gravity and damping for the remaining slice.
    if body.angular_velocity.length() < ANGULAR_REST_EPSILON && !report.embedded {
        let leftover = budget - report.travelled;
        if leftover > 0.0 {
            transform.position += body.velocity * leftover;
        }
    }

    body.last_rotation_delta = transform.euler_angles - start_euler;
    transform.normalize_euler();
    transform.update();
    body.sync_colliders(transform);
    report
}

fn integrate(body: &mut RigidBody, transform: &mut Transform, dt: f32, gravity: Vec3) {
    let properties = body.properties;
    body.velocity = (body.velocity + (body.acceleration + gravity) * dt)
        * BodyProperties::retain_factor(properties.linear_damping, dt);
    transform.position += body.velocity * dt;

    body.angular_velocity = (body.angular_velocity + body.angular_acceleration * dt)
        * BodyProperties::retain_factor(properties.angular_damping, dt);
    transform.euler_angles += body.angular_velocity * dt;
}

fn overlaps(body: &RigidBody, partner: &PartnerSnapshot) -> bool {
    body.colliders()
        .iter()
        .filter(|collider| collider.enabled)
        .any(|collider| {
            partner
                .colliders
                .iter()
                .any(|other| collider.geometry().intersects(other))
        })
}

/// Face normal of a box toward `direction`: the axis with the largest extent-relative
/// component, signed to point along `direction`.
pub fn face_normal(axes: &[Vec3; 3], half_extents: Vec3, direction: Vec3) -> Vec3 {
    let extents = half_extents.to_array();
    let mut best = Vec3::Y;
    let mut best_score = 0.0;
    for (axis, extent) in axes.iter().zip(extents) {
        let score = axis.dot(direction) / extent.max(f32::EPSILON);
        if score.abs() > best_score {
            best_score = score.abs();
            best = *axis * score.signum();
        }
    }
    best
}

fn resolve_against(
    body: &mut RigidBody,
    transform: &Transform,
    partner: &PartnerSnapshot,
    index: usize,
    report: &mut StepReport,
) {
    let own_bound = body
        .implicit_collider()
        .map(|collider| *collider.geometry())
        .unwrap_or_else(|| {
            ColliderGeometry::from_center_half_extents(
                Default::default(),
                transform.position,
                Vec3::splat(0.5),
            )
        });
    let normal = face_normal(
        &own_bound.axes,
        own_bound.half_extents,
        partner.position - transform.position,
    );
    let partner_normal = face_normal(
        &partner.bound.axes,
        partner.bound.half_extents,
        transform.position - partner.position,
    );

    if partner.bound.contains_point(transform.position) {
        report.embedded = true;
        let displacement = transform.position - partner.position;
        let push = EMBED_PUSH_SPEED + body.velocity.dot(normal).max(0.0);
        body.velocity += partner_normal * push;
        body.angular_velocity += displacement.cross(partner_normal) * EMBED_SPIN_GAIN;
    }

    let alignment = normal.dot(partner_normal);
    if alignment > -1.0 + ANTI_PARALLEL_TOLERANCE {
        let axis = partner_normal.cross(normal);
        let misalignment = 1.0 + alignment;
        let [x, y, z] = transform.axes();
        let mut correction =
            Vec3::new(axis.dot(x), axis.dot(y), axis.dot(z)) * misalignment * LANDING_GAIN;
        if correction.dot(body.last_rotation_delta) < 0.0 {
            correction *= 0.5;
        }
        body.angular_velocity += correction;
    }

    let closing = (body.velocity - partner.velocity).dot(normal);
    if IMPULSE_ONLY_WHILE_CLOSING && closing <= 0.0 {
        return;
    }
    let restitution = body.properties.restitution;
    let mass = body.properties.mass.max(MIN_MASS);
    if partner.simulating {
        let partner_mass = partner.mass.max(MIN_MASS);
        let impulse = -(mass * partner_mass) * closing / (mass + partner_mass) * (1.0 + restitution);
        body.velocity += normal * (impulse / mass);
        report
            .partner_impulses
            .push((index, -normal * (impulse / partner_mass)));
    } else {
        let impulse = -mass * closing * (1.0 + restitution);
        body.velocity += normal * (impulse / mass);
    }
}
