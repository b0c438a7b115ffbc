use glam::Vec3;

use crate::error::ArchiveError;
use crate::persistence::{ArchiveReader, ArchiveWriter};
use crate::transform::Transform;

use super::collider::{read_shape, Collider, ColliderShape};

/// How a body takes part in collision detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InteractionMode {
    #[default]
    Block,
    /// Reported as overlap-only on collision events.
    Overlap,
    /// Never tested against other bodies.
    Ignore,
}

impl InteractionMode {
    fn to_u32(self) -> u32 {
        match self {
            Self::Block => 0,
            Self::Overlap => 1,
            Self::Ignore => 2,
        }
    }

    fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::Block),
            1 => Some(Self::Overlap),
            2 => Some(Self::Ignore),
            _ => None,
        }
    }
}

/// Editable physical properties of a body, captured as one value by undo commands.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BodyProperties {
    pub mass: f32,
    /// Percent of linear velocity retained per second (0 to 100).
    pub linear_damping: f32,
    /// Percent of angular velocity retained per second (0 to 100).
    pub angular_damping: f32,
    pub restitution: f32,
    pub mode: InteractionMode,
}

impl Default for BodyProperties {
    fn default() -> Self {
        Self {
            mass: 1.0,
            linear_damping: 99.0,
            angular_damping: 95.0,
            restitution: 0.2,
            mode: InteractionMode::Block,
        }
    }
}

impl BodyProperties {
    /// Damping factor applied over `dt` seconds for a retained-per-second percentage.
    pub fn retain_factor(percent: f32, dt: f32) -> f32 {
        (percent.clamp(0.0, 100.0) / 100.0).powf(dt)
    }
}

/// Rigid-body state. Angular quantities are Euler degrees per second.
///
/// The first collider is the implicit bounding box created when the body is attached;
/// explicit colliders follow it.
#[derive(Debug, Clone, PartialEq)]
pub struct RigidBody {
    pub properties: BodyProperties,
    pub velocity: Vec3,
    /// Single-tick acceleration, cleared after every physics step.
    pub acceleration: Vec3,
    pub angular_velocity: Vec3,
    pub angular_acceleration: Vec3,
    colliders: Vec<Collider>,
    pub(crate) last_rotation_delta: Vec3,
}

impl Default for RigidBody {
    fn default() -> Self {
        Self::new(BodyProperties::default())
    }
}

impl RigidBody {
    pub fn new(properties: BodyProperties) -> Self {
        Self {
            properties,
            velocity: Vec3::ZERO,
            acceleration: Vec3::ZERO,
            angular_velocity: Vec3::ZERO,
            angular_acceleration: Vec3::ZERO,
            colliders: Vec::new(),
            last_rotation_delta: Vec3::ZERO,
        }
    }

    pub fn with_velocity(mut self, velocity: Vec3) -> Self {
        self.velocity = velocity;
        self
    }

    pub fn colliders(&self) -> &[Collider] {
        &self.colliders
    }

    pub fn colliders_mut(&mut self) -> &mut [Collider] {
        &mut self.colliders
    }

    pub fn add_collider(&mut self, collider: Collider) {
        self.colliders.push(collider);
    }

    pub fn implicit_collider(&self) -> Option<&Collider> {
        self.colliders.first().filter(|collider| collider.is_implicit())
    }

    /// Adds `acceleration` for the next physics step only.
    pub fn accelerate(&mut self, acceleration: Vec3) {
        self.acceleration += acceleration;
    }

    /// Sets the implicit bound, creating the implicit collider if the body has none yet.
    pub(crate) fn set_implicit_bound(&mut self, min: Vec3, max: Vec3) {
        match self.colliders.first_mut() {
            Some(collider) if collider.is_implicit() => {
                collider.min = min;
                collider.max = max;
            }
            _ => self
                .colliders
                .insert(0, Collider::implicit(ColliderShape::Aabb, min, max)),
        }
    }

    pub fn collider_shape(&self) -> Option<ColliderShape> {
        self.implicit_collider().map(|collider| collider.shape)
    }

    pub(crate) fn set_collider_shape(&mut self, shape: ColliderShape) {
        if let Some(collider) = self.colliders.first_mut().filter(|c| c.is_implicit()) {
            collider.shape = shape;
        }
    }

    /// Refreshes every collider's world geometry for the owner pose.
    pub fn sync_colliders(&mut self, owner: &Transform) {
        for collider in &mut self.colliders {
            collider.update_geometry(owner);
        }
    }

    /// Takes over `loaded` state while keeping this body's implicit bound.
    pub(crate) fn absorb(&mut self, loaded: RigidBody) {
        let shape = loaded.collider_shape();
        let implicit = self.colliders.first().filter(|c| c.is_implicit()).cloned();
        self.properties = loaded.properties;
        self.velocity = loaded.velocity;
        self.angular_velocity = loaded.angular_velocity;
        self.colliders = implicit.into_iter().collect();
        self.colliders
            .extend(loaded.colliders.into_iter().filter(|c| !c.is_implicit()));
        if let Some(shape) = shape {
            self.set_collider_shape(shape);
        }
    }

    pub(crate) fn save(&self, writer: &mut dyn ArchiveWriter) {
        let properties = &self.properties;
        writer.write_f32("mass", properties.mass);
        writer.write_f32("linear_damping", properties.linear_damping);
        writer.write_f32("angular_damping", properties.angular_damping);
        writer.write_f32("restitution", properties.restitution);
        writer.write_u32("mode", properties.mode.to_u32());
        writer.write_vec3("velocity", self.velocity);
        writer.write_vec3("angular_velocity", self.angular_velocity);
        writer.write_str(
            "shape",
            self.collider_shape().unwrap_or_default().tag(),
        );
        let explicit: Vec<&Collider> = self
            .colliders
            .iter()
            .filter(|collider| !collider.is_implicit())
            .collect();
        writer.write_u32("colliders", explicit.len() as u32);
        for (index, collider) in explicit.iter().enumerate() {
            writer.begin_block(&format!("collider_{index}"));
            collider.save(writer);
            writer.end_block();
        }
    }

    pub(crate) fn load(reader: &mut dyn ArchiveReader) -> Result<Self, ArchiveError> {
        let mass = reader.read_f32("mass")?;
        let linear_damping = reader.read_f32("linear_damping")?;
        let angular_damping = reader.read_f32("angular_damping")?;
        let restitution = reader.read_f32("restitution")?;
        let mode = reader.read_u32("mode")?;
        let properties = BodyProperties {
            mass,
            linear_damping,
            angular_damping,
            restitution,
            mode: InteractionMode::from_u32(mode).ok_or_else(|| ArchiveError::InvalidValue {
                key: "mode".into(),
                message: format!("unknown interaction mode {mode}"),
            })?,
        };
        let mut body = Self::new(properties);
        body.velocity = reader.read_vec3("velocity")?;
        body.angular_velocity = reader.read_vec3("angular_velocity")?;
        let shape = read_shape(reader)?;
        body.colliders
            .push(Collider::implicit(shape, Vec3::splat(-0.5), Vec3::splat(0.5)));
        let count = reader.read_u32("colliders")?;
        for index in 0..count {
            reader.begin_block(&format!("collider_{index}"))?;
            body.colliders.push(Collider::load(reader)?);
            reader.end_block()?;
        }
        Ok(body)
    }
}
