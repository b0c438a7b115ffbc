use glam::{Mat4, Vec3};

use crate::error::ArchiveError;
use crate::persistence::{ArchiveReader, ArchiveWriter};
use crate::render::RenderCommand;
use crate::resources::{MaterialHandle, Resources};

use super::UpdateContext;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Particle {
    pub position: Vec3,
    pub velocity: Vec3,
    pub age: f32,
}

/// CPU particle emitter. Each live particle is submitted as one cube draw.
#[derive(Debug, Clone)]
pub struct ParticleEmitter {
    /// Particles spawned per second.
    pub rate: f32,
    pub lifetime: f32,
    pub speed: f32,
    pub size: f32,
    pub capacity: usize,
    pub material: Option<MaterialHandle>,
    particles: Vec<Particle>,
    spawn_debt: f32,
    spawned: u32,
}

impl Default for ParticleEmitter {
    fn default() -> Self {
        Self {
            rate: 10.0,
            lifetime: 2.0,
            speed: 1.0,
            size: 0.1,
            capacity: 256,
            material: None,
            particles: Vec::new(),
            spawn_debt: 0.0,
            spawned: 0,
        }
    }
}

// Golden angle in radians, spreads consecutive particles around the emit axis.
const GOLDEN_ANGLE: f32 = 2.399_963;

impl ParticleEmitter {
    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    /// Ages, moves and spawns particles for one frame.
    pub fn simulate(&mut self, delta_time: f32, origin: Vec3) {
        for particle in &mut self.particles {
            particle.age += delta_time;
            particle.position += particle.velocity * delta_time;
        }
        let lifetime = self.lifetime;
        self.particles.retain(|particle| particle.age < lifetime);

        self.spawn_debt += self.rate * delta_time;
        while self.spawn_debt >= 1.0 {
            self.spawn_debt -= 1.0;
            if self.particles.len() >= self.capacity {
                continue;
            }
            let angle = self.spawned as f32 * GOLDEN_ANGLE;
            let direction = Vec3::new(angle.cos() * 0.3, 1.0, angle.sin() * 0.3).normalize();
            self.particles.push(Particle {
                position: origin,
                velocity: direction * self.speed,
                age: 0.0,
            });
            self.spawned = self.spawned.wrapping_add(1);
        }
    }

    pub(crate) fn update(&mut self, ctx: &mut UpdateContext<'_>) {
        self.simulate(ctx.delta_time, ctx.transform.position);
        let material = self
            .material
            .unwrap_or_else(|| ctx.resources.default_material());
        let drawable = ctx.resources.cube();
        for particle in &self.particles {
            let world = Mat4::from_scale_rotation_translation(
                Vec3::splat(self.size),
                glam::Quat::IDENTITY,
                particle.position,
            );
            ctx.queue.submit(RenderCommand::new(material, drawable, world));
        }
    }

    pub(crate) fn save(&self, writer: &mut dyn ArchiveWriter, resources: &Resources) {
        writer.write_f32("rate", self.rate);
        writer.write_f32("lifetime", self.lifetime);
        writer.write_f32("speed", self.speed);
        writer.write_f32("size", self.size);
        writer.write_u32("capacity", self.capacity as u32);
        let material = self
            .material
            .map(|material| resources.material_path(material))
            .unwrap_or_default();
        writer.write_str("material", material);
    }

    pub(crate) fn load(
        reader: &mut dyn ArchiveReader,
        resources: &Resources,
    ) -> Result<Self, ArchiveError> {
        let mut emitter = Self {
            rate: reader.read_f32("rate")?,
            lifetime: reader.read_f32("lifetime")?,
            speed: reader.read_f32("speed")?,
            size: reader.read_f32("size")?,
            capacity: reader.read_u32("capacity")? as usize,
            ..Self::default()
        };
        let material = reader.read_str("material")?;
        if !material.is_empty() {
            emitter.material = Some(resources.material_or_default(&material));
        }
        Ok(emitter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spawns_at_rate_and_expires_after_lifetime() {
        let mut emitter = ParticleEmitter {
            rate: 4.0,
            lifetime: 1.0,
            ..ParticleEmitter::default()
        };
        emitter.simulate(0.5, Vec3::ZERO);
        assert_eq!(emitter.particles().len(), 2);
        emitter.simulate(0.75, Vec3::ZERO);
        assert_eq!(emitter.particles().len(), 5);
        emitter.simulate(0.5, Vec3::ZERO);
        // the first two reached 1.25s and expired
        assert!(emitter.particles().iter().all(|particle| particle.age < 1.0));
    }

    #[test]
    fn capacity_bounds_live_particles() {
        let mut emitter = ParticleEmitter {
            rate: 100.0,
            capacity: 3,
            ..ParticleEmitter::default()
        };
        emitter.simulate(1.0, Vec3::ZERO);
        assert_eq!(emitter.particles().len(), 3);
        assert!(emitter.particles()[0].velocity.y > 0.0);
    }
}
