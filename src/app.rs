//! Composition root: engine services, the active scene and the frame loop.

use std::sync::Arc;

use log::{debug, info, warn};

use crate::audio::{AudioDevice, NullAudio};
use crate::config::EngineConfig;
use crate::error::{JobError, RenderError, SceneError};
use crate::input::InputState;
use crate::jobs::JobPool;
use crate::physics::{CollisionEvent, PhysicsSystem};
use crate::render::{FrameStats, GraphicsBackend, RenderQueue, Renderer};
use crate::resources::Resources;
use crate::scene::{FrameServices, Scene};
use crate::undo::{Command, UndoStack};

/// Services shared by every scene the application runs. Built once at startup.
pub struct EngineContext {
    pub config: EngineConfig,
    pub resources: Resources,
    pub input: Arc<InputState>,
    pub audio: Box<dyn AudioDevice>,
    pub queue: RenderQueue,
    pub jobs: JobPool,
}

impl EngineContext {
    /// Context with a silent audio device.
    pub fn new(config: EngineConfig) -> Result<Self, JobError> {
        let jobs = JobPool::new(config.worker_threads)?;
        Ok(Self {
            config,
            resources: Resources::new(),
            input: Arc::new(InputState::new()),
            audio: Box::new(NullAudio::new()),
            queue: RenderQueue::new(),
            jobs,
        })
    }

    pub fn with_audio(mut self, audio: Box<dyn AudioDevice>) -> Self {
        self.audio = audio;
        self
    }

    /// Physics settings for a fresh scene.
    pub fn physics(&self) -> PhysicsSystem {
        PhysicsSystem::new(self.config.gravity, self.config.max_substeps)
    }
}

/// What one call to [`Application::frame`] did.
#[derive(Debug, Default)]
pub struct FrameReport {
    pub physics_ticks: u32,
    /// Fixed ticks owed but skipped because of the catch-up cap.
    pub dropped_ticks: u32,
    pub collisions: Vec<CollisionEvent>,
    pub stats: FrameStats,
}

pub struct Application<B: GraphicsBackend> {
    context: EngineContext,
    scene: Scene,
    renderer: Renderer<B>,
    undo: UndoStack,
    accumulator: f32,
    frames: u64,
}

impl<B: GraphicsBackend> Application<B> {
    pub fn new(context: EngineContext, backend: B) -> Self {
        let scene = Scene::with_physics(context.physics());
        let renderer = Renderer::new(backend, context.config.clear_color);
        let undo = UndoStack::new(context.config.undo_capacity);
        Self {
            context,
            scene,
            renderer,
            undo,
            accumulator: 0.0,
            frames: 0,
        }
    }

    pub fn context(&self) -> &EngineContext {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut EngineContext {
        &mut self.context
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn scene_mut(&mut self) -> &mut Scene {
        &mut self.scene
    }

    pub fn renderer(&self) -> &Renderer<B> {
        &self.renderer
    }

    pub fn renderer_mut(&mut self) -> &mut Renderer<B> {
        &mut self.renderer
    }

    pub fn undo_stack(&self) -> &UndoStack {
        &self.undo
    }

    /// Frames completed so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Makes `scene` active and returns the previous one. History belongs to the old scene
    /// and is cleared; physics settings come from the config.
    pub fn set_scene(&mut self, mut scene: Scene) -> Scene {
        self.undo.clear(&mut self.scene);
        let physics = scene.physics_mut();
        physics.set_gravity(self.context.config.gravity);
        physics.set_max_substeps(self.context.config.max_substeps);
        self.accumulator = 0.0;
        info!("scene activated with {} roots", scene.roots().len());
        std::mem::replace(&mut self.scene, scene)
    }

    pub fn execute(&mut self, command: Box<dyn Command>) -> Result<(), SceneError> {
        self.undo.execute(&mut self.scene, command)
    }

    pub fn record(&mut self, command: Box<dyn Command>) {
        self.undo.push(&mut self.scene, command);
    }

    pub fn undo(&mut self) -> Result<bool, SceneError> {
        self.undo.undo(&mut self.scene)
    }

    pub fn redo(&mut self) -> Result<bool, SceneError> {
        self.undo.redo(&mut self.scene)
    }

    /// Runs one frame: fixed physics ticks for the elapsed time (capped), the variable
    /// update, then rendering. Per-frame input edges are cleared at the end.
    pub fn frame(&mut self, real_dt: f32) -> Result<FrameReport, RenderError> {
        let mut report = FrameReport::default();
        let fixed_delta = self.context.config.fixed_delta;
        let max_ticks = self.context.config.max_catch_up_steps;

        self.accumulator += real_dt.max(0.0);
        while self.accumulator >= fixed_delta && report.physics_ticks < max_ticks {
            self.scene.fixed_update(fixed_delta);
            self.accumulator -= fixed_delta;
            report.physics_ticks += 1;
        }
        if self.accumulator >= fixed_delta {
            report.dropped_ticks = (self.accumulator / fixed_delta) as u32;
            warn!(
                "physics fell {} ticks behind; dropping the backlog",
                report.dropped_ticks
            );
            self.accumulator %= fixed_delta;
        }
        report.collisions = self.scene.drain_collision_events();

        let context = &mut self.context;
        let mut services = FrameServices {
            queue: &mut context.queue,
            resources: &context.resources,
            audio: context.audio.as_mut(),
            input: &context.input,
        };
        self.scene.update(real_dt, &mut services);

        self.renderer.prepare(&mut context.resources);
        let globals = self.scene.frame_globals(context.config.viewport.aspect());
        let rendered = self.renderer.render(
            &mut context.queue,
            &context.resources,
            &globals,
            self.scene.skybox(),
        );
        context.input.end_frame();
        self.frames += 1;

        match rendered {
            Ok(stats) => {
                report.stats = stats;
                debug!(
                    "frame {}: {} ticks, {} draws",
                    self.frames, report.physics_ticks, stats.draws
                );
                Ok(report)
            }
            Err(err) => {
                // Commands from a failed frame are not carried into the next one.
                context.queue.clear();
                Err(err)
            }
        }
    }

    /// Stops background work. The application can still render afterwards.
    pub fn shutdown(&mut self) {
        self.context.jobs.shutdown();
        info!("engine stopped after {} frames", self.frames);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::mesh::{MeshInfo, MeshRenderer};
    use crate::input::KeyCode;
    use crate::physics::RigidBody;
    use crate::render::RecordingBackend;
    use crate::transform::Transform;
    use crate::undo::EditCommand;
    use glam::Vec3;

    fn app(config: EngineConfig) -> Application<RecordingBackend> {
        Application::new(EngineContext::new(config).unwrap(), RecordingBackend::new())
    }

    #[test]
    fn catch_up_is_capped_and_backlog_dropped() {
        let mut app = app(EngineConfig {
            fixed_delta: 0.25,
            max_catch_up_steps: 3,
            ..EngineConfig::default()
        });
        let report = app.frame(2.0).unwrap();
        assert_eq!(report.physics_ticks, 3);
        assert_eq!(report.dropped_ticks, 5);

        let report = app.frame(0.25).unwrap();
        assert_eq!(report.physics_ticks, 1);
        assert_eq!(report.dropped_ticks, 0);
        assert_eq!(app.frames(), 2);
    }

    #[test]
    fn physics_runs_before_update_and_render_drains_queue() {
        let mut app = app(EngineConfig {
            fixed_delta: 0.5,
            gravity: Vec3::new(0.0, -1.0, 0.0),
            ..EngineConfig::default()
        });
        let cube = Arc::new(MeshInfo::cube("cube", &app.context().resources));
        let scene = app.scene_mut();
        let id = scene.create_game_object("Cube");
        scene.add_game_object(id).unwrap();
        scene.add_component(id, MeshRenderer::new(cube)).unwrap();
        scene.add_component(id, RigidBody::default()).unwrap();

        let report = app.frame(0.5).unwrap();
        assert_eq!(report.physics_ticks, 1);
        assert_eq!(report.stats.draws, 1);
        assert!(app.context().queue.is_empty());
        assert!(app.scene().transform(id).unwrap().position.y < 0.0);
        assert_eq!(app.renderer().backend().draws().len(), 1);
    }

    #[test]
    fn input_edges_last_one_frame() {
        let mut app = app(EngineConfig::default());
        app.context().input.set_key_down(KeyCode::Character('W'));
        assert!(app.context().input.was_pressed("W"));
        app.frame(0.0).unwrap();
        assert!(!app.context().input.was_pressed("W"));
        assert!(app.context().input.is_down("W"));
    }

    #[test]
    fn undo_goes_through_the_application() {
        let mut app = app(EngineConfig {
            undo_capacity: 2,
            ..EngineConfig::default()
        });
        let id = app.scene_mut().create_game_object("Crate");
        app.scene_mut().add_game_object(id).unwrap();
        let before = app.scene().transform(id).unwrap();
        let after = Transform::from_position(Vec3::X);
        app.execute(Box::new(EditCommand::transform(id, before, after)))
            .unwrap();
        assert!(app.undo().unwrap());
        assert_eq!(app.scene().transform(id).unwrap(), before);
        assert!(app.redo().unwrap());
        assert_eq!(app.scene().transform(id).unwrap(), after);

        let old = app.set_scene(Scene::new());
        assert_eq!(old.object_count(), 1);
        assert_eq!(app.undo_stack().undos_remaining(), 0);
    }
}
