use std::env;

use anyhow::{anyhow, Context, Result};
use log::info;

use ember_engine::render::GraphicsBackend;
use ember_engine::{
    load_from_path, save_to_path, Application, EngineConfig, EngineContext, GameObjectId,
    RecordingBackend, Scene,
};

const USAGE: &str =
    "Usage: ember <scene> [--frames N] [--config FILE] [--save FILE] [--summary-only]";

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        eprintln!("Error: {err:?}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let options = CliOptions::parse(env::args().skip(1))?;
    let config = match &options.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("failed to load config {path}"))?,
        None => EngineConfig::default(),
    };

    if options.summary_only {
        return run_headless(&options, config);
    }

    #[cfg(feature = "gpu")]
    {
        match window::run_interactive(&options, config.clone()) {
            Ok(()) => Ok(()),
            Err(err) if err.downcast_ref::<window::WindowInitError>().is_some() => {
                eprintln!("{err}. Falling back to --summary-only mode.");
                run_headless(&options, config)
            }
            Err(err) => Err(err),
        }
    }

    #[cfg(not(feature = "gpu"))]
    {
        info!("built without the gpu feature; running headless");
        run_headless(&options, config)
    }
}

fn run_headless(options: &CliOptions, config: EngineConfig) -> Result<()> {
    let step = config.fixed_delta;
    let context = EngineContext::new(config).context("failed to start the engine")?;
    let mut app = Application::new(context, RecordingBackend::new());
    load_scene(&mut app, &options.path)?;

    for _ in 0..options.frames {
        let report = app.frame(step)?;
        for event in &report.collisions {
            let scene = app.scene();
            info!(
                "{:?}: {} / {}",
                event.phase,
                object_name(scene, event.object),
                object_name(scene, event.other)
            );
        }
    }
    finish(&mut app, options)
}

fn load_scene<B: GraphicsBackend>(app: &mut Application<B>, path: &str) -> Result<()> {
    let mut scene = Scene::new();
    load_from_path(&mut scene, &app.context().resources, path)
        .with_context(|| format!("failed to load scene {path}"))?;
    app.set_scene(scene);

    let scene = app.scene();
    println!("Loaded scene with {} objects", scene.object_count());
    for id in scene.walk() {
        let Some(object) = scene.object(id) else {
            continue;
        };
        let kinds: Vec<&str> = object
            .components()
            .iter()
            .filter_map(|component| scene.component(*component))
            .map(|component| component.kind().tag())
            .collect();
        println!(
            "{}- {} [{}]",
            "  ".repeat(depth(scene, id)),
            object.name,
            kinds.join(", ")
        );
    }
    Ok(())
}

fn object_name(scene: &Scene, id: GameObjectId) -> &str {
    scene.object(id).map_or("<destroyed>", |object| object.name.as_str())
}

fn depth(scene: &Scene, id: GameObjectId) -> usize {
    let mut depth = 0;
    let mut cursor = scene.object(id).and_then(|object| object.parent());
    while let Some(parent) = cursor {
        depth += 1;
        cursor = scene.object(parent).and_then(|object| object.parent());
    }
    depth
}

fn finish<B: GraphicsBackend>(app: &mut Application<B>, options: &CliOptions) -> Result<()> {
    app.shutdown();
    print_final_state(app.scene());
    if let Some(path) = &options.save {
        save_to_path(app.scene(), &app.context().resources, path, None)
            .with_context(|| format!("failed to save scene {path}"))?;
        println!("Saved scene to {path}");
    }
    Ok(())
}

fn print_final_state(scene: &Scene) {
    println!("Final object states:");
    for id in scene.walk() {
        let (Some(object), Some(transform)) = (scene.object(id), scene.transform(id)) else {
            continue;
        };
        let position = transform.position;
        println!(
            " - {} pos=({:.2}, {:.2}, {:.2})",
            object.name, position.x, position.y, position.z
        );
    }
}

#[derive(Debug)]
struct CliOptions {
    path: String,
    frames: u32,
    config: Option<String>,
    save: Option<String>,
    summary_only: bool,
}

impl CliOptions {
    fn parse(mut args: impl Iterator<Item = String>) -> Result<Self> {
        let mut options = Self {
            path: args.next().ok_or_else(|| anyhow!(USAGE))?,
            frames: 60,
            config: None,
            save: None,
            summary_only: false,
        };
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--frames" => {
                    let value = args.next().ok_or_else(|| anyhow!("--frames needs a count"))?;
                    options.frames = value
                        .parse()
                        .with_context(|| format!("invalid frame count {value}"))?;
                }
                "--config" => {
                    options.config =
                        Some(args.next().ok_or_else(|| anyhow!("--config needs a path"))?);
                }
                "--save" => {
                    options.save = Some(args.next().ok_or_else(|| anyhow!("--save needs a path"))?);
                }
                "--summary-only" => options.summary_only = true,
                other => return Err(anyhow!("Unknown argument: {other}. {USAGE}")),
            }
        }
        Ok(options)
    }
}

#[cfg(feature = "gpu")]
mod window {
    use std::any::Any;
    use std::fmt;
    use std::panic::{self, AssertUnwindSafe};
    use std::sync::Arc;
    use std::time::Instant;

    use anyhow::Result;
    use glam::Vec2;
    use log::info;
    use pollster::block_on;
    use winit::dpi::LogicalSize;
    use winit::event::{ElementState, Event, MouseButton as WinitMouseButton, WindowEvent};
    use winit::event_loop::EventLoop;
    use winit::keyboard::{KeyCode as WinitKey, PhysicalKey};
    use winit::platform::run_on_demand::EventLoopExtRunOnDemand;
    use winit::window::WindowBuilder;

    use ember_engine::render::gpu::GpuBackend;
    use ember_engine::{
        Application, EngineConfig, EngineContext, KeyCode, MouseButton, NamedKey, RenderError,
    };

    use super::{finish, load_scene, CliOptions};

    pub fn run_interactive(options: &CliOptions, config: EngineConfig) -> Result<()> {
        let default_hook = panic::take_hook();
        panic::set_hook(Box::new(|_| {}));
        let event_loop = panic::catch_unwind(AssertUnwindSafe(EventLoop::new));
        panic::set_hook(default_hook);
        let mut event_loop = event_loop
            .map_err(|panic| WindowInitError::from_panic("event loop", panic))?
            .map_err(|err| WindowInitError::from_error("event loop", err))?;

        let window = Arc::new(
            WindowBuilder::new()
                .with_title("Ember")
                .with_inner_size(LogicalSize::new(
                    config.viewport.width as f64,
                    config.viewport.height as f64,
                ))
                .build(&event_loop)
                .map_err(|err| WindowInitError::from_error("window", err))?,
        );
        let backend = block_on(GpuBackend::new(Arc::clone(&window)))
            .map_err(|err| WindowInitError::from_error("renderer", err))?;

        let context = EngineContext::new(config)?;
        let mut app = Application::new(context, backend);
        load_scene(&mut app, &options.path)?;

        let input = Arc::clone(&app.context().input);
        let window_id = window.id();
        let frame_limit = options.frames;
        let mut last_frame = Instant::now();
        let mut failure: Option<anyhow::Error> = None;

        event_loop.run_on_demand(|event, target| match event {
            Event::WindowEvent { window_id: id, event } if id == window_id => match event {
                WindowEvent::CloseRequested => target.exit(),
                WindowEvent::Resized(size) => {
                    app.renderer_mut().backend_mut().resize(size);
                    let viewport = &mut app.context_mut().config.viewport;
                    viewport.width = size.width.max(1);
                    viewport.height = size.height.max(1);
                }
                WindowEvent::KeyboardInput { event, .. } => {
                    let PhysicalKey::Code(code) = event.physical_key else {
                        return;
                    };
                    let Some(key) = map_keycode(code) else {
                        return;
                    };
                    match event.state {
                        ElementState::Pressed => input.set_key_down(key),
                        ElementState::Released => input.set_key_up(key),
                    }
                }
                WindowEvent::MouseInput { state, button, .. } => {
                    let index = match button {
                        WinitMouseButton::Left => 0,
                        WinitMouseButton::Right => 1,
                        WinitMouseButton::Middle => 2,
                        WinitMouseButton::Back => 3,
                        WinitMouseButton::Forward => 4,
                        WinitMouseButton::Other(value) => value.min(u8::MAX as u16) as u8,
                    };
                    let button = MouseButton::new(index);
                    match state {
                        ElementState::Pressed => input.set_mouse_button_down(button),
                        ElementState::Released => input.set_mouse_button_up(button),
                    }
                }
                WindowEvent::CursorMoved { position, .. } => {
                    input.set_mouse_position(Vec2::new(position.x as f32, position.y as f32));
                }
                WindowEvent::RedrawRequested => {
                    let now = Instant::now();
                    let dt = now.duration_since(last_frame).as_secs_f32();
                    last_frame = now;
                    match app.frame(dt) {
                        Ok(_) => {}
                        Err(RenderError::Target(reason)) => {
                            info!("skipping frame: {reason}");
                        }
                        Err(err) => {
                            failure = Some(err.into());
                            target.exit();
                        }
                    }
                    if frame_limit > 0 && app.frames() >= u64::from(frame_limit) {
                        target.exit();
                    }
                }
                _ => {}
            },
            Event::AboutToWait => window.request_redraw(),
            _ => {}
        })?;

        finish(&mut app, options)?;
        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    #[derive(Debug)]
    pub struct WindowInitError {
        message: String,
    }

    impl WindowInitError {
        fn from_panic(stage: &str, panic: Box<dyn Any + Send>) -> Self {
            Self {
                message: format!("failed to initialize {stage}: {}", panic_message(panic)),
            }
        }

        fn from_error(stage: &str, err: impl fmt::Display) -> Self {
            Self {
                message: format!("failed to initialize {stage}: {err}"),
            }
        }
    }

    impl fmt::Display for WindowInitError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(&self.message)
        }
    }

    impl std::error::Error for WindowInitError {}

    fn panic_message(panic: Box<dyn Any + Send>) -> String {
        match panic.downcast::<String>() {
            Ok(msg) => *msg,
            Err(panic) => match panic.downcast::<&'static str>() {
                Ok(msg) => (*msg).to_string(),
                Err(_) => "unknown panic".into(),
            },
        }
    }

    fn map_keycode(code: WinitKey) -> Option<KeyCode> {
        let letter = |c: char| Some(KeyCode::Character(c));
        match code {
            WinitKey::Space => Some(KeyCode::Named(NamedKey::Space)),
            WinitKey::Enter => Some(KeyCode::Named(NamedKey::Enter)),
            WinitKey::Tab => Some(KeyCode::Named(NamedKey::Tab)),
            WinitKey::ArrowLeft => Some(KeyCode::Named(NamedKey::Left)),
            WinitKey::ArrowRight => Some(KeyCode::Named(NamedKey::Right)),
            WinitKey::ArrowUp => Some(KeyCode::Named(NamedKey::Up)),
            WinitKey::ArrowDown => Some(KeyCode::Named(NamedKey::Down)),
            WinitKey::Escape => Some(KeyCode::Named(NamedKey::Escape)),
            WinitKey::Backspace => Some(KeyCode::Named(NamedKey::Backspace)),
            WinitKey::ShiftLeft => Some(KeyCode::Named(NamedKey::LeftShift)),
            WinitKey::ShiftRight => Some(KeyCode::Named(NamedKey::RightShift)),
            WinitKey::ControlLeft => Some(KeyCode::Named(NamedKey::LeftCtrl)),
            WinitKey::ControlRight => Some(KeyCode::Named(NamedKey::RightCtrl)),
            WinitKey::AltLeft => Some(KeyCode::Named(NamedKey::LeftAlt)),
            WinitKey::AltRight => Some(KeyCode::Named(NamedKey::RightAlt)),
            WinitKey::Digit0 => Some(KeyCode::Digit(0)),
            WinitKey::Digit1 => Some(KeyCode::Digit(1)),
            WinitKey::Digit2 => Some(KeyCode::Digit(2)),
            WinitKey::Digit3 => Some(KeyCode::Digit(3)),
            WinitKey::Digit4 => Some(KeyCode::Digit(4)),
            WinitKey::Digit5 => Some(KeyCode::Digit(5)),
            WinitKey::Digit6 => Some(KeyCode::Digit(6)),
            WinitKey::Digit7 => Some(KeyCode::Digit(7)),
            WinitKey::Digit8 => Some(KeyCode::Digit(8)),
            WinitKey::Digit9 => Some(KeyCode::Digit(9)),
            WinitKey::KeyA => letter('A'),
            WinitKey::KeyB => letter('B'),
            WinitKey::KeyC => letter('C'),
            WinitKey::KeyD => letter('D'),
            WinitKey::KeyE => letter('E'),
            WinitKey::KeyF => letter('F'),
            WinitKey::KeyG => letter('G'),
            WinitKey::KeyH => letter('H'),
            WinitKey::KeyI => letter('I'),
            WinitKey::KeyJ => letter('J'),
            WinitKey::KeyK => letter('K'),
            WinitKey::KeyL => letter('L'),
            WinitKey::KeyM => letter('M'),
            WinitKey::KeyN => letter('N'),
            WinitKey::KeyO => letter('O'),
            WinitKey::KeyP => letter('P'),
            WinitKey::KeyQ => letter('Q'),
            WinitKey::KeyR => letter('R'),
            WinitKey::KeyS => letter('S'),
            WinitKey::KeyT => letter('T'),
            WinitKey::KeyU => letter('U'),
            WinitKey::KeyV => letter('V'),
            WinitKey::KeyW => letter('W'),
            WinitKey::KeyX => letter('X'),
            WinitKey::KeyY => letter('Y'),
            WinitKey::KeyZ => letter('Z'),
            WinitKey::F1 => Some(KeyCode::Function(1)),
            WinitKey::F2 => Some(KeyCode::Function(2)),
            WinitKey::F3 => Some(KeyCode::Function(3)),
            WinitKey::F4 => Some(KeyCode::Function(4)),
            WinitKey::F5 => Some(KeyCode::Function(5)),
            WinitKey::F6 => Some(KeyCode::Function(6)),
            WinitKey::F7 => Some(KeyCode::Function(7)),
            WinitKey::F8 => Some(KeyCode::Function(8)),
            WinitKey::F9 => Some(KeyCode::Function(9)),
            WinitKey::F10 => Some(KeyCode::Function(10)),
            WinitKey::F11 => Some(KeyCode::Function(11)),
            WinitKey::F12 => Some(KeyCode::Function(12)),
            _ => None,
        }
    }
}
