use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use mlua::{HookTriggers, Lua, Value};
use parking_lot::Mutex;

use crate::game_object::GameObjectId;
use crate::input::InputState;
use crate::transform::Transform;

use super::bindings::{register_globals, ScriptContext};
use super::ScriptBridge;

/// Lua instructions a single hook call may run before it is aborted.
const INSTRUCTION_BUDGET: u32 = 10_000_000;
const HOOK_INTERVAL: u32 = 1000;

/// One Lua state bound to one script component.
pub struct ScriptHost {
    lua: Lua,
    transform: Arc<Mutex<Transform>>,
    executed: Arc<AtomicU32>,
}

impl ScriptHost {
    /// Creates the state, binds the globals and runs the chunk once.
    pub fn new(
        chunk: &str,
        source: &str,
        owner: GameObjectId,
        owner_name: &str,
        input: &Arc<InputState>,
        bridge: &Arc<ScriptBridge>,
    ) -> mlua::Result<Self> {
        let lua = Lua::new();
        let executed = Arc::new(AtomicU32::new(0));
        let hook_counter = Arc::clone(&executed);
        lua.set_hook(
            HookTriggers {
                every_nth_instruction: Some(HOOK_INTERVAL),
                ..Default::default()
            },
            move |_, _| {
                let count = hook_counter.fetch_add(HOOK_INTERVAL, Ordering::Relaxed);
                if count >= INSTRUCTION_BUDGET {
                    Err(mlua::Error::RuntimeError(
                        "script exceeded its instruction budget".into(),
                    ))
                } else {
                    Ok(())
                }
            },
        );

        let transform = Arc::new(Mutex::new(Transform::default()));
        let context = ScriptContext {
            chunk: chunk.to_string(),
            owner,
            owner_name: owner_name.to_string(),
            transform: Arc::clone(&transform),
            input: Arc::clone(input),
            bridge: Arc::clone(bridge),
        };
        register_globals(&lua, &context)?;
        lua.load(source).set_name(chunk).exec()?;
        Ok(Self {
            lua,
            transform,
            executed,
        })
    }

    /// True if the script defines a global function called `name`.
    pub fn has_hook(&self, name: &str) -> bool {
        matches!(self.lua.globals().get::<_, Value>(name), Ok(Value::Function(_)))
    }

    /// Calls `OnUpdate(dt)` if the script defines it.
    pub fn update(&self, delta_time: f32, transform: &mut Transform) -> mlua::Result<()> {
        self.call(transform, "OnUpdate", delta_time)
    }

    /// Calls a collision hook with the other object's name.
    pub fn notify(&self, hook: &str, other: &str, transform: &mut Transform) -> mlua::Result<()> {
        self.call(transform, hook, other.to_string())
    }

    /// The owner pose is copied in for the call and back out afterwards, even when the call
    /// fails part-way.
    fn call<A>(&self, transform: &mut Transform, hook: &str, args: A) -> mlua::Result<()>
    where
        A: for<'lua> mlua::IntoLuaMulti<'lua>,
    {
        let function = match self.lua.globals().get::<_, Value>(hook)? {
            Value::Function(function) => function,
            _ => return Ok(()),
        };
        *self.transform.lock() = *transform;
        self.executed.store(0, Ordering::Relaxed);
        let result = function.call::<_, ()>(args);
        *transform = *self.transform.lock();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    fn host(source: &str) -> mlua::Result<ScriptHost> {
        ScriptHost::new(
            "test",
            source,
            GameObjectId::default(),
            "Mover",
            &Arc::new(InputState::new()),
            &Arc::new(ScriptBridge::new()),
        )
    }

    #[test]
    fn on_update_moves_owner() {
        let host = host(
            r#"
            function OnUpdate(dt)
                transform:Translate(Vector3.new(dt, 0, 0))
            end
        "#,
        )
        .unwrap();
        let mut transform = Transform::from_position(Vec3::new(1.0, 0.0, 0.0));
        host.update(0.5, &mut transform).unwrap();
        assert_eq!(transform.position, Vec3::new(1.5, 0.0, 0.0));
    }

    #[test]
    fn missing_hooks_are_skipped() {
        let host = host("local x = 1").unwrap();
        assert!(!host.has_hook("OnUpdate"));
        let mut transform = Transform::default();
        host.update(0.1, &mut transform).unwrap();
        host.notify("OnEnter", "Floor", &mut transform).unwrap();
    }

    #[test]
    fn syntax_and_runtime_errors_surface_as_results() {
        assert!(host("function OnUpdate(").is_err());
        let host = host("function OnUpdate(dt) error('boom') end").unwrap();
        let err = host.update(0.1, &mut Transform::default()).unwrap_err();
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn runaway_loops_are_aborted() {
        let host = host("function OnUpdate(dt) while true do end end").unwrap();
        let err = host.update(0.1, &mut Transform::default()).unwrap_err();
        assert!(err.to_string().contains("instruction budget"));
    }
}
