use std::sync::Arc;

use glam::{Vec2, Vec3};
use log::info;
use mlua::{
    FromLua, IntoLua, Lua, MetaMethod, Result as LuaResult, Table, UserData, UserDataFields,
    UserDataMethods, Value, Variadic,
};
use parking_lot::Mutex;

use crate::game_object::GameObjectId;
use crate::input::InputState;
use crate::transform::Transform;

use super::{ScriptBridge, ScriptRequest};

/// What one script state is bound to.
#[derive(Clone)]
pub(super) struct ScriptContext {
    pub chunk: String,
    pub owner: GameObjectId,
    pub owner_name: String,
    pub transform: Arc<Mutex<Transform>>,
    pub input: Arc<InputState>,
    pub bridge: Arc<ScriptBridge>,
}

pub(super) fn register_globals(lua: &Lua, context: &ScriptContext) -> LuaResult<()> {
    register_print(lua, context.chunk.clone())?;
    register_datatypes(lua)?;
    register_self(lua, context)?;
    register_input(lua, context)?;
    register_scene(lua, context)?;
    Ok(())
}

fn register_print(lua: &Lua, chunk: String) -> LuaResult<()> {
    let print = lua.create_function(move |lua, values: Variadic<Value>| {
        let mut out = Vec::with_capacity(values.len());
        for value in values.iter() {
            let text = match value {
                Value::Nil => "nil".to_string(),
                Value::Boolean(b) => b.to_string(),
                Value::String(s) => s.to_str()?.to_string(),
                _ => match lua.coerce_string(value.clone())? {
                    Some(s) => s.to_str()?.to_string(),
                    None => format!("{value:?}"),
                },
            };
            out.push(text);
        }
        info!(target: "lua", "[{chunk}] {}", out.join("\t"));
        Ok(())
    })?;
    lua.globals().set("print", print)
}

fn register_datatypes(lua: &Lua) -> LuaResult<()> {
    let vector3 = lua.create_table()?;
    vector3.set(
        "new",
        lua.create_function(|_, (x, y, z): (Option<f32>, Option<f32>, Option<f32>)| {
            Ok(LuaVector3(Vec3::new(
                x.unwrap_or(0.0),
                y.unwrap_or(0.0),
                z.unwrap_or(0.0),
            )))
        })?,
    )?;
    lua.globals().set("Vector3", vector3)
}

/// `self` is a fresh table on every (re)load so it always names the current owner.
fn register_self(lua: &Lua, context: &ScriptContext) -> LuaResult<()> {
    let this = lua.create_table()?;
    this.set("name", context.owner_name.clone())?;
    this.set("id", context.owner.identity() as i64)?;
    lua.globals().set("self", this)?;
    lua.globals()
        .set("transform", LuaTransform(Arc::clone(&context.transform)))
}

fn register_input(lua: &Lua, context: &ScriptContext) -> LuaResult<()> {
    let table = lua.create_table()?;

    let input = Arc::clone(&context.input);
    table.set(
        "GetKeyDown",
        lua.create_function(move |_, name: String| Ok(input.is_down(&name)))?,
    )?;

    let input = Arc::clone(&context.input);
    table.set(
        "GetKeyPressed",
        lua.create_function(move |_, name: String| Ok(input.was_pressed(&name)))?,
    )?;

    let input = Arc::clone(&context.input);
    table.set(
        "GetKeyReleased",
        lua.create_function(move |_, name: String| Ok(input.was_released(&name)))?,
    )?;

    let input = Arc::clone(&context.input);
    table.set(
        "GetMousePosition",
        lua.create_function(move |lua, ()| LuaVec2(input.mouse_position()).into_lua(lua))?,
    )?;

    lua.globals().set("input", table)
}

fn register_scene(lua: &Lua, context: &ScriptContext) -> LuaResult<()> {
    let table = lua.create_table()?;

    let bridge = Arc::clone(&context.bridge);
    table.set(
        "find",
        lua.create_function(move |lua, name: String| {
            if bridge.find(&name).is_none() {
                return Ok(Value::Nil);
            }
            let object = SceneObjectRef {
                bridge: Arc::clone(&bridge),
                name,
            };
            Ok(Value::UserData(lua.create_userdata(object)?))
        })?,
    )?;

    let bridge = Arc::clone(&context.bridge);
    table.set(
        "spawn",
        lua.create_function(move |_, (name, position): (String, Option<LuaVector3>)| {
            bridge.request(ScriptRequest::Spawn {
                name,
                position: position.map(|p| p.0).unwrap_or(Vec3::ZERO),
            });
            Ok(())
        })?,
    )?;

    let bridge = Arc::clone(&context.bridge);
    table.set(
        "destroy",
        lua.create_function(move |_, name: String| {
            bridge.request(ScriptRequest::Destroy { name });
            Ok(())
        })?,
    )?;

    let bridge = Arc::clone(&context.bridge);
    table.set(
        "names",
        lua.create_function(move |lua, ()| {
            let names = bridge.names();
            let result = lua.create_table_with_capacity(names.len(), 0)?;
            for (index, name) in names.into_iter().enumerate() {
                result.set(index + 1, name)?;
            }
            Ok(result)
        })?,
    )?;

    lua.globals().set("scene", table)
}

/// Handle to another object. Reads come from the last directory snapshot; writes are deferred.
struct SceneObjectRef {
    bridge: Arc<ScriptBridge>,
    name: String,
}

impl UserData for SceneObjectRef {
    fn add_fields<'lua, F: UserDataFields<'lua, Self>>(fields: &mut F) {
        fields.add_field_method_get("name", |_, this| Ok(this.name.clone()));
        fields.add_field_method_get("position", |_, this| {
            Ok(this.bridge.find(&this.name).map(|entry| LuaVector3(entry.position)))
        });
        fields.add_field_method_set("position", |_, this, value: LuaVector3| {
            this.bridge.request(ScriptRequest::SetPosition {
                name: this.name.clone(),
                position: value.0,
            });
            Ok(())
        });
    }
}

/// The owner's transform, shared with the host for the duration of a call.
struct LuaTransform(Arc<Mutex<Transform>>);

impl UserData for LuaTransform {
    fn add_fields<'lua, F: UserDataFields<'lua, Self>>(fields: &mut F) {
        fields.add_field_method_get("position", |_, this| Ok(LuaVector3(this.0.lock().position)));
        fields.add_field_method_get("rotation", |_, this| {
            Ok(LuaVector3(this.0.lock().euler_angles))
        });
        fields.add_field_method_get("scale", |_, this| Ok(LuaVector3(this.0.lock().scale)));
        fields.add_field_method_set("position", |_, this, value: LuaVector3| {
            this.0.lock().position = value.0;
            Ok(())
        });
        fields.add_field_method_set("rotation", |_, this, value: LuaVector3| {
            this.0.lock().euler_angles = value.0;
            Ok(())
        });
        fields.add_field_method_set("scale", |_, this, value: LuaVector3| {
            this.0.lock().scale = value.0;
            Ok(())
        });
    }

    fn add_methods<'lua, M: UserDataMethods<'lua, Self>>(methods: &mut M) {
        methods.add_method("Translate", |_, this, delta: LuaVector3| {
            this.0.lock().position += delta.0;
            Ok(())
        });
        methods.add_method("Rotate", |_, this, delta: LuaVector3| {
            this.0.lock().euler_angles += delta.0;
            Ok(())
        });
    }
}

#[derive(Debug, Clone, Copy)]
pub(super) struct LuaVector3(pub Vec3);

impl UserData for LuaVector3 {
    fn add_fields<'lua, F: UserDataFields<'lua, Self>>(fields: &mut F) {
        fields.add_field_method_get("x", |_, this| Ok(this.0.x));
        fields.add_field_method_get("y", |_, this| Ok(this.0.y));
        fields.add_field_method_get("z", |_, this| Ok(this.0.z));
        fields.add_field_method_get("X", |_, this| Ok(this.0.x));
        fields.add_field_method_get("Y", |_, this| Ok(this.0.y));
        fields.add_field_method_get("Z", |_, this| Ok(this.0.z));
        fields.add_field_method_set("x", |_, this, value: f32| {
            this.0.x = value;
            Ok(())
        });
        fields.add_field_method_set("y", |_, this, value: f32| {
            this.0.y = value;
            Ok(())
        });
        fields.add_field_method_set("z", |_, this, value: f32| {
            this.0.z = value;
            Ok(())
        });
    }

    fn add_methods<'lua, M: UserDataMethods<'lua, Self>>(methods: &mut M) {
        methods.add_meta_method(MetaMethod::Add, |_, this, other: LuaVector3| {
            Ok(LuaVector3(this.0 + other.0))
        });
        methods.add_meta_method(MetaMethod::Sub, |_, this, other: LuaVector3| {
            Ok(LuaVector3(this.0 - other.0))
        });
        methods.add_meta_method(MetaMethod::Mul, |_, this, factor: f32| {
            Ok(LuaVector3(this.0 * factor))
        });
        methods.add_meta_method(MetaMethod::ToString, |_, this, ()| {
            Ok(format!("({}, {}, {})", this.0.x, this.0.y, this.0.z))
        });
        methods.add_method("Length", |_, this, ()| Ok(this.0.length()));
    }
}

impl<'lua> FromLua<'lua> for LuaVector3 {
    fn from_lua(value: Value<'lua>, _: &'lua Lua) -> LuaResult<Self> {
        match value {
            Value::Table(table) => Ok(Self(table_to_vec3(&table)?)),
            Value::UserData(ud) => ud.borrow::<LuaVector3>().map(|vec| *vec),
            _ => Err(mlua::Error::FromLuaConversionError {
                from: value.type_name(),
                to: "Vector3",
                message: Some("expected Vector3 userdata or table".into()),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct LuaVec2(Vec2);

impl<'lua> IntoLua<'lua> for LuaVec2 {
    fn into_lua(self, lua: &'lua Lua) -> LuaResult<Value<'lua>> {
        let table = lua.create_table()?;
        table.set("x", self.0.x)?;
        table.set("y", self.0.y)?;
        Ok(Value::Table(table))
    }
}

fn table_to_vec3(table: &Table) -> LuaResult<Vec3> {
    Ok(Vec3::new(
        table_component(table, "x", 1)?,
        table_component(table, "y", 2)?,
        table_component(table, "z", 3)?,
    ))
}

fn table_component(table: &Table, key: &str, index: i32) -> LuaResult<f32> {
    if let Ok(value) = table.get::<_, f32>(key) {
        return Ok(value);
    }
    table.get::<_, f32>(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::{KeyCode, NamedKey};
    use crate::scripting::DirectoryEntry;

    fn context() -> ScriptContext {
        ScriptContext {
            chunk: "test".into(),
            owner: GameObjectId::default(),
            owner_name: "Player".into(),
            transform: Arc::new(Mutex::new(Transform::default())),
            input: Arc::new(InputState::new()),
            bridge: Arc::new(ScriptBridge::new()),
        }
    }

    #[test]
    fn transform_proxy_reads_and_writes_owner_pose() {
        let lua = Lua::new();
        let context = context();
        register_globals(&lua, &context).unwrap();

        let name: String = lua
            .load(
                r#"
                transform.position = Vector3.new(1, 2, 3)
                transform:Translate({ x = 1, y = 0, z = 0 })
                transform.rotation = Vector3.new(0, 90, 0)
                return self.name
            "#,
            )
            .eval()
            .unwrap();

        assert_eq!(name, "Player");
        let transform = context.transform.lock();
        assert_eq!(transform.position, Vec3::new(2.0, 2.0, 3.0));
        assert_eq!(transform.euler_angles, Vec3::new(0.0, 90.0, 0.0));
    }

    #[test]
    fn scene_writes_are_deferred_requests() {
        let lua = Lua::new();
        let context = context();
        context.bridge.refresh(vec![DirectoryEntry {
            id: GameObjectId::default(),
            name: "Crate".into(),
            position: Vec3::new(0.0, 5.0, 0.0),
        }]);
        register_globals(&lua, &context).unwrap();

        let (y, count, missing): (f32, i64, bool) = lua
            .load(
                r#"
                local crate = scene.find("Crate")
                local y = crate.position.y
                crate.position = crate.position + Vector3.new(0, 1, 0)
                scene.spawn("Spark", Vector3.new(1, 1, 1))
                return y, #scene.names(), scene.find("Ghost") == nil
            "#,
            )
            .eval()
            .unwrap();

        assert_eq!(y, 5.0);
        assert_eq!(count, 1);
        assert!(missing);
        // Reads still see the snapshot until the scene applies the requests.
        assert_eq!(
            context.bridge.find("Crate").unwrap().position,
            Vec3::new(0.0, 5.0, 0.0)
        );
        let requests = context.bridge.take_requests();
        assert_eq!(
            requests,
            [
                ScriptRequest::SetPosition {
                    name: "Crate".into(),
                    position: Vec3::new(0.0, 6.0, 0.0),
                },
                ScriptRequest::Spawn {
                    name: "Spark".into(),
                    position: Vec3::ONE,
                },
            ]
        );
    }

    #[test]
    fn input_table_reports_levels_and_edges() {
        let lua = Lua::new();
        let context = context();
        context.input.set_key_down(KeyCode::Named(NamedKey::Space));
        register_globals(&lua, &context).unwrap();

        let check = || -> (bool, bool, bool) {
            lua.load(
                r#"return input.GetKeyDown("Space"), input.GetKeyPressed("Space"),
                          input.GetKeyDown("Unknown")"#,
            )
            .eval()
            .unwrap()
        };
        assert_eq!(check(), (true, true, false));
        context.input.end_frame();
        assert_eq!(check(), (true, false, false));
    }
}
