//! Value marshaling between the host and the interpreter.
//!
//! Pushing is done through [`Args`], which builds the argument list for
//! one dispatch and resolves polymorphic entity references to their
//! most-derived script-visible wrapper. Reading is done through the
//! `check_*` functions; every numeric argument crosses the boundary as a
//! Lua number (an f64), so integer reads range-validate before
//! narrowing. A failed check aborts only the invocation it happened in —
//! the error is trapped at the protected-call boundary.

use mlua::{Function, Lua, MetaMethod, UserData, UserDataMethods, UserDataRef, Value};
use tracing::error;

use aldera_events::{Guid, ObjectRef, TypeTag, WorldEntity};

use crate::env::EnvState;
use crate::objects::ScriptObject;

/// Script-visible wrapper for a 64-bit object guid.
///
/// Guids do not round-trip through a Lua number without precision loss,
/// so they cross the boundary boxed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LuaGuid(pub Guid);

impl UserData for LuaGuid {
    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        methods.add_method("IsEmpty", |_, this, ()| Ok(this.0.is_empty()));
        methods.add_meta_method(MetaMethod::ToString, |_, this, ()| Ok(this.0.to_string()));
        methods.add_meta_method(MetaMethod::Eq, |_, this, other: UserDataRef<LuaGuid>| {
            Ok(this.0 == other.0)
        });
    }
}

/// Argument list under construction for one dispatch.
pub struct Args {
    lua: Lua,
    epoch: u64,
    values: Vec<Value>,
}

impl Args {
    pub(crate) fn new(lua: Lua, epoch: u64) -> Self {
        Self {
            lua,
            epoch,
            values: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn push_nil(&mut self) -> &mut Self {
        self.values.push(Value::Nil);
        self
    }

    pub fn push_bool(&mut self, v: bool) -> &mut Self {
        self.values.push(Value::Boolean(v));
        self
    }

    pub fn push_int(&mut self, v: i64) -> &mut Self {
        self.values.push(Value::Integer(v as mlua::Integer));
        self
    }

    pub fn push_uint(&mut self, v: u32) -> &mut Self {
        self.push_int(i64::from(v))
    }

    pub fn push_num(&mut self, v: f64) -> &mut Self {
        self.values.push(Value::Number(v));
        self
    }

    pub fn push_str(&mut self, v: &str) -> &mut Self {
        match self.lua.create_string(v) {
            Ok(s) => self.values.push(Value::String(s)),
            Err(err) => {
                error!(target: "scripting", "Failed to marshal string argument: {err}");
                self.values.push(Value::Nil);
            }
        }
        self
    }

    pub fn push_guid(&mut self, guid: Guid) -> &mut Self {
        match self.lua.create_userdata(LuaGuid(guid)) {
            Ok(ud) => self.values.push(Value::UserData(ud)),
            Err(err) => {
                error!(target: "scripting", "Failed to marshal guid argument: {err}");
                self.values.push(Value::Nil);
            }
        }
        self
    }

    /// Pushes a handle for `obj`, stamped with the current epoch.
    pub fn push_object(&mut self, obj: ObjectRef) -> &mut Self {
        match self.lua.create_userdata(ScriptObject::new(obj, self.epoch)) {
            Ok(ud) => self.values.push(Value::UserData(ud)),
            Err(err) => {
                error!(target: "scripting", "Failed to marshal {} handle: {err}", obj.tag);
                self.values.push(Value::Nil);
            }
        }
        self
    }

    /// Pushes an entity reference, or nil for an absent one.
    ///
    /// The concrete kind of the entity decides the wrapper scripts see;
    /// kinds without their own wrapper surface as the nearest recognized
    /// supertype.
    pub fn push_entity(&mut self, entity: Option<&dyn WorldEntity>) -> &mut Self {
        match entity {
            None => self.push_nil(),
            Some(e) => self.push_object(ObjectRef::of(e)),
        }
    }

    /// Escape hatch for values produced elsewhere, e.g. instance data
    /// tables.
    pub fn push_value(&mut self, value: Value) -> &mut Self {
        self.values.push(value);
        self
    }

    pub(crate) fn into_values(self) -> Vec<Value> {
        self.values
    }
}

fn type_name(value: Option<&Value>) -> &'static str {
    value.map_or("no value", |v| v.type_name())
}

/// Builds the uniform argument-level error.
pub fn arg_error(narg: usize, msg: &str) -> mlua::Error {
    mlua::Error::RuntimeError(format!("bad argument #{narg}: {msg}"))
}

pub fn check_f64(vals: &[Value], narg: usize) -> mlua::Result<f64> {
    match vals.get(narg - 1) {
        Some(Value::Integer(i)) => Ok(*i as f64),
        Some(Value::Number(n)) => Ok(*n),
        other => Err(arg_error(
            narg,
            &format!("number expected, got {}", type_name(other)),
        )),
    }
}

fn check_int_range(vals: &[Value], narg: usize, min: i64, max: i64) -> mlua::Result<i64> {
    let value = check_f64(vals, narg)?;
    if !value.is_finite() {
        return Err(arg_error(narg, "number must be finite"));
    }
    if value > max as f64 {
        return Err(arg_error(
            narg,
            &format!("value must be less than or equal to {max}"),
        ));
    }
    if value < min as f64 {
        return Err(arg_error(
            narg,
            &format!("value must be greater than or equal to {min}"),
        ));
    }
    Ok(value as i64)
}

pub fn check_i8(vals: &[Value], narg: usize) -> mlua::Result<i8> {
    check_int_range(vals, narg, i64::from(i8::MIN), i64::from(i8::MAX)).map(|v| v as i8)
}

pub fn check_u8(vals: &[Value], narg: usize) -> mlua::Result<u8> {
    check_int_range(vals, narg, 0, i64::from(u8::MAX)).map(|v| v as u8)
}

pub fn check_i16(vals: &[Value], narg: usize) -> mlua::Result<i16> {
    check_int_range(vals, narg, i64::from(i16::MIN), i64::from(i16::MAX)).map(|v| v as i16)
}

pub fn check_u16(vals: &[Value], narg: usize) -> mlua::Result<u16> {
    check_int_range(vals, narg, 0, i64::from(u16::MAX)).map(|v| v as u16)
}

pub fn check_i32(vals: &[Value], narg: usize) -> mlua::Result<i32> {
    check_int_range(vals, narg, i64::from(i32::MIN), i64::from(i32::MAX)).map(|v| v as i32)
}

pub fn check_u32(vals: &[Value], narg: usize) -> mlua::Result<u32> {
    check_int_range(vals, narg, 0, i64::from(u32::MAX)).map(|v| v as u32)
}

pub fn check_u64(vals: &[Value], narg: usize) -> mlua::Result<u64> {
    let value = check_f64(vals, narg)?;
    if !value.is_finite() {
        return Err(arg_error(narg, "number must be finite"));
    }
    if value < 0.0 {
        return Err(arg_error(narg, "value must be greater than or equal to 0"));
    }
    if value > u64::MAX as f64 {
        return Err(arg_error(
            narg,
            &format!("value must be less than or equal to {}", u64::MAX),
        ));
    }
    Ok(value as u64)
}

/// Plain Lua truthiness; never raises.
pub fn check_bool(vals: &[Value], narg: usize) -> bool {
    match vals.get(narg - 1) {
        None | Some(Value::Nil) | Some(Value::Boolean(false)) => false,
        _ => true,
    }
}

pub fn check_str(vals: &[Value], narg: usize) -> mlua::Result<String> {
    match vals.get(narg - 1) {
        Some(Value::String(s)) => Ok(s.to_string_lossy()),
        // Numbers coerce, as they do everywhere in Lua.
        Some(Value::Integer(i)) => Ok(i.to_string()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        other => Err(arg_error(
            narg,
            &format!("string expected, got {}", type_name(other)),
        )),
    }
}

pub fn check_function(vals: &[Value], narg: usize) -> mlua::Result<Function> {
    match vals.get(narg - 1) {
        Some(Value::Function(f)) => Ok(f.clone()),
        other => Err(arg_error(
            narg,
            &format!("function expected, got {}", type_name(other)),
        )),
    }
}

pub fn check_guid(vals: &[Value], narg: usize) -> mlua::Result<Guid> {
    match vals.get(narg - 1) {
        Some(Value::UserData(ud)) => {
            if let Ok(guid) = ud.borrow::<LuaGuid>() {
                return Ok(guid.0);
            }
            if let Ok(obj) = ud.borrow::<ScriptObject>() {
                return Ok(obj.obj.guid);
            }
            Err(arg_error(narg, "guid expected, got unrecognized userdata"))
        }
        Some(Value::Integer(_)) | Some(Value::Number(_)) => check_u64(vals, narg).map(Guid),
        other => Err(arg_error(
            narg,
            &format!("guid expected, got {}", type_name(other)),
        )),
    }
}

pub fn opt_u32(vals: &[Value], narg: usize, default: u32) -> mlua::Result<u32> {
    match vals.get(narg - 1) {
        None | Some(Value::Nil) => Ok(default),
        _ => check_u32(vals, narg),
    }
}

/// Reads an object handle, validating lifetime and the expected wrapper
/// kind.
///
/// The accepted kinds form a fixed chain from most specific to most
/// general: asking for a `Unit` accepts players and creatures, asking
/// for the root kind accepts any recognized handle.
pub fn check_object(
    state: &EnvState,
    vals: &[Value],
    narg: usize,
    expected: TypeTag,
) -> mlua::Result<ObjectRef> {
    match vals.get(narg - 1) {
        Some(Value::UserData(ud)) => {
            let handle = ud.borrow::<ScriptObject>().map_err(|_| {
                arg_error(narg, &format!("{expected} expected, got unrecognized userdata"))
            })?;
            handle.check_access(state)?;
            if handle.obj.tag.is_a(expected) {
                Ok(handle.obj)
            } else {
                Err(arg_error(
                    narg,
                    &format!("{expected} expected, got {}", handle.exposed_tag()),
                ))
            }
        }
        other => Err(arg_error(
            narg,
            &format!("{expected} expected, got {}", type_name(other)),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn u8_range_is_enforced() {
        let vals = vec![
            Value::Integer(0),
            Value::Integer(255),
            Value::Integer(256),
            Value::Number(-1.0),
        ];
        assert_eq!(check_u8(&vals, 1).unwrap(), 0);
        assert_eq!(check_u8(&vals, 2).unwrap(), 255);
        let too_big = check_u8(&vals, 3).unwrap_err().to_string();
        assert!(too_big.contains("less than or equal to 255"), "{too_big}");
        let negative = check_u8(&vals, 4).unwrap_err().to_string();
        assert!(negative.contains("greater than or equal to 0"), "{negative}");
    }

    #[test]
    fn non_finite_numbers_are_rejected() {
        let vals = vec![Value::Number(f64::NAN), Value::Number(f64::INFINITY)];
        assert!(check_u32(&vals, 1).is_err());
        assert!(check_u32(&vals, 2).is_err());
    }

    #[test]
    fn missing_argument_names_expectation() {
        let vals: Vec<Value> = Vec::new();
        let err = check_u32(&vals, 1).unwrap_err().to_string();
        assert!(err.contains("number expected, got no value"), "{err}");
    }

    #[test]
    fn booleans_use_lua_truthiness() {
        let vals = vec![Value::Boolean(true), Value::Nil, Value::Integer(0)];
        assert!(check_bool(&vals, 1));
        assert!(!check_bool(&vals, 2));
        // 0 is truthy in Lua.
        assert!(check_bool(&vals, 3));
        assert!(!check_bool(&vals, 4));
    }

    #[test]
    fn strings_coerce_from_numbers() {
        let vals = vec![Value::Integer(17)];
        assert_eq!(check_str(&vals, 1).unwrap(), "17");
    }

    mod object_checks {
        use super::*;
        use std::sync::Arc;

        use mlua::Lua;

        use aldera_events::{Guid, TemplateKind, TemplateProvider};

        use crate::bindings::BindStores;
        use crate::env::BoundMap;
        use crate::instance_data::InstanceDataStore;
        use crate::timers::TimerManager;

        struct NoTemplates;

        impl TemplateProvider for NoTemplates {
            fn has_template(&self, _kind: TemplateKind, _entry: u32) -> bool {
                false
            }
        }

        fn state() -> EnvState {
            EnvState {
                map: BoundMap::continent(0),
                stores: BindStores::new(),
                instance_data: InstanceDataStore::new(),
                timers: TimerManager::new(),
                event_level: 0,
                epoch: 3,
                templates: Arc::new(NoTemplates),
                liveness: None,
                traceback: false,
            }
        }

        fn handle(lua: &Lua, tag: TypeTag, epoch: u64) -> Value {
            let obj = ObjectRef {
                guid: Guid(1),
                tag,
                entry: 0,
                map_id: 0,
                instance_id: 0,
            };
            Value::UserData(lua.create_userdata(ScriptObject::new(obj, epoch)).unwrap())
        }

        #[test]
        fn widening_chain_accepts_subtypes() {
            let lua = Lua::new();
            let state = state();
            let vals = vec![handle(&lua, TypeTag::Player, 3)];

            assert!(check_object(&state, &vals, 1, TypeTag::Player).is_ok());
            assert!(check_object(&state, &vals, 1, TypeTag::Unit).is_ok());
            assert!(check_object(&state, &vals, 1, TypeTag::Object).is_ok());
        }

        #[test]
        fn mismatch_names_expected_and_actual() {
            let lua = Lua::new();
            let state = state();
            let vals = vec![handle(&lua, TypeTag::GameObject, 3)];

            let err = check_object(&state, &vals, 1, TypeTag::Unit)
                .unwrap_err()
                .to_string();
            assert!(err.contains("Unit expected, got GameObject"), "{err}");

            let err = check_object(&state, &vals, 2, TypeTag::Unit)
                .unwrap_err()
                .to_string();
            assert!(err.contains("Unit expected, got no value"), "{err}");
        }

        #[test]
        fn stale_epoch_is_rejected() {
            let lua = Lua::new();
            let state = state();
            let vals = vec![handle(&lua, TypeTag::Player, 2)];

            let err = check_object(&state, &vals, 1, TypeTag::Player)
                .unwrap_err()
                .to_string();
            assert!(err.contains("stale Player reference"), "{err}");
        }
    }
}
