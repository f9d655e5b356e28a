//! Cross-boundary object handles and their lifetime guard.
//!
//! Scripts never receive a pointer into the host. They receive a
//! [`ScriptObject`] userdata: the entity's identity plus the dispatch
//! epoch it was created under. The environment advances its epoch every
//! time the outermost dispatch unwinds back to host control, so a handle
//! smuggled past that point stops validating. When the host tracks
//! liveness for an object kind itself, its probe takes precedence over
//! the epoch fallback.

use std::cell::RefCell;
use std::rc::Rc;

use mlua::{MetaMethod, UserData, UserDataMethods};

use aldera_events::{ObjectRef, TypeTag};

use crate::env::EnvState;
use crate::marshal::LuaGuid;

/// Script-visible wrapper around one world object.
pub struct ScriptObject {
    pub obj: ObjectRef,
    /// Dispatch epoch this handle was created under.
    pub epoch: u64,
}

impl ScriptObject {
    pub fn new(obj: ObjectRef, epoch: u64) -> Self {
        Self { obj, epoch }
    }

    /// Whether the handle may still be dereferenced.
    pub fn is_valid(&self, state: &EnvState) -> bool {
        if let Some(probe) = &state.liveness {
            if let Some(alive) = probe.is_live(&self.obj) {
                return alive;
            }
        }
        self.epoch == state.epoch
    }

    /// Rejects access through a handle that outlived its dispatch.
    pub fn check_access(&self, state: &EnvState) -> mlua::Result<()> {
        if self.is_valid(state) {
            Ok(())
        } else {
            Err(mlua::Error::RuntimeError(format!(
                "attempt to use a stale {} reference; the object may no longer exist",
                self.obj.tag.exposed()
            )))
        }
    }

    /// The wrapper type scripts see this handle as.
    pub fn exposed_tag(&self) -> TypeTag {
        self.obj.tag.exposed()
    }
}

fn with_state<R>(lua: &mlua::Lua, f: impl FnOnce(&EnvState) -> R) -> mlua::Result<R> {
    let state = lua
        .app_data_ref::<Rc<RefCell<EnvState>>>()
        .ok_or_else(|| mlua::Error::RuntimeError("scripting environment state missing".into()))?;
    let guard = state.borrow();
    Ok(f(&guard))
}

impl UserData for ScriptObject {
    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        methods.add_method("IsValid", |lua, this, ()| {
            with_state(lua, |state| this.is_valid(state))
        });

        methods.add_method("GetObjectType", |_, this, ()| {
            Ok(this.exposed_tag().to_string())
        });

        methods.add_method("GetGUID", |lua, this, ()| {
            with_state(lua, |state| this.check_access(state))??;
            Ok(LuaGuid(this.obj.guid))
        });

        methods.add_method("GetEntry", |lua, this, ()| {
            with_state(lua, |state| this.check_access(state))??;
            Ok(this.obj.entry)
        });

        methods.add_method("GetMapId", |lua, this, ()| {
            with_state(lua, |state| this.check_access(state))??;
            Ok(this.obj.map_id)
        });

        methods.add_method("GetInstanceId", |lua, this, ()| {
            with_state(lua, |state| this.check_access(state))??;
            Ok(this.obj.instance_id)
        });

        methods.add_meta_method(MetaMethod::ToString, |_, this, ()| {
            Ok(format!("{} ({})", this.exposed_tag(), this.obj.guid))
        });
    }
}
