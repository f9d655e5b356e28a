//! The native functions installed into every interpreter.
//!
//! One register global per registration type, all funneling into
//! [`register_binding`]; each returns a cancellation closure that is
//! idempotent and safe to call mid-dispatch. The timed-event and
//! instance-data globals round out the script-visible core API.

use std::cell::RefCell;
use std::rc::Rc;

use mlua::{Function, Lua, MultiValue, Value};
use tracing::{debug, error};

use aldera_events::{
    CommandEvent, CreatureEvent, EntryKey, EventKey, GameObjectEvent, GossipEvent, GroupEvent,
    GuildEvent, HookEvent, InstanceEvent, ItemEvent, PlayerEvent, RegisterType, StringKey,
    TemplateKind, UniqueKey, WorldEvent,
};

use crate::bindings::{BindStores, BindingId, Bindings};
use crate::env::{EnvState, RegisterSpec};
use crate::error::RegisterError;
use crate::marshal;
use crate::timers::TimerId;

type Sel<K> = fn(&mut BindStores) -> &mut Bindings<K>;
type State = Rc<RefCell<EnvState>>;

fn internal(err: mlua::Error) -> RegisterError {
    RegisterError::Internal(err.to_string())
}

fn reject(err: RegisterError) -> mlua::Error {
    error!(target: "scripting", "Rejected registration: {err}");
    mlua::Error::external(err)
}

/// Builds the script-visible cancellation closure for one binding.
fn make_cancel(
    lua: &Lua,
    state: &State,
    regtype: RegisterType,
    id: BindingId,
) -> Result<Function, RegisterError> {
    let state = Rc::clone(state);
    lua.create_function(move |_, ()| {
        let removed = state.borrow_mut().stores.remove_by_id(regtype, id);
        if !removed {
            debug!(target: "scripting", "Cancellation of binding {id} ignored; already removed");
        }
        Ok(())
    })
    .map_err(internal)
}

fn require_template(state: &State, kind: TemplateKind, entry: u32) -> Result<(), RegisterError> {
    if state.borrow().templates.has_template(kind, entry) {
        Ok(())
    } else {
        Err(RegisterError::MissingTemplate { kind, entry })
    }
}

fn insert_basic<E: HookEvent>(
    lua: &Lua,
    state: &State,
    spec: &RegisterSpec,
    func: Function,
    sel: Sel<EventKey<E>>,
) -> Result<Function, RegisterError> {
    let Some(event) = E::from_id(spec.event) else {
        return Err(RegisterError::UnknownEvent {
            regtype: spec.regtype,
            event: spec.event,
        });
    };
    let key = EventKey::new(event);
    let id = sel(&mut state.borrow_mut().stores)
        .insert(lua, key, func, spec.shots)
        .map_err(internal)?;
    make_cancel(lua, state, spec.regtype, id)
}

fn insert_entry<E: HookEvent>(
    lua: &Lua,
    state: &State,
    spec: &RegisterSpec,
    func: Function,
    sel: Sel<EntryKey<E>>,
) -> Result<Function, RegisterError> {
    let Some(event) = E::from_id(spec.event) else {
        return Err(RegisterError::UnknownEvent {
            regtype: spec.regtype,
            event: spec.event,
        });
    };
    let key = EntryKey::new(event, spec.entry);
    let id = sel(&mut state.borrow_mut().stores)
        .insert(lua, key, func, spec.shots)
        .map_err(internal)?;
    make_cancel(lua, state, spec.regtype, id)
}

fn insert_unique<E: HookEvent>(
    lua: &Lua,
    state: &State,
    spec: &RegisterSpec,
    func: Function,
    sel: Sel<UniqueKey<E>>,
) -> Result<Function, RegisterError> {
    let Some(event) = E::from_id(spec.event) else {
        return Err(RegisterError::UnknownEvent {
            regtype: spec.regtype,
            event: spec.event,
        });
    };
    let key = UniqueKey::new(event, spec.guid, spec.instance_id);
    let id = sel(&mut state.borrow_mut().stores)
        .insert(lua, key, func, spec.shots)
        .map_err(internal)?;
    make_cancel(lua, state, spec.regtype, id)
}

fn insert_string<E: HookEvent>(
    lua: &Lua,
    state: &State,
    spec: &RegisterSpec,
    qualifier: String,
    func: Function,
    sel: Sel<StringKey<E>>,
) -> Result<Function, RegisterError> {
    let Some(event) = E::from_id(spec.event) else {
        return Err(RegisterError::UnknownEvent {
            regtype: spec.regtype,
            event: spec.event,
        });
    };
    let key = StringKey::new(event, qualifier);
    let id = sel(&mut state.borrow_mut().stores)
        .insert(lua, key, func, spec.shots)
        .map_err(internal)?;
    make_cancel(lua, state, spec.regtype, id)
}

/// Validates and stores one registration.
///
/// A rejected registration drops the offered callable — releasing its
/// interpreter reference — and creates no binding.
pub(crate) fn register_binding(
    lua: &Lua,
    state: &State,
    spec: RegisterSpec,
    func: Function,
) -> Result<Function, RegisterError> {
    match spec.regtype {
        RegisterType::World => {
            insert_basic::<WorldEvent>(lua, state, &spec, func, |s| &mut s.world)
        }
        RegisterType::Player => {
            insert_basic::<PlayerEvent>(lua, state, &spec, func, |s| &mut s.player)
        }
        RegisterType::Guild => {
            insert_basic::<GuildEvent>(lua, state, &spec, func, |s| &mut s.guild)
        }
        RegisterType::Group => {
            insert_basic::<GroupEvent>(lua, state, &spec, func, |s| &mut s.group)
        }
        RegisterType::Creature => {
            require_template(state, TemplateKind::Creature, spec.entry)?;
            insert_entry::<CreatureEvent>(lua, state, &spec, func, |s| &mut s.creature)
        }
        RegisterType::CreatureUnique => {
            if spec.guid.is_empty() {
                return Err(RegisterError::EmptyGuid);
            }
            insert_unique::<CreatureEvent>(lua, state, &spec, func, |s| &mut s.creature_unique)
        }
        RegisterType::CreatureGossip => {
            require_template(state, TemplateKind::Creature, spec.entry)?;
            insert_entry::<GossipEvent>(lua, state, &spec, func, |s| &mut s.creature_gossip)
        }
        RegisterType::GameObject => {
            require_template(state, TemplateKind::GameObject, spec.entry)?;
            insert_entry::<GameObjectEvent>(lua, state, &spec, func, |s| &mut s.gameobject)
        }
        RegisterType::GameObjectGossip => {
            require_template(state, TemplateKind::GameObject, spec.entry)?;
            insert_entry::<GossipEvent>(lua, state, &spec, func, |s| &mut s.gameobject_gossip)
        }
        RegisterType::Item => {
            require_template(state, TemplateKind::Item, spec.entry)?;
            insert_entry::<ItemEvent>(lua, state, &spec, func, |s| &mut s.item)
        }
        RegisterType::ItemGossip => {
            require_template(state, TemplateKind::Item, spec.entry)?;
            insert_entry::<GossipEvent>(lua, state, &spec, func, |s| &mut s.item_gossip)
        }
        RegisterType::PlayerGossip => {
            insert_entry::<GossipEvent>(lua, state, &spec, func, |s| &mut s.player_gossip)
        }
        RegisterType::Map => {
            insert_entry::<InstanceEvent>(lua, state, &spec, func, |s| &mut s.map)
        }
        RegisterType::Instance => {
            insert_entry::<InstanceEvent>(lua, state, &spec, func, |s| &mut s.instance)
        }
        RegisterType::Command => {
            let qualifier = match spec.qualifier.as_deref() {
                Some(name) if !name.trim().is_empty() => name.trim().to_owned(),
                _ => return Err(RegisterError::MissingQualifier),
            };
            insert_string::<CommandEvent>(lua, state, &spec, qualifier, func, |s| &mut s.command)
        }
    }
}

fn install_basic(
    lua: &Lua,
    state: &State,
    name: &str,
    regtype: RegisterType,
) -> mlua::Result<()> {
    let state = Rc::clone(state);
    let func = lua.create_function(move |lua, vals: MultiValue| {
        let vals = vals.into_vec();
        let event = marshal::check_u32(&vals, 1)?;
        let callback = marshal::check_function(&vals, 2)?;
        let shots = marshal::opt_u32(&vals, 3, 0)?;
        register_binding(lua, &state, RegisterSpec::basic(regtype, event, shots), callback)
            .map_err(reject)
    })?;
    lua.globals().set(name, func)
}

fn install_entry(
    lua: &Lua,
    state: &State,
    name: &str,
    regtype: RegisterType,
) -> mlua::Result<()> {
    let state = Rc::clone(state);
    let func = lua.create_function(move |lua, vals: MultiValue| {
        let vals = vals.into_vec();
        let entry = marshal::check_u32(&vals, 1)?;
        let event = marshal::check_u32(&vals, 2)?;
        let callback = marshal::check_function(&vals, 3)?;
        let shots = marshal::opt_u32(&vals, 4, 0)?;
        register_binding(
            lua,
            &state,
            RegisterSpec::entry(regtype, entry, event, shots),
            callback,
        )
        .map_err(reject)
    })?;
    lua.globals().set(name, func)
}

fn install_unique(lua: &Lua, state: &State) -> mlua::Result<()> {
    let state = Rc::clone(state);
    let func = lua.create_function(move |lua, vals: MultiValue| {
        let vals = vals.into_vec();
        let guid = marshal::check_guid(&vals, 1)?;
        let instance_id = marshal::check_u32(&vals, 2)?;
        let event = marshal::check_u32(&vals, 3)?;
        let callback = marshal::check_function(&vals, 4)?;
        let shots = marshal::opt_u32(&vals, 5, 0)?;
        let spec = RegisterSpec::unique(guid, instance_id, event, shots);
        register_binding(lua, &state, spec, callback).map_err(reject)
    })?;
    lua.globals().set("RegisterUniqueCreatureEvent", func)
}

fn install_command(lua: &Lua, state: &State) -> mlua::Result<()> {
    let state = Rc::clone(state);
    let func = lua.create_function(move |lua, vals: MultiValue| {
        let vals = vals.into_vec();
        let name = marshal::check_str(&vals, 1)?;
        let callback = marshal::check_function(&vals, 2)?;
        let shots = marshal::opt_u32(&vals, 3, 0)?;
        register_binding(lua, &state, RegisterSpec::command(name, shots), callback)
            .map_err(reject)
    })?;
    lua.globals().set("RegisterCommand", func)
}

fn install_timed_events(lua: &Lua, state: &State) -> mlua::Result<()> {
    let schedule_state = Rc::clone(state);
    let schedule = lua.create_function(move |lua, vals: MultiValue| {
        let vals = vals.into_vec();
        let callback = marshal::check_function(&vals, 1)?;
        let delay = marshal::check_u32(&vals, 2)?;
        let repeats = marshal::opt_u32(&vals, 3, 1)?;
        let id = schedule_state
            .borrow_mut()
            .timers
            .schedule(lua, callback, delay, repeats)?;
        Ok(id.raw() as i64)
    })?;
    lua.globals().set("ScheduleTimedEvent", schedule)?;

    let cancel_state = Rc::clone(state);
    let cancel = lua.create_function(move |_, vals: MultiValue| {
        let vals = vals.into_vec();
        let id = marshal::check_u64(&vals, 1)?;
        Ok(cancel_state
            .borrow_mut()
            .timers
            .cancel(TimerId::from_raw(id)))
    })?;
    lua.globals().set("CancelTimedEvent", cancel)?;

    let cancel_all_state = Rc::clone(state);
    let cancel_all = lua.create_function(move |_, ()| {
        Ok(cancel_all_state.borrow_mut().timers.cancel_all())
    })?;
    lua.globals().set("CancelAllTimedEvents", cancel_all)
}

fn install_instance_data(lua: &Lua, state: &State) -> mlua::Result<()> {
    let create_state = Rc::clone(state);
    let create = lua.create_function(move |lua, vals: MultiValue| {
        let vals = vals.into_vec();
        let table = match vals.first() {
            Some(Value::Table(table)) => table.clone(),
            other => {
                return Err(marshal::arg_error(
                    1,
                    &format!(
                        "table expected, got {}",
                        other.map_or("no value", |v| v.type_name())
                    ),
                ))
            }
        };
        let mut st = create_state.borrow_mut();
        let key = st.map.data_key();
        st.instance_data.create(lua, key, table)
    })?;
    lua.globals().set("CreateInstanceData", create)?;

    let get_state = Rc::clone(state);
    let get = lua.create_function(move |lua, ()| {
        let st = get_state.borrow();
        let key = st.map.data_key();
        Ok(match st.instance_data.table(lua, key) {
            Some(table) => Value::Table(table),
            None => Value::Nil,
        })
    })?;
    lua.globals().set("GetInstanceData", get)?;

    let has_state = Rc::clone(state);
    let has = lua.create_function(move |_, ()| {
        let st = has_state.borrow();
        let key = st.map.data_key();
        Ok(st.instance_data.has(key))
    })?;
    lua.globals().set("HasInstanceData", has)
}

/// Installs the whole native bridge into a fresh interpreter.
pub(crate) fn install(lua: &Lua, state: &State) -> mlua::Result<()> {
    install_basic(lua, state, "RegisterWorldEvent", RegisterType::World)?;
    install_basic(lua, state, "RegisterPlayerEvent", RegisterType::Player)?;
    install_basic(lua, state, "RegisterGuildEvent", RegisterType::Guild)?;
    install_basic(lua, state, "RegisterGroupEvent", RegisterType::Group)?;
    install_entry(lua, state, "RegisterCreatureEvent", RegisterType::Creature)?;
    install_entry(lua, state, "RegisterCreatureGossipEvent", RegisterType::CreatureGossip)?;
    install_entry(lua, state, "RegisterGameObjectEvent", RegisterType::GameObject)?;
    install_entry(
        lua,
        state,
        "RegisterGameObjectGossipEvent",
        RegisterType::GameObjectGossip,
    )?;
    install_entry(lua, state, "RegisterItemEvent", RegisterType::Item)?;
    install_entry(lua, state, "RegisterItemGossipEvent", RegisterType::ItemGossip)?;
    install_entry(lua, state, "RegisterPlayerGossipEvent", RegisterType::PlayerGossip)?;
    install_entry(lua, state, "RegisterMapEvent", RegisterType::Map)?;
    install_entry(lua, state, "RegisterInstanceEvent", RegisterType::Instance)?;
    install_unique(lua, state)?;
    install_command(lua, state)?;
    install_timed_events(lua, state)?;
    install_instance_data(lua, state)
}
