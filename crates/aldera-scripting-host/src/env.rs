//! The per-map scripting environment.
//!
//! Each world map (or map instance) the server activates owns one
//! [`ScriptEnv`]: its own interpreter, binding stores, instance data,
//! timers and async drain. Everything in here is driven by the single
//! thread updating that map; there is no locking and no cross-map
//! sharing.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::Arc;

use mlua::{Function, Lua, MultiValue, Table, Value};
use tracing::{debug, error, info};

use aldera_events::{Guid, LivenessProbe, RegisterType, TemplateProvider};

use crate::bindings::BindStores;
use crate::bridge;
use crate::config::ScriptingConfig;
use crate::error::RegisterError;
use crate::instance_data::{DataKey, InstanceController, InstanceDataStore};
use crate::loader::ScriptCache;
use crate::marshal::Args;
use crate::query::{QueryQueue, QueryTicket};
use crate::timers::TimerManager;

/// The map a scripting environment is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundMap {
    pub map_id: i32,
    pub instance_id: u32,
    pub instanceable: bool,
}

impl BoundMap {
    pub fn continent(map_id: i32) -> Self {
        Self {
            map_id,
            instance_id: 0,
            instanceable: false,
        }
    }

    pub fn instance(map_id: i32, instance_id: u32) -> Self {
        Self {
            map_id,
            instance_id,
            instanceable: true,
        }
    }

    pub(crate) fn data_key(self) -> DataKey {
        if self.instanceable {
            DataKey::Instance(self.instance_id)
        } else {
            DataKey::Continent(self.map_id)
        }
    }
}

/// Host collaborators wired into an environment at creation.
#[derive(Clone)]
pub struct HostContext {
    pub templates: Arc<dyn TemplateProvider>,
    /// Finer-grained liveness source for object handles, when the host
    /// has one.
    pub liveness: Option<Arc<dyn LivenessProbe>>,
}

/// One registration request, as accepted by [`ScriptEnv::register`].
#[derive(Debug, Clone)]
pub struct RegisterSpec {
    pub regtype: RegisterType,
    pub event: u32,
    pub entry: u32,
    pub guid: Guid,
    pub instance_id: u32,
    pub qualifier: Option<String>,
    /// Remaining-invocation budget; 0 = unlimited.
    pub shots: u32,
}

impl RegisterSpec {
    pub fn basic(regtype: RegisterType, event: u32, shots: u32) -> Self {
        Self {
            regtype,
            event,
            entry: 0,
            guid: Guid::default(),
            instance_id: 0,
            qualifier: None,
            shots,
        }
    }

    pub fn entry(regtype: RegisterType, entry: u32, event: u32, shots: u32) -> Self {
        Self {
            entry,
            ..Self::basic(regtype, event, shots)
        }
    }

    pub fn unique(guid: Guid, instance_id: u32, event: u32, shots: u32) -> Self {
        Self {
            guid,
            instance_id,
            ..Self::basic(RegisterType::CreatureUnique, event, shots)
        }
    }

    pub fn command(name: impl Into<String>, shots: u32) -> Self {
        Self {
            qualifier: Some(name.into()),
            ..Self::basic(
                RegisterType::Command,
                aldera_events::CommandEvent::Execute as u32,
                shots,
            )
        }
    }
}

/// Mutable environment state shared with the interpreter bridge.
///
/// Register/cancel closures and userdata methods reach this through the
/// interpreter's app data; everything runs on the owning map's thread,
/// so the `RefCell` is never contended, only re-entered — and never
/// held across a script call.
pub(crate) struct EnvState {
    pub map: BoundMap,
    pub stores: BindStores,
    pub instance_data: InstanceDataStore,
    pub timers: TimerManager,
    /// Nested dispatch depth; 0 means control is fully back in the host.
    pub event_level: u32,
    /// Advanced when `event_level` returns to 0; stale object handles
    /// stop validating.
    pub epoch: u64,
    pub templates: Arc<dyn TemplateProvider>,
    pub liveness: Option<Arc<dyn LivenessProbe>>,
    pub traceback: bool,
}

/// A map's scripting environment.
pub struct ScriptEnv {
    pub(crate) lua: Lua,
    pub(crate) state: Rc<RefCell<EnvState>>,
    cache: Arc<ScriptCache>,
    queries: QueryQueue,
    reload: bool,
}

impl ScriptEnv {
    /// Opens an interpreter for `map` and loads its script set.
    ///
    /// If the script cache has not finished its first scan the load is
    /// deferred: the environment comes up empty with a reload pending.
    pub fn new(
        map: BoundMap,
        cache: Arc<ScriptCache>,
        host: HostContext,
        config: &ScriptingConfig,
    ) -> mlua::Result<Self> {
        let state = Rc::new(RefCell::new(EnvState {
            map,
            stores: BindStores::new(),
            instance_data: InstanceDataStore::new(),
            timers: TimerManager::new(),
            event_level: 0,
            epoch: 0,
            templates: host.templates,
            liveness: host.liveness,
            traceback: config.traceback,
        }));
        let lua = Self::open_lua(&state)?;
        let mut env = Self {
            lua,
            state,
            cache,
            queries: QueryQueue::new(),
            reload: false,
        };
        if env.cache.is_ready() {
            env.run_scripts();
        } else {
            debug!(
                target: "scripting",
                "Script cache not ready; deferring load for map {}",
                map.map_id
            );
            env.reload = true;
        }
        Ok(env)
    }

    fn open_lua(state: &Rc<RefCell<EnvState>>) -> mlua::Result<Lua> {
        let lua = Lua::new();
        lua.set_app_data(Rc::clone(state));
        bridge::install(&lua, state)?;
        Ok(lua)
    }

    pub fn lua(&self) -> &Lua {
        &self.lua
    }

    pub fn map(&self) -> BoundMap {
        self.state.borrow().map
    }

    /// Current nested dispatch depth.
    pub fn event_level(&self) -> u32 {
        self.state.borrow().event_level
    }

    /// Async operations issued but not yet drained.
    pub fn pending_async(&self) -> usize {
        self.queries.outstanding()
    }

    /// Starts an argument list stamped with the current dispatch epoch.
    pub fn args(&self) -> Args {
        Args::new(self.lua.clone(), self.state.borrow().epoch)
    }

    /// Flags the environment for a reload; the reload itself happens on
    /// the next update once it is safe.
    pub fn request_reload(&mut self) {
        self.reload = true;
    }

    pub fn reload_pending(&self) -> bool {
        self.reload
    }

    /// Registers a callback per `spec`, returning the script-callable
    /// cancellation closure. On rejection the callable is released and
    /// no binding is created.
    pub fn register(&self, spec: RegisterSpec, func: Function) -> Result<Function, RegisterError> {
        bridge::register_binding(&self.lua, &self.state, spec, func).inspect_err(
            |err| error!(target: "scripting", "Rejected registration: {err}"),
        )
    }

    /// Registers one in-flight async host operation whose completion
    /// `handler` will receive on a later update.
    pub fn issue_query(&self, handler: Function) -> mlua::Result<QueryTicket> {
        let handler = self.lua.create_registry_value(handler)?;
        Ok(self.queries.issue(handler))
    }

    /// One update tick for this map's scripting.
    ///
    /// Performs a pending reload when the cache is ready, no dispatch is
    /// on the stack and no async work is outstanding; then advances
    /// timers and runs drained async completions.
    pub fn update(&mut self, diff: u32) {
        if self.reload
            && self.cache.is_ready()
            && self.queries.outstanding() == 0
            && self.state.borrow().event_level == 0
        {
            self.do_reload();
        }

        let fired = {
            let mut state = self.state.borrow_mut();
            state.timers.advance(&self.lua, diff)
        };
        for timer in fired {
            let mut args = self.args();
            args.push_int(timer.id.raw() as i64)
                .push_uint(timer.delay)
                .push_uint(timer.remaining);
            let call_args = MultiValue::from_vec(args.into_values());
            self.execute_call(&timer.func, call_args, 0);
            self.end_dispatch();
        }

        for completion in self.queries.drain() {
            let handler = match self.lua.registry_value::<Function>(&completion.handler) {
                Ok(handler) => handler,
                Err(err) => {
                    debug!(target: "scripting", "Dropping async completion with dead handler: {err}");
                    continue;
                }
            };
            let mut args = self.args();
            (completion.push)(&mut args);
            let call_args = MultiValue::from_vec(args.into_values());
            self.execute_call(&handler, call_args, 0);
            self.end_dispatch();
        }

        self.lua.expire_registry_values();
    }

    fn do_reload(&mut self) {
        let map = self.map();
        info!(
            target: "scripting",
            "Reloading scripts for map {} instance {}",
            map.map_id, map.instance_id
        );

        {
            let mut state = self.state.borrow_mut();
            let cancelled = state.timers.cancel_all();
            if cancelled > 0 {
                debug!(target: "scripting", "Cancelled {cancelled} timed event(s) for reload");
            }
            state.stores.clear_all();
            state.instance_data.clear();
            state.epoch += 1;
        }
        self.queries.cancel_pending();

        // Dropping the interpreter releases every callable and table
        // reference still held through its registry.
        match Self::open_lua(&self.state) {
            Ok(lua) => self.lua = lua,
            Err(err) => {
                error!(target: "scripting", "Failed to reopen interpreter: {err}");
                return;
            }
        }

        self.run_scripts();
        self.reload = false;
    }

    /// Loads this map's script set: global scripts plus scripts tagged
    /// for the map. A script that fails to compile or duplicates an
    /// already-loaded logical name is skipped; the rest of the batch
    /// still loads.
    pub fn run_scripts(&mut self) {
        let map_id = self.state.borrow().map.map_id;
        let units = self.cache.scripts_for(map_id);
        let mut loaded: HashMap<String, PathBuf> = HashMap::new();
        let mut count = 0usize;

        for unit in units {
            if let Some(prev) = loaded.get(&unit.name) {
                error!(
                    target: "scripting",
                    "Error loading `{}`: a script named `{}` was already loaded from `{}`, rename one of them",
                    unit.path.display(),
                    unit.name,
                    prev.display()
                );
                continue;
            }
            loaded.insert(unit.name.clone(), unit.path.clone());

            let func = match self
                .lua
                .load(&unit.source)
                .set_name(unit.name.as_str())
                .into_function()
            {
                Ok(func) => func,
                Err(err) => {
                    error!(
                        target: "scripting",
                        "Failed to compile `{}`: {err}",
                        unit.path.display()
                    );
                    continue;
                }
            };

            let (ok, _) = self.execute_call(&func, MultiValue::new(), 0);
            self.end_dispatch();
            if ok {
                debug!(target: "scripting", "Loaded `{}`", unit.path.display());
                count += 1;
            }
        }

        info!(
            target: "scripting",
            "Executed {count} script(s) for map {map_id}"
        );
    }

    // ===== Instance data =====

    pub fn has_instance_data(&self, key: DataKey) -> bool {
        self.state.borrow().instance_data.has(key)
    }

    /// Stores `table` as the instance data record for `key`, replacing
    /// and releasing any prior record.
    pub fn create_instance_data(&self, key: DataKey, table: Table) -> mlua::Result<()> {
        self.state
            .borrow_mut()
            .instance_data
            .create(&self.lua, key, table)
    }

    /// Pushes the controller's instance data table as the next argument.
    ///
    /// A missing record (the usual aftermath of a reload) first runs the
    /// controller's reload routine, which is expected to recreate and
    /// repopulate it.
    pub fn push_instance_data(&self, args: &mut Args, controller: &mut dyn InstanceController) {
        let key = controller.data_key();
        if !self.has_instance_data(key) {
            controller.reload(self);
        }
        let table = {
            let state = self.state.borrow();
            state.instance_data.table(&self.lua, key)
        };
        match table {
            Some(table) => {
                args.push_value(Value::Table(table));
            }
            None => {
                error!(
                    target: "scripting",
                    "Instance data for {key:?} still missing after controller reload"
                );
                args.push_nil();
            }
        }
    }

    /// Tears down everything scoped to one map instance: its data record
    /// and every binding addressed to it.
    pub fn free_instance(&self, instance_id: u32) {
        let mut state = self.state.borrow_mut();
        state.instance_data.free_instance(instance_id);
        state.stores.clear_instance(instance_id);
        debug!(target: "scripting", "Freed instance {instance_id}");
    }
}
