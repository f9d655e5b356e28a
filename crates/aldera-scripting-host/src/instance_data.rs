//! Persistent per-map script state.
//!
//! Scripted maps keep one Lua table alive across events: instanced maps
//! key it by instance id, continents by map id. The table is created by
//! script code (typically in an initialize or load event) and retained
//! through the Lua registry; exactly one table is live per key at a
//! time.

use std::collections::HashMap;

use mlua::{Lua, RegistryKey, Table};
use tracing::debug;

/// Identifies one instance data record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataKey {
    /// A non-instanced map ("continent").
    Continent(i32),
    /// One instance of an instanceable map.
    Instance(u32),
}

/// Registry references to the live instance data tables of one
/// environment.
pub struct InstanceDataStore {
    continents: HashMap<i32, RegistryKey>,
    instances: HashMap<u32, RegistryKey>,
}

impl InstanceDataStore {
    pub fn new() -> Self {
        Self {
            continents: HashMap::new(),
            instances: HashMap::new(),
        }
    }

    pub fn has(&self, key: DataKey) -> bool {
        match key {
            DataKey::Continent(map_id) => self.continents.contains_key(&map_id),
            DataKey::Instance(instance_id) => self.instances.contains_key(&instance_id),
        }
    }

    /// Stores the table reference for `key`, releasing any prior record.
    pub fn create(&mut self, lua: &Lua, key: DataKey, table: Table) -> mlua::Result<()> {
        let table_ref = lua.create_registry_value(table)?;
        let replaced = match key {
            DataKey::Continent(map_id) => self.continents.insert(map_id, table_ref),
            DataKey::Instance(instance_id) => self.instances.insert(instance_id, table_ref),
        };
        if replaced.is_some() {
            debug!(target: "scripting", "Replaced instance data for {key:?}");
        }
        Ok(())
    }

    pub fn table(&self, lua: &Lua, key: DataKey) -> Option<Table> {
        let table_ref = match key {
            DataKey::Continent(map_id) => self.continents.get(&map_id),
            DataKey::Instance(instance_id) => self.instances.get(&instance_id),
        }?;
        lua.registry_value::<Table>(table_ref).ok()
    }

    /// Releases the record for one torn-down instance.
    pub fn free_instance(&mut self, instance_id: u32) {
        self.instances.remove(&instance_id);
    }

    pub fn clear(&mut self) {
        self.continents.clear();
        self.instances.clear();
    }
}

impl Default for InstanceDataStore {
    fn default() -> Self {
        Self::new()
    }
}

/// The host-side controller of a scripted map, usually its AI object.
///
/// The controller exists as long as the map does, and knows how to
/// rebuild its instance data after a script reload dropped the table.
pub trait InstanceController {
    fn map_id(&self) -> i32;
    fn instance_id(&self) -> u32;
    fn instanceable(&self) -> bool;

    fn data_key(&self) -> DataKey {
        if self.instanceable() {
            DataKey::Instance(self.instance_id())
        } else {
            DataKey::Continent(self.map_id())
        }
    }

    /// Recreates and repopulates the instance data record, e.g. from the
    /// last known save state, firing the script-side initialize/load
    /// path.
    fn reload(&mut self, env: &crate::env::ScriptEnv);
}
