//! Event binding registries.
//!
//! A [`Bindings`] maps one key shape to ordered callback lists. Callables
//! are retained through the Lua registry for as long as they stay
//! registered, so the interpreter cannot collect them from under a
//! pending dispatch. Every environment owns one [`BindStores`] holding
//! one registry per registration type; nothing here is process-global.

use std::collections::HashMap;
use std::fmt;

use mlua::{Function, Lua, RegistryKey};
use tracing::warn;

use aldera_events::{
    BindingKey, CommandEvent, CreatureEvent, EntryKey, EventKey, GameObjectEvent, GossipEvent,
    GroupEvent, GuildEvent, InstanceEvent, ItemEvent, PlayerEvent, RegisterType, StringKey,
    UniqueKey, WorldEvent,
};

/// Handle to one registration, used for cancellation.
///
/// Ids are monotonic per store and never reused while the owning
/// environment is alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindingId(u64);

impl fmt::Display for BindingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

struct Binding {
    id: BindingId,
    func: RegistryKey,
    /// Remaining invocations; 0 means unlimited.
    remaining: u32,
}

/// Ordered callback registry for one key shape.
pub struct Bindings<K> {
    entries: HashMap<K, Vec<Binding>>,
    next_id: u64,
}

impl<K: BindingKey> Bindings<K> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            next_id: 1,
        }
    }

    /// Appends a registration for `key` and retains the callable.
    pub fn insert(
        &mut self,
        lua: &Lua,
        key: K,
        func: Function,
        shots: u32,
    ) -> mlua::Result<BindingId> {
        let func = lua.create_registry_value(func)?;
        let id = BindingId(self.next_id);
        self.next_id += 1;
        self.entries.entry(key).or_default().push(Binding {
            id,
            func,
            remaining: shots,
        });
        Ok(id)
    }

    /// Removes the registration with `id` wherever it is.
    ///
    /// Idempotent: removing an id twice, or an id that was auto-removed
    /// after its last shot, is a no-op.
    pub fn remove(&mut self, id: BindingId) -> bool {
        let mut removed = false;
        self.entries.retain(|_, list| {
            let before = list.len();
            list.retain(|b| b.id != id);
            removed |= list.len() != before;
            !list.is_empty()
        });
        removed
    }

    /// Cheap existence check, used to gate argument marshaling.
    pub fn has_bindings(&self, key: &K) -> bool {
        self.entries.get(key).is_some_and(|list| !list.is_empty())
    }

    /// Drops every registration for `key`.
    pub fn clear(&mut self, key: &K) {
        self.entries.remove(key);
    }

    /// Drops every registration, keeping the id counter running so ids
    /// are never reused within one environment.
    pub fn clear_all(&mut self) {
        self.entries.clear();
    }

    /// Drops every registration whose key matches `pred`.
    pub fn clear_matching(&mut self, pred: impl Fn(&K) -> bool) {
        self.entries.retain(|key, _| !pred(key));
    }

    /// Resolves the current registrations for `key`, in insertion order.
    ///
    /// Dispatch iterates this snapshot, so a callback cancelling itself
    /// or a neighbour mid-dispatch neither skips nor double-invokes the
    /// remaining entries of the batch.
    pub fn snapshot(&self, lua: &Lua, key: &K) -> Vec<(BindingId, Function)> {
        let Some(list) = self.entries.get(key) else {
            return Vec::new();
        };
        list.iter()
            .filter_map(|b| match lua.registry_value::<Function>(&b.func) {
                Ok(f) => Some((b.id, f)),
                Err(err) => {
                    warn!(target: "scripting", "Dropping unresolvable callback for binding {}: {err}", b.id);
                    None
                }
            })
            .collect()
    }

    /// Burns one shot after a successful invocation; a finite count
    /// hitting zero removes the registration.
    pub fn note_success(&mut self, key: &K, id: BindingId) {
        let Some(list) = self.entries.get_mut(key) else {
            return;
        };
        if let Some(pos) = list.iter().position(|b| b.id == id) {
            if list[pos].remaining > 0 {
                list[pos].remaining -= 1;
                if list[pos].remaining == 0 {
                    list.remove(pos);
                }
            }
        }
        if list.is_empty() {
            self.entries.remove(key);
        }
    }
}

impl<K: BindingKey> Default for Bindings<K> {
    fn default() -> Self {
        Self::new()
    }
}

/// The per-environment collection of binding registries, one per
/// registration type.
pub struct BindStores {
    pub world: Bindings<EventKey<WorldEvent>>,
    pub player: Bindings<EventKey<PlayerEvent>>,
    pub guild: Bindings<EventKey<GuildEvent>>,
    pub group: Bindings<EventKey<GroupEvent>>,
    pub creature: Bindings<EntryKey<CreatureEvent>>,
    pub creature_unique: Bindings<UniqueKey<CreatureEvent>>,
    pub creature_gossip: Bindings<EntryKey<GossipEvent>>,
    pub gameobject: Bindings<EntryKey<GameObjectEvent>>,
    pub gameobject_gossip: Bindings<EntryKey<GossipEvent>>,
    pub item: Bindings<EntryKey<ItemEvent>>,
    pub item_gossip: Bindings<EntryKey<GossipEvent>>,
    pub player_gossip: Bindings<EntryKey<GossipEvent>>,
    pub map: Bindings<EntryKey<InstanceEvent>>,
    pub instance: Bindings<EntryKey<InstanceEvent>>,
    pub command: Bindings<StringKey<CommandEvent>>,
}

impl BindStores {
    pub fn new() -> Self {
        Self {
            world: Bindings::new(),
            player: Bindings::new(),
            guild: Bindings::new(),
            group: Bindings::new(),
            creature: Bindings::new(),
            creature_unique: Bindings::new(),
            creature_gossip: Bindings::new(),
            gameobject: Bindings::new(),
            gameobject_gossip: Bindings::new(),
            item: Bindings::new(),
            item_gossip: Bindings::new(),
            player_gossip: Bindings::new(),
            map: Bindings::new(),
            instance: Bindings::new(),
            command: Bindings::new(),
        }
    }

    /// Removes one registration by id from the store owning it.
    pub fn remove_by_id(&mut self, regtype: RegisterType, id: BindingId) -> bool {
        match regtype {
            RegisterType::World => self.world.remove(id),
            RegisterType::Player => self.player.remove(id),
            RegisterType::Guild => self.guild.remove(id),
            RegisterType::Group => self.group.remove(id),
            RegisterType::Creature => self.creature.remove(id),
            RegisterType::CreatureUnique => self.creature_unique.remove(id),
            RegisterType::CreatureGossip => self.creature_gossip.remove(id),
            RegisterType::GameObject => self.gameobject.remove(id),
            RegisterType::GameObjectGossip => self.gameobject_gossip.remove(id),
            RegisterType::Item => self.item.remove(id),
            RegisterType::ItemGossip => self.item_gossip.remove(id),
            RegisterType::PlayerGossip => self.player_gossip.remove(id),
            RegisterType::Map => self.map.remove(id),
            RegisterType::Instance => self.instance.remove(id),
            RegisterType::Command => self.command.remove(id),
        }
    }

    /// Drops every binding scoped to `instance_id`.
    pub fn clear_instance(&mut self, instance_id: u32) {
        self.creature_unique
            .clear_matching(|key| key.instance_id == instance_id);
    }

    /// Empties every store without restarting the id counters.
    pub fn clear_all(&mut self) {
        self.world.clear_all();
        self.player.clear_all();
        self.guild.clear_all();
        self.group.clear_all();
        self.creature.clear_all();
        self.creature_unique.clear_all();
        self.creature_gossip.clear_all();
        self.gameobject.clear_all();
        self.gameobject_gossip.clear_all();
        self.item.clear_all();
        self.item_gossip.clear_all();
        self.player_gossip.clear_all();
        self.map.clear_all();
        self.instance.clear_all();
        self.command.clear_all();
    }
}

impl Default for BindStores {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mlua::Lua;

    fn noop(lua: &Lua) -> Function {
        lua.create_function(|_, ()| Ok(())).unwrap()
    }

    #[test]
    fn insert_returns_distinct_ids() {
        let lua = Lua::new();
        let mut bindings = Bindings::new();
        let key = EventKey::new(PlayerEvent::Login);

        let a = bindings.insert(&lua, key, noop(&lua), 0).unwrap();
        let b = bindings.insert(&lua, key, noop(&lua), 0).unwrap();
        assert_ne!(a, b);
        assert!(bindings.has_bindings(&key));
        assert_eq!(bindings.snapshot(&lua, &key).len(), 2);
    }

    #[test]
    fn remove_is_idempotent() {
        let lua = Lua::new();
        let mut bindings = Bindings::new();
        let key = EventKey::new(PlayerEvent::Login);

        let id = bindings.insert(&lua, key, noop(&lua), 0).unwrap();
        assert!(bindings.remove(id));
        assert!(!bindings.remove(id));
        assert!(!bindings.has_bindings(&key));
    }

    #[test]
    fn finite_shots_are_removed_at_zero() {
        let lua = Lua::new();
        let mut bindings = Bindings::new();
        let key = EventKey::new(PlayerEvent::Login);

        let id = bindings.insert(&lua, key, noop(&lua), 2).unwrap();
        bindings.note_success(&key, id);
        assert!(bindings.has_bindings(&key));
        bindings.note_success(&key, id);
        assert!(!bindings.has_bindings(&key));
        // Burning a shot on a removed binding is a no-op.
        bindings.note_success(&key, id);
    }

    #[test]
    fn unlimited_shots_survive_success() {
        let lua = Lua::new();
        let mut bindings = Bindings::new();
        let key = EventKey::new(PlayerEvent::Login);

        let id = bindings.insert(&lua, key, noop(&lua), 0).unwrap();
        for _ in 0..10 {
            bindings.note_success(&key, id);
        }
        assert!(bindings.has_bindings(&key));
    }

    #[test]
    fn clear_drops_every_registration_for_a_key() {
        let lua = Lua::new();
        let mut bindings = Bindings::new();
        let key = EventKey::new(PlayerEvent::Login);
        let other = EventKey::new(PlayerEvent::Logout);

        bindings.insert(&lua, key, noop(&lua), 0).unwrap();
        bindings.insert(&lua, key, noop(&lua), 0).unwrap();
        bindings.insert(&lua, other, noop(&lua), 0).unwrap();

        bindings.clear(&key);
        assert!(!bindings.has_bindings(&key));
        assert!(bindings.has_bindings(&other));
    }

    #[test]
    fn clear_instance_only_touches_matching_keys() {
        let lua = Lua::new();
        let mut stores = BindStores::new();
        let guid = aldera_events::Guid(7);

        let in_instance = UniqueKey::new(CreatureEvent::Died, guid, 42);
        let elsewhere = UniqueKey::new(CreatureEvent::Died, guid, 43);
        stores
            .creature_unique
            .insert(&lua, in_instance, noop(&lua), 0)
            .unwrap();
        stores
            .creature_unique
            .insert(&lua, elsewhere, noop(&lua), 0)
            .unwrap();

        stores.clear_instance(42);
        assert!(!stores.creature_unique.has_bindings(&in_instance));
        assert!(stores.creature_unique.has_bindings(&elsewhere));
    }
}
