//! Representative hook entry points.
//!
//! The server raises events through thin call sites like these; every
//! one gates on the cheap existence check before marshaling anything,
//! then funnels into the dispatch core. The full hook surface lives
//! with the server's entity code; the set here covers each key shape
//! and result policy the core supports.

use mlua::Value;

use aldera_events::{
    CommandEvent, CreatureEvent, EntryKey, EventKey, GameObjectEvent, GossipEvent, InstanceEvent,
    ItemEvent, PlayerEvent, StringKey, UniqueKey, WorldEvent, WorldEntity,
};

use crate::env::ScriptEnv;
use crate::instance_data::InstanceController;

fn value_as_u32(value: Option<&Value>) -> Option<u32> {
    match value {
        Some(Value::Integer(i)) => u32::try_from(*i).ok(),
        Some(Value::Number(n)) if n.is_finite() && *n >= 0.0 && *n <= u32::MAX as f64 => {
            Some(*n as u32)
        }
        _ => None,
    }
}

impl ScriptEnv {
    // ===== World =====

    pub fn on_startup(&self) {
        let key = EventKey::new(WorldEvent::Startup);
        if !self.has_bindings(|s| &s.world, &key) {
            return;
        }
        self.call_all(|s| &mut s.world, &key, self.args());
    }

    pub fn on_shutdown(&self) {
        let key = EventKey::new(WorldEvent::Shutdown);
        if !self.has_bindings(|s| &s.world, &key) {
            return;
        }
        self.call_all(|s| &mut s.world, &key, self.args());
    }

    pub fn on_world_update(&self, diff: u32) {
        let key = EventKey::new(WorldEvent::Update);
        if !self.has_bindings(|s| &s.world, &key) {
            return;
        }
        let mut args = self.args();
        args.push_uint(diff);
        self.call_all(|s| &mut s.world, &key, args);
    }

    pub fn on_config_load(&self, reload: bool) {
        let key = EventKey::new(WorldEvent::ConfigLoad);
        if !self.has_bindings(|s| &s.world, &key) {
            return;
        }
        let mut args = self.args();
        args.push_bool(reload);
        self.call_all(|s| &mut s.world, &key, args);
    }

    pub fn on_game_event_start(&self, event_id: u32) {
        let key = EventKey::new(WorldEvent::GameEventStart);
        if !self.has_bindings(|s| &s.world, &key) {
            return;
        }
        let mut args = self.args();
        args.push_uint(event_id);
        self.call_all(|s| &mut s.world, &key, args);
    }

    // ===== Player =====

    pub fn on_player_login(&self, player: &dyn WorldEntity) {
        let key = EventKey::new(PlayerEvent::Login);
        if !self.has_bindings(|s| &s.player, &key) {
            return;
        }
        let mut args = self.args();
        args.push_entity(Some(player));
        self.call_all(|s| &mut s.player, &key, args);
    }

    pub fn on_player_logout(&self, player: &dyn WorldEntity) {
        let key = EventKey::new(PlayerEvent::Logout);
        if !self.has_bindings(|s| &s.player, &key) {
            return;
        }
        let mut args = self.args();
        args.push_entity(Some(player));
        self.call_all(|s| &mut s.player, &key, args);
    }

    pub fn on_player_level_change(&self, player: &dyn WorldEntity, old_level: u8) {
        let key = EventKey::new(PlayerEvent::LevelChange);
        if !self.has_bindings(|s| &s.player, &key) {
            return;
        }
        let mut args = self.args();
        args.push_entity(Some(player)).push_uint(u32::from(old_level));
        self.call_all(|s| &mut s.player, &key, args);
    }

    pub fn on_player_emote(&self, player: &dyn WorldEntity, emote: u32) {
        let key = EventKey::new(PlayerEvent::Emote);
        if !self.has_bindings(|s| &s.player, &key) {
            return;
        }
        let mut args = self.args();
        args.push_entity(Some(player)).push_uint(emote);
        self.call_all(|s| &mut s.player, &key, args);
    }

    /// Chat veto hook: delivery is allowed unless some handler returns
    /// an explicit `false`. This is the one family where the boolean
    /// rule is a veto, not an any-true.
    pub fn on_player_chat(
        &self,
        player: &dyn WorldEntity,
        chat_type: u32,
        lang: u32,
        msg: &str,
    ) -> bool {
        let key = EventKey::new(PlayerEvent::Chat);
        if !self.has_bindings(|s| &s.player, &key) {
            return true;
        }
        let mut args = self.args();
        args.push_entity(Some(player))
            .push_uint(chat_type)
            .push_uint(lang)
            .push_str(msg);
        let mut allow = true;
        self.call_all_with(|s| &mut s.player, &key, args, 1, &mut |_, results| {
            if matches!(results.first(), Some(Value::Boolean(false))) {
                allow = false;
            }
        });
        allow
    }

    /// Experience hook: handlers may return a replacement amount, which
    /// later handlers and the host then observe.
    pub fn on_player_give_xp(
        &self,
        player: &dyn WorldEntity,
        amount: &mut u32,
        victim: Option<&dyn WorldEntity>,
    ) {
        let key = EventKey::new(PlayerEvent::GiveXp);
        if !self.has_bindings(|s| &s.player, &key) {
            return;
        }
        let mut args = self.args();
        args.push_entity(Some(player))
            .push_uint(*amount)
            .push_entity(victim);
        let final_args = self.call_all_with(
            |s| &mut s.player,
            &key,
            args,
            1,
            &mut |shared, results| {
                if let Some(new_amount) = value_as_u32(results.first()) {
                    shared[2] = Value::Integer(new_amount as mlua::Integer);
                }
            },
        );
        if let Some(new_amount) = value_as_u32(final_args.get(2)) {
            *amount = new_amount;
        }
    }

    // ===== Creature =====

    pub fn on_creature_enter_combat(&self, creature: &dyn WorldEntity, target: &dyn WorldEntity) {
        let entry_key = EntryKey::new(CreatureEvent::EnterCombat, creature.entry());
        let unique_key = UniqueKey::new(
            CreatureEvent::EnterCombat,
            creature.guid(),
            creature.instance_id(),
        );
        if !self.has_bindings(|s| &s.creature, &entry_key)
            && !self.has_bindings(|s| &s.creature_unique, &unique_key)
        {
            return;
        }
        let mut args = self.args();
        args.push_entity(Some(creature)).push_entity(Some(target));
        self.call_all_dual(
            |s| &mut s.creature,
            &entry_key,
            |s| &mut s.creature_unique,
            &unique_key,
            args,
        );
    }

    pub fn on_creature_died(&self, creature: &dyn WorldEntity, killer: Option<&dyn WorldEntity>) {
        let entry_key = EntryKey::new(CreatureEvent::Died, creature.entry());
        let unique_key =
            UniqueKey::new(CreatureEvent::Died, creature.guid(), creature.instance_id());
        if !self.has_bindings(|s| &s.creature, &entry_key)
            && !self.has_bindings(|s| &s.creature_unique, &unique_key)
        {
            return;
        }
        let mut args = self.args();
        args.push_entity(Some(creature)).push_entity(killer);
        self.call_all_dual(
            |s| &mut s.creature,
            &entry_key,
            |s| &mut s.creature_unique,
            &unique_key,
            args,
        );
    }

    pub fn on_creature_spawn(&self, creature: &dyn WorldEntity) {
        let entry_key = EntryKey::new(CreatureEvent::Spawn, creature.entry());
        let unique_key =
            UniqueKey::new(CreatureEvent::Spawn, creature.guid(), creature.instance_id());
        if !self.has_bindings(|s| &s.creature, &entry_key)
            && !self.has_bindings(|s| &s.creature_unique, &unique_key)
        {
            return;
        }
        let mut args = self.args();
        args.push_entity(Some(creature));
        self.call_all_dual(
            |s| &mut s.creature,
            &entry_key,
            |s| &mut s.creature_unique,
            &unique_key,
            args,
        );
    }

    pub fn on_creature_ai_update(&self, creature: &dyn WorldEntity, diff: u32) {
        let entry_key = EntryKey::new(CreatureEvent::AiUpdate, creature.entry());
        let unique_key = UniqueKey::new(
            CreatureEvent::AiUpdate,
            creature.guid(),
            creature.instance_id(),
        );
        if !self.has_bindings(|s| &s.creature, &entry_key)
            && !self.has_bindings(|s| &s.creature_unique, &unique_key)
        {
            return;
        }
        let mut args = self.args();
        args.push_entity(Some(creature)).push_uint(diff);
        self.call_all_dual(
            |s| &mut s.creature,
            &entry_key,
            |s| &mut s.creature_unique,
            &unique_key,
            args,
        );
    }

    /// Damage hook with an out-argument: handlers returning a number
    /// replace the damage for the handlers after them and for the host.
    pub fn on_creature_damage_taken(
        &self,
        creature: &dyn WorldEntity,
        attacker: Option<&dyn WorldEntity>,
        damage: &mut u32,
    ) {
        let entry_key = EntryKey::new(CreatureEvent::DamageTaken, creature.entry());
        let unique_key = UniqueKey::new(
            CreatureEvent::DamageTaken,
            creature.guid(),
            creature.instance_id(),
        );
        if !self.has_bindings(|s| &s.creature, &entry_key)
            && !self.has_bindings(|s| &s.creature_unique, &unique_key)
        {
            return;
        }
        let mut args = self.args();
        args.push_entity(Some(creature))
            .push_entity(attacker)
            .push_uint(*damage);
        let final_args = self.call_all_dual_with(
            |s| &mut s.creature,
            &entry_key,
            |s| &mut s.creature_unique,
            &unique_key,
            args,
            1,
            &mut |shared, results| {
                if let Some(new_damage) = value_as_u32(results.first()) {
                    shared[3] = Value::Integer(new_damage as mlua::Integer);
                }
            },
        );
        if let Some(new_damage) = value_as_u32(final_args.get(3)) {
            *damage = new_damage;
        }
    }

    // ===== Game objects and items =====

    pub fn on_gameobject_use(&self, player: &dyn WorldEntity, gameobject: &dyn WorldEntity) -> bool {
        let key = EntryKey::new(GameObjectEvent::Use, gameobject.entry());
        if !self.has_bindings(|s| &s.gameobject, &key) {
            return false;
        }
        let mut args = self.args();
        args.push_entity(Some(player)).push_entity(Some(gameobject));
        self.call_all_bool(|s| &mut s.gameobject, &key, args, false)
    }

    pub fn on_item_use(&self, player: &dyn WorldEntity, item: &dyn WorldEntity) -> bool {
        let key = EntryKey::new(ItemEvent::Use, item.entry());
        if !self.has_bindings(|s| &s.item, &key) {
            return false;
        }
        let mut args = self.args();
        args.push_entity(Some(player)).push_entity(Some(item));
        self.call_all_bool(|s| &mut s.item, &key, args, false)
    }

    // ===== Gossip =====

    /// Returns whether any script took over the dialog.
    pub fn on_gossip_hello(&self, player: &dyn WorldEntity, creature: &dyn WorldEntity) -> bool {
        let key = EntryKey::new(GossipEvent::Hello, creature.entry());
        if !self.has_bindings(|s| &s.creature_gossip, &key) {
            return false;
        }
        let mut args = self.args();
        args.push_entity(Some(player)).push_entity(Some(creature));
        self.call_all_bool(|s| &mut s.creature_gossip, &key, args, false)
    }

    pub fn on_gossip_select(
        &self,
        player: &dyn WorldEntity,
        creature: &dyn WorldEntity,
        sender: u32,
        action: u32,
        code: Option<&str>,
    ) -> bool {
        let event = if code.is_some() {
            GossipEvent::SelectCode
        } else {
            GossipEvent::Select
        };
        let key = EntryKey::new(event, creature.entry());
        if !self.has_bindings(|s| &s.creature_gossip, &key) {
            return false;
        }
        let mut args = self.args();
        args.push_entity(Some(player))
            .push_entity(Some(creature))
            .push_uint(sender)
            .push_uint(action);
        match code {
            Some(code) => args.push_str(code),
            None => args.push_nil(),
        };
        self.call_all_bool(|s| &mut s.creature_gossip, &key, args, false)
    }

    // ===== Commands =====

    /// Returns whether a script consumed the command.
    pub fn on_command(&self, player: Option<&dyn WorldEntity>, text: &str) -> bool {
        let trimmed = text.trim().trim_start_matches(['/', '.']);
        let Some(name) = trimmed.split_whitespace().next() else {
            return false;
        };
        let key = StringKey::new(CommandEvent::Execute, name);
        if !self.has_bindings(|s| &s.command, &key) {
            return false;
        }
        let mut args = self.args();
        args.push_entity(player).push_str(trimmed);
        self.call_all_bool(|s| &mut s.command, &key, args, false)
    }

    // ===== Instanced maps =====

    pub fn on_instance_initialize(&self, controller: &mut dyn InstanceController) {
        self.instance_event(controller, InstanceEvent::Initialize, None);
    }

    pub fn on_instance_load(&self, controller: &mut dyn InstanceController) {
        self.instance_event(controller, InstanceEvent::Load, None);
    }

    pub fn on_instance_update(&self, controller: &mut dyn InstanceController, diff: u32) {
        self.instance_event(controller, InstanceEvent::Update, Some(diff));
    }

    pub fn on_instance_player_enter(
        &self,
        controller: &mut dyn InstanceController,
        player: &dyn WorldEntity,
    ) {
        let key = EntryKey::new(InstanceEvent::PlayerEnter, controller.map_id() as u32);
        if !self.has_bindings(|s| &s.map, &key) && !self.has_bindings(|s| &s.instance, &key) {
            return;
        }
        let mut args = self.args();
        self.push_instance_data(&mut args, controller);
        args.push_entity(Some(player));
        self.call_all_dual(|s| &mut s.map, &key, |s| &mut s.instance, &key, args);
    }

    pub fn on_check_encounter_in_progress(&self, controller: &mut dyn InstanceController) -> bool {
        let key = EntryKey::new(
            InstanceEvent::CheckEncounterInProgress,
            controller.map_id() as u32,
        );
        if !self.has_bindings(|s| &s.map, &key) && !self.has_bindings(|s| &s.instance, &key) {
            return false;
        }
        let mut args = self.args();
        self.push_instance_data(&mut args, controller);
        self.call_all_dual_bool(|s| &mut s.map, &key, |s| &mut s.instance, &key, args, false)
    }

    fn instance_event(
        &self,
        controller: &mut dyn InstanceController,
        event: InstanceEvent,
        diff: Option<u32>,
    ) {
        let key = EntryKey::new(event, controller.map_id() as u32);
        if !self.has_bindings(|s| &s.map, &key) && !self.has_bindings(|s| &s.instance, &key) {
            return;
        }
        let mut args = self.args();
        self.push_instance_data(&mut args, controller);
        if let Some(diff) = diff {
            args.push_uint(diff);
        }
        self.call_all_dual(|s| &mut s.map, &key, |s| &mut s.instance, &key, args);
    }
}
