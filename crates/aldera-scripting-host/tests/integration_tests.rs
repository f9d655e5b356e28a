// Integration tests for the scripting host core: registration,
// dispatch, marshaling and object lifetime.

mod common;

use std::sync::Arc;

use aldera_scripting_host::events::{EventKey, PlayerEvent, RegisterType, TypeTag};
use aldera_scripting_host::{
    BoundMap, DataKey, HostContext, RegisterError, RegisterSpec, ScriptCache, ScriptEnv,
    ScriptingConfig,
};

use common::{env_with_scripts, global_bool, global_i64, host_context, unit, AlwaysLive, TestEntity, TestTemplates};

#[test]
fn zero_subscribers_is_a_cheap_no_op() {
    let env = env_with_scripts(&[]);
    let key = EventKey::new(PlayerEvent::Login);
    assert!(!env.has_bindings(|s| &s.player, &key));

    // Raising with no subscribers must not touch the interpreter.
    env.on_player_login(&TestEntity::player(1));
    assert!(!env.has_bindings(|s| &s.player, &key));
}

#[test]
fn registered_callback_receives_event_and_arguments() {
    let env = env_with_scripts(&[(
        "login_counter",
        r#"
        RegisterPlayerEvent(1, function(event, player)
            HITS = (HITS or 0) + 1
            EVENT_ID = event
            IS_PLAYER = player:GetObjectType() == "Player"
        end)
        "#,
    )]);

    env.on_player_login(&TestEntity::player(7));
    env.on_player_login(&TestEntity::player(7));

    assert_eq!(global_i64(&env, "HITS"), Some(2));
    assert_eq!(global_i64(&env, "EVENT_ID"), Some(1));
    assert_eq!(global_bool(&env, "IS_PLAYER"), Some(true));
}

#[test]
fn invocation_limit_expires_the_binding() {
    let env = env_with_scripts(&[(
        "two_shot",
        r#"
        RegisterPlayerEvent(1, function() HITS = (HITS or 0) + 1 end, 2)
        "#,
    )]);
    let key = EventKey::new(PlayerEvent::Login);
    let player = TestEntity::player(1);

    env.on_player_login(&player);
    env.on_player_login(&player);
    assert_eq!(global_i64(&env, "HITS"), Some(2));
    assert!(!env.has_bindings(|s| &s.player, &key));

    // A third raise finds nothing to invoke.
    env.on_player_login(&player);
    assert_eq!(global_i64(&env, "HITS"), Some(2));
}

#[test]
fn cancellation_is_effective_and_idempotent() {
    let env = env_with_scripts(&[(
        "cancel_me",
        r#"
        CANCEL = RegisterPlayerEvent(1, function() HITS = (HITS or 0) + 1 end)
        "#,
    )]);
    let player = TestEntity::player(1);

    env.on_player_login(&player);
    assert_eq!(global_i64(&env, "HITS"), Some(1));

    env.lua().load("CANCEL() CANCEL()").exec().unwrap();
    env.on_player_login(&player);
    assert_eq!(global_i64(&env, "HITS"), Some(1));
}

#[test]
fn identical_registrations_are_independent() {
    let env = env_with_scripts(&[(
        "twins",
        r#"
        local handler = function() HITS = (HITS or 0) + 1 end
        FIRST = RegisterPlayerEvent(1, handler)
        SECOND = RegisterPlayerEvent(1, handler)
        "#,
    )]);
    let player = TestEntity::player(1);

    env.on_player_login(&player);
    assert_eq!(global_i64(&env, "HITS"), Some(2));

    env.lua().load("FIRST()").exec().unwrap();
    env.on_player_login(&player);
    assert_eq!(global_i64(&env, "HITS"), Some(3));
}

#[test]
fn cancelling_mid_dispatch_spares_the_current_batch() {
    let env = env_with_scripts(&[(
        "mid_dispatch",
        r#"
        RegisterPlayerEvent(1, function()
            FIRST = (FIRST or 0) + 1
            CANCEL_SECOND()
        end)
        CANCEL_SECOND = RegisterPlayerEvent(1, function()
            SECOND = (SECOND or 0) + 1
        end)
        "#,
    )]);
    let player = TestEntity::player(1);

    // The snapshot taken at dispatch start still runs the second
    // handler this round.
    env.on_player_login(&player);
    assert_eq!(global_i64(&env, "FIRST"), Some(1));
    assert_eq!(global_i64(&env, "SECOND"), Some(1));

    env.on_player_login(&player);
    assert_eq!(global_i64(&env, "FIRST"), Some(2));
    assert_eq!(global_i64(&env, "SECOND"), Some(1));
}

#[test]
fn a_failing_callback_does_not_stop_the_batch() {
    let env = env_with_scripts(&[(
        "faulty",
        r#"
        RegisterPlayerEvent(1, function() error("boom") end)
        RegisterPlayerEvent(1, function() SURVIVED = true end)
        "#,
    )]);

    env.on_player_login(&TestEntity::player(1));
    assert_eq!(global_bool(&env, "SURVIVED"), Some(true));
}

#[test]
fn argument_errors_abort_only_the_current_invocation() {
    // The second handler passes a bad value to a range-checked native;
    // the error stays inside its own invocation.
    let env = env_with_scripts(&[(
        "bad_args",
        r#"
        RegisterPlayerEvent(1, function()
            -- delay must be a number; this invocation dies here
            ScheduleTimedEvent(function() end, "soon")
            UNREACHED = true
        end)
        RegisterPlayerEvent(1, function() SURVIVED = true end)
        "#,
    )]);

    env.on_player_login(&TestEntity::player(1));
    assert_eq!(global_bool(&env, "UNREACHED"), None);
    assert_eq!(global_bool(&env, "SURVIVED"), Some(true));
}

#[test]
fn bool_dispatch_ors_results() {
    let env = env_with_scripts(&[(
        "gossip",
        r#"
        RegisterCreatureGossipEvent(100, 1, function() return false end)
        RegisterCreatureGossipEvent(100, 1, function() return true end)
        "#,
    )]);
    let player = TestEntity::player(1);
    let creature = TestEntity::creature(2, 100);

    assert!(env.on_gossip_hello(&player, &creature));
    // No bindings for this entry: the default (false) comes back.
    let other = TestEntity::creature(3, 200);
    assert!(!env.on_gossip_hello(&player, &other));
}

#[test]
fn chat_hook_vetoes_on_explicit_false() {
    let env = env_with_scripts(&[(
        "chat_filter",
        r#"
        RegisterPlayerEvent(5, function(event, player, type, lang, msg)
            if msg == "blocked" then return false end
        end)
        "#,
    )]);
    let player = TestEntity::player(1);

    assert!(env.on_player_chat(&player, 0, 0, "hello"));
    assert!(!env.on_player_chat(&player, 0, 0, "blocked"));
}

#[test]
fn damage_hook_replaces_the_out_argument_in_order() {
    let env = env_with_scripts(&[(
        "damage_chain",
        r#"
        RegisterCreatureEvent(100, 10, function(event, creature, attacker, damage)
            return damage * 2
        end)
        RegisterCreatureEvent(100, 10, function(event, creature, attacker, damage)
            SEEN_BY_SECOND = damage
            return damage + 5
        end)
        "#,
    )]);
    let creature = TestEntity::creature(2, 100);
    let attacker = TestEntity::player(1);

    let mut damage = 10u32;
    env.on_creature_damage_taken(&creature, Some(&attacker), &mut damage);

    // First handler doubled it, the second saw the doubled value.
    assert_eq!(global_i64(&env, "SEEN_BY_SECOND"), Some(20));
    assert_eq!(damage, 25);
}

#[test]
fn registration_validation_rejects_bad_requests() {
    let env = env_with_scripts(&[]);
    let noop = env.lua().create_function(|_, ()| Ok(())).unwrap();

    // Unknown event id for the family.
    let err = env
        .register(
            RegisterSpec::basic(RegisterType::Player, 9999, 0),
            noop.clone(),
        )
        .unwrap_err();
    assert!(matches!(err, RegisterError::UnknownEvent { event: 9999, .. }));

    // Entry that names no template.
    let err = env
        .register(
            RegisterSpec::entry(RegisterType::Creature, 12345, 1, 0),
            noop.clone(),
        )
        .unwrap_err();
    assert!(matches!(err, RegisterError::MissingTemplate { entry: 12345, .. }));

    // Unique registration without a guid.
    let err = env
        .register(RegisterSpec::unique(Default::default(), 0, 1, 0), noop)
        .unwrap_err();
    assert_eq!(err, RegisterError::EmptyGuid);

    // Nothing was registered along the way.
    let key = EventKey::new(PlayerEvent::Login);
    assert!(!env.has_bindings(|s| &s.player, &key));
}

#[test]
fn rejected_script_registration_is_logged_not_fatal() {
    // The bad registration kills that script's load; the next script
    // still loads.
    let env = env_with_scripts(&[
        (
            "bad_entry",
            "RegisterCreatureEvent(12345, 1, function() end) LOADED_BAD = true",
        ),
        ("good", "LOADED_GOOD = true"),
    ]);

    assert_eq!(global_bool(&env, "LOADED_BAD"), None);
    assert_eq!(global_bool(&env, "LOADED_GOOD"), Some(true));
}

#[test]
fn handles_expire_when_the_dispatch_chain_unwinds() {
    let env = env_with_scripts(&[(
        "smuggler",
        r#"
        RegisterPlayerEvent(1, function(event, player)
            SAVED = player
            DURING = SAVED:IsValid()
        end)
        RegisterPlayerEvent(2, function()
            AFTER = SAVED:IsValid()
            OK = pcall(function() return SAVED:GetGUID() end)
        end)
        "#,
    )]);
    let player = TestEntity::player(1);

    env.on_player_login(&player);
    assert_eq!(global_bool(&env, "DURING"), Some(true));

    env.on_player_logout(&player);
    assert_eq!(global_bool(&env, "AFTER"), Some(false));
    assert_eq!(global_bool(&env, "OK"), Some(false));
}

#[test]
fn host_liveness_probe_overrides_the_epoch_fallback() {
    let units = vec![unit(
        "keeper",
        r#"
        RegisterPlayerEvent(1, function(event, player) SAVED = player end)
        RegisterPlayerEvent(2, function() STILL_VALID = SAVED:IsValid() end)
        "#,
    )];
    let env = ScriptEnv::new(
        BoundMap::continent(0),
        ScriptCache::preloaded(units),
        HostContext {
            templates: Arc::new(TestTemplates(vec![])),
            liveness: Some(Arc::new(AlwaysLive)),
        },
        &ScriptingConfig::default(),
    )
    .unwrap();
    let player = TestEntity::player(1);

    env.on_player_login(&player);
    env.on_player_logout(&player);
    assert_eq!(global_bool(&env, "STILL_VALID"), Some(true));
}

#[test]
fn handles_expose_their_script_type() {
    let env = env_with_scripts(&[(
        "type_check",
        r#"
        RegisterCreatureEvent(100, 5, function(event, creature)
            TYPE_NAME = creature:GetObjectType()
        end)
        "#,
    )]);
    // Pets script as creatures: the wrapper resolves to the
    // most-derived exposed kind.
    let mut pet = TestEntity::creature(5, 100);
    pet.tag = TypeTag::Pet;
    env.on_creature_spawn(&pet);
    assert_eq!(
        env.lua()
            .globals()
            .get::<Option<String>>("TYPE_NAME")
            .unwrap()
            .as_deref(),
        Some("Creature")
    );
}

#[test]
fn instance_data_is_created_retrieved_and_freed() {
    let units = vec![unit(
        "instance_state",
        "CreateInstanceData({ bosses_down = 3 })",
    )];
    let env = ScriptEnv::new(
        BoundMap::instance(1, 42),
        ScriptCache::preloaded(units),
        host_context(),
        &ScriptingConfig::default(),
    )
    .unwrap();

    assert!(env.has_instance_data(DataKey::Instance(42)));
    let table = env
        .lua()
        .load("return GetInstanceData().bosses_down")
        .eval::<i64>()
        .unwrap();
    assert_eq!(table, 3);

    env.free_instance(42);
    assert!(!env.has_instance_data(DataKey::Instance(42)));
    assert_eq!(
        env.lua().load("return HasInstanceData()").eval::<bool>().unwrap(),
        false
    );
}

#[test]
fn freeing_an_instance_clears_its_scoped_bindings() {
    let env = env_with_scripts(&[(
        "unique_bindings",
        r#"
        RegisterUniqueCreatureEvent(77, 42, 4, function() HITS = (HITS or 0) + 1 end)
        "#,
    )]);

    let key = aldera_scripting_host::events::UniqueKey::new(
        aldera_scripting_host::events::CreatureEvent::Died,
        aldera_scripting_host::events::Guid(77),
        42,
    );
    assert!(env.has_bindings(|s| &s.creature_unique, &key));

    env.free_instance(42);
    assert!(!env.has_bindings(|s| &s.creature_unique, &key));
}

#[test]
fn timed_events_fire_on_the_update_path() {
    let mut env = env_with_scripts(&[(
        "timers",
        r#"
        ScheduleTimedEvent(function(id, delay, remaining)
            TICKS = (TICKS or 0) + 1
            LAST_DELAY = delay
        end, 50, 2)
        "#,
    )]);

    env.update(40);
    assert_eq!(global_i64(&env, "TICKS"), None);

    env.update(20);
    assert_eq!(global_i64(&env, "TICKS"), Some(1));
    assert_eq!(global_i64(&env, "LAST_DELAY"), Some(50));

    env.update(60);
    env.update(60);
    // Two repeats were requested; the third tick finds nothing.
    assert_eq!(global_i64(&env, "TICKS"), Some(2));
}

struct TestController {
    reloads: u32,
}

impl aldera_scripting_host::InstanceController for TestController {
    fn map_id(&self) -> i32 {
        1
    }
    fn instance_id(&self) -> u32 {
        42
    }
    fn instanceable(&self) -> bool {
        true
    }
    fn reload(&mut self, env: &ScriptEnv) {
        self.reloads += 1;
        let table = env.lua().create_table().unwrap();
        table.set("restored", true).unwrap();
        env.create_instance_data(DataKey::Instance(42), table).unwrap();
    }
}

#[test]
fn missing_instance_data_triggers_the_controller_reload() {
    let units = vec![unit(
        "instance_observer",
        r#"
        RegisterInstanceEvent(1, 4, function(event, data, player)
            RESTORED = data.restored
        end)
        "#,
    )];
    let env = ScriptEnv::new(
        BoundMap::instance(1, 42),
        ScriptCache::preloaded(units),
        host_context(),
        &ScriptingConfig::default(),
    )
    .unwrap();
    let mut controller = TestController { reloads: 0 };
    let player = TestEntity::player(9);

    // No script created the data table, so the first event routes
    // through the controller's reload.
    env.on_instance_player_enter(&mut controller, &player);
    assert_eq!(controller.reloads, 1);
    assert_eq!(global_bool(&env, "RESTORED"), Some(true));

    // The record now exists; later events reuse it.
    env.on_instance_player_enter(&mut controller, &player);
    assert_eq!(controller.reloads, 1);
}

#[test]
fn commands_dispatch_by_name() {
    let env = env_with_scripts(&[(
        "commands",
        r#"
        RegisterCommand("teleport", function(event, player, text)
            LAST_COMMAND = text
            return true
        end)
        "#,
    )]);
    let player = TestEntity::player(1);

    assert!(env.on_command(Some(&player), "/teleport home"));
    assert_eq!(
        env.lua()
            .globals()
            .get::<Option<String>>("LAST_COMMAND")
            .unwrap()
            .as_deref(),
        Some("teleport home")
    );
    assert!(!env.on_command(Some(&player), "/unknown"));
    assert!(!env.on_command(None, "   "));
}
