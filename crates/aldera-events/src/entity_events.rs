//! Event families for spawned entities: creatures, game objects, items
//! and the gossip dialogs any of them can open.

use strum_macros::FromRepr;

use crate::keys::hook_event;

/// Creature AI events, addressed by template entry or by a unique spawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromRepr)]
#[repr(u32)]
pub enum CreatureEvent {
    EnterCombat = 1,
    /// Combat ended by evade.
    EnterEvadeMode = 2,
    TargetDied = 3,
    Died = 4,
    Spawn = 5,
    ReachHome = 6,
    ReceiveEmote = 7,
    /// Periodic AI update while the creature is active.
    AiUpdate = 8,
    MovementInform = 9,
    /// Incoming damage; handlers may replace the damage amount.
    DamageTaken = 10,
    Summoned = 11,
    CorpseRemoved = 12,
    MoveInLineOfSight = 13,
    SpellHit = 14,
}
hook_event!(CreatureEvent);

/// Game object events, addressed by template entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromRepr)]
#[repr(u32)]
pub enum GameObjectEvent {
    AiUpdate = 1,
    Spawn = 2,
    /// A player used the object.
    Use = 3,
    StateChanged = 4,
    LootStateChanged = 5,
    Destroyed = 6,
    Damaged = 7,
    Remove = 8,
}
hook_event!(GameObjectEvent);

/// Item events, addressed by template entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromRepr)]
#[repr(u32)]
pub enum ItemEvent {
    Use = 1,
    Equip = 2,
    Unequip = 3,
    Add = 4,
    Remove = 5,
    Expire = 6,
    QuestAccept = 7,
}
hook_event!(ItemEvent);

/// Gossip dialog events, shared by creatures, game objects, items and
/// player-opened menus; the registration type decides which.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromRepr)]
#[repr(u32)]
pub enum GossipEvent {
    /// Dialog opened.
    Hello = 1,
    /// An option was selected.
    Select = 2,
    /// An option with a text box was selected.
    SelectCode = 3,
}
hook_event!(GossipEvent);
