//! Player event family.

use strum_macros::FromRepr;

use crate::keys::hook_event;

/// Events raised for player characters, addressed by event id alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromRepr)]
#[repr(u32)]
pub enum PlayerEvent {
    /// A character entered the world.
    Login = 1,
    /// A character left the world.
    Logout = 2,
    /// First login of a freshly created character.
    FirstLogin = 3,
    LevelChange = 4,
    /// Chat message; handlers may veto delivery.
    Chat = 5,
    Emote = 6,
    TextEmote = 7,
    GiveXp = 8,
    PvpKill = 9,
    CreatureKill = 10,
    KilledByCreature = 11,
    /// Released spirit after death.
    Repop = 12,
    Resurrect = 13,
    MapChange = 14,
    UpdateZone = 15,
    LootMoney = 16,
    LootItem = 17,
    MoneyChange = 18,
    QuestAbandon = 19,
    DuelStart = 20,
    DuelEnd = 21,
    EnterCombat = 22,
    LeaveCombat = 23,
}
hook_event!(PlayerEvent);
