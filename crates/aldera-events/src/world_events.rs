//! Server-wide event families: world lifecycle, guilds and groups.

use strum_macros::FromRepr;

use crate::keys::hook_event;

/// Events raised by the world server itself, not tied to any entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromRepr)]
#[repr(u32)]
pub enum WorldEvent {
    /// The world finished starting up.
    Startup = 1,
    /// The world is shutting down.
    Shutdown = 2,
    /// A scheduled shutdown was cancelled.
    ShutdownCancel = 3,
    /// Server configuration was (re)loaded.
    ConfigLoad = 4,
    /// The world was opened or closed to players.
    OpenStateChange = 5,
    /// A seasonal game event started.
    GameEventStart = 6,
    /// A seasonal game event stopped.
    GameEventStop = 7,
    /// One world update tick.
    Update = 8,
}
hook_event!(WorldEvent);

/// Guild lifecycle and member events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromRepr)]
#[repr(u32)]
pub enum GuildEvent {
    AddMember = 1,
    RemoveMember = 2,
    MotdChange = 3,
    InfoChange = 4,
    Create = 5,
    Disband = 6,
    MoneyWithdraw = 7,
    MoneyDeposit = 8,
    ItemMove = 9,
}
hook_event!(GuildEvent);

/// Party/raid group events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromRepr)]
#[repr(u32)]
pub enum GroupEvent {
    AddMember = 1,
    InviteMember = 2,
    RemoveMember = 3,
    ChangeLeader = 4,
    Disband = 5,
    Create = 6,
}
hook_event!(GroupEvent);
