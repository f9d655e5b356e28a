//! Instanced map event family.

use strum_macros::FromRepr;

use crate::keys::hook_event;

/// Events raised for a scripted map or map instance, addressed by map id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromRepr)]
#[repr(u32)]
pub enum InstanceEvent {
    /// First-time setup of a fresh instance.
    Initialize = 1,
    /// Instance state restored from a save.
    Load = 2,
    Update = 3,
    PlayerEnter = 4,
    CreatureCreate = 5,
    GameObjectCreate = 6,
    /// Queried to decide whether an encounter blocks entry; handlers
    /// answer with a boolean.
    CheckEncounterInProgress = 7,
}
hook_event!(InstanceEvent);
