/// Script event vocabulary for the aldera world server.
///
/// This crate provides the foundational types for the scripting event
/// system: the event id enums for every hook family, the registration
/// types that tie a family to a key shape, the key shapes themselves and
/// the collaborator traits the scripting host consumes. Keeping these
/// here lets the server and the scripting host collaborate without
/// circular dependencies.
pub mod command_events;
pub mod entity_events;
pub mod host;
pub mod instance_events;
pub mod keys;
pub mod player_events;
pub mod world_events;

pub use command_events::CommandEvent;
pub use entity_events::{CreatureEvent, GameObjectEvent, GossipEvent, ItemEvent};
pub use host::{Guid, LivenessProbe, ObjectRef, TemplateKind, TemplateProvider, TypeTag, WorldEntity};
pub use instance_events::InstanceEvent;
pub use keys::{BindingKey, EntryKey, EventKey, HookEvent, StringKey, UniqueKey};
pub use player_events::PlayerEvent;
pub use world_events::{GroupEvent, GuildEvent, WorldEvent};

use strum_macros::FromRepr;

/// Categories of script registrations.
///
/// Each registration type pairs one event family with one key shape.
/// The numeric values are part of the script-facing API and must not be
/// reordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromRepr)]
#[repr(u32)]
pub enum RegisterType {
    /// World/server events, addressed by event id alone.
    World = 0,
    /// Player events, addressed by event id alone.
    Player = 1,
    /// Guild events, addressed by event id alone.
    Guild = 2,
    /// Group events, addressed by event id alone.
    Group = 3,
    /// Creature events, addressed by (event, template entry).
    Creature = 4,
    /// Creature events, addressed by (event, guid, instance).
    CreatureUnique = 5,
    /// Creature gossip events, addressed by (event, template entry).
    CreatureGossip = 6,
    /// Game object events, addressed by (event, template entry).
    GameObject = 7,
    /// Game object gossip events, addressed by (event, template entry).
    GameObjectGossip = 8,
    /// Item events, addressed by (event, template entry).
    Item = 9,
    /// Item gossip events, addressed by (event, template entry).
    ItemGossip = 10,
    /// Player gossip events, addressed by (event, menu id).
    PlayerGossip = 11,
    /// Map events, addressed by (event, map id).
    Map = 12,
    /// Instanced map events, addressed by (event, map id).
    Instance = 13,
    /// Chat command events, addressed by (event, command name).
    Command = 14,
}
