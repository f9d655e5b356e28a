//! Identity types and collaborator traits supplied by the host server.
//!
//! The scripting host never owns or models world entities. It sees them
//! through [`WorldEntity`] at hook call sites, remembers them as
//! [`ObjectRef`] snapshots, and asks the host about templates and
//! liveness through the traits below.

use std::fmt;

use serde::{Deserialize, Serialize};
use strum_macros::Display;

/// Globally unique identifier of a spawned world object.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Guid(pub u64);

impl Guid {
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016X}", self.0)
    }
}

/// Closed set of object kinds the scripting layer recognizes.
///
/// The set is deliberately closed: resolving a polymorphic host reference
/// to its script-visible wrapper is an explicit match over these tags,
/// never open reflection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
pub enum TypeTag {
    Object,
    Item,
    WorldObject,
    Corpse,
    GameObject,
    Unit,
    Creature,
    Pet,
    Summon,
    Player,
}

impl TypeTag {
    /// The most-derived wrapper actually exposed to scripts for this tag.
    ///
    /// Pets and temporary summons are scripted as creatures.
    pub fn exposed(self) -> TypeTag {
        match self {
            TypeTag::Pet | TypeTag::Summon => TypeTag::Creature,
            other => other,
        }
    }

    /// Whether an object tagged `self` satisfies a check for `expected`.
    ///
    /// Checks walk the wrapper chain from most specific to most general:
    /// a unit check accepts players and creatures, a world object check
    /// accepts anything placed in the world, and the root object check
    /// accepts every recognized kind.
    pub fn is_a(self, expected: TypeTag) -> bool {
        let tag = self.exposed();
        if tag == expected {
            return true;
        }
        match expected {
            TypeTag::Unit => matches!(tag, TypeTag::Player | TypeTag::Creature),
            TypeTag::WorldObject => matches!(
                tag,
                TypeTag::Player
                    | TypeTag::Creature
                    | TypeTag::Unit
                    | TypeTag::GameObject
                    | TypeTag::Corpse
            ),
            TypeTag::Object => true,
            _ => false,
        }
    }
}

/// A live world entity as seen at a hook call site.
///
/// Implemented by the server's entity types. The scripting layer only
/// reads identity from it; it never stores the reference itself.
pub trait WorldEntity {
    fn guid(&self) -> Guid;
    fn type_tag(&self) -> TypeTag;
    /// Template entry of the entity, 0 when it has none.
    fn entry(&self) -> u32 {
        0
    }
    fn map_id(&self) -> i32;
    fn instance_id(&self) -> u32;
}

/// Non-owning snapshot of a world entity's identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectRef {
    pub guid: Guid,
    pub tag: TypeTag,
    pub entry: u32,
    pub map_id: i32,
    pub instance_id: u32,
}

impl ObjectRef {
    pub fn of(entity: &dyn WorldEntity) -> Self {
        Self {
            guid: entity.guid(),
            tag: entity.type_tag(),
            entry: entity.entry(),
            map_id: entity.map_id(),
            instance_id: entity.instance_id(),
        }
    }
}

/// Kinds of templates a registration can name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum TemplateKind {
    Creature,
    GameObject,
    Item,
}

/// Host-side template lookup, consulted when a registration names an
/// entry id.
pub trait TemplateProvider: Send + Sync {
    fn has_template(&self, kind: TemplateKind, entry: u32) -> bool;
}

/// Optional host-side liveness source for cross-boundary object handles.
///
/// When the host tracks destruction of an object kind itself, the probe
/// returns `Some(alive)` and overrides the scripting host's epoch
/// fallback; `None` means the host has no tracking for that kind.
pub trait LivenessProbe: Send + Sync {
    fn is_live(&self, obj: &ObjectRef) -> Option<bool>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exposed_collapses_pets_to_creatures() {
        assert_eq!(TypeTag::Pet.exposed(), TypeTag::Creature);
        assert_eq!(TypeTag::Summon.exposed(), TypeTag::Creature);
        assert_eq!(TypeTag::Player.exposed(), TypeTag::Player);
    }

    #[test]
    fn check_chain_widens() {
        assert!(TypeTag::Player.is_a(TypeTag::Unit));
        assert!(TypeTag::Pet.is_a(TypeTag::Unit));
        assert!(TypeTag::GameObject.is_a(TypeTag::WorldObject));
        assert!(TypeTag::Item.is_a(TypeTag::Object));
        assert!(!TypeTag::GameObject.is_a(TypeTag::Unit));
        assert!(!TypeTag::Item.is_a(TypeTag::WorldObject));
    }
}
