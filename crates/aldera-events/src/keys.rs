//! Key shapes used to address event subscriptions.
//!
//! A binding store is generic over one of the four shapes below. Keys are
//! structural: two keys are the same subscription address iff all their
//! fields compare equal.

use std::fmt;
use std::hash::Hash;

use crate::host::Guid;

/// An event id enum usable as part of a binding key.
pub trait HookEvent: Copy + Eq + Hash + fmt::Debug + 'static {
    fn id(self) -> u32;
    fn from_id(id: u32) -> Option<Self>;
}

macro_rules! hook_event {
    ($ty:ty) => {
        impl crate::keys::HookEvent for $ty {
            fn id(self) -> u32 {
                self as u32
            }
            fn from_id(id: u32) -> Option<Self> {
                Self::from_repr(id)
            }
        }
    };
}
pub(crate) use hook_event;

/// A complete subscription address, independent of its concrete shape.
pub trait BindingKey: Clone + Eq + Hash + fmt::Debug + 'static {
    /// The event id component, passed to handlers as their first argument.
    fn event_id(&self) -> u32;
}

/// Addresses a subscription by event id alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventKey<E: HookEvent> {
    pub event: E,
}

impl<E: HookEvent> EventKey<E> {
    pub fn new(event: E) -> Self {
        Self { event }
    }
}

impl<E: HookEvent> BindingKey for EventKey<E> {
    fn event_id(&self) -> u32 {
        self.event.id()
    }
}

/// Addresses a subscription by event id and template entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntryKey<E: HookEvent> {
    pub event: E,
    pub entry: u32,
}

impl<E: HookEvent> EntryKey<E> {
    pub fn new(event: E, entry: u32) -> Self {
        Self { event, entry }
    }
}

impl<E: HookEvent> BindingKey for EntryKey<E> {
    fn event_id(&self) -> u32 {
        self.event.id()
    }
}

/// Addresses a subscription by event id and one spawned object, scoped to
/// a map instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UniqueKey<E: HookEvent> {
    pub event: E,
    pub guid: Guid,
    pub instance_id: u32,
}

impl<E: HookEvent> UniqueKey<E> {
    pub fn new(event: E, guid: Guid, instance_id: u32) -> Self {
        Self {
            event,
            guid,
            instance_id,
        }
    }
}

impl<E: HookEvent> BindingKey for UniqueKey<E> {
    fn event_id(&self) -> u32 {
        self.event.id()
    }
}

/// Addresses a subscription by event id and a string qualifier, e.g. a
/// chat command name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StringKey<E: HookEvent> {
    pub event: E,
    pub qualifier: String,
}

impl<E: HookEvent> StringKey<E> {
    pub fn new(event: E, qualifier: impl Into<String>) -> Self {
        Self {
            event,
            qualifier: qualifier.into(),
        }
    }
}

impl<E: HookEvent> BindingKey for StringKey<E> {
    fn event_id(&self) -> u32 {
        self.event.id()
    }
}
