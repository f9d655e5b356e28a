//! Chat command event family, addressed by command name.

use strum_macros::FromRepr;

use crate::keys::hook_event;

/// Events for script-provided chat commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromRepr)]
#[repr(u32)]
pub enum CommandEvent {
    /// The named command was typed; handlers answer whether they
    /// consumed it.
    Execute = 1,
}
hook_event!(CommandEvent);
