/// Embedded Lua scripting host for the aldera world server.
///
/// Each active map owns a [`ScriptEnv`]: one interpreter, its event
/// binding stores, per-map instance data, timed events and an async
/// completion drain, all driven by that map's update thread. Scripts
/// subscribe to host events through the registration globals the bridge
/// installs; the server raises events through hook call sites that
/// funnel into the dispatch core. No script failure escapes the
/// protected-call boundary, and no object handle outlives the dispatch
/// chain it was created in unless the host vouches for the object.
pub mod bindings;
mod bridge;
pub mod config;
pub mod dispatch;
pub mod env;
pub mod error;
pub mod hooks;
pub mod instance_data;
pub mod loader;
pub mod marshal;
pub mod objects;
pub mod query;
pub mod reload;
pub mod timers;

pub use bindings::{BindStores, Bindings, BindingId};
pub use config::ScriptingConfig;
pub use env::{BoundMap, HostContext, RegisterSpec, ScriptEnv};
pub use error::RegisterError;
pub use instance_data::{DataKey, InstanceController, InstanceDataStore};
pub use loader::{ScriptCache, ScriptUnit};
pub use marshal::{Args, LuaGuid};
pub use objects::ScriptObject;
pub use query::QueryTicket;
pub use reload::{setup_reload_signal, ReloadSignal};
pub use timers::{TimerId, TimerManager};

// Re-export the event vocabulary so embedders depend on one crate.
pub use aldera_events as events;
