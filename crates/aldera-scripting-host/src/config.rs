//! Scripting configuration, deserialized from the server's TOML config.

use std::path::PathBuf;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScriptingConfig {
    /// Master switch; a disabled server creates no environments.
    pub enabled: bool,
    /// Directory scanned for `.lua` scripts.
    pub script_dir: PathBuf,
    /// Log full error chains (with tracebacks) for failed callbacks.
    pub traceback: bool,
}

impl Default for ScriptingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            script_dir: PathBuf::from("lua_scripts"),
            traceback: false,
        }
    }
}

impl ScriptingConfig {
    pub fn from_toml(raw: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(raw)?)
    }
}
