//! Script source cache.
//!
//! Scans a directory of `.lua` files into an ordered set of script
//! units. Environments consume the cache through [`ScriptCache::scripts_for`];
//! a cache that has not finished its first scan reports not-ready, and
//! environments created before that point defer their script load to the
//! reload path.
//!
//! A script is global unless its first line carries a map tag:
//!
//! ```lua
//! -- @map 530
//! ```

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};

/// One loadable script.
#[derive(Debug, Clone)]
pub struct ScriptUnit {
    /// Logical name; unique within one load batch.
    pub name: String,
    pub path: PathBuf,
    pub source: String,
    /// Restricts loading to one map; `None` loads everywhere.
    pub map_id: Option<i32>,
}

/// Shared, rescannable script source.
pub struct ScriptCache {
    dir: PathBuf,
    ready: AtomicBool,
    scripts: Mutex<Vec<ScriptUnit>>,
}

impl ScriptCache {
    pub fn new(dir: impl Into<PathBuf>) -> Arc<Self> {
        Arc::new(Self {
            dir: dir.into(),
            ready: AtomicBool::new(false),
            scripts: Mutex::new(Vec::new()),
        })
    }

    /// Builds a ready cache from an in-memory script set. Used by
    /// embedders that ship scripts inside the binary, and by tests.
    pub fn preloaded(units: Vec<ScriptUnit>) -> Arc<Self> {
        Arc::new(Self {
            dir: PathBuf::new(),
            ready: AtomicBool::new(true),
            scripts: Mutex::new(units),
        })
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Rescans the script directory, replacing the cached set.
    pub fn scan(&self) {
        let units = scan_dir(&self.dir);
        info!(
            target: "scripting",
            "Cached {} script(s) from {}",
            units.len(),
            self.dir.display()
        );
        *self.scripts.lock().expect("script cache lock poisoned") = units;
        self.ready.store(true, Ordering::Release);
    }

    /// Runs `scan` on a worker thread, keeping file IO off the server's
    /// update loop.
    pub fn spawn_scan(self: &Arc<Self>) {
        let cache = Arc::clone(self);
        std::thread::spawn(move || cache.scan());
    }

    /// The ordered load set for one map: global scripts plus scripts
    /// tagged for it.
    pub fn scripts_for(&self, map_id: i32) -> Vec<ScriptUnit> {
        self.scripts
            .lock()
            .expect("script cache lock poisoned")
            .iter()
            .filter(|unit| unit.map_id.is_none() || unit.map_id == Some(map_id))
            .cloned()
            .collect()
    }
}

fn scan_dir(dir: &Path) -> Vec<ScriptUnit> {
    let mut units = Vec::new();

    if !dir.exists() {
        info!(
            target: "scripting",
            "Script directory does not exist: {} (this is fine if no scripts are being used)",
            dir.display()
        );
        return units;
    }

    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            warn!(
                target: "scripting",
                "Failed to read script directory {}: {err}",
                dir.display()
            );
            return units;
        }
    };

    let mut paths: Vec<PathBuf> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.extension().and_then(|s| s.to_str()) == Some("lua"))
        .collect();
    // Deterministic load order.
    paths.sort();

    for path in paths {
        let source = match std::fs::read_to_string(&path) {
            Ok(source) => source,
            Err(err) => {
                warn!(target: "scripting", "Failed to read {}: {err}", path.display());
                continue;
            }
        };
        let name = match path.file_stem().and_then(|s| s.to_str()) {
            Some(stem) => stem.to_owned(),
            None => continue,
        };
        let map_id = parse_map_tag(&source);
        debug!(
            target: "scripting",
            "Cached `{name}` from {} (map: {map_id:?})",
            path.display()
        );
        units.push(ScriptUnit {
            name,
            path,
            source,
            map_id,
        });
    }

    units
}

/// Reads the optional `-- @map <id>` tag from a script's first line.
fn parse_map_tag(source: &str) -> Option<i32> {
    let first = source.lines().next()?.trim();
    let rest = first.strip_prefix("--")?.trim();
    let id = rest.strip_prefix("@map")?.trim();
    match id.parse() {
        Ok(id) => Some(id),
        Err(_) => {
            warn!(target: "scripting", "Ignoring unparseable map tag: `{first}`");
            None
        }
    }
}
