//! Shared fixtures for the scripting host integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use aldera_scripting_host::events::{
    Guid, LivenessProbe, ObjectRef, TemplateKind, TemplateProvider, TypeTag, WorldEntity,
};
use aldera_scripting_host::{
    BoundMap, HostContext, ScriptCache, ScriptEnv, ScriptUnit, ScriptingConfig,
};

/// Template provider backed by a fixed entry list (same entries for
/// every template kind).
pub struct TestTemplates(pub Vec<u32>);

impl TemplateProvider for TestTemplates {
    fn has_template(&self, _kind: TemplateKind, entry: u32) -> bool {
        self.0.contains(&entry)
    }
}

/// Liveness probe that vouches for every object it is asked about.
pub struct AlwaysLive;

impl LivenessProbe for AlwaysLive {
    fn is_live(&self, _obj: &ObjectRef) -> Option<bool> {
        Some(true)
    }
}

pub struct TestEntity {
    pub guid: Guid,
    pub tag: TypeTag,
    pub entry: u32,
    pub map_id: i32,
    pub instance_id: u32,
}

impl TestEntity {
    pub fn player(guid: u64) -> Self {
        Self {
            guid: Guid(guid),
            tag: TypeTag::Player,
            entry: 0,
            map_id: 0,
            instance_id: 0,
        }
    }

    pub fn creature(guid: u64, entry: u32) -> Self {
        Self {
            guid: Guid(guid),
            tag: TypeTag::Creature,
            entry,
            map_id: 0,
            instance_id: 0,
        }
    }
}

impl WorldEntity for TestEntity {
    fn guid(&self) -> Guid {
        self.guid
    }
    fn type_tag(&self) -> TypeTag {
        self.tag
    }
    fn entry(&self) -> u32 {
        self.entry
    }
    fn map_id(&self) -> i32 {
        self.map_id
    }
    fn instance_id(&self) -> u32 {
        self.instance_id
    }
}

pub fn unit(name: &str, source: &str) -> ScriptUnit {
    ScriptUnit {
        name: name.to_owned(),
        path: format!("{name}.lua").into(),
        source: source.to_owned(),
        map_id: None,
    }
}

pub fn host_context() -> HostContext {
    HostContext {
        templates: Arc::new(TestTemplates(vec![100, 200])),
        liveness: None,
    }
}

/// Routes scripting logs into the test harness; respects `RUST_LOG`.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Environment bound to continent 0 with the given preloaded scripts.
pub fn env_with_scripts(sources: &[(&str, &str)]) -> ScriptEnv {
    init_tracing();
    let units = sources.iter().map(|(n, s)| unit(n, s)).collect();
    ScriptEnv::new(
        BoundMap::continent(0),
        ScriptCache::preloaded(units),
        host_context(),
        &ScriptingConfig::default(),
    )
    .expect("failed to create scripting environment")
}

/// Reads a global from the environment's interpreter.
pub fn global_i64(env: &ScriptEnv, name: &str) -> Option<i64> {
    env.lua().globals().get::<Option<i64>>(name).unwrap()
}

pub fn global_bool(env: &ScriptEnv, name: &str) -> Option<bool> {
    env.lua().globals().get::<Option<bool>>(name).unwrap()
}
