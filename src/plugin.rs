// expipe/src/plugin.rs

use anyhow::Result;
use clap::{ArgMatches, Command};
use parking_lot::RwLock;
use std::{fmt, path::PathBuf, sync::Arc};
use tracing::debug;

use crate::error::PluginError;
use crate::resolver::{ConfigResolver, ResolvedConfig};

/// Fully-qualified plugin name: `namespace::name`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PluginId(String);

impl PluginId {
    pub fn new(namespace: &str, name: &str) -> Self { Self(format!("{namespace}::{name}")) }
    pub fn as_str(&self) -> &str { &self.0 }
    pub fn name(&self) -> &str { self.0.rsplit("::").next().unwrap_or(&self.0) }
}

impl fmt::Display for PluginId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

/// What a subcommand gets to work with once dispatched.
pub struct PluginContext<'a> {
    pub cwd: PathBuf,
    pub resolver: &'a ConfigResolver,
    pub config: &'a mut ResolvedConfig,
}

/// A unit of command-surface extension.
pub trait Plugin: Send + Sync {
    fn id(&self) -> PluginId;
    /// Register subcommands on the root group.
    fn attach(&self, cli: Command) -> Result<Command>;
    /// Run one of the subcommands this plugin attached.
    fn run(&self, command: &str, matches: &ArgMatches, ctx: &mut PluginContext<'_>) -> Result<()>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PluginSource {
    Builtin,
    External { executable: PathBuf },
}

type Factory = Arc<dyn Fn() -> Box<dyn Plugin> + Send + Sync>;

/// A known plugin type; instantiated on demand.
#[derive(Clone)]
pub struct PluginDescriptor {
    id: PluginId,
    source: PluginSource,
    factory: Factory,
}

impl PluginDescriptor {
    pub fn new<F>(id: PluginId, source: PluginSource, factory: F) -> Self
    where
        F: Fn() -> Box<dyn Plugin> + Send + Sync + 'static,
    {
        Self { id, source, factory: Arc::new(factory) }
    }

    pub fn builtin<P, F>(id: PluginId, factory: F) -> Self
    where
        P: Plugin + 'static,
        F: Fn() -> P + Send + Sync + 'static,
    {
        Self::new(id, PluginSource::Builtin, move || Box::new(factory()) as Box<dyn Plugin>)
    }

    pub fn id(&self) -> &PluginId { &self.id }
    pub fn source(&self) -> &PluginSource { &self.source }
    pub fn instantiate(&self) -> Box<dyn Plugin> { (self.factory)() }
}

impl fmt::Debug for PluginDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginDescriptor").field("id", &self.id).field("source", &self.source).finish_non_exhaustive()
    }
}

/// Known plugins for one invocation, keyed by identity, in registration order.
#[derive(Default)]
pub struct PluginRegistry {
    known: RwLock<Vec<PluginDescriptor>>,
}

impl PluginRegistry {
    pub fn new() -> Self { Self::default() }

    /// Insert unless the identity is already known. Returns whether it was added.
    pub fn register(&self, plugin: PluginDescriptor) -> bool {
        let mut known = self.known.write();
        if known.iter().any(|p| p.id == plugin.id) {
            debug!(plugin = %plugin.id, "plugin already registered");
            return false;
        }
        debug!(plugin = %plugin.id, "registered plugin");
        known.push(plugin);
        true
    }

    pub fn all(&self) -> Vec<PluginDescriptor> { self.known.read().clone() }
    pub fn len(&self) -> usize { self.known.read().len() }
    pub fn is_empty(&self) -> bool { self.known.read().is_empty() }
    pub fn contains(&self, id: &PluginId) -> bool { self.known.read().iter().any(|p| &p.id == id) }

    /// First plugin whose identity contains `fragment`.
    pub fn find(&self, fragment: &str) -> Result<PluginDescriptor, PluginError> {
        self.known
            .read()
            .iter()
            .find(|p| p.id.as_str().contains(fragment))
            .cloned()
            .ok_or_else(|| PluginError::NotFound(fragment.to_string()))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Attaches one subcommand per name; fails on demand.
    pub(crate) struct StubPlugin {
        pub id: PluginId,
        pub commands: Vec<&'static str>,
        pub fail: bool,
    }

    impl Plugin for StubPlugin {
        fn id(&self) -> PluginId { self.id.clone() }
        fn attach(&self, mut cli: Command) -> Result<Command> {
            if self.fail { anyhow::bail!("stub attach failure"); }
            for c in &self.commands { cli = cli.subcommand(Command::new(*c)); }
            Ok(cli)
        }
        fn run(&self, _command: &str, _matches: &ArgMatches, _ctx: &mut PluginContext<'_>) -> Result<()> { Ok(()) }
    }

    pub(crate) fn stub(ns: &str, name: &str, commands: Vec<&'static str>, fail: bool) -> PluginDescriptor {
        let id = PluginId::new(ns, name);
        let pid = id.clone();
        PluginDescriptor::builtin(id, move || StubPlugin { id: pid.clone(), commands: commands.clone(), fail })
    }

    #[test]
    fn register_is_idempotent() {
        let reg = PluginRegistry::new();
        assert!(reg.register(stub("test", "alpha", vec![], false)));
        assert!(!reg.register(stub("test", "alpha", vec!["x"], false)));
        assert_eq!(reg.len(), 1);
        assert!(reg.contains(&PluginId::new("test", "alpha")));
    }

    #[test]
    fn all_keeps_registration_order() {
        let reg = PluginRegistry::new();
        for name in ["c", "a", "b"] { reg.register(stub("test", name, vec![], false)); }
        let ids: Vec<String> = reg.all().iter().map(|p| p.id().to_string()).collect();
        assert_eq!(ids, ["test::c", "test::a", "test::b"]);
    }

    #[test]
    fn find_by_fragment() {
        let reg = PluginRegistry::new();
        reg.register(stub("expipe", "core", vec![], false));
        reg.register(stub("plugin-expipe-ephys", "ephys", vec![], false));
        assert_eq!(reg.find("ephys").unwrap().id().as_str(), "plugin-expipe-ephys::ephys");
        assert_eq!(reg.find("expipe").unwrap().id().as_str(), "expipe::core");
        assert!(matches!(reg.find("nope"), Err(PluginError::NotFound(f)) if f == "nope"));
    }

    #[test]
    fn registries_are_independent() {
        let a = PluginRegistry::new();
        let b = PluginRegistry::new();
        a.register(stub("test", "only-a", vec![], false));
        assert!(b.is_empty());
    }

    #[test]
    fn id_name_is_last_segment() {
        assert_eq!(PluginId::new("plugin-expipe-x", "tools").name(), "tools");
    }
}
