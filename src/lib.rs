pub mod error;
pub mod project_root;
pub mod layered_config;
pub mod resolver;
pub mod plugin;
pub mod discovery;
pub mod assemble;
pub mod builtin;

pub use error::{ConfigError, PluginError};
pub use layered_config::{ConfigLayer, ConfigMap, ConfigPaths, ConfigValue, LayerKind};
pub use resolver::{ConfigResolver, ProjectContext, ProjectLookup, ResolvedConfig};
pub use plugin::{Plugin, PluginContext, PluginDescriptor, PluginId, PluginRegistry, PluginSource};
pub use discovery::{DiscoveryReport, PluginDiscoverer};
pub use assemble::{AssembledCli, CommandAssembler, root_command};
