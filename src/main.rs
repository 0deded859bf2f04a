// expipe/src/main.rs

use anyhow::Result;
use std::sync::Arc;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use expipe_cli::{
    CommandAssembler, ConfigPaths, ConfigResolver, PluginContext, PluginDiscoverer, PluginRegistry,
    builtin, root_command,
};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cwd = std::env::current_dir()?;
    let resolver = ConfigResolver::new(ConfigPaths::from_env()?);
    let mut config = resolver.resolve(&cwd, None)?;

    let registry = Arc::new(PluginRegistry::new());
    builtin::register_builtins(&registry);
    let report = PluginDiscoverer::new(registry.clone())?.discover(&config);
    debug!(plugins = report.plugins.len(), failures = report.failures.len(), "plugin discovery finished");

    let cli = CommandAssembler::new().assemble(root_command(), &report.plugins)?;
    let matches = cli.command().clone().get_matches();
    let mut ctx = PluginContext { cwd, resolver: &resolver, config: &mut config };
    cli.dispatch(&matches, &mut ctx)
}
