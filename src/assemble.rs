// expipe/src/assemble.rs

use anyhow::{Result, anyhow};
use clap::{ArgMatches, Command};
use std::collections::BTreeMap;
use tracing::{debug, error};

use crate::error::PluginError;
use crate::plugin::{Plugin, PluginContext, PluginDescriptor, PluginId};

/// The root command group every plugin attaches to.
pub fn root_command() -> Command {
    Command::new("expipe")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Manage expipe projects. Subcommands are contributed by plugins; run `expipe COMMAND --help` for details.")
        .arg_required_else_help(true)
}

/// Instantiates plugins and lets each attach its subcommands.
#[derive(Default)]
pub struct CommandAssembler;

impl CommandAssembler {
    pub fn new() -> Self { Self }

    pub fn assemble(&self, root: Command, plugins: &[PluginDescriptor]) -> Result<AssembledCli, PluginError> {
        let mut cli = root;
        let mut instances: Vec<Box<dyn Plugin>> = Vec::with_capacity(plugins.len());
        let mut owners = BTreeMap::<String, usize>::new();
        for desc in plugins {
            let plugin = desc.instantiate();
            cli = attach_one(cli, plugin.as_ref(), desc.id(), instances.len(), &mut owners).map_err(|source| {
                error!(plugin = %desc.id(), error = %source, "error when loading plugin");
                PluginError::Attachment { plugin: desc.id().clone(), source }
            })?;
            instances.push(plugin);
        }
        Ok(AssembledCli { command: cli, plugins: instances, owners })
    }
}

fn attach_one(
    cli: Command,
    plugin: &dyn Plugin,
    id: &PluginId,
    index: usize,
    owners: &mut BTreeMap<String, usize>,
) -> Result<Command> {
    let cli = plugin.attach(cli)?;
    let mut counts = BTreeMap::<&str, usize>::new();
    for sub in cli.get_subcommands() { *counts.entry(sub.get_name()).or_default() += 1; }
    for (name, n) in counts {
        if n > 1 { return Err(PluginError::DuplicateCommand { command: name.to_string() }.into()); }
        if !owners.contains_key(name) {
            debug!(plugin = %id, command = name, "attached command");
            owners.insert(name.to_string(), index);
        }
    }
    Ok(cli)
}

/// The final command surface and the plugin behind each subcommand.
pub struct AssembledCli {
    command: Command,
    plugins: Vec<Box<dyn Plugin>>,
    owners: BTreeMap<String, usize>,
}

impl AssembledCli {
    pub fn command(&self) -> &Command { &self.command }

    pub fn owner(&self, subcommand: &str) -> Option<PluginId> {
        self.owners.get(subcommand).map(|&i| self.plugins[i].id())
    }

    /// Subcommand names with the plugin that attached them.
    pub fn commands(&self) -> Vec<(String, PluginId)> {
        self.owners.iter().map(|(name, &i)| (name.clone(), self.plugins[i].id())).collect()
    }

    pub fn try_get_matches_from<I, T>(&self, args: I) -> Result<ArgMatches, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        self.command.clone().try_get_matches_from(args)
    }

    /// Hand a parsed subcommand to the plugin that attached it.
    pub fn dispatch(&self, matches: &ArgMatches, ctx: &mut PluginContext<'_>) -> Result<()> {
        let (name, sub) = matches.subcommand().ok_or_else(|| anyhow!("no command given"))?;
        let &index = self.owners.get(name).ok_or_else(|| anyhow!("unknown command: {name}"))?;
        self.plugins[index].run(name, sub, ctx)
    }
}
