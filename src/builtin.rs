// expipe/src/builtin.rs

use anyhow::{Context, Result, anyhow};
use clap::{Arg, ArgAction, ArgMatches, Command, value_parser};
use std::io::Write;

use crate::layered_config::{ConfigValue, LayerKind, PLUGINS_KEY};
use crate::plugin::{Plugin, PluginContext, PluginDescriptor, PluginId, PluginRegistry};
use crate::resolver::ProjectContext;

pub const NAMESPACE: &str = "expipe";

/// Register the plugins compiled into this binary.
pub fn register_builtins(registry: &PluginRegistry) {
    registry.register(PluginDescriptor::builtin(CorePlugin::plugin_id(), || CorePlugin));
}

/// `config` and `status`: the commands that read and write the layers themselves.
pub struct CorePlugin;

impl CorePlugin {
    pub fn plugin_id() -> PluginId { PluginId::new(NAMESPACE, "core") }
}

impl Plugin for CorePlugin {
    fn id(&self) -> PluginId { Self::plugin_id() }

    fn attach(&self, cli: Command) -> Result<Command> {
        let config = Command::new("config")
            .about("Set config info.")
            .arg(Arg::new("target").required(true).value_parser(value_parser!(LayerKind)))
            .arg(Arg::new("project-id").long("project-id").value_name("ID"))
            .arg(Arg::new("plugin").long("plugin").short('p').action(ArgAction::Append).value_name("NAME"))
            .arg(
                Arg::new("add")
                    .long("add")
                    .short('a')
                    .num_args(2)
                    .action(ArgAction::Append)
                    .value_names(["KEY", "VALUE"]),
            );
        let status = Command::new("status").about("Print project status.");
        Ok(cli.subcommand(config).subcommand(status))
    }

    fn run(&self, command: &str, matches: &ArgMatches, ctx: &mut PluginContext<'_>) -> Result<()> {
        match command {
            "config" => set_config(matches, ctx),
            "status" => print_status(ctx, &mut std::io::stdout().lock()),
            other => Err(anyhow!("unknown command: {other}")),
        }
    }
}

fn set_config(matches: &ArgMatches, ctx: &mut PluginContext<'_>) -> Result<()> {
    let target = *matches.get_one::<LayerKind>("target").ok_or_else(|| anyhow!("missing target"))?;
    let plugins: Vec<String> = matches.get_many::<String>("plugin").map(|v| v.cloned().collect()).unwrap_or_default();
    let adds: Vec<(String, ConfigValue)> = matches
        .get_occurrences::<String>("add")
        .map(|occ| {
            occ.filter_map(|mut pair| Some((pair.next()?.clone(), ConfigValue::parse_lossy(pair.next()?))))
                .collect()
        })
        .unwrap_or_default();

    // an explicit id means the identity layer of another project; re-resolve for it.
    // the global layer has no project, so the id is ignored there
    let mut named;
    let config = match matches.get_one::<String>("project-id").filter(|_| target != LayerKind::Global) {
        Some(id) => {
            named = ctx.resolver.resolve(&ctx.cwd, Some(id.as_str()))?;
            &mut named
        }
        None => &mut *ctx.config,
    };
    if target != LayerKind::Global {
        config.require_project_id().context(
            "unable to load config, move into a project to configure target \"local\" or \"project\"; \
             to configure target \"project\" from elsewhere give --project-id",
        )?;
    }

    let path = config.update(target, |values| {
        if !plugins.is_empty() {
            let mut merged = plugins.clone();
            if let Some(existing) = values.get(PLUGINS_KEY) {
                merged.extend(existing.names().into_iter().map(str::to_string));
            }
            values.insert(PLUGINS_KEY.to_string(), ConfigValue::List(merged));
        }
        for (k, v) in adds {
            values.insert(k, v);
        }
    })?;
    tracing::info!(layer = %target, path = %path.display(), "updated configuration");
    Ok(())
}

fn print_status(ctx: &PluginContext<'_>, out: &mut impl Write) -> Result<()> {
    let config = &*ctx.config;
    match config.context() {
        ProjectContext::Local { root, project_id } => {
            writeln!(out, "project: {project_id}")?;
            writeln!(out, "root: {}", root.display())?;
        }
        ProjectContext::Named { project_id } => writeln!(out, "project: {project_id}")?,
        ProjectContext::Detached => writeln!(out, "project: (none)")?,
    }
    for (key, (layer, value)) in config.effective() {
        if key == PLUGINS_KEY { continue; }
        writeln!(out, "{key}: {value} ({layer})")?;
    }
    let plugins: Vec<String> = config.plugins().into_iter().collect();
    writeln!(out, "{PLUGINS_KEY}: [{}]", plugins.join(", "))?;
    Ok(())
}
