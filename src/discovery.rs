// expipe/src/discovery.rs

use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};
use globset::{Glob, GlobMatcher};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeSet, ffi::OsString, fs, path::{Path, PathBuf}, process, sync::Arc};
use tracing::{debug, info, warn};

use crate::error::PluginError;
use crate::plugin::{Plugin, PluginContext, PluginDescriptor, PluginId, PluginRegistry, PluginSource};
use crate::resolver::ResolvedConfig;

/// Name prefix of external plugin executables.
pub const EXECUTABLE_PREFIX: &str = "plugin-expipe";
/// Argument asking an external plugin to print its manifest.
pub const MANIFEST_FLAG: &str = "--expipe-manifest";
pub const PROJECT_ID_ENV: &str = "EXPIPE_PROJECT_ID";
pub const PROJECT_ROOT_ENV: &str = "EXPIPE_PROJECT_ROOT";

#[cfg(windows)]
const EXECUTABLE_SUFFIX: &str = ".exe";
#[cfg(not(windows))]
const EXECUTABLE_SUFFIX: &str = "";

/// What an external executable prints for `--expipe-manifest`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Manifest {
    pub plugins: Vec<ManifestPlugin>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ManifestPlugin {
    pub name: String,
    pub about: Option<String>,
    pub commands: Vec<ManifestCommand>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ManifestCommand {
    pub name: String,
    pub about: Option<String>,
}

/// A plugin provided by a separate executable; its commands run as subprocesses.
pub struct ExternalPlugin {
    id: PluginId,
    executable: PathBuf,
    spec: ManifestPlugin,
}

impl ExternalPlugin {
    pub fn executable(&self) -> &Path { &self.executable }
}

impl Plugin for ExternalPlugin {
    fn id(&self) -> PluginId { self.id.clone() }

    fn attach(&self, mut cli: Command) -> Result<Command> {
        for cmd in &self.spec.commands {
            let mut sub = Command::new(cmd.name.clone())
                .disable_help_flag(true)
                .arg(Arg::new("args").num_args(0..).trailing_var_arg(true).allow_hyphen_values(true));
            if let Some(about) = cmd.about.clone().or_else(|| self.spec.about.clone()) {
                sub = sub.about(about);
            }
            cli = cli.subcommand(sub);
        }
        Ok(cli)
    }

    fn run(&self, command: &str, matches: &ArgMatches, ctx: &mut PluginContext<'_>) -> Result<()> {
        let args: Vec<&String> = matches.get_many::<String>("args").map(|a| a.collect()).unwrap_or_default();
        let mut child = process::Command::new(&self.executable);
        child.arg(command).args(args).current_dir(&ctx.cwd);
        if let Some(id) = ctx.config.project_id() { child.env(PROJECT_ID_ENV, id); }
        if let Some(root) = ctx.config.local_root() { child.env(PROJECT_ROOT_ENV, root); }
        debug!(plugin = %self.id, command, executable = %self.executable.display(), "running external command");
        let status = child.status().with_context(|| format!("spawn {}", self.executable.display()))?;
        if !status.success() {
            return Err(PluginError::ExternalCommand { plugin: self.id.clone(), command: command.to_string(), code: status.code() }.into());
        }
        Ok(())
    }
}

/// An external executable that could not be loaded.
#[derive(Debug)]
pub struct DiscoveryFailure {
    pub executable: PathBuf,
    pub error: PluginError,
}

#[derive(Debug, Default)]
pub struct DiscoveryReport {
    /// Every plugin known after discovery, built-ins first.
    pub plugins: Vec<PluginDescriptor>,
    pub failures: Vec<DiscoveryFailure>,
    /// Configured plugin names no known plugin satisfies.
    pub unresolved: Vec<PluginError>,
}

pub struct PluginDiscoverer {
    registry: Arc<PluginRegistry>,
    search_path: Vec<PathBuf>,
    matcher: GlobMatcher,
}

impl PluginDiscoverer {
    /// Discoverer over the process `PATH`.
    pub fn new(registry: Arc<PluginRegistry>) -> Result<Self> {
        let search_path = std::env::var_os("PATH").map(|p| std::env::split_paths(&p).collect()).unwrap_or_default();
        Self::with_search_path(registry, search_path)
    }

    pub fn with_search_path(registry: Arc<PluginRegistry>, search_path: Vec<PathBuf>) -> Result<Self> {
        let pattern = format!("{EXECUTABLE_PREFIX}*{EXECUTABLE_SUFFIX}");
        let matcher = Glob::new(&pattern).with_context(|| format!("invalid glob: {pattern}"))?.compile_matcher();
        Ok(Self { registry, search_path, matcher })
    }

    /// Candidate executables, first occurrence of each name on the search path.
    pub fn scan(&self) -> Vec<PathBuf> {
        let mut seen = BTreeSet::<OsString>::new();
        let mut found = vec![];
        for dir in &self.search_path {
            let Ok(rd) = fs::read_dir(dir) else { continue; };
            let mut entries: Vec<PathBuf> = rd
                .filter_map(|e| e.ok().map(|x| x.path()))
                .filter(|p| p.is_file())
                .filter(|p| p.file_name().is_some_and(|n| self.matcher.is_match(Path::new(n))))
                .collect();
            entries.sort();
            for p in entries {
                if let Some(name) = p.file_name() {
                    if seen.insert(name.to_os_string()) { found.push(p); }
                }
            }
        }
        found
    }

    pub fn discover(&self, config: &ResolvedConfig) -> DiscoveryReport {
        let mut report = DiscoveryReport::default();
        for exe in self.scan() {
            match load_manifest(&exe) {
                Ok(manifest) => self.register_external(&exe, manifest),
                Err(error) => {
                    warn!(executable = %exe.display(), %error, "skipping external plugin");
                    report.failures.push(DiscoveryFailure { executable: exe, error });
                }
            }
        }
        for name in config.plugins() {
            if self.registry.find(&name).is_err() {
                let err = PluginError::UnresolvedReference(name);
                warn!("{err}");
                report.unresolved.push(err);
            }
        }
        report.plugins = self.registry.all();
        report
    }

    fn register_external(&self, exe: &Path, manifest: Manifest) {
        let namespace = executable_stem(exe);
        for spec in manifest.plugins {
            let id = PluginId::new(&namespace, &spec.name);
            let executable = exe.to_path_buf();
            let source = PluginSource::External { executable: executable.clone() };
            let pid = id.clone();
            let added = self.registry.register(PluginDescriptor::new(id.clone(), source, move || {
                Box::new(ExternalPlugin { id: pid.clone(), executable: executable.clone(), spec: spec.clone() }) as Box<dyn Plugin>
            }));
            if added { info!(plugin = %id, "discovered external plugin"); }
        }
    }
}

fn executable_stem(exe: &Path) -> String {
    let name = exe.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    name.strip_suffix(EXECUTABLE_SUFFIX).filter(|s| !s.is_empty()).unwrap_or(&name).to_string()
}

/// Run `<exe> --expipe-manifest` and parse what it prints.
pub fn load_manifest(exe: &Path) -> Result<Manifest, PluginError> {
    let fail = |reason: String| PluginError::ExternalLoad { path: exe.to_path_buf(), reason };
    let out = process::Command::new(exe)
        .arg(MANIFEST_FLAG)
        .stdin(process::Stdio::null())
        .output()
        .map_err(|e| fail(e.to_string()))?;
    if !out.status.success() {
        let stderr = String::from_utf8_lossy(&out.stderr);
        return Err(fail(format!("exited with {}: {}", out.status, stderr.trim())));
    }
    let manifest: Manifest = serde_json::from_slice(&out.stdout).map_err(|e| fail(format!("invalid manifest: {e}")))?;
    if let Some(bad) = manifest.plugins.iter().find(|p| p.name.trim().is_empty()) {
        return Err(fail(format!("plugin entry without a name ({} commands)", bad.commands.len())));
    }
    Ok(manifest)
}
