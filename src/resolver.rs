// expipe/src/resolver.rs

// Effective value of a key: local, then project identity, then global.
// The `plugins` key is the exception: its names are unioned across all three layers.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::ConfigError;
use crate::layered_config::{ConfigLayer, ConfigMap, ConfigPaths, ConfigValue, LayerKind};
use crate::project_root;

/// Which project, if any, this invocation operates on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProjectContext {
    /// Inside a directory tree marked by a local config file.
    Local { root: PathBuf, project_id: String },
    /// Named explicitly by the caller from outside any project.
    Named { project_id: String },
    /// Neither; only the global layer applies.
    Detached,
}

impl ProjectContext {
    pub fn project_id(&self) -> Option<&str> {
        match self {
            Self::Local { project_id, .. } | Self::Named { project_id } => Some(project_id),
            Self::Detached => None,
        }
    }

    pub fn local_root(&self) -> Option<&Path> {
        match self {
            Self::Local { root, .. } => Some(root),
            _ => None,
        }
    }
}

/// Outcome of looking for the project the caller means.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProjectLookup {
    Found(ProjectContext),
    NotInProject,
    Conflict { explicit: String, local_root: PathBuf },
}

#[derive(Clone, Debug)]
pub struct ConfigResolver {
    paths: ConfigPaths,
}

impl ConfigResolver {
    pub fn new(paths: ConfigPaths) -> Self { Self { paths } }
    pub fn paths(&self) -> &ConfigPaths { &self.paths }

    pub fn lookup(&self, cwd: &Path, explicit: Option<&str>) -> Result<ProjectLookup, ConfigError> {
        let local_root = project_root::locate(cwd);
        Ok(match (local_root, explicit) {
            (Some(root), Some(id)) => ProjectLookup::Conflict { explicit: id.to_string(), local_root: root },
            (Some(root), None) => {
                let project_id = root
                    .file_name()
                    .and_then(|n| n.to_str())
                    .map(str::to_string)
                    .ok_or_else(|| ConfigError::InvalidProjectId(root.display().to_string()))?;
                ProjectLookup::Found(ProjectContext::Local { root, project_id })
            }
            (None, Some(id)) => {
                validate_project_id(id)?;
                ProjectLookup::Found(ProjectContext::Named { project_id: id.to_string() })
            }
            (None, None) => ProjectLookup::NotInProject,
        })
    }

    /// Resolve all layers for `cwd`. Outside a project without an explicit id
    /// the result is [`ProjectContext::Detached`]; callers that need a project
    /// use [`ResolvedConfig::require_project_id`].
    pub fn resolve(&self, cwd: &Path, explicit: Option<&str>) -> Result<ResolvedConfig, ConfigError> {
        let context = match self.lookup(cwd, explicit)? {
            ProjectLookup::Found(ctx) => ctx,
            ProjectLookup::NotInProject => ProjectContext::Detached,
            ProjectLookup::Conflict { explicit, local_root } => {
                return Err(ConfigError::ConflictingProjectIdentity { explicit, local_root });
            }
        };
        debug!(?context, config_dir = %self.paths.config_dir.display(), "resolving configuration");

        let global = ConfigLayer::open(LayerKind::Global, self.paths.global_root())?;
        let identity = context
            .project_id()
            .map(|id| ConfigLayer::open(LayerKind::Identity, self.paths.identity_root(id)))
            .transpose()?;
        let local = context
            .local_root()
            .map(|root| ConfigLayer::open(LayerKind::Local, root))
            .transpose()?;
        Ok(ResolvedConfig { context, global, identity, local })
    }

    /// Like [`resolve`](Self::resolve) but fails when no project applies.
    pub fn resolve_project(&self, cwd: &Path, explicit: Option<&str>) -> Result<ResolvedConfig, ConfigError> {
        let resolved = self.resolve(cwd, explicit)?;
        resolved.require_project_id()?;
        Ok(resolved)
    }
}

fn validate_project_id(id: &str) -> Result<(), ConfigError> {
    let bad = id.is_empty()
        || id == "."
        || id == ".."
        || id.contains(['/', '\\'])
        || Path::new(id).is_absolute();
    if bad { Err(ConfigError::InvalidProjectId(id.to_string())) } else { Ok(()) }
}

/// The merged view of the global, identity and local layers.
#[derive(Clone, Debug)]
pub struct ResolvedConfig {
    context: ProjectContext,
    global: ConfigLayer,
    identity: Option<ConfigLayer>,
    local: Option<ConfigLayer>,
}

impl ResolvedConfig {
    pub fn context(&self) -> &ProjectContext { &self.context }
    pub fn project_id(&self) -> Option<&str> { self.context.project_id() }
    pub fn local_root(&self) -> Option<&Path> { self.context.local_root() }

    pub fn require_project_id(&self) -> Result<&str, ConfigError> {
        self.project_id().ok_or(ConfigError::MissingProjectIdentity)
    }

    pub fn layer(&self, kind: LayerKind) -> Option<&ConfigLayer> {
        match kind {
            LayerKind::Global => Some(&self.global),
            LayerKind::Identity => self.identity.as_ref(),
            LayerKind::Local => self.local.as_ref(),
        }
    }

    /// Present layers, highest precedence first.
    fn by_precedence(&self) -> impl Iterator<Item = &ConfigLayer> {
        [self.local.as_ref(), self.identity.as_ref(), Some(&self.global)].into_iter().flatten()
    }

    pub fn get(&self, key: &str) -> Option<&ConfigValue> {
        self.get_with_source(key).map(|(_, v)| v)
    }

    pub fn get_with_source(&self, key: &str) -> Option<(LayerKind, &ConfigValue)> {
        self.by_precedence().find_map(|layer| layer.get(key).map(|v| (layer.kind(), v)))
    }

    /// Every key with its effective value and the layer it came from.
    pub fn effective(&self) -> BTreeMap<&str, (LayerKind, &ConfigValue)> {
        let mut out = BTreeMap::new();
        for layer in self.by_precedence() {
            for (k, v) in layer.values() {
                out.entry(k.as_str()).or_insert((layer.kind(), v));
            }
        }
        out
    }

    /// Plugin names from all layers, deduplicated.
    pub fn plugins(&self) -> BTreeSet<String> {
        self.by_precedence().flat_map(|layer| layer.plugins()).map(str::to_string).collect()
    }

    /// Apply `edit` to one layer's values and persist the result.
    pub fn update<F>(&mut self, kind: LayerKind, edit: F) -> Result<&Path, ConfigError>
    where
        F: FnOnce(&mut ConfigMap),
    {
        let layer = match kind {
            LayerKind::Global => &mut self.global,
            LayerKind::Identity => self.identity.as_mut().ok_or(ConfigError::MissingProjectIdentity)?,
            LayerKind::Local => self.local.as_mut().ok_or(ConfigError::LayerUnavailable("local"))?,
        };
        let mut values = layer.values().clone();
        edit(&mut values);
        layer.write(values)?;
        Ok(layer.path())
    }
}
