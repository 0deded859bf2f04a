// expipe/src/error.rs

use std::path::PathBuf;
use thiserror::Error;

use crate::plugin::PluginId;

/// Failures while locating, reading or writing configuration layers.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("project id '{explicit}' was given, but the current directory is inside project {}", local_root.display())]
    ConflictingProjectIdentity { explicit: String, local_root: PathBuf },

    #[error("no project found: move into a project directory or pass a project id")]
    MissingProjectIdentity,

    #[error("invalid project id '{0}'")]
    InvalidProjectId(String),

    #[error("malformed config file {}: {source}", path.display())]
    MalformedConfigFile {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("failed to serialize config for {}: {source}", path.display())]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unable to determine the home directory")]
    NoHomeDirectory,

    #[error("the {0} layer is not available outside a project")]
    LayerUnavailable(&'static str),
}

impl ConfigError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }
}

/// Failures in plugin lookup, discovery and attachment.
#[derive(Debug, Error)]
pub enum PluginError {
    #[error("the plugin {0} cannot be found")]
    NotFound(String),

    #[error("configured plugin '{0}' does not match any known plugin")]
    UnresolvedReference(String),

    #[error("error when loading plugin `{plugin}`: {source}")]
    Attachment {
        plugin: PluginId,
        #[source]
        source: anyhow::Error,
    },

    #[error("command '{command}' is already attached by another plugin")]
    DuplicateCommand { command: String },

    #[error("failed to load external plugin {}: {reason}", path.display())]
    ExternalLoad { path: PathBuf, reason: String },

    #[error("plugin `{plugin}` command '{command}' exited with status {}", code.map_or_else(|| "signal".to_string(), |c| c.to_string()))]
    ExternalCommand { plugin: PluginId, command: String, code: Option<i32> },
}
