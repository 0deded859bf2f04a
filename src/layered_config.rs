// expipe/src/layered_config.rs

use clap::ValueEnum;
use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt, fs, path::{Path, PathBuf}};
use tracing::debug;

use crate::error::ConfigError;
use crate::project_root::MARKER_FILE;

/// Environment variable overriding `<home>/.config/expipe`.
pub const CONFIG_DIR_ENV: &str = "EXPIPE_CONFIG_DIR";
/// Key holding the list of plugin names in every layer.
pub const PLUGINS_KEY: &str = "plugins";

const GLOBAL_FILE: &str = "config.yaml";

/// Layers ordered from lowest to highest precedence.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, ValueEnum)]
pub enum LayerKind {
    Global,
    #[value(name = "project", alias = "user")]
    Identity,
    Local,
}

impl LayerKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Global => "global",
            Self::Identity => "project",
            Self::Local => "local",
        }
    }
}

impl fmt::Display for LayerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.name()) }
}

/// A single setting: a scalar or a list of strings. An empty YAML value is `Null`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<String>),
}

impl ConfigValue {
    /// Parse command-line input as a YAML scalar, falling back to a plain string.
    /// Blank input stays an empty string; only an explicit `~` or `null` is `Null`.
    pub fn parse_lossy(raw: &str) -> Self {
        if raw.trim().is_empty() { return Self::String(raw.to_string()); }
        serde_yaml::from_str::<ConfigValue>(raw).unwrap_or_else(|_| Self::String(raw.to_string()))
    }

    /// Entries of a list; a lone string is a one-element list.
    pub fn names(&self) -> Vec<&str> {
        match self {
            Self::List(items) => items.iter().map(String::as_str).collect(),
            Self::String(s) => vec![s.as_str()],
            _ => Vec::new(),
        }
    }

    /// Lists are sets of unique strings; keep the first occurrence of each.
    fn dedup(&mut self) {
        if let Self::List(items) = self {
            let mut seen = std::collections::HashSet::new();
            items.retain(|s| seen.insert(s.clone()));
        }
    }
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("~"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::String(s) => f.write_str(s),
            Self::List(items) => write!(f, "[{}]", items.join(", ")),
        }
    }
}

impl From<&str> for ConfigValue {
    fn from(s: &str) -> Self { Self::String(s.to_string()) }
}

impl From<bool> for ConfigValue {
    fn from(b: bool) -> Self { Self::Bool(b) }
}

impl From<Vec<String>> for ConfigValue {
    fn from(items: Vec<String>) -> Self { Self::List(items) }
}

pub type ConfigMap = BTreeMap<String, ConfigValue>;

/// Where the global and identity layers live.
#[derive(Clone, Debug)]
pub struct ConfigPaths {
    pub config_dir: PathBuf,
}

impl ConfigPaths {
    pub fn new(config_dir: impl Into<PathBuf>) -> Self { Self { config_dir: config_dir.into() } }

    /// `$EXPIPE_CONFIG_DIR`, else `<home>/.config/expipe`.
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Some(dir) = std::env::var_os(CONFIG_DIR_ENV).filter(|d| !d.is_empty()) {
            return Ok(Self::new(dir));
        }
        let base = BaseDirs::new().ok_or(ConfigError::NoHomeDirectory)?;
        Ok(Self::new(base.home_dir().join(".config").join("expipe")))
    }

    pub fn global_root(&self) -> PathBuf { self.config_dir.clone() }
    pub fn identity_root(&self, project_id: &str) -> PathBuf { self.config_dir.join(project_id) }
}

/// One configuration source: a root directory, its file and the parsed values.
#[derive(Clone, Debug)]
pub struct ConfigLayer {
    kind: LayerKind,
    root: PathBuf,
    path: PathBuf,
    values: ConfigMap,
}

impl ConfigLayer {
    /// Describe a layer without touching the filesystem.
    pub fn new(kind: LayerKind, root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let path = match kind {
            LayerKind::Global => root.join(GLOBAL_FILE),
            LayerKind::Identity => {
                let id = root.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
                root.join(format!("{id}.yaml"))
            }
            LayerKind::Local => root.join(MARKER_FILE),
        };
        Self { kind, root, path, values: ConfigMap::new() }
    }

    /// Construct and read in one step.
    pub fn open(kind: LayerKind, root: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let mut layer = Self::new(kind, root);
        layer.load()?;
        Ok(layer)
    }

    pub fn kind(&self) -> LayerKind { self.kind }
    pub fn root(&self) -> &Path { &self.root }
    pub fn path(&self) -> &Path { &self.path }
    pub fn values(&self) -> &ConfigMap { &self.values }
    pub fn get(&self, key: &str) -> Option<&ConfigValue> { self.values.get(key) }

    /// Plugin names listed in this layer; a scalar string counts as a single name.
    pub fn plugins(&self) -> Vec<&str> {
        self.values.get(PLUGINS_KEY).map(ConfigValue::names).unwrap_or_default()
    }

    /// Read the file; a missing file is an empty mapping.
    pub fn load(&mut self) -> Result<&ConfigMap, ConfigError> {
        self.values = read_map(&self.path)?;
        Ok(&self.values)
    }

    /// Persist `values`, creating the root directory when needed.
    pub fn write(&mut self, mut values: ConfigMap) -> Result<(), ConfigError> {
        values.values_mut().for_each(ConfigValue::dedup);
        let text = serde_yaml::to_string(&values)
            .map_err(|source| ConfigError::Serialize { path: self.path.clone(), source })?;
        fs::create_dir_all(&self.root).map_err(|e| ConfigError::io(&self.root, e))?;
        fs::write(&self.path, text).map_err(|e| ConfigError::io(&self.path, e))?;
        debug!(layer = %self.kind, path = %self.path.display(), "wrote config layer");
        self.values = values;
        Ok(())
    }
}

pub fn read_map(path: &Path) -> Result<ConfigMap, ConfigError> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(ConfigMap::new()),
        Err(e) => return Err(ConfigError::io(path, e)),
    };
    if text.trim().is_empty() { return Ok(ConfigMap::new()); }
    let parsed: Option<ConfigMap> = serde_yaml::from_str(&text)
        .map_err(|source| ConfigError::MalformedConfigFile { path: path.to_path_buf(), source })?;
    Ok(parsed.unwrap_or_default())
}
