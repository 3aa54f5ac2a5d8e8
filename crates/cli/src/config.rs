#![forbid(unsafe_code)]

use mptt_core::{Identifier, TreeSpec};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_CONFIG_FILE: &str = "mptt.toml";
pub const DEFAULT_STORAGE_DIR: &str = ".mptt";

/// Parsed `mptt.toml`: where the database lives and how each tree type is
/// laid out.
#[derive(Debug, Default)]
pub struct CliConfig {
    path: Option<PathBuf>,
    storage_dir: Option<PathBuf>,
    trees: BTreeMap<String, TreeSpec>,
}

impl CliConfig {
    /// An explicit path must exist; the default `mptt.toml` is optional.
    pub fn load(explicit: Option<PathBuf>) -> Result<Self, ConfigError> {
        let (path, required) = match explicit {
            Some(path) => (path, true),
            None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
        };
        if !required && !path.exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        let mut config = Self::from_toml_str(&contents).map_err(|err| err.at(&path))?;
        config.path = Some(path);
        Ok(config)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = toml::from_str(contents).map_err(|source| ConfigError::Parse {
            path: None,
            source,
        })?;
        let mut trees = BTreeMap::new();
        for raw_tree in &raw.tree {
            let spec = convert_tree(raw_tree)?;
            let name = spec.tree_type().to_string();
            if trees.insert(name.clone(), spec).is_some() {
                return Err(ConfigError::DuplicateTree { tree_type: name });
            }
        }
        Ok(Self {
            path: None,
            storage_dir: raw.storage_dir,
            trees,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// `override_dir` (flag or env) wins over the file, which wins over the
    /// built-in default.
    pub fn storage_dir(&self, override_dir: Option<&Path>) -> PathBuf {
        override_dir
            .map(Path::to_path_buf)
            .or_else(|| self.storage_dir.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STORAGE_DIR))
    }

    pub fn trees(&self) -> impl Iterator<Item = &TreeSpec> {
        self.trees.values()
    }

    /// Trees missing from the file fall back to the default layout.
    pub fn tree_spec(&self, tree_type: &str) -> Result<TreeSpec, ConfigError> {
        if let Some(spec) = self.trees.get(tree_type) {
            return Ok(spec.clone());
        }
        let ident = identifier("tree_type", tree_type)?;
        Ok(TreeSpec::new(ident))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    #[serde(default)]
    storage_dir: Option<PathBuf>,
    #[serde(default)]
    tree: Vec<RawTree>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawTree {
    tree_type: String,
    #[serde(default)]
    parent_field: Option<String>,
    #[serde(default)]
    single_root: bool,
    #[serde(default)]
    allow_root_deletion: bool,
}

fn identifier(field: &'static str, value: &str) -> Result<Identifier, ConfigError> {
    Identifier::try_new(value).map_err(|err| ConfigError::InvalidIdentifier {
        field,
        value: value.to_string(),
        reason: err.message(),
    })
}

fn convert_tree(raw: &RawTree) -> Result<TreeSpec, ConfigError> {
    let mut spec = TreeSpec::new(identifier("tree_type", &raw.tree_type)?)
        .with_single_root(raw.single_root)
        .with_root_deletion(raw.allow_root_deletion);
    if let Some(parent_field) = raw.parent_field.as_deref() {
        spec = spec.with_parent_field(identifier("parent_field", parent_field)?);
    }
    Ok(spec)
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config{}: {source}", display_path(.path))]
    Parse {
        path: Option<PathBuf>,
        source: toml::de::Error,
    },
    #[error("invalid {field} '{value}': {reason}")]
    InvalidIdentifier {
        field: &'static str,
        value: String,
        reason: &'static str,
    },
    #[error("tree type '{tree_type}' is configured twice")]
    DuplicateTree { tree_type: String },
}

impl ConfigError {
    fn at(self, path: &Path) -> Self {
        match self {
            Self::Parse { source, .. } => Self::Parse {
                path: Some(path.to_path_buf()),
                source,
            },
            other => other,
        }
    }
}

fn display_path(path: &Option<PathBuf>) -> String {
    path.as_ref()
        .map(|path| format!(" {}", path.display()))
        .unwrap_or_default()
}
