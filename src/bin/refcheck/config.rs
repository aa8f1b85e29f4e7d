use std::fs;
use std::path::{Path, PathBuf};

use refcheck::audit::StrategyKind;
use serde::Deserialize;
use thiserror::Error;

/// Settings read from the TOML config file.
///
/// ```toml
/// [store]
/// default = "/var/lib/app/store.json"
///
/// [scan]
/// root_name = "app"
/// strategies = ["relationship", "search-manager"]
///
/// [catalogs]
/// paths = ["zport/dmd/global_catalog"]
/// reindex = ["zport/dmd/Devices"]
/// ```
#[derive(Debug, Default)]
pub struct CliConfig {
    path: Option<PathBuf>,
    data: RawConfig,
}

impl CliConfig {
    /// Loads `explicit`, or the per-user default location. A missing file
    /// yields defaults.
    pub fn load(explicit: Option<PathBuf>) -> Result<Self, ConfigError> {
        let path = explicit.or_else(default_config_path);
        let data = match path.as_ref() {
            Some(config_path) if config_path.exists() => read_file(config_path)?,
            _ => RawConfig::default(),
        };
        Ok(Self { path, data })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn default_store(&self) -> Option<&PathBuf> {
        self.data.store.default_path.as_ref()
    }

    pub fn root_name(&self) -> Option<&str> {
        self.data.scan.root_name.as_deref()
    }

    pub fn strategies(&self) -> Option<&[StrategyKind]> {
        self.data.scan.strategies.as_deref()
    }

    pub fn catalogs(&self) -> &[String] {
        &self.data.catalogs.paths
    }

    pub fn reindex_targets(&self) -> Option<&[String]> {
        self.data.catalogs.reindex.as_deref()
    }
}

fn read_file(path: &Path) -> Result<RawConfig, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    #[serde(default)]
    store: StoreSection,
    #[serde(default)]
    scan: ScanSection,
    #[serde(default)]
    catalogs: CatalogSection,
}

#[derive(Debug, Default, Deserialize)]
struct StoreSection {
    #[serde(rename = "default")]
    default_path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct ScanSection {
    root_name: Option<String>,
    strategies: Option<Vec<StrategyKind>>,
}

#[derive(Debug, Default, Deserialize)]
struct CatalogSection {
    #[serde(default)]
    paths: Vec<String>,
    reindex: Option<Vec<String>>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|base| base.join("refcheck").join("config.toml"))
}
