use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use url::Url;

use crate::sync::RollbackStrategy;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
  /// Base of the REST surface (e.g. http://localhost:5000/api)
  pub api_url: String,
  /// Base the pre-warm asset paths are resolved against
  pub asset_url: String,
  /// Default log level; TASKSYNC_LOG overrides it
  pub log_level: String,
  pub cache: CacheConfig,
  pub sync: SyncConfig,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      api_url: "http://localhost:5000/api".to_string(),
      asset_url: "http://localhost:5000/".to_string(),
      log_level: "info".to_string(),
      cache: CacheConfig::default(),
      sync: SyncConfig::default(),
    }
  }
}

/// Response cache settings, injected into the policy engine and lifecycle manager.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  /// When false, nothing is stored and every lookup misses
  pub enabled: bool,
  /// Cache database location (defaults to the user data directory)
  pub path: Option<PathBuf>,
  /// Path prefix that classifies a request as an API resource
  pub api_prefix: String,
  pub generations: Generations,
  /// Application shell resources fetched on install, in order
  pub precache: Vec<String>,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      path: None,
      api_prefix: "/api/".to_string(),
      generations: Generations::default(),
      precache: vec!["./".to_string(), "./index.html".to_string()],
    }
  }
}

impl CacheConfig {
  /// Generations that survive activation.
  pub fn allow_list(&self) -> Vec<String> {
    vec![
      self.generations.static_assets.clone(),
      self.generations.api.clone(),
    ]
  }

  /// API resources are network-first; everything else is cache-first.
  pub fn is_api_resource(&self, url: &Url) -> bool {
    url.path().starts_with(&self.api_prefix)
  }
}

/// Generation names. Bumping a name invalidates that tier on the next activation.
#[derive(Debug, Clone, Deserialize)]
pub struct Generations {
  #[serde(rename = "static")]
  pub static_assets: String,
  pub api: String,
}

impl Default for Generations {
  fn default() -> Self {
    Self {
      static_assets: "tasksync-static-v1".to_string(),
      api: "tasksync-api-v1".to_string(),
    }
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
  pub rollback: RollbackStrategy,
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./tasksync.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/tasksync/config.yaml
  ///
  /// Falls back to defaults when no file is found.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("tasksync.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("tasksync").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents)?;
    Ok(config)
  }

  /// API base with a trailing slash, so relative endpoint joins keep the `/api` segment.
  pub fn api_base(&self) -> Result<Url> {
    parse_base(&self.api_url)
  }

  pub fn asset_base(&self) -> Result<Url> {
    parse_base(&self.asset_url)
  }
}

fn parse_base(raw: &str) -> Result<Url> {
  let normalized = if raw.ends_with('/') {
    raw.to_string()
  } else {
    format!("{}/", raw)
  };
  Url::parse(&normalized).map_err(|e| eyre!("Invalid base url '{}': {}", raw, e))
}
