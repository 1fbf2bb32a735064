//! Engine configuration: YAML file, `.env`, then `DBLAB_*` environment overrides.
//!
//! Every field has a default so an empty or missing file is a valid configuration.

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::docker::engine::DEFAULT_DOCKER_SOCKET;
use crate::pool::{CloneConfig, Pool};

pub const DEFAULT_IMAGE: &str = "postgresai/extended-postgres:16";
pub const DEFAULT_NETWORK: &str = "dblab_internal";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub pool: Pool,
    pub docker_socket: PathBuf,
    /// Docker CLI binary; looked up on PATH when unset.
    pub docker_path: Option<PathBuf>,
    /// Pin Engine API requests to this version (e.g. `1.43`).
    pub api_version: Option<String>,
    pub network_id: String,
    pub image: String,
    /// Extra runtime flags passed to every clone container as `--name=value`.
    pub container_conf: BTreeMap<String, String>,
    pub lock_dir: Option<PathBuf>,
    pub state_dir: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pool: Pool::default(),
            docker_socket: PathBuf::from(DEFAULT_DOCKER_SOCKET),
            docker_path: None,
            api_version: None,
            network_id: DEFAULT_NETWORK.to_string(),
            image: DEFAULT_IMAGE.to_string(),
            container_conf: BTreeMap::new(),
            lock_dir: None,
            state_dir: None,
        }
    }
}

/// `~/.dblab/engine.yml`
pub fn default_config_path() -> Option<PathBuf> {
    home::home_dir().map(|h| h.join(".dblab").join("engine.yml"))
}

/// `~/.dblab`, falling back to the temp dir when HOME is unknown.
pub fn default_state_dir() -> PathBuf {
    home::home_dir()
        .map(|h| h.join(".dblab"))
        .unwrap_or_else(|| env::temp_dir().join("dblab"))
}

impl EngineConfig {
    /// Load from `explicit`, else the default path when it exists, then apply env overrides.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut cfg = match explicit {
            Some(p) => Self::from_file(p)?,
            None => match default_config_path().filter(|p| p.is_file()) {
                Some(p) => Self::from_file(&p)?,
                None => Self::default(),
            },
        };
        cfg.apply_overrides(|k| env::var(k).ok());
        Ok(cfg)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("cannot read config {}", path.display()))?;
        Self::from_yaml(&raw).with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn from_yaml(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(raw)?)
    }

    /// Apply `DBLAB_*` overrides; empty values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |k: &str| lookup(k).filter(|v| !v.trim().is_empty());
        if let Some(v) = get("DBLAB_POOL_NAME") {
            self.pool.name = v;
        }
        if let Some(v) = get("DBLAB_POOL_MOUNT_DIR") {
            self.pool.mount_dir = PathBuf::from(v);
        }
        if let Some(v) = get("DBLAB_DOCKER_SOCKET") {
            self.docker_socket = PathBuf::from(v);
        }
        if let Some(v) = get("DBLAB_NETWORK_ID") {
            self.network_id = v;
        }
        if let Some(v) = get("DBLAB_IMAGE") {
            self.image = v;
        }
        if let Some(v) = get("DBLAB_LOCK_DIR") {
            self.lock_dir = Some(PathBuf::from(v));
        }
    }

    pub fn lock_dir(&self) -> PathBuf {
        self.lock_dir
            .clone()
            .unwrap_or_else(crate::lock::default_lock_dir)
    }

    pub fn state_dir(&self) -> PathBuf {
        self.state_dir.clone().unwrap_or_else(default_state_dir)
    }

    /// Clone request for `clone_name` on `port`, carrying the configured image, network and flags.
    pub fn clone_config(&self, clone_name: &str, port: u16) -> CloneConfig {
        let mut c = CloneConfig::new(clone_name, port, self.pool.clone())
            .with_image(&self.image)
            .with_network(&self.network_id);
        for (k, v) in &self.container_conf {
            c = c.with_flag(k, v);
        }
        c
    }

    pub fn docker_path(&self) -> std::io::Result<PathBuf> {
        match &self.docker_path {
            Some(p) => Ok(p.clone()),
            None => crate::docker::container_runtime_path(),
        }
    }
}
