//! Storage pool layout and per-clone configuration.
//!
//! The pool itself (copy-on-write filesystem, snapshots) lives outside this crate; only the
//! path-producing accessors are modelled here.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Read-only view of a storage pool's directory layout.
///
/// `clones_dir = mount_dir[/clones_sub_dir]`, `clone_dir = clones_dir/<clone>`,
/// `data_dir = clone_dir/<data_sub_dir>`, `socket_clone_dir = clone_dir/<socket_sub_dir>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Pool {
    pub name: String,
    pub mount_dir: PathBuf,
    pub clones_sub_dir: String,
    pub data_sub_dir: String,
    pub socket_sub_dir: String,
}

impl Default for Pool {
    fn default() -> Self {
        Self {
            name: "dblab_pool".to_string(),
            mount_dir: PathBuf::from("/var/lib/dblab/dblab_pool"),
            clones_sub_dir: "clones".to_string(),
            data_sub_dir: "data".to_string(),
            socket_sub_dir: "sockets".to_string(),
        }
    }
}

impl Pool {
    pub fn new(name: impl Into<String>, mount_dir: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            mount_dir: mount_dir.into(),
            ..Self::default()
        }
    }

    pub fn with_clones_sub_dir(mut self, sub: impl Into<String>) -> Self {
        self.clones_sub_dir = sub.into();
        self
    }

    pub fn with_data_sub_dir(mut self, sub: impl Into<String>) -> Self {
        self.data_sub_dir = sub.into();
        self
    }

    pub fn with_socket_sub_dir(mut self, sub: impl Into<String>) -> Self {
        self.socket_sub_dir = sub.into();
        self
    }

    pub fn mount_dir(&self) -> &Path {
        &self.mount_dir
    }

    pub fn clones_dir(&self) -> PathBuf {
        join_opt(&self.mount_dir, &self.clones_sub_dir)
    }

    pub fn clone_dir(&self, clone_name: &str) -> PathBuf {
        self.clones_dir().join(clone_name)
    }

    pub fn data_dir(&self, clone_name: &str) -> PathBuf {
        join_opt(&self.clone_dir(clone_name), &self.data_sub_dir)
    }

    pub fn socket_clone_dir(&self, clone_name: &str) -> PathBuf {
        join_opt(&self.clone_dir(clone_name), &self.socket_sub_dir)
    }
}

fn join_opt(base: &Path, sub: &str) -> PathBuf {
    let sub = sub.trim_matches('/');
    if sub.is_empty() {
        base.to_path_buf()
    } else {
        base.join(sub)
    }
}

/// Everything needed to run one clone container.
#[derive(Debug, Clone)]
pub struct CloneConfig {
    pub clone_name: String,
    pub port: u16,
    pub docker_image: String,
    pub network_id: String,
    /// Extra runtime flags rendered as `--name=value`; sorted for deterministic commands.
    pub container_conf: BTreeMap<String, String>,
    pub pool: Pool,
}

impl CloneConfig {
    pub fn new(clone_name: impl Into<String>, port: u16, pool: Pool) -> Self {
        Self {
            clone_name: clone_name.into(),
            port,
            docker_image: String::new(),
            network_id: String::new(),
            container_conf: BTreeMap::new(),
            pool,
        }
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.docker_image = image.into();
        self
    }

    pub fn with_network(mut self, network_id: impl Into<String>) -> Self {
        self.network_id = network_id.into();
        self
    }

    pub fn with_flag(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.container_conf.insert(name.into(), value.into());
        self
    }

    pub fn clone_dir(&self) -> PathBuf {
        self.pool.clone_dir(&self.clone_name)
    }

    pub fn data_dir(&self) -> PathBuf {
        self.pool.data_dir(&self.clone_name)
    }

    pub fn socket_dir(&self) -> PathBuf {
        self.pool.socket_clone_dir(&self.clone_name)
    }
}
