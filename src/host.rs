#![allow(clippy::module_name_repetitions)]
//! Host metadata: virtualization role and hostname.

use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Whether the engine runs directly on a host or inside a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VirtualizationRole {
    Host,
    Guest,
}

impl VirtualizationRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            VirtualizationRole::Host => "host",
            VirtualizationRole::Guest => "guest",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "guest" | "container" => Some(VirtualizationRole::Guest),
            "host" | "bare" | "" => Some(VirtualizationRole::Host),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostContext {
    pub role: VirtualizationRole,
    /// In the guest role this is the engine's own container id/name.
    pub hostname: String,
}

impl HostContext {
    pub fn is_guest(&self) -> bool {
        self.role == VirtualizationRole::Guest
    }
}

/// Source of host metadata; queried fresh for every clone run.
pub trait HostInfoProvider {
    fn host_context(&self) -> io::Result<HostContext>;
}

/// Fixed answer, for tests and explicit overrides.
#[derive(Debug, Clone)]
pub struct StaticHostInfo(pub HostContext);

impl HostInfoProvider for StaticHostInfo {
    fn host_context(&self) -> io::Result<HostContext> {
        Ok(self.0.clone())
    }
}

/// Detects the role from container markers on the local filesystem.
#[derive(Debug, Clone)]
pub struct SystemHostInfo {
    root: PathBuf,
}

impl Default for SystemHostInfo {
    fn default() -> Self {
        Self {
            root: PathBuf::from("/"),
        }
    }
}

const CGROUP_CONTAINER_HINTS: &[&str] = &["docker", "lxc", "kubepods", "containerd", "libpod"];

impl SystemHostInfo {
    /// Inspect markers below `root` instead of `/`.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn marker(&self, rel: &str) -> PathBuf {
        self.root.join(rel.trim_start_matches('/'))
    }

    pub fn detect_role(&self) -> VirtualizationRole {
        if let Ok(v) = env::var("DBLAB_VIRTUALIZATION_ROLE") {
            if let Some(role) = VirtualizationRole::parse(&v) {
                return role;
            }
        }
        if self.marker("/.dockerenv").exists() || self.marker("/run/.containerenv").exists() {
            return VirtualizationRole::Guest;
        }
        if cgroup_mentions_container(&self.marker("/proc/1/cgroup")) {
            return VirtualizationRole::Guest;
        }
        VirtualizationRole::Host
    }
}

fn cgroup_mentions_container(path: &Path) -> bool {
    match fs::read_to_string(path) {
        Ok(s) => s
            .lines()
            .any(|l| CGROUP_CONTAINER_HINTS.iter().any(|h| l.contains(h))),
        Err(_) => false,
    }
}

impl HostInfoProvider for SystemHostInfo {
    fn host_context(&self) -> io::Result<HostContext> {
        let hostname = nix::unistd::gethostname()
            .map_err(io::Error::from)?
            .into_string()
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "hostname is not UTF-8"))?;
        let ctx = HostContext {
            role: self.detect_role(),
            hostname,
        };
        tracing::debug!(role = ctx.role.as_str(), hostname = %ctx.hostname, "host info");
        Ok(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_role() {
        assert_eq!(VirtualizationRole::parse("guest"), Some(VirtualizationRole::Guest));
        assert_eq!(VirtualizationRole::parse(" HOST "), Some(VirtualizationRole::Host));
        assert_eq!(VirtualizationRole::parse(""), Some(VirtualizationRole::Host));
        assert_eq!(VirtualizationRole::parse("vm"), None);
    }

    #[test]
    fn test_detect_role_from_markers() {
        std::env::remove_var("DBLAB_VIRTUALIZATION_ROLE");
        let td = tempfile::tempdir().expect("tmpdir");
        let info = SystemHostInfo::with_root(td.path());
        assert_eq!(info.detect_role(), VirtualizationRole::Host);

        fs::create_dir_all(td.path().join("proc/1")).expect("mkdir");
        fs::write(
            td.path().join("proc/1/cgroup"),
            "0::/system.slice/docker-1234.scope\n",
        )
        .expect("write cgroup");
        assert_eq!(info.detect_role(), VirtualizationRole::Guest);

        let td2 = tempfile::tempdir().expect("tmpdir");
        fs::write(td2.path().join(".dockerenv"), "").expect("write marker");
        assert_eq!(
            SystemHostInfo::with_root(td2.path()).detect_role(),
            VirtualizationRole::Guest
        );
    }

    #[test]
    fn test_static_host_info() {
        let info = StaticHostInfo(HostContext {
            role: VirtualizationRole::Guest,
            hostname: "dblab_server".to_string(),
        });
        let ctx = info.host_context().expect("ctx");
        assert!(ctx.is_guest());
        assert_eq!(ctx.hostname, "dblab_server");
    }
}
