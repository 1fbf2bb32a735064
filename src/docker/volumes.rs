#![allow(clippy::module_name_repetitions)]
//! Bind-mount topology for clone containers.
//!
//! On a bare host the clone gets identity binds of its data and socket directories. When the
//! engine itself runs in a container, host-side paths are derived from the engine container's
//! own mounts: `--volumes-from` would carry the pool mount point itself instead of the pool data.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::docker::command::DockerCommand;
use crate::errors::ProvisionError;
use crate::host::HostContext;
use crate::pool::CloneConfig;
use crate::runner::CommandRunner;
use crate::util::rebase_path;

/// Mount sources that are never re-exposed inside a clone.
const SYSTEM_VOLUMES: &[&str] = &["/sys", "/lib", "/proc"];

/// Propagation mode for the derived socket mount; nested mount events must cross the guest boundary.
pub const SOCKET_PROPAGATION: &str = "rshared";

/// One mount of the engine's own container, as reported by `docker inspect`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct MountPoint {
    #[serde(rename = "Source", default)]
    pub source: String,
    #[serde(rename = "Destination", default)]
    pub destination: String,
    #[serde(rename = "BindOptions", default)]
    pub bind_options: Option<BindOptions>,
    #[serde(rename = "Propagation", default)]
    pub propagation: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct BindOptions {
    #[serde(rename = "Propagation", default)]
    pub propagation: Option<String>,
}

impl MountPoint {
    pub fn new(source: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            ..Self::default()
        }
    }

    pub fn with_propagation(mut self, mode: impl Into<String>) -> Self {
        self.bind_options = Some(BindOptions {
            propagation: Some(mode.into()),
        });
        self
    }

    /// Propagation mode, preferring `BindOptions`; empty strings count as unset.
    pub fn propagation_mode(&self) -> Option<&str> {
        self.bind_options
            .as_ref()
            .and_then(|b| b.propagation.as_deref())
            .or(self.propagation.as_deref())
            .filter(|p| !p.is_empty())
    }
}

/// A resolved bind for the clone container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeSpec {
    pub host_path: PathBuf,
    pub container_path: PathBuf,
    pub propagation: Option<String>,
}

impl VolumeSpec {
    pub fn bind(host_path: impl Into<PathBuf>, container_path: impl Into<PathBuf>) -> Self {
        Self {
            host_path: host_path.into(),
            container_path: container_path.into(),
            propagation: None,
        }
    }

    pub fn identity(path: impl Into<PathBuf>) -> Self {
        let p = path.into();
        Self::bind(p.clone(), p)
    }

    pub fn with_propagation(mut self, mode: impl Into<String>) -> Self {
        self.propagation = Some(mode.into());
        self
    }
}

impl fmt::Display for VolumeSpec {
    /// `host:container[:propagation]`, the `--volume` argument form.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}",
            self.host_path.display(),
            self.container_path.display()
        )?;
        if let Some(p) = &self.propagation {
            write!(f, ":{p}")?;
        }
        Ok(())
    }
}

/// Lists the mounts of the engine's own container.
pub trait MountInspector {
    fn container_mounts(&self, container: &str) -> Result<Vec<MountPoint>, ProvisionError>;
}

/// Mount introspection through `docker inspect -f '{{ json .Mounts }}'`.
#[derive(Debug, Clone)]
pub struct DockerMountInspector<R> {
    runner: R,
}

impl<R: CommandRunner> DockerMountInspector<R> {
    pub fn new(runner: R) -> Self {
        Self { runner }
    }
}

impl<R: CommandRunner> MountInspector for DockerMountInspector<R> {
    fn container_mounts(&self, container: &str) -> Result<Vec<MountPoint>, ProvisionError> {
        let cmd = DockerCommand::new(["inspect"])
            .option("-f", "{{ json .Mounts }}")?
            .name("container name", container)?;
        let out = self
            .runner
            .run(&cmd, true)
            .map_err(|e| ProvisionError::HostInspection {
                context: "failed to get container mounts",
                source: io::Error::other(e),
            })?;
        parse_mount_points(&out)
    }
}

/// Parse the JSON mount array printed by `docker inspect`.
pub fn parse_mount_points(raw: &str) -> Result<Vec<MountPoint>, ProvisionError> {
    serde_json::from_str(raw.trim()).map_err(|e| ProvisionError::HostInspection {
        context: "failed to interpret mount paths",
        source: io::Error::new(io::ErrorKind::InvalidData, e),
    })
}

fn is_system_volume(source: &str) -> bool {
    SYSTEM_VOLUMES.iter().any(|s| source.starts_with(s))
}

/// Identity binds of the clone directory and the socket directory.
pub fn default_volumes(config: &CloneConfig) -> (PathBuf, Vec<VolumeSpec>) {
    let socket_dir = config.socket_dir();
    let volumes = vec![
        VolumeSpec::identity(config.clone_dir()),
        VolumeSpec::identity(socket_dir.clone()),
    ];
    (socket_dir, volumes)
}

/// Volumes derived from the engine container's mounts (guest role).
pub fn volumes_from_mount_points(config: &CloneConfig, mounts: &[MountPoint]) -> Vec<VolumeSpec> {
    let socket_dir = config.socket_dir();
    let mount_dir = config.pool.mount_dir();
    let mut volumes = Vec::with_capacity(mounts.len() + 1);

    if let Some((mp, host_socket_dir)) = mounts.iter().find_map(|mp| {
        if mp.destination.is_empty() {
            return None;
        }
        // Prefix match by path component, so /run/sock2 is not under /run/sock.
        rebase_path(&socket_dir, Path::new(&mp.destination), Path::new(&mp.source))
            .map(|host| (mp, host))
    }) {
        tracing::debug!(
            source = %mp.source,
            destination = %mp.destination,
            "socket directory resolved through engine mount"
        );
        volumes.push(
            VolumeSpec::bind(host_socket_dir, socket_dir.clone()).with_propagation(SOCKET_PROPAGATION),
        );
    }

    // Mount dir match is by path component, so /data/pool2 is not under /data/pool.
    for mp in mounts {
        if is_system_volume(&mp.source) || !Path::new(&mp.source).starts_with(mount_dir) {
            continue;
        }
        let mut volume = VolumeSpec::bind(&mp.source, &mp.destination);
        if let Some(mode) = mp.propagation_mode() {
            volume = volume.with_propagation(mode);
        }
        volumes.push(volume);
    }

    volumes
}

/// Pure topology resolution: `(socket_dir, volumes)` for the given host context.
///
/// The mount list is only consulted in the guest role.
pub fn resolve(
    host: &HostContext,
    config: &CloneConfig,
    mounts: &[MountPoint],
) -> (PathBuf, Vec<VolumeSpec>) {
    if host.is_guest() {
        (config.socket_dir(), volumes_from_mount_points(config, mounts))
    } else {
        default_volumes(config)
    }
}

/// Resolve volumes, inspecting the engine container's mounts only when nested.
pub fn resolve_volumes<M: MountInspector + ?Sized>(
    host: &HostContext,
    config: &CloneConfig,
    inspector: &M,
) -> Result<(PathBuf, Vec<VolumeSpec>), ProvisionError> {
    if !host.is_guest() {
        return Ok(default_volumes(config));
    }
    let mounts = inspector.container_mounts(&host.hostname)?;
    Ok(resolve(host, config, &mounts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::VirtualizationRole;
    use crate::pool::Pool;

    fn guest() -> HostContext {
        HostContext {
            role: VirtualizationRole::Guest,
            hostname: "dblab_server".to_string(),
        }
    }

    fn config() -> CloneConfig {
        let pool = Pool::new("dblab_pool", "/var/lib/dblab/dblab_pool");
        CloneConfig::new("dblab_clone_6000", 6000, pool)
    }

    #[test]
    fn test_volume_display() {
        assert_eq!(VolumeSpec::identity("/a/b").to_string(), "/a/b:/a/b");
        assert_eq!(
            VolumeSpec::bind("/h", "/c").with_propagation("rshared").to_string(),
            "/h:/c:rshared"
        );
    }

    #[test]
    fn test_parse_mount_points_accepts_both_propagation_shapes() {
        let raw = r#"[
            {"Type":"bind","Source":"/var/lib/dblab","Destination":"/var/lib/dblab","Mode":"","RW":true,"Propagation":"rshared"},
            {"Source":"/host/run","Destination":"/run/dblab","BindOptions":{"Propagation":"rslave"}},
            {"Source":"/host/x","Destination":"/x","Propagation":""}
        ]"#;
        let mounts = parse_mount_points(raw).expect("parse");
        assert_eq!(mounts.len(), 3);
        assert_eq!(mounts[0].propagation_mode(), Some("rshared"));
        assert_eq!(mounts[1].propagation_mode(), Some("rslave"));
        assert_eq!(mounts[2].propagation_mode(), None);
    }

    #[test]
    fn test_parse_mount_points_rejects_garbage() {
        let err = parse_mount_points("Error: No such object: dblab_server").unwrap_err();
        assert!(matches!(err, ProvisionError::HostInspection { .. }));
    }

    #[test]
    fn test_host_socket_path_is_rebased_onto_source() {
        let mounts = vec![MountPoint::new("/mnt/hostpool", "/var/lib/dblab")];
        let volumes = volumes_from_mount_points(&config(), &mounts);
        assert_eq!(
            volumes,
            vec![VolumeSpec::bind(
                "/mnt/hostpool/dblab_pool/clones/dblab_clone_6000/sockets",
                "/var/lib/dblab/dblab_pool/clones/dblab_clone_6000/sockets",
            )
            .with_propagation("rshared")]
        );
    }

    #[test]
    fn test_propagation_is_carried_forward() {
        let mounts = vec![
            MountPoint::new("/var/lib/dblab/dblab_pool", "/var/lib/dblab/dblab_pool")
                .with_propagation("rshared"),
        ];
        let (_, volumes) = resolve(&guest(), &config(), &mounts);
        assert_eq!(volumes.len(), 2);
        assert_eq!(
            volumes[1].to_string(),
            "/var/lib/dblab/dblab_pool:/var/lib/dblab/dblab_pool:rshared"
        );
    }

    #[test]
    fn test_sibling_directory_is_not_under_mount_dir() {
        let mounts = vec![MountPoint::new(
            "/var/lib/dblab/dblab_pool2",
            "/var/lib/dblab/dblab_pool2",
        )];
        let (_, volumes) = resolve(&guest(), &config(), &mounts);
        assert!(volumes.is_empty(), "{volumes:?}");
    }
}
