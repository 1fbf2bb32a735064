#![allow(clippy::module_name_repetitions)]
//! Clone container lifecycle through the docker CLI.
//!
//! Containers are addressed by name and by the label pair attached at run time; nothing is
//! persisted on the side.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use crate::docker::command::{validate_object_name, DockerCommand};
use crate::docker::volumes::{resolve_volumes, MountInspector, VolumeSpec};
use crate::errors::ProvisionError;
use crate::host::HostInfoProvider;
use crate::pool::CloneConfig;
use crate::runner::CommandRunner;

/// Identity label key carried by every clone container.
pub const LABEL_CLONE: &str = "dblab_clone";

/// Mode of the clone socket directory; the database runs as a different user in the container.
pub const SOCKET_DIR_MODE: u32 = 0o777;

/// Remove and recreate `path`, then open its permissions. Safe whether or not it existed.
pub fn reset_socket_dir(path: &Path) -> Result<(), ProvisionError> {
    let fs_err = |source: io::Error| ProvisionError::Filesystem {
        path: path.to_path_buf(),
        source,
    };
    match fs::remove_dir_all(path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(fs_err(e)),
    }
    fs::create_dir_all(path).map_err(fs_err)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(SOCKET_DIR_MODE)).map_err(fs_err)?;
    }
    Ok(())
}

/// Orchestrates clone containers: run, stop, remove, list, logs, exec.
#[derive(Debug, Clone)]
pub struct CloneContainerManager<R, H, M> {
    runner: R,
    host: H,
    mounts: M,
}

impl<R, H, M> CloneContainerManager<R, H, M>
where
    R: CommandRunner,
    H: HostInfoProvider,
    M: MountInspector,
{
    pub fn new(runner: R, host: H, mounts: M) -> Self {
        Self {
            runner,
            host,
            mounts,
        }
    }

    /// Socket directory and volume binds for `config`, resolved against the current host.
    pub fn volumes(&self, config: &CloneConfig) -> Result<(PathBuf, Vec<VolumeSpec>), ProvisionError> {
        validate_object_name("clone name", &config.clone_name)?;
        let host = self
            .host
            .host_context()
            .map_err(|source| ProvisionError::HostInspection {
                context: "failed to get host info",
                source,
            })?;
        resolve_volumes(&host, config, &self.mounts)
    }

    /// Build the `docker run` invocation for `config` without touching the filesystem.
    pub fn run_command(&self, config: &CloneConfig) -> Result<DockerCommand, ProvisionError> {
        let (socket_dir, volumes) = self.volumes(config)?;
        Ok(build_commands(config, &socket_dir, &volumes)?.0)
    }

    /// Create and start the clone container, then attach it to the engine network.
    ///
    /// Every argument is validated before the socket directory is reset. No rollback happens
    /// when the network attach fails; the created container is left for the caller to destroy.
    pub fn run_container(&self, config: &CloneConfig) -> Result<String, ProvisionError> {
        let (socket_dir, volumes) = self.volumes(config)?;
        let (run, connect) = build_commands(config, &socket_dir, &volumes)?;
        ensure_inside_pool(config, &socket_dir)?;
        reset_socket_dir(&socket_dir)?;

        tracing::info!(clone = %config.clone_name, port = config.port, "running clone container");
        let out = self
            .runner
            .run(&run, true)
            .map_err(|e| ProvisionError::command("failed to run container", e))?;

        self.runner
            .run(&connect, true)
            .map_err(|e| ProvisionError::command("failed to connect container to network", e))?;
        Ok(out)
    }

    pub fn stop_container(&self, config: &CloneConfig) -> Result<String, ProvisionError> {
        let cmd = DockerCommand::new(["container", "stop"]).name("clone name", &config.clone_name)?;
        tracing::info!(clone = %config.clone_name, "stopping clone container");
        self.runner
            .run(&cmd, false)
            .map_err(|e| ProvisionError::command("failed to stop container", e))
    }

    pub fn remove_container(&self, name: &str) -> Result<String, ProvisionError> {
        let cmd = DockerCommand::new(["container", "rm", "--force", "--volumes"])
            .name("container name", name)?;
        tracing::info!(container = name, "removing clone container");
        self.runner
            .run(&cmd, false)
            .map_err(|e| ProvisionError::command("failed to remove container", e))
    }

    /// Names of all containers labelled as clones of `pool`; empty when none match.
    pub fn list_containers(&self, pool: &str) -> Result<Vec<String>, ProvisionError> {
        let cmd = DockerCommand::new(["container", "ls"])
            .option("--filter", &format!("label={LABEL_CLONE}"))?
            .option("--filter", &format!("label={pool}"))?
            .arg("--all")
            .option("--format", "{{.Names}}")?;
        let out = self
            .runner
            .run(&cmd, false)
            .map_err(|e| ProvisionError::command("failed to list containers", e))?;
        Ok(out
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Timestamped container logs for the trailing `since_minutes` minutes.
    pub fn get_logs(&self, config: &CloneConfig, since_minutes: u64) -> Result<String, ProvisionError> {
        let cmd = DockerCommand::new(["logs"])
            .name("clone name", &config.clone_name)?
            .option("--since", &format!("{since_minutes}m"))?
            .arg("--timestamps");
        self.runner
            .run(&cmd, true)
            .map_err(|e| ProvisionError::command("failed to get container logs", e))
    }

    /// Run `command` through `sh -c` inside the clone container.
    pub fn exec(&self, config: &CloneConfig, command: &str) -> Result<String, ProvisionError> {
        let cmd = DockerCommand::new(["exec"])
            .name("clone name", &config.clone_name)?
            .arg("sh")
            .arg("-c")
            .arg(command);
        self.runner
            .run(&cmd, true)
            .map_err(|e| ProvisionError::command("failed to exec command", e))
    }
}

/// The socket directory is removed recursively, so it must stay below the pool mount point.
fn ensure_inside_pool(config: &CloneConfig, socket_dir: &Path) -> Result<(), ProvisionError> {
    let mount_dir = config.pool.mount_dir();
    let relative = socket_dir
        .components()
        .all(|c| !matches!(c, Component::ParentDir | Component::CurDir));
    if !relative || socket_dir == mount_dir || !socket_dir.starts_with(mount_dir) {
        return Err(ProvisionError::invalid(
            "socket directory",
            format!(
                "{} is not inside pool mount dir {}",
                socket_dir.display(),
                mount_dir.display()
            ),
        ));
    }
    Ok(())
}

/// `docker run` and the `docker network connect` that follows it.
fn build_commands(
    config: &CloneConfig,
    socket_dir: &Path,
    volumes: &[VolumeSpec],
) -> Result<(DockerCommand, DockerCommand), ProvisionError> {
    let run = build_run_command(config, socket_dir, volumes)?;
    let connect = DockerCommand::new(["network", "connect"])
        .name("network id", &config.network_id)?
        .name("clone name", &config.clone_name)?;
    Ok((run, connect))
}

fn build_run_command(
    config: &CloneConfig,
    socket_dir: &Path,
    volumes: &[VolumeSpec],
) -> Result<DockerCommand, ProvisionError> {
    validate_object_name("clone name", &config.clone_name)?;
    let port = config.port.to_string();
    let mut cmd = DockerCommand::new(["run"])
        .option("--name", &config.clone_name)?
        .arg("--detach")
        .option("--publish", &format!("{port}:{port}"))?
        .option("--env", &format!("PGDATA={}", config.data_dir().display()))?
        .option("--env", &format!("PG_UNIX_SOCKET_DIR={}", socket_dir.display()))?
        .option("--env", &format!("PG_SERVER_PORT={port}"))?;

    for v in volumes {
        cmd = cmd.option("--volume", &v.to_string())?;
    }
    cmd = cmd
        .option("--label", &format!("{LABEL_CLONE}={}", config.pool.name))?
        .option("--label", &config.pool.name)?;
    for (name, value) in &config.container_conf {
        cmd = cmd.extra_flag(name, value)?;
    }
    cmd.image(&config.docker_image)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_socket_dir_is_idempotent() {
        let td = tempfile::tempdir().expect("tmpdir");
        let dir = td.path().join("clones").join("c1").join("sockets");
        reset_socket_dir(&dir).expect("first reset");
        fs::write(dir.join(".s.PGSQL.6000"), b"stale").expect("write");
        reset_socket_dir(&dir).expect("second reset");
        assert!(dir.is_dir());
        assert_eq!(fs::read_dir(&dir).expect("read_dir").count(), 0);
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&dir).expect("meta").permissions().mode() & 0o777;
            assert_eq!(mode, SOCKET_DIR_MODE);
        }
    }

    #[test]
    fn test_reset_socket_dir_reports_path() {
        let td = tempfile::tempdir().expect("tmpdir");
        let file = td.path().join("not-a-dir");
        fs::write(&file, b"x").expect("write");
        let err = reset_socket_dir(&file.join("sockets")).unwrap_err();
        match err {
            ProvisionError::Filesystem { path, .. } => assert!(path.ends_with("sockets")),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
