#![allow(clippy::module_name_repetitions)]
//! Clone container provisioning: volume topology, container lifecycle, image preparation,
//! and the runtime clients underneath them.

pub mod command;
pub mod container;
pub mod engine;
pub(crate) mod http;
pub mod images;
pub mod volumes;

pub use command::DockerCommand;
pub use container::{reset_socket_dir, CloneContainerManager, LABEL_CLONE};
pub use engine::{CancelToken, ContainerRuntime, DockerEngine, EngineError};
pub use images::{ImageProvisioner, PullProgress, PullStream};
pub use volumes::{
    resolve, resolve_volumes, DockerMountInspector, MountInspector, MountPoint, VolumeSpec,
};

use std::io;
use std::path::PathBuf;

use which::which;

/// Locate the docker CLI on PATH.
pub fn container_runtime_path() -> io::Result<PathBuf> {
    which("docker").map_err(|_| {
        io::Error::new(
            io::ErrorKind::NotFound,
            "Docker is required but was not found in PATH.",
        )
    })
}
