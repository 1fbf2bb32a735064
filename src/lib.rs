//! dblab-engine: provisioning of disposable database clones in containers.
//!
//! The core computes bind-mount topology for clone containers (including when the engine
//! itself runs in a container), drives the clone container lifecycle through the docker CLI,
//! and makes sure images are present by draining the pull progress stream.

mod color;
pub mod api;
pub mod config;
pub mod docker;
pub mod errors;
pub mod host;
pub mod lock;
pub mod logging;
pub mod observe;
pub mod pool;
pub mod runner;
pub mod ui;
pub mod util;

pub use color::{
    color_enabled_stderr, color_enabled_stdout, log_error_stderr, log_info_stderr,
    log_warn_stderr, paint, set_color_mode, ColorMode,
};
pub use docker::{
    CancelToken, CloneContainerManager, ContainerRuntime, DockerCommand, DockerEngine,
    DockerMountInspector, ImageProvisioner, MountInspector, MountPoint, PullProgress, PullStream,
    VolumeSpec,
};
pub use errors::{exit_code_for_anyhow, exit_code_for_error, exit_code_for_io_error, ProvisionError};
pub use host::{HostContext, HostInfoProvider, StaticHostInfo, SystemHostInfo, VirtualizationRole};
pub use lock::CloneLock;
pub use pool::{CloneConfig, Pool};
pub use runner::{CommandError, CommandRunner, LocalRunner};
