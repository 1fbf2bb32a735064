//! Error mapping guide:
//! - Library operations return ProvisionError; each variant names the failed step.
//! - Map io::ErrorKind::NotFound to exit code 127 (docker binary missing); all others to 1.
//! - No retries happen at this layer; callers own retry policy.
use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::docker::engine::EngineError;
use crate::runner::CommandError;

/// Failures surfaced by the provisioning engine.
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// Virtualization role or the engine's own mount list could not be determined.
    #[error("host inspection failed: {context}: {source}")]
    HostInspection {
        context: &'static str,
        #[source]
        source: io::Error,
    },

    /// The clone socket directory could not be reset.
    #[error("failed to prepare socket directory {}: {source}", path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A docker command (run/stop/remove/list/connect/logs/exec) failed.
    #[error("{step}: {source}")]
    CommandExecution {
        step: &'static str,
        #[source]
        source: CommandError,
    },

    /// Image listing, pulling or container inspection failed at the runtime API.
    #[error("{step}: {source}")]
    Image {
        step: &'static str,
        #[source]
        source: EngineError,
    },

    /// A pull progress record was malformed before end-of-input.
    #[error("failed to decode image pull progress: {0}")]
    StreamDecode(#[source] serde_json::Error),

    /// The pull was cancelled before the progress stream was drained.
    #[error("image pull cancelled before completion")]
    Cancelled,

    /// A value was rejected before any command was built.
    #[error("invalid {what}: {reason}")]
    InvalidArgument { what: &'static str, reason: String },
}

impl ProvisionError {
    pub(crate) fn command(step: &'static str, source: CommandError) -> Self {
        ProvisionError::CommandExecution { step, source }
    }

    pub(crate) fn image(step: &'static str, source: EngineError) -> Self {
        ProvisionError::Image { step, source }
    }

    pub(crate) fn invalid(what: &'static str, reason: impl Into<String>) -> Self {
        ProvisionError::InvalidArgument {
            what,
            reason: reason.into(),
        }
    }
}

/// Map an io::Error to a process exit code:
/// - 127 for NotFound (command not found)
/// - 1 for all other errors
pub fn exit_code_for_io_error(e: &io::Error) -> u8 {
    if e.kind() == io::ErrorKind::NotFound {
        127
    } else {
        1
    }
}

/// Convert ProvisionError to exit code (parity with io::Error mapping).
pub fn exit_code_for_error(e: &ProvisionError) -> u8 {
    match e {
        ProvisionError::CommandExecution {
            source: CommandError::Spawn { source, .. },
            ..
        } => exit_code_for_io_error(source),
        _ => 1,
    }
}

/// Walk an anyhow chain for a ProvisionError and map it; fall back to 1.
pub fn exit_code_for_anyhow(e: &anyhow::Error) -> u8 {
    for cause in e.chain() {
        if let Some(pe) = cause.downcast_ref::<ProvisionError>() {
            return exit_code_for_error(pe);
        }
        if let Some(ioe) = cause.downcast_ref::<io::Error>() {
            return exit_code_for_io_error(ioe);
        }
    }
    1
}
