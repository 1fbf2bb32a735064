#![allow(clippy::module_name_repetitions)]
//! Command execution transport for docker CLI invocations.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::docker::command::DockerCommand;
use crate::util::exec::{ExecRequest, ExecService};

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("failed to execute `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },
    #[error("`{command}` failed ({status}): {}", output.trim())]
    Failed {
        command: String,
        status: String,
        output: String,
    },
}

/// Runs one docker command and returns its captured output.
///
/// `combined_output` selects stdout followed by stderr instead of stdout alone. The two
/// streams are captured separately, so their relative order is not preserved.
pub trait CommandRunner {
    fn run(&self, cmd: &DockerCommand, combined_output: bool) -> Result<String, CommandError>;
}

impl<T: CommandRunner + ?Sized> CommandRunner for &T {
    fn run(&self, cmd: &DockerCommand, combined_output: bool) -> Result<String, CommandError> {
        (**self).run(cmd, combined_output)
    }
}

/// Executes commands with the local docker binary.
#[derive(Debug, Clone)]
pub struct LocalRunner {
    docker: PathBuf,
    exec: ExecService,
}

impl LocalRunner {
    pub fn new(docker: impl Into<PathBuf>) -> Self {
        Self {
            docker: docker.into(),
            exec: ExecService::default(),
        }
    }

    /// Kill commands running longer than `timeout` (default: no limit).
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.exec = ExecService::new(timeout);
        self
    }
}

impl CommandRunner for LocalRunner {
    fn run(&self, cmd: &DockerCommand, combined_output: bool) -> Result<String, CommandError> {
        let preview = cmd.preview();
        tracing::debug!(command = %preview, "exec");

        let request = ExecRequest::new(self.docker.as_os_str())
            .args(cmd.args())
            .capture_output(true);
        let out = self.exec.run(request).map_err(|e| {
            let source = e
                .chain()
                .find_map(|c| c.downcast_ref::<io::Error>())
                .map(|ioe| io::Error::new(ioe.kind(), format!("{e:#}")))
                .unwrap_or_else(|| io::Error::other(format!("{e:#}")));
            CommandError::Spawn {
                command: preview.clone(),
                source,
            }
        })?;

        let text = if combined_output {
            out.combined()
        } else {
            out.stdout.clone()
        };
        if !out.status.success() {
            return Err(CommandError::Failed {
                command: preview,
                status: out.status.to_string(),
                output: if combined_output {
                    text
                } else {
                    out.combined()
                },
            });
        }
        Ok(text)
    }
}
