#![allow(dead_code)]

use std::collections::VecDeque;
use std::io::{Cursor, Read};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use dblab_engine::docker::engine::{ContainerState, EngineError, ImageSummary};
use dblab_engine::{
    CancelToken, CommandError, CommandRunner, ContainerRuntime, DockerCommand, HostContext,
    MountInspector, MountPoint, ProvisionError, VirtualizationRole,
};

pub fn guest(hostname: &str) -> HostContext {
    HostContext {
        role: VirtualizationRole::Guest,
        hostname: hostname.to_string(),
    }
}

pub fn bare_host() -> HostContext {
    HostContext {
        role: VirtualizationRole::Host,
        hostname: "db-host-1".to_string(),
    }
}

/// Records every command and answers from a script (default: empty success).
#[derive(Default)]
pub struct RecordingRunner {
    pub calls: Mutex<Vec<Vec<String>>>,
    pub combined: Mutex<Vec<bool>>,
    pub replies: Mutex<VecDeque<Result<String, CommandError>>>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply_ok(self, out: &str) -> Self {
        self.replies.lock().unwrap().push_back(Ok(out.to_string()));
        self
    }

    pub fn reply_failed(self, output: &str) -> Self {
        self.replies
            .lock()
            .unwrap()
            .push_back(Err(CommandError::Failed {
                command: "docker".to_string(),
                status: "exit status: 1".to_string(),
                output: output.to_string(),
            }));
        self
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }

    /// `combined_output` flag of every call, in order.
    pub fn combined_flags(&self) -> Vec<bool> {
        self.combined.lock().unwrap().clone()
    }
}

impl CommandRunner for RecordingRunner {
    fn run(&self, cmd: &DockerCommand, combined_output: bool) -> Result<String, CommandError> {
        self.calls.lock().unwrap().push(cmd.args().to_vec());
        self.combined.lock().unwrap().push(combined_output);
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(String::new()))
    }
}

/// Fixed mount list, counting how often it was asked.
#[derive(Default)]
pub struct FakeMounts {
    pub mounts: Vec<MountPoint>,
    pub fail: bool,
    pub calls: AtomicUsize,
}

impl FakeMounts {
    pub fn with(mounts: Vec<MountPoint>) -> Self {
        Self {
            mounts,
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl MountInspector for FakeMounts {
    fn container_mounts(&self, _container: &str) -> Result<Vec<MountPoint>, ProvisionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(ProvisionError::HostInspection {
                context: "failed to get container mounts",
                source: std::io::Error::other("inspect failed"),
            });
        }
        Ok(self.mounts.clone())
    }
}

/// Reader that flags when it is dropped.
pub struct TrackedStream {
    inner: Cursor<Vec<u8>>,
    closed: Arc<AtomicBool>,
}

impl Read for TrackedStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Drop for TrackedStream {
    fn drop(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// In-memory runtime: a set of local images and one canned pull stream.
#[derive(Default)]
pub struct FakeRuntime {
    pub images: Vec<String>,
    pub pull_body: String,
    pub running: bool,
    pub pulls: AtomicUsize,
    pub closed: Arc<AtomicBool>,
}

impl FakeRuntime {
    pub fn with_images(images: &[&str]) -> Self {
        Self {
            images: images.iter().map(|s| s.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn with_pull_body(body: &str) -> Self {
        Self {
            pull_body: body.to_string(),
            ..Self::default()
        }
    }

    pub fn pulls(&self) -> usize {
        self.pulls.load(Ordering::SeqCst)
    }

    pub fn stream_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl ContainerRuntime for FakeRuntime {
    fn list_images(&self, reference: &str) -> Result<Vec<ImageSummary>, EngineError> {
        Ok(self
            .images
            .iter()
            .filter(|i| i.as_str() == reference)
            .map(|i| ImageSummary {
                id: format!("sha256:{}", i.len()),
                repo_tags: Some(vec![i.clone()]),
            })
            .collect())
    }

    fn pull_image(
        &self,
        _image: &str,
        _cancel: &CancelToken,
    ) -> Result<Box<dyn Read + Send>, EngineError> {
        self.pulls.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(TrackedStream {
            inner: Cursor::new(self.pull_body.clone().into_bytes()),
            closed: self.closed.clone(),
        }))
    }

    fn inspect_container(&self, _name: &str) -> Result<ContainerState, EngineError> {
        Ok(ContainerState {
            running: self.running,
        })
    }
}

/// `n` well-formed pull progress records.
pub fn progress_records(n: usize) -> String {
    (0..n)
        .map(|i| {
            format!(
                "{{\"status\":\"Downloading\",\"progress\":\"[{}>] {}MB/10MB\",\"id\":\"layer{}\"}}\n",
                "=".repeat(i),
                i,
                i
            )
        })
        .collect()
}
