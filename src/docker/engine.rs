#![allow(clippy::module_name_repetitions)]
//! Docker Engine API client over the daemon's unix socket.
//!
//! Only the three calls the provisioning engine needs are modelled; the `ContainerRuntime`
//! trait keeps them swappable for fakes.

use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::docker::http::{read_response, write_request, HttpResponse};

pub const DEFAULT_DOCKER_SOCKET: &str = "/var/run/docker.sock";

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("cannot reach docker daemon at {}: {source}", socket.display())]
    Connect {
        socket: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("docker API transport error: {0}")]
    Io(#[from] io::Error),
    #[error("docker API returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("cannot decode docker API response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Cooperative cancellation flag shared between a caller and a long-running call.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A locally present image.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ImageSummary {
    #[serde(rename = "Id", default)]
    pub id: String,
    #[serde(rename = "RepoTags", default)]
    pub repo_tags: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct ContainerState {
    #[serde(rename = "Running", default)]
    pub running: bool,
}

/// The subset of container-runtime operations used for image preparation and status.
pub trait ContainerRuntime {
    /// Local images whose reference matches `reference` exactly.
    fn list_images(&self, reference: &str) -> Result<Vec<ImageSummary>, EngineError>;

    /// Start pulling `image`; the returned stream carries JSON progress records and the pull
    /// only completes once it has been read to end-of-input.
    fn pull_image(
        &self,
        image: &str,
        cancel: &CancelToken,
    ) -> Result<Box<dyn Read + Send>, EngineError>;

    fn inspect_container(&self, name: &str) -> Result<ContainerState, EngineError>;
}

impl<T: ContainerRuntime + ?Sized> ContainerRuntime for &T {
    fn list_images(&self, reference: &str) -> Result<Vec<ImageSummary>, EngineError> {
        (**self).list_images(reference)
    }

    fn pull_image(
        &self,
        image: &str,
        cancel: &CancelToken,
    ) -> Result<Box<dyn Read + Send>, EngineError> {
        (**self).pull_image(image, cancel)
    }

    fn inspect_container(&self, name: &str) -> Result<ContainerState, EngineError> {
        (**self).inspect_container(name)
    }
}

/// Split an image reference into `(repository, tag)` the way `docker pull` does:
/// missing tags default to `latest`, digests are passed as the tag.
pub fn split_image_reference(image: &str) -> (String, String) {
    if let Some((repo, digest)) = image.split_once('@') {
        return (repo.to_string(), digest.to_string());
    }
    let last_slash = image.rfind('/').map(|i| i + 1).unwrap_or(0);
    match image[last_slash..].rfind(':') {
        Some(i) => {
            let split = last_slash + i;
            (image[..split].to_string(), image[split + 1..].to_string())
        }
        None => (image.to_string(), "latest".to_string()),
    }
}

/// Docker Engine API over a unix socket.
#[derive(Debug, Clone)]
pub struct DockerEngine {
    socket: PathBuf,
    api_version: Option<String>,
    io_timeout: Option<Duration>,
}

impl Default for DockerEngine {
    fn default() -> Self {
        Self::new(DEFAULT_DOCKER_SOCKET)
    }
}

#[derive(Deserialize)]
struct ApiErrorBody {
    message: String,
}

#[derive(Deserialize)]
struct InspectBody {
    #[serde(rename = "State", default)]
    state: ContainerState,
}

impl DockerEngine {
    pub fn new(socket: impl Into<PathBuf>) -> Self {
        Self {
            socket: socket.into(),
            api_version: None,
            io_timeout: None,
        }
    }

    /// Pin requests to `/v<version>/…` instead of the daemon's default API version.
    pub fn with_api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = Some(version.into());
        self
    }

    /// Socket read/write timeout for non-streaming calls.
    pub fn with_io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = Some(timeout);
        self
    }

    pub fn socket(&self) -> &Path {
        &self.socket
    }

    fn path(&self, p: &str) -> String {
        match &self.api_version {
            Some(v) => format!("/v{}{}", v.trim_start_matches('v'), p),
            None => p.to_string(),
        }
    }

    #[cfg(unix)]
    fn connect(&self) -> Result<std::os::unix::net::UnixStream, EngineError> {
        std::os::unix::net::UnixStream::connect(&self.socket).map_err(|source| EngineError::Connect {
            socket: self.socket.clone(),
            source,
        })
    }

    #[cfg(unix)]
    fn request(&self, method: &str, path: &str, streaming: bool) -> Result<HttpResponse, EngineError> {
        let stream = self.connect()?;
        self.exchange(stream, method, path, streaming)
    }

    #[cfg(unix)]
    fn exchange(
        &self,
        mut stream: std::os::unix::net::UnixStream,
        method: &str,
        path: &str,
        streaming: bool,
    ) -> Result<HttpResponse, EngineError> {
        if !streaming {
            stream.set_read_timeout(self.io_timeout)?;
        }
        stream.set_write_timeout(self.io_timeout)?;
        let full = self.path(path);
        tracing::debug!(method, path = %full, "docker api");
        write_request(&mut stream, method, &full, None)?;
        let resp = read_response(stream)?;
        if resp.is_success() {
            Ok(resp)
        } else {
            Err(api_error(resp))
        }
    }

    #[cfg(not(unix))]
    fn request(&self, _method: &str, _path: &str, _streaming: bool) -> Result<HttpResponse, EngineError> {
        Err(EngineError::Connect {
            socket: self.socket.clone(),
            source: io::Error::new(io::ErrorKind::Unsupported, "unix sockets are not available"),
        })
    }

    #[cfg(unix)]
    fn open_pull(&self, path: &str, cancel: &CancelToken) -> Result<Box<dyn Read + Send>, EngineError> {
        let stream = self.connect()?;
        let watch = CancelWatch::spawn(stream.try_clone()?, cancel.clone());
        let resp = self.exchange(stream, "POST", path, true)?;
        Ok(Box::new(WatchedBody {
            inner: resp.body,
            _watch: watch,
        }))
    }

    #[cfg(not(unix))]
    fn open_pull(&self, path: &str, _cancel: &CancelToken) -> Result<Box<dyn Read + Send>, EngineError> {
        Ok(self.request("POST", path, true)?.body)
    }
}

/// How often a pull watcher looks at its cancel token.
#[cfg(unix)]
const CANCEL_POLL: Duration = Duration::from_millis(25);

/// Shuts the pull socket down once the token fires, unblocking a stalled read.
/// The watcher thread exits when this guard is dropped.
#[cfg(unix)]
struct CancelWatch {
    done: Arc<AtomicBool>,
}

#[cfg(unix)]
impl CancelWatch {
    fn spawn(socket: std::os::unix::net::UnixStream, cancel: CancelToken) -> Self {
        let done = Arc::new(AtomicBool::new(false));
        let finished = done.clone();
        std::thread::spawn(move || {
            while !finished.load(Ordering::SeqCst) {
                if cancel.is_cancelled() {
                    tracing::debug!("pull cancelled, closing daemon stream");
                    let _ = socket.shutdown(std::net::Shutdown::Both);
                    return;
                }
                std::thread::sleep(CANCEL_POLL);
            }
        });
        Self { done }
    }
}

#[cfg(unix)]
impl Drop for CancelWatch {
    fn drop(&mut self) {
        self.done.store(true, Ordering::SeqCst);
    }
}

#[cfg(unix)]
struct WatchedBody {
    inner: Box<dyn Read + Send>,
    _watch: CancelWatch,
}

#[cfg(unix)]
impl Read for WatchedBody {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

fn api_error(resp: HttpResponse) -> EngineError {
    let status = resp.status;
    let body = resp.text().unwrap_or_default();
    let message = serde_json::from_str::<ApiErrorBody>(&body)
        .map(|b| b.message)
        .unwrap_or_else(|_| body.trim().to_string());
    EngineError::Api { status, message }
}

impl ContainerRuntime for DockerEngine {
    fn list_images(&self, reference: &str) -> Result<Vec<ImageSummary>, EngineError> {
        let filters = serde_json::json!({ "reference": { reference: true } }).to_string();
        let path = format!("/images/json?filters={}", urlencoding::encode(&filters));
        let body = self.request("GET", &path, false)?.text()?;
        Ok(serde_json::from_str(&body)?)
    }

    fn pull_image(
        &self,
        image: &str,
        cancel: &CancelToken,
    ) -> Result<Box<dyn Read + Send>, EngineError> {
        if cancel.is_cancelled() {
            return Err(EngineError::Io(io::Error::new(
                io::ErrorKind::Interrupted,
                "pull cancelled before start",
            )));
        }
        let (repo, tag) = split_image_reference(image);
        let path = format!(
            "/images/create?fromImage={}&tag={}",
            urlencoding::encode(&repo),
            urlencoding::encode(&tag)
        );
        self.open_pull(&path, cancel)
    }

    fn inspect_container(&self, name: &str) -> Result<ContainerState, EngineError> {
        let path = format!("/containers/{}/json", urlencoding::encode(name));
        let body = self.request("GET", &path, false)?.text()?;
        let parsed: InspectBody = serde_json::from_str(&body)?;
        Ok(parsed.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_image_reference() {
        assert_eq!(
            split_image_reference("postgresai/extended-postgres:16"),
            ("postgresai/extended-postgres".to_string(), "16".to_string())
        );
        assert_eq!(
            split_image_reference("postgres"),
            ("postgres".to_string(), "latest".to_string())
        );
        assert_eq!(
            split_image_reference("registry.local:5000/team/pg"),
            ("registry.local:5000/team/pg".to_string(), "latest".to_string())
        );
        assert_eq!(
            split_image_reference("registry.local:5000/team/pg:15"),
            ("registry.local:5000/team/pg".to_string(), "15".to_string())
        );
        assert_eq!(
            split_image_reference("pg@sha256:abc"),
            ("pg".to_string(), "sha256:abc".to_string())
        );
    }

    #[test]
    fn test_api_version_prefix() {
        let e = DockerEngine::new("/tmp/x.sock").with_api_version("v1.43");
        assert_eq!(e.path("/images/json"), "/v1.43/images/json");
        assert_eq!(DockerEngine::default().path("/_ping"), "/_ping");
    }

    #[test]
    fn test_cancel_token_is_shared() {
        let t = CancelToken::new();
        let t2 = t.clone();
        assert!(!t.is_cancelled());
        t2.cancel();
        assert!(t.is_cancelled());
    }

    #[test]
    fn test_connect_failure_names_socket() {
        let e = DockerEngine::new("/nonexistent/dblab/docker.sock");
        let err = e.list_images("postgres:16").unwrap_err();
        assert!(matches!(err, EngineError::Connect { .. }));
        assert!(err.to_string().contains("/nonexistent/dblab/docker.sock"));
    }
}
