//! Blocking client for the clone management HTTP API.
//!
//! Requests carry the `Verification-Token` header; synchronous lifecycle calls poll the clone
//! until it leaves its transitional status.

use std::thread;
use std::time::{Duration, Instant};

use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

pub const DEFAULT_API_URL: &str = "http://127.0.0.1:2345";
pub const TOKEN_HEADER: &str = "Verification-Token";

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(30 * 60);

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid API url {url:?}: {source}")]
    Url {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("request to {path} failed: {source}")]
    Http {
        path: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{path} returned {status}: {message}")]
    Status {
        path: String,
        status: u16,
        message: String,
    },
    #[error("clone {id} did not settle within {}", humantime::format_duration(*waited))]
    Timeout { id: String, waited: Duration },
    #[error("clone {id} failed: {message}")]
    CloneFailed { id: String, message: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CloneStatus {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SnapshotRef {
    pub id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub data_state_at: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Database {
    pub conn_str: String,
    pub host: String,
    pub port: String,
    pub username: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CloneMetadata {
    pub clone_diff_size: u64,
    pub cloning_time: f64,
    pub max_idle_minutes: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CloneInfo {
    pub id: String,
    pub snapshot: Option<SnapshotRef>,
    pub protected: bool,
    pub delete_at: String,
    pub status: CloneStatus,
    pub db: Database,
    pub metadata: CloneMetadata,
    pub project: String,
    pub created_at: String,
}

impl CloneInfo {
    pub fn status_code(&self) -> &str {
        &self.status.code
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DbCredentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCloneRequest {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub project: String,
    pub protected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<SnapshotRef>,
    pub db: DbCredentials,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct UpdateCloneRequest {
    pub protected: bool,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    detail: String,
}

/// Status codes that end a synchronous wait.
pub fn is_terminal_status(code: &str) -> bool {
    matches!(code, "OK" | "FATAL")
}

#[derive(Debug, Clone)]
pub struct CloneApi {
    base: Url,
    token: Option<String>,
    client: Client,
    poll_interval: Duration,
    poll_timeout: Duration,
}

impl CloneApi {
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self, ApiError> {
        let mut base = Url::parse(base_url).map_err(|source| ApiError::Url {
            url: base_url.to_string(),
            source,
        })?;
        if !base.path().ends_with('/') {
            let p = format!("{}/", base.path());
            base.set_path(&p);
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|source| ApiError::Http {
                path: base.to_string(),
                source,
            })?;
        Ok(Self {
            base,
            token: token.filter(|t| !t.is_empty()),
            client,
            poll_interval: DEFAULT_POLL_INTERVAL,
            poll_timeout: DEFAULT_POLL_TIMEOUT,
        })
    }

    pub fn with_polling(mut self, interval: Duration, timeout: Duration) -> Self {
        self.poll_interval = interval;
        self.poll_timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn url(&self, path: &str) -> Result<Url, ApiError> {
        self.base
            .join(path.trim_start_matches('/'))
            .map_err(|source| ApiError::Url {
                url: path.to_string(),
                source,
            })
    }

    fn send(&self, path: &str, req: RequestBuilder) -> Result<Response, ApiError> {
        let req = match &self.token {
            Some(t) => req.header(TOKEN_HEADER, t),
            None => req,
        };
        tracing::debug!(path, "api request");
        let resp = req.send().map_err(|source| ApiError::Http {
            path: path.to_string(),
            source,
        })?;
        if resp.status().is_success() {
            return Ok(resp);
        }
        let status = resp.status().as_u16();
        let text = resp.text().unwrap_or_default();
        let message = match serde_json::from_str::<ErrorBody>(&text) {
            Ok(b) if !b.detail.is_empty() => format!("{}: {}", b.message, b.detail),
            Ok(b) if !b.message.is_empty() => b.message,
            _ => text.trim().to_string(),
        };
        Err(ApiError::Status {
            path: path.to_string(),
            status,
            message,
        })
    }

    fn json<T: serde::de::DeserializeOwned>(path: &str, resp: Response) -> Result<T, ApiError> {
        resp.json().map_err(|source| ApiError::Http {
            path: path.to_string(),
            source,
        })
    }

    pub fn list_clones(&self) -> Result<Vec<CloneInfo>, ApiError> {
        let path = "clones";
        let resp = self.send(path, self.client.get(self.url(path)?))?;
        Self::json(path, resp)
    }

    pub fn get_clone(&self, id: &str) -> Result<CloneInfo, ApiError> {
        let path = format!("clone/{}", urlencoding::encode(id));
        let resp = self.send(&path, self.client.get(self.url(&path)?))?;
        Self::json(&path, resp)
    }

    /// Create a clone; unless `async_mode`, wait until it is ready.
    pub fn create_clone(&self, req: &CreateCloneRequest, async_mode: bool) -> Result<CloneInfo, ApiError> {
        let path = "clone";
        let resp = self.send(path, self.client.post(self.url(path)?).json(req))?;
        let created: CloneInfo = Self::json(path, resp)?;
        if async_mode {
            return Ok(created);
        }
        self.wait_ready(&created.id)
    }

    pub fn update_clone(&self, id: &str, req: &UpdateCloneRequest) -> Result<CloneInfo, ApiError> {
        let path = format!("clone/{}", urlencoding::encode(id));
        let resp = self.send(&path, self.client.patch(self.url(&path)?).json(req))?;
        Self::json(&path, resp)
    }

    /// Reset a clone to its snapshot; unless `async_mode`, wait until it is ready again.
    pub fn reset_clone(&self, id: &str, async_mode: bool) -> Result<Option<CloneInfo>, ApiError> {
        let path = format!("clone/{}/reset", urlencoding::encode(id));
        self.send(&path, self.client.post(self.url(&path)?))?;
        if async_mode {
            return Ok(None);
        }
        self.wait_ready(id).map(Some)
    }

    /// Destroy a clone; unless `async_mode`, wait until the API no longer knows it.
    pub fn destroy_clone(&self, id: &str, async_mode: bool) -> Result<(), ApiError> {
        let path = format!("clone/{}", urlencoding::encode(id));
        self.send(&path, self.client.delete(self.url(&path)?))?;
        if async_mode {
            return Ok(());
        }
        let start = Instant::now();
        loop {
            match self.get_clone(id) {
                Err(ApiError::Status { status, .. }) if status == StatusCode::NOT_FOUND.as_u16() => {
                    return Ok(())
                }
                Err(e) => return Err(e),
                Ok(c) if c.status_code() == "FATAL" => {
                    return Err(ApiError::CloneFailed {
                        id: id.to_string(),
                        message: c.status.message,
                    })
                }
                Ok(_) => {}
            }
            if start.elapsed() >= self.poll_timeout {
                return Err(ApiError::Timeout {
                    id: id.to_string(),
                    waited: start.elapsed(),
                });
            }
            thread::sleep(self.poll_interval);
        }
    }

    /// Poll until the clone reaches a terminal status; `FATAL` is an error.
    pub fn wait_ready(&self, id: &str) -> Result<CloneInfo, ApiError> {
        let start = Instant::now();
        loop {
            let c = self.get_clone(id)?;
            tracing::debug!(id, status = %c.status.code, "clone status");
            if is_terminal_status(c.status_code()) {
                if c.status_code() == "FATAL" {
                    return Err(ApiError::CloneFailed {
                        id: id.to_string(),
                        message: c.status.message,
                    });
                }
                return Ok(c);
            }
            if start.elapsed() >= self.poll_timeout {
                return Err(ApiError::Timeout {
                    id: id.to_string(),
                    waited: start.elapsed(),
                });
            }
            thread::sleep(self.poll_interval);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_gets_trailing_slash() {
        let api = CloneApi::new("http://127.0.0.1:2345/api", None).unwrap();
        assert_eq!(api.url("clone/x").unwrap().as_str(), "http://127.0.0.1:2345/api/clone/x");
        let api = CloneApi::new(DEFAULT_API_URL, Some(String::new())).unwrap();
        assert_eq!(api.url("/clones").unwrap().as_str(), "http://127.0.0.1:2345/clones");
        assert!(api.token.is_none());
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(matches!(
            CloneApi::new("not a url", None),
            Err(ApiError::Url { .. })
        ));
    }

    #[test]
    fn test_clone_payload_decodes_with_missing_fields() {
        let c: CloneInfo = serde_json::from_str(
            r#"{"id":"c1","protected":true,"status":{"code":"OK","message":"ready"},
                "db":{"port":"6000","username":"john","connStr":"host=localhost"},
                "snapshot":{"id":"snap1","dataStateAt":"2026-01-01"},"unknown":1}"#,
        )
        .unwrap();
        assert_eq!(c.id, "c1");
        assert!(c.protected);
        assert_eq!(c.db.conn_str, "host=localhost");
        assert_eq!(c.snapshot.unwrap().id, "snap1");
        assert_eq!(c.metadata.clone_diff_size, 0);
    }

    #[test]
    fn test_create_request_shape() {
        let req = CreateCloneRequest {
            protected: true,
            db: DbCredentials {
                username: "u".into(),
                password: "p".into(),
            },
            ..Default::default()
        };
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(
            v,
            serde_json::json!({"protected": true, "db": {"username": "u", "password": "p"}})
        );
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(is_terminal_status("OK"));
        assert!(is_terminal_status("FATAL"));
        assert!(!is_terminal_status("CREATING"));
        assert!(!is_terminal_status("RESETTING"));
    }
}
