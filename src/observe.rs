//! Clone status observation sessions.
//!
//! A session samples the clone status at a fixed interval, reports every sample and is stored
//! as `<state dir>/observations/<clone>.json` for `observe-summary`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant, SystemTime};

use serde::{Deserialize, Serialize};

use crate::api::{ApiError, CloneApi, CloneStatus};

/// Where status samples come from.
pub trait StatusSource {
    fn clone_status(&self, id: &str) -> Result<CloneStatus, ApiError>;
}

impl StatusSource for CloneApi {
    fn clone_status(&self, id: &str) -> Result<CloneStatus, ApiError> {
        Ok(self.get_clone(id)?.status)
    }
}

#[derive(Debug, Clone)]
pub struct ObserveOptions {
    /// Keep sampling until the deadline instead of taking a single sample.
    pub follow: bool,
    pub interval: Duration,
    pub max_duration: Option<Duration>,
    /// Longest lock the observed operation may hold; recorded with the session.
    pub max_lock_duration: Option<Duration>,
    /// SSL mode of the clone database connection.
    pub sslmode: String,
}

impl Default for ObserveOptions {
    fn default() -> Self {
        Self {
            follow: false,
            interval: Duration::from_secs(5),
            max_duration: None,
            max_lock_duration: None,
            sslmode: "disable".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    pub at: String,
    pub elapsed_ms: u64,
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservationSession {
    pub clone_id: String,
    pub started_at: String,
    pub finished_at: String,
    pub duration_ms: u64,
    pub interval_ms: u64,
    #[serde(default)]
    pub max_duration_ms: Option<u64>,
    #[serde(default)]
    pub max_lock_duration_ms: Option<u64>,
    #[serde(default)]
    pub sslmode: String,
    pub samples: Vec<Sample>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSummary {
    pub clone_id: String,
    pub samples: usize,
    pub status_changes: usize,
    pub duration_ms: u64,
    pub final_status: Option<String>,
    pub within_max_duration: Option<bool>,
    pub max_lock_duration_ms: Option<u64>,
}

fn now_rfc3339() -> String {
    humantime::format_rfc3339_seconds(SystemTime::now()).to_string()
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Run one observation session, calling `on_sample` for every sample taken.
///
/// Sampling stops after one sample without `follow`, or once `max_duration` has elapsed,
/// or when the clone reports `FATAL`. The first failing status request ends the session with
/// that error.
pub fn observe<S, F>(
    source: &S,
    clone_id: &str,
    opts: &ObserveOptions,
    mut on_sample: F,
) -> Result<ObservationSession, ApiError>
where
    S: StatusSource + ?Sized,
    F: FnMut(&Sample),
{
    let started_at = now_rfc3339();
    let start = Instant::now();
    let mut samples = Vec::new();

    loop {
        let status = source.clone_status(clone_id)?;
        let sample = Sample {
            at: now_rfc3339(),
            elapsed_ms: millis(start.elapsed()),
            code: status.code,
            message: status.message,
        };
        on_sample(&sample);
        let fatal = sample.code == "FATAL";
        samples.push(sample);

        if !opts.follow || fatal {
            break;
        }
        if let Some(max) = opts.max_duration {
            if start.elapsed() + opts.interval > max {
                break;
            }
        }
        thread::sleep(opts.interval);
    }

    Ok(ObservationSession {
        clone_id: clone_id.to_string(),
        started_at,
        finished_at: now_rfc3339(),
        duration_ms: millis(start.elapsed()),
        interval_ms: millis(opts.interval),
        max_duration_ms: opts.max_duration.map(millis),
        max_lock_duration_ms: opts.max_lock_duration.map(millis),
        sslmode: opts.sslmode.clone(),
        samples,
    })
}

impl ObservationSession {
    pub fn summary(&self) -> SessionSummary {
        let status_changes = self
            .samples
            .windows(2)
            .filter(|w| w[0].code != w[1].code)
            .count();
        SessionSummary {
            clone_id: self.clone_id.clone(),
            samples: self.samples.len(),
            status_changes,
            duration_ms: self.duration_ms,
            final_status: self.samples.last().map(|s| s.code.clone()),
            within_max_duration: self.max_duration_ms.map(|m| self.duration_ms <= m),
            max_lock_duration_ms: self.max_lock_duration_ms,
        }
    }
}

/// Stored observation sessions, one JSON file per clone.
#[derive(Debug, Clone)]
pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    pub fn new(state_dir: &Path) -> Self {
        Self {
            dir: state_dir.join("observations"),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, clone_id: &str) -> PathBuf {
        let safe: String = clone_id
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{safe}.json"))
    }

    pub fn save(&self, session: &ObservationSession) -> io::Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(&session.clone_id);
        let tmp = path.with_extension("json.tmp");
        let data = serde_json::to_vec_pretty(session).map_err(io::Error::other)?;
        fs::write(&tmp, data)?;
        fs::rename(&tmp, &path)?;
        Ok(path)
    }

    /// All readable sessions, sorted by clone id; unreadable files are skipped with a warning.
    pub fn load_all(&self) -> io::Result<Vec<ObservationSession>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(e) => e,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let mut sessions = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let parsed = fs::read(&path).and_then(|b| {
                serde_json::from_slice::<ObservationSession>(&b).map_err(io::Error::other)
            });
            match parsed {
                Ok(s) => sessions.push(s),
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping observation file"),
            }
        }
        sessions.sort_by(|a, b| a.clone_id.cmp(&b.clone_id));
        Ok(sessions)
    }
}
