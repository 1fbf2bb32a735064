#![allow(clippy::module_name_repetitions)]
//! Image preparation: existence check, pull, and full drain of the pull progress stream.

use std::io::Read;

use serde::Deserialize;
use serde_json::de::IoRead;
use serde_json::StreamDeserializer;

use crate::docker::engine::{CancelToken, ContainerRuntime};
use crate::errors::ProvisionError;

/// One record of the pull progress stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PullProgress {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub progress: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

type ProgressDecoder = StreamDeserializer<'static, IoRead<Box<dyn Read + Send>>, PullProgress>;

/// Lazy, finite, non-restartable sequence of pull progress records.
///
/// The underlying stream is released on end-of-input, on the first decode error, on
/// cancellation, on `close()`, and on drop, whichever comes first. Cancellation is seen
/// between records, or when the runtime cuts a blocked read short.
pub struct PullStream {
    decoder: Option<ProgressDecoder>,
    cancel: CancelToken,
    consumed: usize,
}

impl PullStream {
    pub fn new(stream: Box<dyn Read + Send>, cancel: CancelToken) -> Self {
        Self {
            decoder: Some(serde_json::Deserializer::from_reader(stream).into_iter()),
            cancel,
            consumed: 0,
        }
    }

    /// Release the underlying stream; idempotent and non-blocking.
    pub fn close(&mut self) {
        self.decoder = None;
    }

    pub fn is_closed(&self) -> bool {
        self.decoder.is_none()
    }

    /// Number of records decoded so far.
    pub fn consumed(&self) -> usize {
        self.consumed
    }

    /// Read to end-of-input, reporting each record; returns the record count.
    pub fn drain(mut self, image: &str) -> Result<usize, ProvisionError> {
        for record in self.by_ref() {
            let p = record?;
            tracing::debug!(
                image,
                status = %p.status,
                progress = %p.progress,
                "image pulling progress"
            );
            if let Some(err) = &p.error {
                tracing::warn!(image, error = %err, "image pull reported an error");
            }
        }
        Ok(self.consumed)
    }
}

impl Iterator for PullStream {
    type Item = Result<PullProgress, ProvisionError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cancel.is_cancelled() && self.decoder.is_some() {
            self.close();
            return Some(Err(ProvisionError::Cancelled));
        }
        let decoder = self.decoder.as_mut()?;
        match decoder.next() {
            Some(Ok(p)) => {
                self.consumed += 1;
                Some(Ok(p))
            }
            // A cancelled pull usually ends in EOF or a truncated record once the
            // runtime shuts its stream down
            Some(Err(_)) | None if self.cancel.is_cancelled() => {
                self.close();
                Some(Err(ProvisionError::Cancelled))
            }
            Some(Err(e)) => {
                self.close();
                Some(Err(ProvisionError::StreamDecode(e)))
            }
            None => {
                self.close();
                None
            }
        }
    }
}

impl Drop for PullStream {
    fn drop(&mut self) {
        self.close();
    }
}

/// Ensures images are present locally before clone containers use them.
#[derive(Debug, Clone)]
pub struct ImageProvisioner<C> {
    runtime: C,
}

impl<C: ContainerRuntime> ImageProvisioner<C> {
    pub fn new(runtime: C) -> Self {
        Self { runtime }
    }

    /// No-op when the image exists locally, otherwise pull it to completion.
    pub fn prepare_image(&self, image: &str, cancel: &CancelToken) -> Result<(), ProvisionError> {
        if self.image_exists(image)? {
            tracing::debug!(image, "image already present");
            return Ok(());
        }
        self.pull_image(image, cancel)
    }

    pub fn image_exists(&self, image: &str) -> Result<bool, ProvisionError> {
        let list = self
            .runtime
            .list_images(image)
            .map_err(|e| ProvisionError::image("failed to list images", e))?;
        Ok(!list.is_empty())
    }

    /// Pull `image`, draining the progress stream to end-of-input.
    pub fn pull_image(&self, image: &str, cancel: &CancelToken) -> Result<(), ProvisionError> {
        tracing::info!(image, "pulling image");
        let stream = self
            .runtime
            .pull_image(image, cancel)
            .map_err(|e| {
                if cancel.is_cancelled() {
                    ProvisionError::Cancelled
                } else {
                    ProvisionError::image("failed to pull image", e)
                }
            })?;
        let records = PullStream::new(stream, cancel.clone()).drain(image)?;
        tracing::info!(image, records, "image pulled");
        Ok(())
    }

    pub fn is_container_running(&self, name: &str) -> Result<bool, ProvisionError> {
        let state = self
            .runtime
            .inspect_container(name)
            .map_err(|e| ProvisionError::image("failed to inspect container", e))?;
        Ok(state.running)
    }
}
