//! Live-change monitor
//!
//! Polls one document on disk and re-validates it only when its content
//! signature (SHA-256 of the raw bytes) changes. The only state kept between
//! polls is the last signature seen, so a file that disappears and comes back
//! with identical bytes is reported again.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use futures::stream::{self, Stream};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::sync::watch;

use crate::error::{MonitorError, MonitorResult};
use crate::validator::{ValidationResult, Validator};

/// Outcome of one detected content change
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LiveUpdate {
    pub source: PathBuf,
    pub timestamp: DateTime<Utc>,
    pub result: ValidationResult,
}

impl LiveUpdate {
    /// RFC 3339 timestamp with second precision and a `Z` suffix
    pub fn iso_timestamp(&self) -> String {
        self.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)
    }
}

/// Sending half of a stop signal
#[derive(Debug)]
pub struct StopHandle {
    sender: watch::Sender<bool>,
}

impl StopHandle {
    /// Ask every linked [`StopSignal`] to stop. Idempotent.
    pub fn stop(&self) {
        self.sender.send_replace(true);
    }
}

/// Receiving half of a stop signal, checked by [`LiveUpdateMonitor::run`]
#[derive(Debug, Clone)]
pub struct StopSignal {
    receiver: Option<watch::Receiver<bool>>,
}

impl StopSignal {
    /// A signal that never fires
    pub fn never() -> Self {
        Self { receiver: None }
    }

    pub fn is_stopped(&self) -> bool {
        self.receiver
            .as_ref()
            .is_some_and(|receiver| *receiver.borrow())
    }

    async fn stopped(&mut self) {
        match self.receiver.as_mut() {
            Some(receiver) => {
                // A dropped handle can never stop us.
                if receiver.wait_for(|stopped| *stopped).await.is_err() {
                    std::future::pending::<()>().await;
                }
            }
            None => std::future::pending::<()>().await,
        }
    }
}

/// Create a linked stop handle and signal.
pub fn stop_channel() -> (StopHandle, StopSignal) {
    let (sender, receiver) = watch::channel(false);
    (
        StopHandle { sender },
        StopSignal {
            receiver: Some(receiver),
        },
    )
}

/// Lowercase hex SHA-256 of `bytes`
pub fn content_signature(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Change-driven validator for a single path
#[derive(Debug, Clone)]
pub struct LiveUpdateMonitor {
    path: PathBuf,
    validator: Validator,
    last_signature: Option<String>,
}

impl LiveUpdateMonitor {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_validator(path, Validator::default())
    }

    pub fn with_validator(path: impl Into<PathBuf>, validator: Validator) -> Self {
        Self {
            path: path.into(),
            validator,
            last_signature: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn last_signature(&self) -> Option<&str> {
        self.last_signature.as_deref()
    }

    /// Forget the last signature so the next poll reports the current content.
    pub fn reset(&mut self) {
        self.last_signature = None;
    }

    /// Check the document once.
    ///
    /// Returns `Ok(None)` when the file is missing or its content is unchanged.
    pub async fn poll_once(&mut self) -> MonitorResult<Option<LiveUpdate>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                if self.last_signature.take().is_some() {
                    tracing::warn!(path = %self.path.display(), "Watched SAR document disappeared");
                }
                return Ok(None);
            }
            Err(source) => {
                return Err(MonitorError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        let signature = content_signature(&bytes);
        if self.last_signature.as_deref() == Some(signature.as_str()) {
            return Ok(None);
        }

        tracing::debug!(
            path = %self.path.display(),
            signature = %signature,
            "SAR document changed, re-validating"
        );
        self.last_signature = Some(signature);

        Ok(Some(LiveUpdate {
            source: self.path.clone(),
            timestamp: Utc::now(),
            result: self.validator.validate_bytes(&bytes),
        }))
    }

    /// Lazy, infinite sequence of updates: poll, then wait `interval` (or
    /// until `stop` fires) between polls.
    ///
    /// A zero interval yields [`MonitorError::InvalidInterval`] as the first
    /// item and ends the stream without polling. Read errors are yielded and
    /// polling continues. Calling `run` again starts a fresh sequence that
    /// shares this monitor's signature.
    pub fn run(
        &mut self,
        interval: Duration,
        stop: StopSignal,
    ) -> impl Stream<Item = MonitorResult<LiveUpdate>> + '_ {
        let state = RunState {
            monitor: self,
            stop,
            interval,
            polled: false,
            finished: false,
        };

        stream::unfold(state, |mut state| async move {
            if state.finished {
                return None;
            }
            if state.interval.is_zero() {
                state.finished = true;
                return Some((Err(MonitorError::InvalidInterval), state));
            }

            loop {
                if state.stop.is_stopped() {
                    return None;
                }
                if state.polled && sleep_or_stop(state.interval, &mut state.stop).await {
                    return None;
                }
                state.polled = true;

                match state.monitor.poll_once().await {
                    Ok(Some(update)) => return Some((Ok(update), state)),
                    Ok(None) => continue,
                    Err(err) => return Some((Err(err), state)),
                }
            }
        })
    }
}

struct RunState<'a> {
    monitor: &'a mut LiveUpdateMonitor,
    stop: StopSignal,
    interval: Duration,
    polled: bool,
    finished: bool,
}

/// `true` when the stop signal fired before the interval elapsed
async fn sleep_or_stop(interval: Duration, stop: &mut StopSignal) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(interval) => false,
        _ = stop.stopped() => true,
    }
}
