//! Instrumentation adapter
//!
//! Logging and metrics are capability-shaped collaborators injected by the
//! caller. Both are optional and every call is a no-op when the sink is absent.
//! Only the pipeline and the validator's instrumented entry point talk to
//! these sinks; rules never do.

use std::fmt;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use crate::error::SarError;

pub use tracing::Level;

/// Correlation identifier threaded through one logical request.
///
/// Created by the caller and never mutated by the core.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CorrelationContext {
    id: String,
}

impl CorrelationContext {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    /// Fresh random identifier
    pub fn generate() -> Self {
        Self::new(Uuid::new_v4().to_string())
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for CorrelationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

/// Structured log sink
pub trait LogSink: Send + Sync {
    fn emit(&self, level: Level, message: &str, correlation_id: &str, fields: &[(&str, &str)]);
}

/// Metric counter sink
pub trait MetricsRecorder: Send + Sync {
    fn record(&self, name: &str, value: f64, correlation_id: &str, labels: &[(&str, &str)]);
}

/// Optional pair of sinks shared by every component of one deployment
#[derive(Clone, Default)]
pub struct Instrumentation {
    logger: Option<Arc<dyn LogSink>>,
    metrics: Option<Arc<dyn MetricsRecorder>>,
}

impl fmt::Debug for Instrumentation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instrumentation")
            .field("logger", &self.logger.is_some())
            .field("metrics", &self.metrics.is_some())
            .finish()
    }
}

impl Instrumentation {
    /// No sinks at all
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn with_logger(mut self, logger: Arc<dyn LogSink>) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsRecorder>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn has_logger(&self) -> bool {
        self.logger.is_some()
    }

    pub fn has_metrics(&self) -> bool {
        self.metrics.is_some()
    }

    pub fn emit_log(
        &self,
        level: Level,
        message: &str,
        correlation: &CorrelationContext,
        fields: &[(&str, &str)],
    ) {
        if let Some(logger) = &self.logger {
            logger.emit(level, message, correlation.id(), fields);
        }
    }

    pub fn emit_metric(
        &self,
        name: &str,
        value: f64,
        correlation: &CorrelationContext,
        labels: &[(&str, &str)],
    ) {
        if let Some(metrics) = &self.metrics {
            metrics.record(name, value, correlation.id(), labels);
        }
    }
}

/// [`LogSink`] that forwards to `tracing` events
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogSink;

impl LogSink for TracingLogSink {
    fn emit(&self, level: Level, message: &str, correlation_id: &str, fields: &[(&str, &str)]) {
        let fields = join_fields(fields);

        // tracing macros need the level at compile time
        if level == Level::ERROR {
            tracing::error!(correlation_id, fields = %fields, "{}", message);
        } else if level == Level::WARN {
            tracing::warn!(correlation_id, fields = %fields, "{}", message);
        } else if level == Level::INFO {
            tracing::info!(correlation_id, fields = %fields, "{}", message);
        } else if level == Level::DEBUG {
            tracing::debug!(correlation_id, fields = %fields, "{}", message);
        } else {
            tracing::trace!(correlation_id, fields = %fields, "{}", message);
        }
    }
}

fn join_fields(fields: &[(&str, &str)]) -> String {
    fields
        .iter()
        .map(|(key, value)| format!("{}={}", key, value))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Install a fmt subscriber filtered by `RUST_LOG`, or by `default_filter`
/// when the variable is unset. A subscriber that is already installed is left
/// in place.
pub fn init_tracing(default_filter: &str) -> Result<(), SarError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_filter)
            .map_err(|err| SarError::Logging(format!("{}: {}", default_filter, err)))?,
    };

    // try_init fails only when a global subscriber already exists.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();

    Ok(())
}
