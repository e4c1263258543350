//! # sar-validator Library
//!
//! An async-first Rust library for validating Suspicious Activity Report
//! filings: defensive XML loading, an ordered rule engine that returns every
//! finding with its location, a transactional validate-then-persist pipeline,
//! and a live-change monitor that re-validates a document when it changes.

pub mod config;
pub mod document;
pub mod error;
pub mod instrumentation;
pub mod location;
pub mod monitor;
pub mod output;
pub mod pipeline;
pub mod rules;
pub mod validator;

pub use config::{Config, ConfigError, ConfigManager, EnvProvider, SystemEnvProvider};
pub use document::{Element, NodeId, ParsedTree, RawDocument, SourceId};
pub use error::{MonitorError, PersistenceError, Result, SarError};
pub use instrumentation::{
    CorrelationContext, Instrumentation, Level, LogSink, MetricsRecorder, TracingLogSink,
    init_tracing,
};
pub use location::{ParentIndex, locate};
pub use monitor::{LiveUpdate, LiveUpdateMonitor, StopHandle, StopSignal, stop_channel};
pub use output::{Output, OutputFormat, VerbosityLevel};
pub use pipeline::{PipelineStage, SarProcessor, SarRepository, TransactionManager};
pub use validator::{
    ErrorKind, Severity, ValidationError, ValidationOptions, ValidationResult, Validator,
    validate, validate_path,
};
