//! SAR Validation Engine
//!
//! This module exposes the entry points of the rule engine:
//! - **Findings as data**: every problem becomes a [`ValidationError`] record;
//!   nothing in here returns `Err` for a bad document
//! - **Ordered rules**: see [`crate::rules`] for the fixed evaluation order
//! - **Pure evaluation**: [`Validator::validate`] performs no I/O and shares no
//!   state, so one validator can serve many tasks concurrently
//!
//! Only [`Validator::validate_instrumented`] talks to the instrumentation sinks.

use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::path::Path;

use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::document::{ParsedTree, RawDocument};
use crate::error::SarError;
use crate::instrumentation::{CorrelationContext, Instrumentation, Level};
use crate::rules::{self, RuleContext};

/// Severity of a finding. Warnings never invalidate a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
        }
    }
}

/// Category of a finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Unparsable document
    MalformedInput,
    /// Required block, collection, element or attribute absent
    Structural,
    /// Present but semantically empty value (`PENDING`, `N/A`, ...)
    Placeholder,
    /// Date, amount, currency or identifier fails its pattern or numeric constraint
    Format,
    /// Identifier reused within one document
    Duplicate,
    /// Input rejected by defensive parsing
    SecurityPolicy,
    /// Document could not be read from its source
    Unreadable,
}

/// A single validation finding
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ValidationError {
    /// Human-readable description
    pub message: String,
    /// Path-like location, `None` when no addressable node exists
    pub location: Option<String>,
    pub severity: Severity,
    pub kind: ErrorKind,
}

impl ValidationError {
    pub fn error(kind: ErrorKind, message: impl Into<String>, location: Option<String>) -> Self {
        Self {
            message: message.into(),
            location,
            severity: Severity::Error,
            kind,
        }
    }

    pub fn warning(kind: ErrorKind, message: impl Into<String>, location: Option<String>) -> Self {
        Self {
            message: message.into(),
            location,
            severity: Severity::Warning,
            kind,
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(location) => write!(f, "{} ({})", self.message, location),
            None => write!(f, "{}", self.message),
        }
    }
}

/// Ordered, immutable collection of findings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    errors: Vec<ValidationError>,
}

impl ValidationResult {
    /// Build a result, dropping repeated identical findings (first one wins).
    pub fn from_errors(errors: impl IntoIterator<Item = ValidationError>) -> Self {
        let mut seen = HashSet::new();
        let errors = errors
            .into_iter()
            .filter(|error| seen.insert(error.clone()))
            .collect();
        Self { errors }
    }

    pub fn valid() -> Self {
        Self::default()
    }

    /// `true` when no finding has error severity
    pub fn is_valid(&self) -> bool {
        !self.errors.iter().any(ValidationError::is_error)
    }

    /// Every finding, warnings included, in evaluation order
    pub fn errors(&self) -> &[ValidationError] {
        &self.errors
    }

    pub fn into_errors(self) -> Vec<ValidationError> {
        self.errors
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn error_count(&self) -> usize {
        self.errors.iter().filter(|error| error.is_error()).count()
    }

    pub fn warning_count(&self) -> usize {
        self.errors.len() - self.error_count()
    }

    pub fn of_kind(&self, kind: ErrorKind) -> impl Iterator<Item = &ValidationError> {
        self.errors.iter().filter(move |error| error.kind == kind)
    }

    /// Convert an invalid result into [`SarError::ValidationFailed`].
    pub fn require_valid(&self) -> Result<(), SarError> {
        if self.is_valid() {
            return Ok(());
        }

        let summary = self
            .errors
            .iter()
            .filter(|error| error.is_error())
            .map(|error| error.message.as_str())
            .collect::<Vec<_>>()
            .join("; ");
        Err(SarError::ValidationFailed { summary })
    }
}

/// Caller-supplied knobs for semantic checks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationOptions {
    /// Reference date for future-date warnings; the local date when `None`
    pub today: Option<NaiveDate>,
    /// Accepted currency codes; any well-formed code when `None`
    pub currency_allow_list: Option<BTreeSet<String>>,
    /// Expected root element name
    pub root_tag: String,
}

impl Default for ValidationOptions {
    fn default() -> Self {
        Self {
            today: None,
            currency_allow_list: None,
            root_tag: rules::DEFAULT_ROOT_TAG.to_string(),
        }
    }
}

impl ValidationOptions {
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    pub fn with_currencies<I, S>(mut self, currencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.currency_allow_list = Some(currencies.into_iter().map(Into::into).collect());
        self
    }
}

/// Entry point of the rule engine
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Validator {
    options: ValidationOptions,
}

impl Validator {
    pub fn new(options: ValidationOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ValidationOptions {
        &self.options
    }

    pub fn validate(&self, text: &str) -> ValidationResult {
        match ParsedTree::parse(text) {
            Ok(tree) => self.validate_tree(&tree),
            Err(error) => ValidationResult::from_errors([error]),
        }
    }

    pub fn validate_bytes(&self, bytes: &[u8]) -> ValidationResult {
        match ParsedTree::parse_bytes(bytes) {
            Ok(tree) => self.validate_tree(&tree),
            Err(error) => ValidationResult::from_errors([error]),
        }
    }

    pub fn validate_document(&self, document: &RawDocument) -> ValidationResult {
        self.validate(document.text())
    }

    /// Run every rule, in order, over an already parsed tree.
    pub fn validate_tree(&self, tree: &ParsedTree) -> ValidationResult {
        let today = self
            .options
            .today
            .unwrap_or_else(|| Local::now().date_naive());
        let context = RuleContext::new(
            tree,
            today,
            self.options.currency_allow_list.as_ref(),
            &self.options.root_tag,
        );
        ValidationResult::from_errors(rules::evaluate(&context))
    }

    /// Read a file and validate it. Read failures come back as findings.
    pub async fn validate_path(&self, path: &Path) -> ValidationResult {
        match tokio::fs::read(path).await {
            Ok(bytes) => self.validate_bytes(&bytes),
            Err(err) => ValidationResult::from_errors([ValidationError::error(
                ErrorKind::Unreadable,
                format!("Unable to read file {}: {}", path.display(), err),
                None,
            )]),
        }
    }

    /// Validate and report the outcome to the instrumentation sinks.
    pub fn validate_instrumented(
        &self,
        text: &str,
        correlation: &CorrelationContext,
        instrumentation: &Instrumentation,
    ) -> ValidationResult {
        let result = self.validate(text);

        let error_count = result.error_count().to_string();
        let warning_count = result.warning_count().to_string();
        let status = if result.is_valid() { "valid" } else { "invalid" };
        let level = if result.is_valid() {
            Level::INFO
        } else {
            Level::WARN
        };
        let fields = [
            ("stage", "validation"),
            ("status", status),
            ("error_count", error_count.as_str()),
            ("warning_count", warning_count.as_str()),
        ];

        instrumentation.emit_log(level, "sar_validation_completed", correlation, &fields);
        instrumentation.emit_metric("sar.validation.completed", 1.0, correlation, &fields);
        instrumentation.emit_metric(
            "sar.validation.errors",
            result.error_count() as f64,
            correlation,
            &[("stage", "validation")],
        );

        result
    }
}

/// Validate a document with default options.
pub fn validate(text: &str) -> ValidationResult {
    Validator::default().validate(text)
}

/// Validate a document on disk with default options.
pub async fn validate_path(path: &Path) -> ValidationResult {
    Validator::default().validate_path(path).await
}
