//! Transactional pipeline
//!
//! One `process` call validates a document and, only when it is valid,
//! persists it inside a single unit of work:
//!
//! ```text
//! Received -> Validating -> Rejected
//!                        -> Validated -> TxBegin -> TxSave -> TxCommit -> Completed
//!                                                          \-> TxRollback -> Failed
//! ```
//!
//! Validation failures come back as data. Only [`PersistenceError`]s cross the
//! boundary, and a save or commit failure is always rolled back first.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{PersistenceError, PersistenceResult};
use crate::instrumentation::{CorrelationContext, Instrumentation, Level};
use crate::validator::{ValidationResult, Validator};

/// Unit-of-work control exposed by the storage layer
#[async_trait]
pub trait TransactionManager: Send + Sync {
    async fn begin(&self) -> PersistenceResult<()>;
    async fn commit(&self) -> PersistenceResult<()>;
    async fn rollback(&self) -> PersistenceResult<()>;
}

/// Storage for accepted SAR payloads
#[async_trait]
pub trait SarRepository: Send + Sync {
    async fn save(&self, document: &str, correlation_id: &str) -> PersistenceResult<()>;
}

/// Pipeline states; every transition emits one log event and one metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineStage {
    Received,
    Validating,
    Rejected,
    Validated,
    TxBegin,
    TxSave,
    TxCommit,
    Completed,
    TxRollback,
    Failed,
}

impl PipelineStage {
    pub fn name(self) -> &'static str {
        match self {
            PipelineStage::Received => "received",
            PipelineStage::Validating => "validating",
            PipelineStage::Rejected => "rejected",
            PipelineStage::Validated => "validated",
            PipelineStage::TxBegin => "tx_begin",
            PipelineStage::TxSave => "tx_save",
            PipelineStage::TxCommit => "tx_commit",
            PipelineStage::Completed => "completed",
            PipelineStage::TxRollback => "tx_rollback",
            PipelineStage::Failed => "failed",
        }
    }

    pub fn log_event(self) -> &'static str {
        match self {
            PipelineStage::Received => "sar_request_received",
            PipelineStage::Validating => "sar_validation_started",
            PipelineStage::Rejected => "sar_request_rejected",
            PipelineStage::Validated => "sar_request_validated",
            PipelineStage::TxBegin => "sar_transaction_started",
            PipelineStage::TxSave => "sar_payload_saved",
            PipelineStage::TxCommit => "sar_transaction_committed",
            PipelineStage::Completed => "sar_request_completed",
            PipelineStage::TxRollback => "sar_transaction_rolled_back",
            PipelineStage::Failed => "sar_request_failed",
        }
    }

    pub fn metric_name(self) -> &'static str {
        match self {
            PipelineStage::Received => "sar.request.received",
            PipelineStage::Validating => "sar.validation.started",
            PipelineStage::Rejected => "sar.request.rejected",
            PipelineStage::Validated => "sar.request.validated",
            PipelineStage::TxBegin => "sar.storage.transaction_started",
            PipelineStage::TxSave => "sar.storage.saved",
            PipelineStage::TxCommit => "sar.storage.transaction_committed",
            PipelineStage::Completed => "sar.request.completed",
            PipelineStage::TxRollback => "sar.storage.rolled_back",
            PipelineStage::Failed => "sar.storage.failed",
        }
    }

    pub fn level(self) -> Level {
        match self {
            PipelineStage::Rejected | PipelineStage::TxRollback => Level::WARN,
            PipelineStage::Failed => Level::ERROR,
            _ => Level::INFO,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PipelineStage::Rejected | PipelineStage::Completed | PipelineStage::Failed
        )
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Validate-then-persist processor
#[derive(Clone)]
pub struct SarProcessor {
    repository: Arc<dyn SarRepository>,
    transactions: Arc<dyn TransactionManager>,
    instrumentation: Instrumentation,
    validator: Validator,
}

impl fmt::Debug for SarProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SarProcessor")
            .field("instrumentation", &self.instrumentation)
            .field("validator", &self.validator)
            .finish_non_exhaustive()
    }
}

impl SarProcessor {
    pub fn new(
        repository: Arc<dyn SarRepository>,
        transactions: Arc<dyn TransactionManager>,
    ) -> Self {
        Self {
            repository,
            transactions,
            instrumentation: Instrumentation::default(),
            validator: Validator::default(),
        }
    }

    pub fn with_instrumentation(mut self, instrumentation: Instrumentation) -> Self {
        self.instrumentation = instrumentation;
        self
    }

    pub fn with_validator(mut self, validator: Validator) -> Self {
        self.validator = validator;
        self
    }

    pub fn validator(&self) -> &Validator {
        &self.validator
    }

    /// Validate `text` and persist it when valid.
    ///
    /// An invalid document is returned as `Ok` without touching storage.
    /// `Err` means storage failed; by then any open transaction has been
    /// rolled back.
    pub async fn process(
        &self,
        text: &str,
        correlation: &CorrelationContext,
    ) -> PersistenceResult<ValidationResult> {
        self.transition(PipelineStage::Received, correlation, &[]);
        self.transition(PipelineStage::Validating, correlation, &[]);

        let result = self
            .validator
            .validate_instrumented(text, correlation, &self.instrumentation);
        let error_count = result.error_count().to_string();
        let warning_count = result.warning_count().to_string();
        let counts = [
            ("error_count", error_count.as_str()),
            ("warning_count", warning_count.as_str()),
        ];

        if !result.is_valid() {
            self.transition(PipelineStage::Rejected, correlation, &counts);
            return Ok(result);
        }
        self.transition(PipelineStage::Validated, correlation, &counts);

        if let Err(err) = self.transactions.begin().await {
            // Nothing is open yet, so there is nothing to roll back.
            self.fail(correlation, &err);
            return Err(err);
        }
        self.transition(PipelineStage::TxBegin, correlation, &[]);

        if let Err(err) = self.persist(text, correlation).await {
            self.roll_back(correlation).await;
            self.fail(correlation, &err);
            return Err(err);
        }

        self.transition(PipelineStage::Completed, correlation, &counts);
        Ok(result)
    }

    async fn persist(&self, text: &str, correlation: &CorrelationContext) -> PersistenceResult<()> {
        self.repository.save(text, correlation.id()).await?;
        self.transition(PipelineStage::TxSave, correlation, &[]);

        self.transactions.commit().await?;
        self.transition(PipelineStage::TxCommit, correlation, &[]);
        Ok(())
    }

    async fn roll_back(&self, correlation: &CorrelationContext) {
        match self.transactions.rollback().await {
            Ok(()) => self.transition(PipelineStage::TxRollback, correlation, &[]),
            Err(rollback_err) => {
                let details = rollback_err.to_string();
                self.instrumentation.emit_log(
                    Level::ERROR,
                    "sar_rollback_failed",
                    correlation,
                    &[("stage", PipelineStage::TxRollback.name()), ("error", details.as_str())],
                );
                tracing::error!(
                    correlation_id = correlation.id(),
                    error = %rollback_err,
                    "Rollback failed"
                );
            }
        }
    }

    fn fail(&self, correlation: &CorrelationContext, err: &PersistenceError) {
        let details = err.to_string();
        self.transition(PipelineStage::Failed, correlation, &[("error", details.as_str())]);
    }

    fn transition(
        &self,
        stage: PipelineStage,
        correlation: &CorrelationContext,
        extra: &[(&str, &str)],
    ) {
        let mut fields: Vec<(&str, &str)> = Vec::with_capacity(extra.len() + 1);
        fields.push(("stage", stage.name()));
        fields.extend_from_slice(extra);

        self.instrumentation
            .emit_log(stage.level(), stage.log_event(), correlation, &fields);
        self.instrumentation
            .emit_metric(stage.metric_name(), 1.0, correlation, &fields);
    }
}
