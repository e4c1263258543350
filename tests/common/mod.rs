#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::NaiveDate;

use sar_validator::error::{PersistenceError, PersistenceResult};
use sar_validator::{
    Level, LogSink, MetricsRecorder, SarRepository, TransactionManager, ValidationOptions,
    Validator,
};

pub const VALID_SAR: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<SAR>
  <FilingInformation>
    <FilingType>Initial</FilingType>
    <FilingDate>2024-03-01</FilingDate>
  </FilingInformation>
  <FilerInformation>
    <FilerName>Example Financial</FilerName>
    <FilerAddress>
      <AddressLine1>1 Main Street</AddressLine1>
      <City>Springfield</City>
      <Country>US</Country>
    </FilerAddress>
  </FilerInformation>
  <Subjects>
    <Subject>
      <Name>John Doe</Name>
      <EntityType>Individual</EntityType>
    </Subject>
  </Subjects>
  <Transactions>
    <Transaction>
      <Date>2024-02-14</Date>
      <Amount currency="USD">100.00</Amount>
      <UETR>550e8400-e29b-41d4-a716-446655440000</UETR>
    </Transaction>
    <Transaction>
      <Date>2024-02-15</Date>
      <Amount currency="EUR">2500</Amount>
      <OriginatingAccount>
        <Name>Doe Holdings Ltd</Name>
      </OriginatingAccount>
      <Beneficiaries>
        <Beneficiary>Jane Roe</Beneficiary>
        <Beneficiary>Acme Imports</Beneficiary>
      </Beneficiaries>
      <UETR>7c9e6679742540de944be07fc1f90ae7</UETR>
    </Transaction>
  </Transactions>
</SAR>"#;

/// Reference date used by every fixture-driven test
pub fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
}

pub fn validator() -> Validator {
    Validator::new(ValidationOptions::default().with_today(today()))
}

/// Replace the first occurrence of `from` in the valid fixture.
pub fn sar_with(from: &str, to: &str) -> String {
    assert!(VALID_SAR.contains(from), "fixture does not contain {:?}", from);
    VALID_SAR.replacen(from, to, 1)
}

/// Ordered record of collaborator calls, shared between fakes
#[derive(Clone, Default)]
pub struct CallLog {
    calls: Arc<Mutex<Vec<String>>>,
}

impl CallLog {
    pub fn push(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

/// Which collaborator step should fail
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum FailAt {
    #[default]
    Nowhere,
    Begin,
    Save,
    Commit,
    SaveAndRollback,
}

/// Transaction manager that records calls and fails on request
pub struct FakeTransactionManager {
    log: CallLog,
    fail_at: FailAt,
}

impl FakeTransactionManager {
    pub fn new(log: CallLog, fail_at: FailAt) -> Self {
        Self { log, fail_at }
    }
}

#[async_trait]
impl TransactionManager for FakeTransactionManager {
    async fn begin(&self) -> PersistenceResult<()> {
        self.log.push("begin");
        if self.fail_at == FailAt::Begin {
            return Err(PersistenceError::Begin {
                details: "pool exhausted".to_string(),
            });
        }
        Ok(())
    }

    async fn commit(&self) -> PersistenceResult<()> {
        self.log.push("commit");
        if self.fail_at == FailAt::Commit {
            return Err(PersistenceError::Commit {
                details: "serialization failure".to_string(),
            });
        }
        Ok(())
    }

    async fn rollback(&self) -> PersistenceResult<()> {
        self.log.push("rollback");
        if self.fail_at == FailAt::SaveAndRollback {
            return Err(PersistenceError::Rollback {
                details: "connection lost".to_string(),
            });
        }
        Ok(())
    }
}

/// Repository that records saved payloads
pub struct FakeRepository {
    log: CallLog,
    fail_at: FailAt,
    saved: Arc<Mutex<Vec<(String, String)>>>,
}

impl FakeRepository {
    pub fn new(log: CallLog, fail_at: FailAt) -> Self {
        Self {
            log,
            fail_at,
            saved: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn saved(&self) -> Vec<(String, String)> {
        self.saved.lock().unwrap().clone()
    }
}

#[async_trait]
impl SarRepository for FakeRepository {
    async fn save(&self, document: &str, correlation_id: &str) -> PersistenceResult<()> {
        self.log.push("save");
        if matches!(self.fail_at, FailAt::Save | FailAt::SaveAndRollback) {
            return Err(PersistenceError::Save {
                correlation_id: correlation_id.to_string(),
                details: "duplicate filing".to_string(),
            });
        }
        self.saved
            .lock()
            .unwrap()
            .push((document.to_string(), correlation_id.to_string()));
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct LogRecord {
    pub level: Level,
    pub message: String,
    pub correlation_id: String,
    pub fields: Vec<(String, String)>,
}

impl LogRecord {
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct MetricRecord {
    pub name: String,
    pub value: f64,
    pub correlation_id: String,
}

/// Log and metric sink that keeps everything it receives
#[derive(Default)]
pub struct RecordingSink {
    logs: Mutex<Vec<LogRecord>>,
    metrics: Mutex<Vec<MetricRecord>>,
}

impl RecordingSink {
    pub fn logs(&self) -> Vec<LogRecord> {
        self.logs.lock().unwrap().clone()
    }

    pub fn metrics(&self) -> Vec<MetricRecord> {
        self.metrics.lock().unwrap().clone()
    }

    pub fn log_messages(&self) -> Vec<String> {
        self.logs().into_iter().map(|record| record.message).collect()
    }

    pub fn metric_names(&self) -> Vec<String> {
        self.metrics().into_iter().map(|record| record.name).collect()
    }
}

impl LogSink for RecordingSink {
    fn emit(&self, level: Level, message: &str, correlation_id: &str, fields: &[(&str, &str)]) {
        self.logs.lock().unwrap().push(LogRecord {
            level,
            message: message.to_string(),
            correlation_id: correlation_id.to_string(),
            fields: fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        });
    }
}

impl MetricsRecorder for RecordingSink {
    fn record(&self, name: &str, value: f64, correlation_id: &str, _labels: &[(&str, &str)]) {
        self.metrics.lock().unwrap().push(MetricRecord {
            name: name.to_string(),
            value,
            correlation_id: correlation_id.to_string(),
        });
    }
}
