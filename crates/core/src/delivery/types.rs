//! Types for delivery pipeline operations.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors returned by a delivery pipeline service.
///
/// "Pipeline does not exist" is not an error: [`DeliveryClient::describe`]
/// reports it as `Ok(None)`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Request throttled: {0}")]
    Throttled(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Service error {code}: {message}")]
    Service { code: String, message: String },

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Request timeout")]
    Timeout,
}

/// Where a delivery pipeline gets its records from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SourceMode {
    /// Producers call the pipeline's ingestion API directly.
    DirectPush,
    /// The pipeline reads from an upstream append-only stream.
    StreamFed {
        /// Identifier (ARN) of the upstream stream.
        stream_arn: String,
    },
}

impl SourceMode {
    /// Upstream stream identifier, if this pipeline is stream-fed.
    pub fn upstream_stream(&self) -> Option<&str> {
        match self {
            SourceMode::DirectPush => None,
            SourceMode::StreamFed { stream_arn } => Some(stream_arn.as_str()),
        }
    }

    /// Returns the string representation used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceMode::DirectPush => "direct_push",
            SourceMode::StreamFed { .. } => "stream_fed",
        }
    }
}

/// Observed state of a delivery pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    /// Being created; not yet accepting records.
    Creating,
    /// Accepting records.
    Active,
    /// Being deleted. Never comes back.
    Deleting,
    /// Creation or deletion failed on the service side.
    Failed,
    /// Any status this client does not recognise.
    Unknown,
}

impl PipelineStatus {
    /// Returns the string representation for logs and reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStatus::Creating => "creating",
            PipelineStatus::Active => "active",
            PipelineStatus::Deleting => "deleting",
            PipelineStatus::Failed => "failed",
            PipelineStatus::Unknown => "unknown",
        }
    }

    /// Whether waiting longer can never make this pipeline usable.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineStatus::Deleting | PipelineStatus::Failed)
    }
}

/// Result of describing an existing pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineDescription {
    /// Pipeline identifier (ARN).
    pub arn: String,
    /// Current status.
    pub status: PipelineStatus,
}

/// Fully-resolved request to create a pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatePipelineRequest {
    /// Pipeline name.
    pub name: String,
    /// Sink bucket identifier (ARN).
    pub bucket_arn: String,
    /// Role the pipeline assumes to write to the sink (and read the stream).
    pub role_arn: String,
    /// Source configuration.
    pub source: SourceMode,
    /// Sink buffering interval.
    pub buffering_interval_secs: u32,
}

/// One unit of data to deliver. The payload is opaque.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Record {
    data: Vec<u8>,
}

impl Record {
    /// Create a record from raw bytes.
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self { data: data.into() }
    }

    /// Payload bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Payload size in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

}

impl From<&str> for Record {
    fn from(s: &str) -> Self {
        Self::new(s.as_bytes())
    }
}

impl From<String> for Record {
    fn from(s: String) -> Self {
        Self::new(s.into_bytes())
    }
}

/// Per-record outcome inside a batch submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RecordOutcome {
    /// The record was accepted.
    Accepted {
        #[serde(skip_serializing_if = "Option::is_none")]
        record_id: Option<String>,
    },
    /// The record was rejected with an error code.
    Rejected {
        code: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
}

impl RecordOutcome {
    /// Accepted outcome without an id.
    pub fn accepted() -> Self {
        RecordOutcome::Accepted { record_id: None }
    }

    /// Rejected outcome with just a code.
    pub fn rejected(code: impl Into<String>) -> Self {
        RecordOutcome::Rejected {
            code: code.into(),
            message: None,
        }
    }

    /// The error code, if this record was rejected.
    pub fn error_code(&self) -> Option<&str> {
        match self {
            RecordOutcome::Accepted { .. } => None,
            RecordOutcome::Rejected { code, .. } => Some(code.as_str()),
        }
    }
}

/// Outcome of one batch submission.
///
/// Built only through [`BatchResult::from_outcomes`], so `failed` always
/// equals the number of rejected entries and `outcomes.len() == total`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResult {
    total: usize,
    failed: usize,
    outcomes: Vec<RecordOutcome>,
}

impl BatchResult {
    /// Build a result from one outcome per submitted record, in order.
    pub fn from_outcomes(outcomes: Vec<RecordOutcome>) -> Self {
        let failed = outcomes
            .iter()
            .filter(|o| o.error_code().is_some())
            .count();
        Self {
            total: outcomes.len(),
            failed,
            outcomes,
        }
    }

    /// A result where every one of `total` records was accepted.
    pub fn all_accepted(total: usize) -> Self {
        Self::from_outcomes(vec![RecordOutcome::accepted(); total])
    }

    /// Number of records in the batch.
    pub fn total(&self) -> usize {
        self.total
    }

    /// Number of rejected records.
    pub fn failed(&self) -> usize {
        self.failed
    }

    /// Outcomes in submission order.
    pub fn outcomes(&self) -> &[RecordOutcome] {
        &self.outcomes
    }

    /// Local indices of rejected records, ascending, with their error codes.
    pub fn rejected(&self) -> impl Iterator<Item = (usize, &str)> + '_ {
        self.outcomes
            .iter()
            .enumerate()
            .filter_map(|(i, o)| o.error_code().map(|code| (i, code)))
    }
}

/// A delivery pipeline service.
#[async_trait]
pub trait DeliveryClient: Send + Sync {
    /// Returns the name of this backend (for logging).
    fn name(&self) -> &str;

    /// Describe a pipeline by name. `Ok(None)` if it does not exist.
    async fn describe(&self, name: &str) -> Result<Option<PipelineDescription>, DeliveryError>;

    /// Create a pipeline. Returns its identifier.
    async fn create(&self, request: &CreatePipelineRequest) -> Result<String, DeliveryError>;

    /// Submit several records in one call. The call may partially succeed.
    async fn put_batch(&self, name: &str, records: &[Record]) -> Result<BatchResult, DeliveryError>;

    /// Submit a single record.
    async fn put_single(&self, name: &str, record: &Record) -> Result<(), DeliveryError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_result_counts_rejections() {
        let result = BatchResult::from_outcomes(vec![
            RecordOutcome::accepted(),
            RecordOutcome::rejected("ServiceUnavailableException"),
            RecordOutcome::accepted(),
            RecordOutcome::rejected("InternalFailure"),
        ]);
        assert_eq!(result.total(), 4);
        assert_eq!(result.failed(), 2);
        let rejected: Vec<_> = result.rejected().collect();
        assert_eq!(
            rejected,
            vec![(1, "ServiceUnavailableException"), (3, "InternalFailure")]
        );
    }

    #[test]
    fn test_all_accepted() {
        let result = BatchResult::all_accepted(3);
        assert_eq!(result.total(), 3);
        assert_eq!(result.failed(), 0);
        assert_eq!(result.rejected().count(), 0);
    }

    #[test]
    fn test_source_mode_upstream() {
        assert_eq!(SourceMode::DirectPush.upstream_stream(), None);
        let fed = SourceMode::StreamFed {
            stream_arn: "arn:aws:kinesis:us-east-2:1:stream/in".to_string(),
        };
        assert_eq!(
            fed.upstream_stream(),
            Some("arn:aws:kinesis:us-east-2:1:stream/in")
        );
        assert_eq!(fed.as_str(), "stream_fed");
    }

    #[test]
    fn test_source_mode_deserialize() {
        let mode: SourceMode = toml::from_str(
            r#"
            mode = "stream_fed"
            stream_arn = "arn:aws:kinesis:us-east-2:1:stream/in"
        "#,
        )
        .unwrap();
        assert!(matches!(mode, SourceMode::StreamFed { .. }));

        let mode: SourceMode = toml::from_str(r#"mode = "direct_push""#).unwrap();
        assert_eq!(mode, SourceMode::DirectPush);
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(PipelineStatus::Deleting.is_terminal());
        assert!(PipelineStatus::Failed.is_terminal());
        assert!(!PipelineStatus::Creating.is_terminal());
        assert!(!PipelineStatus::Active.is_terminal());
        assert!(!PipelineStatus::Unknown.is_terminal());
    }

    #[test]
    fn test_record_outcome_serialization() {
        let json = serde_json::to_string(&RecordOutcome::rejected("Throttled")).unwrap();
        assert_eq!(json, r#"{"outcome":"rejected","code":"Throttled"}"#);
    }
}
