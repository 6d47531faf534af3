//! Mock delivery client for testing.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::delivery::{
    BatchResult, CreatePipelineRequest, DeliveryClient, DeliveryError, PipelineDescription,
    PipelineStatus, Record, RecordOutcome,
};

use super::fixtures::REJECTION_CODE;

/// A mock pipeline: its ARN and the statuses `describe` will report.
#[derive(Debug, Clone)]
struct MockPipeline {
    arn: String,
    /// Pops one per describe; the last one sticks.
    statuses: VecDeque<PipelineStatus>,
}

impl MockPipeline {
    fn next_status(&mut self) -> PipelineStatus {
        if self.statuses.len() > 1 {
            self.statuses.pop_front().unwrap_or(PipelineStatus::Unknown)
        } else {
            self.statuses
                .front()
                .copied()
                .unwrap_or(PipelineStatus::Unknown)
        }
    }
}

/// What a given batch call should do.
#[derive(Debug, Clone)]
enum BatchPlan {
    Reject(Vec<usize>),
    Fail(DeliveryError),
}

/// Mock implementation of the DeliveryClient trait.
///
/// Provides controllable behavior for testing:
/// - Script the statuses `describe` reports per pipeline
/// - Reject records by batch call and position, or by payload
/// - Fail whole batch calls or single-record calls
/// - Record every call for assertions
///
/// # Example
///
/// ```rust,ignore
/// let client = MockDeliveryClient::new();
/// client.reject_in_batch(1, vec![3, 7]).await;
///
/// dispatcher.dispatch("events", &source, &cancel).await?;
///
/// assert_eq!(client.single_calls().await.len(), 2);
/// ```
#[derive(Debug)]
pub struct MockDeliveryClient {
    pipelines: Arc<RwLock<HashMap<String, MockPipeline>>>,
    /// Statuses given to pipelines created through `create`.
    post_create_statuses: Arc<RwLock<Vec<PipelineStatus>>>,
    describe_errors: Arc<RwLock<VecDeque<DeliveryError>>>,
    create_error: Arc<RwLock<Option<DeliveryError>>>,
    batch_plans: Arc<RwLock<HashMap<usize, BatchPlan>>>,
    rejected_payloads: Arc<RwLock<HashSet<Record>>>,
    single_failures: Arc<RwLock<HashMap<Record, DeliveryError>>>,
    describe_count: Arc<RwLock<usize>>,
    create_requests: Arc<RwLock<Vec<CreatePipelineRequest>>>,
    batch_calls: Arc<RwLock<Vec<Vec<Record>>>>,
    single_calls: Arc<RwLock<Vec<Record>>>,
}

impl Default for MockDeliveryClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDeliveryClient {
    /// Create a new mock delivery client with no pipelines.
    pub fn new() -> Self {
        Self {
            pipelines: Arc::new(RwLock::new(HashMap::new())),
            post_create_statuses: Arc::new(RwLock::new(vec![
                PipelineStatus::Creating,
                PipelineStatus::Active,
            ])),
            describe_errors: Arc::new(RwLock::new(VecDeque::new())),
            create_error: Arc::new(RwLock::new(None)),
            batch_plans: Arc::new(RwLock::new(HashMap::new())),
            rejected_payloads: Arc::new(RwLock::new(HashSet::new())),
            single_failures: Arc::new(RwLock::new(HashMap::new())),
            describe_count: Arc::new(RwLock::new(0)),
            create_requests: Arc::new(RwLock::new(Vec::new())),
            batch_calls: Arc::new(RwLock::new(Vec::new())),
            single_calls: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// The ARN the mock assigns to pipeline `name`.
    pub fn arn_for(name: &str) -> String {
        format!(
            "arn:aws:firehose:us-east-2:000000000000:deliverystream/{}",
            name
        )
    }

    /// Pre-populate a pipeline with a fixed status.
    pub async fn add_pipeline(&self, name: &str, status: PipelineStatus) {
        self.add_pipeline_with_statuses(name, vec![status]).await;
    }

    /// Pre-populate a pipeline whose status advances on every describe.
    pub async fn add_pipeline_with_statuses(&self, name: &str, statuses: Vec<PipelineStatus>) {
        self.pipelines.write().await.insert(
            name.to_string(),
            MockPipeline {
                arn: Self::arn_for(name),
                statuses: statuses.into(),
            },
        );
    }

    /// Statuses reported by pipelines created after this call.
    /// Defaults to `[Creating, Active]`.
    pub async fn set_post_create_statuses(&self, statuses: Vec<PipelineStatus>) {
        *self.post_create_statuses.write().await = statuses;
    }

    /// Queue an error for the next describe call.
    pub async fn push_describe_error(&self, error: DeliveryError) {
        self.describe_errors.write().await.push_back(error);
    }

    /// Make the next create call fail.
    pub async fn set_create_error(&self, error: DeliveryError) {
        *self.create_error.write().await = Some(error);
    }

    /// Reject the given positions in the `call`-th batch submission (0-based).
    pub async fn reject_in_batch(&self, call: usize, indices: Vec<usize>) {
        self.batch_plans
            .write()
            .await
            .insert(call, BatchPlan::Reject(indices));
    }

    /// Fail the `call`-th batch submission (0-based) outright.
    pub async fn fail_batch(&self, call: usize, error: DeliveryError) {
        self.batch_plans
            .write()
            .await
            .insert(call, BatchPlan::Fail(error));
    }

    /// Reject `record` wherever it appears in a batch.
    pub async fn reject_record(&self, record: Record) {
        self.rejected_payloads.write().await.insert(record);
    }

    /// Fail single-record submissions of `record`.
    pub async fn fail_single(&self, record: Record, error: DeliveryError) {
        self.single_failures.write().await.insert(record, error);
    }

    /// Number of describe calls made.
    pub async fn describe_count(&self) -> usize {
        *self.describe_count.read().await
    }

    /// Recorded create calls.
    pub async fn create_requests(&self) -> Vec<CreatePipelineRequest> {
        self.create_requests.read().await.clone()
    }

    /// Recorded batch submissions, in call order.
    pub async fn batch_calls(&self) -> Vec<Vec<Record>> {
        self.batch_calls.read().await.clone()
    }

    /// Recorded single-record submissions, in call order.
    pub async fn single_calls(&self) -> Vec<Record> {
        self.single_calls.read().await.clone()
    }

    /// Check if a pipeline exists.
    pub async fn has_pipeline(&self, name: &str) -> bool {
        self.pipelines.read().await.contains_key(name)
    }
}

#[async_trait]
impl DeliveryClient for MockDeliveryClient {
    fn name(&self) -> &str {
        "mock"
    }

    async fn describe(&self, name: &str) -> Result<Option<PipelineDescription>, DeliveryError> {
        *self.describe_count.write().await += 1;

        if let Some(error) = self.describe_errors.write().await.pop_front() {
            return Err(error);
        }

        let mut pipelines = self.pipelines.write().await;
        Ok(pipelines.get_mut(name).map(|pipeline| PipelineDescription {
            arn: pipeline.arn.clone(),
            status: pipeline.next_status(),
        }))
    }

    async fn create(&self, request: &CreatePipelineRequest) -> Result<String, DeliveryError> {
        self.create_requests.write().await.push(request.clone());

        if let Some(error) = self.create_error.write().await.take() {
            return Err(error);
        }

        let mut pipelines = self.pipelines.write().await;
        if pipelines.contains_key(&request.name) {
            return Err(DeliveryError::Service {
                code: "ResourceInUseException".to_string(),
                message: format!("{} already exists", request.name),
            });
        }

        let arn = Self::arn_for(&request.name);
        let statuses = self.post_create_statuses.read().await.clone();
        pipelines.insert(
            request.name.clone(),
            MockPipeline {
                arn: arn.clone(),
                statuses: statuses.into(),
            },
        );
        Ok(arn)
    }

    async fn put_batch(&self, _name: &str, records: &[Record]) -> Result<BatchResult, DeliveryError> {
        let call = {
            let mut calls = self.batch_calls.write().await;
            calls.push(records.to_vec());
            calls.len() - 1
        };

        let plan = self.batch_plans.read().await.get(&call).cloned();
        let rejected_positions = match plan {
            Some(BatchPlan::Fail(error)) => return Err(error),
            Some(BatchPlan::Reject(indices)) => indices,
            None => Vec::new(),
        };

        let rejected_payloads = self.rejected_payloads.read().await;
        let outcomes = records
            .iter()
            .enumerate()
            .map(|(i, record)| {
                if rejected_positions.contains(&i) || rejected_payloads.contains(record) {
                    RecordOutcome::rejected(REJECTION_CODE)
                } else {
                    RecordOutcome::accepted()
                }
            })
            .collect();

        Ok(BatchResult::from_outcomes(outcomes))
    }

    async fn put_single(&self, _name: &str, record: &Record) -> Result<(), DeliveryError> {
        self.single_calls.write().await.push(record.clone());

        match self.single_failures.read().await.get(record) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}
