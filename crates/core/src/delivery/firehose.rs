//! Kinesis Data Firehose implementation of [`DeliveryClient`].

use async_trait::async_trait;
use aws_sdk_firehose::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_firehose::primitives::Blob;
use aws_sdk_firehose::types::{
    BufferingHints, DeliveryStreamStatus, DeliveryStreamType, ExtendedS3DestinationConfiguration,
    KinesisStreamSourceConfiguration, Record as FirehoseRecord,
};
use tracing::debug;

use crate::config::AwsConfig;

use super::{
    BatchResult, CreatePipelineRequest, DeliveryClient, DeliveryError, PipelineDescription,
    PipelineStatus, Record, RecordOutcome, SourceMode,
};

/// Firehose delivery stream client.
#[derive(Debug, Clone)]
pub struct FirehoseClient {
    client: aws_sdk_firehose::Client,
}

impl FirehoseClient {
    /// Wrap an existing SDK client.
    pub fn new(client: aws_sdk_firehose::Client) -> Self {
        Self { client }
    }

    /// Build a client from the ambient AWS environment plus `config`.
    pub async fn from_config(config: &AwsConfig) -> Self {
        let shared = crate::aws::load_sdk_config(config).await;
        let mut builder = aws_sdk_firehose::config::Builder::from(&shared);
        if let Some(url) = &config.endpoint_url {
            builder = builder.endpoint_url(url);
        }
        Self::new(aws_sdk_firehose::Client::from_conf(builder.build()))
    }

    fn to_sdk_record(record: &Record) -> Result<FirehoseRecord, DeliveryError> {
        FirehoseRecord::builder()
            .data(Blob::new(record.as_bytes()))
            .build()
            .map_err(|e| DeliveryError::InvalidRequest(e.to_string()))
    }
}

fn map_status(status: &DeliveryStreamStatus) -> PipelineStatus {
    match status {
        DeliveryStreamStatus::Creating => PipelineStatus::Creating,
        DeliveryStreamStatus::Active => PipelineStatus::Active,
        DeliveryStreamStatus::Deleting => PipelineStatus::Deleting,
        DeliveryStreamStatus::CreatingFailed | DeliveryStreamStatus::DeletingFailed => {
            PipelineStatus::Failed
        }
        _ => PipelineStatus::Unknown,
    }
}

fn map_sdk_error<E, R>(err: SdkError<E, R>) -> DeliveryError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    match &err {
        SdkError::TimeoutError(_) => DeliveryError::Timeout,
        SdkError::DispatchFailure(_) => {
            DeliveryError::ConnectionFailed(DisplayErrorContext(&err).to_string())
        }
        SdkError::ServiceError(_) => {
            let code = err.code().unwrap_or("Unknown").to_string();
            let message = err
                .message()
                .map(str::to_string)
                .unwrap_or_else(|| DisplayErrorContext(&err).to_string());
            if code.contains("Throttl") || code == "LimitExceededException" {
                DeliveryError::Throttled(message)
            } else if code == "InvalidArgumentException" {
                DeliveryError::InvalidRequest(message)
            } else {
                DeliveryError::Service { code, message }
            }
        }
        _ => DeliveryError::Service {
            code: "Unknown".to_string(),
            message: DisplayErrorContext(&err).to_string(),
        },
    }
}

#[async_trait]
impl DeliveryClient for FirehoseClient {
    fn name(&self) -> &str {
        "firehose"
    }

    async fn describe(&self, name: &str) -> Result<Option<PipelineDescription>, DeliveryError> {
        let result = self
            .client
            .describe_delivery_stream()
            .delivery_stream_name(name)
            .send()
            .await;

        match result {
            Ok(output) => {
                let description = output.delivery_stream_description().ok_or_else(|| {
                    DeliveryError::MalformedResponse(format!(
                        "describe of {} returned no description",
                        name
                    ))
                })?;
                Ok(Some(PipelineDescription {
                    arn: description.delivery_stream_arn().to_string(),
                    status: map_status(description.delivery_stream_status()),
                }))
            }
            Err(err) => {
                let not_found = err
                    .as_service_error()
                    .map(|e| e.is_resource_not_found_exception())
                    .unwrap_or(false);
                if not_found {
                    debug!("Delivery stream {} does not exist", name);
                    Ok(None)
                } else {
                    Err(map_sdk_error(err))
                }
            }
        }
    }

    async fn create(&self, request: &CreatePipelineRequest) -> Result<String, DeliveryError> {
        let interval = i32::try_from(request.buffering_interval_secs).map_err(|_| {
            DeliveryError::InvalidRequest(format!(
                "buffering interval {} out of range",
                request.buffering_interval_secs
            ))
        })?;

        let destination = ExtendedS3DestinationConfiguration::builder()
            .bucket_arn(&request.bucket_arn)
            .role_arn(&request.role_arn)
            .buffering_hints(BufferingHints::builder().interval_in_seconds(interval).build())
            .build()
            .map_err(|e| DeliveryError::InvalidRequest(e.to_string()))?;

        let (stream_type, stream_source) = match &request.source {
            SourceMode::DirectPush => (DeliveryStreamType::DirectPut, None),
            SourceMode::StreamFed { stream_arn } => {
                let source = KinesisStreamSourceConfiguration::builder()
                    .kinesis_stream_arn(stream_arn)
                    .role_arn(&request.role_arn)
                    .build()
                    .map_err(|e| DeliveryError::InvalidRequest(e.to_string()))?;
                (DeliveryStreamType::KinesisStreamAsSource, Some(source))
            }
        };

        let output = self
            .client
            .create_delivery_stream()
            .delivery_stream_name(&request.name)
            .delivery_stream_type(stream_type)
            .set_kinesis_stream_source_configuration(stream_source)
            .extended_s3_destination_configuration(destination)
            .send()
            .await
            .map_err(map_sdk_error)?;

        output
            .delivery_stream_arn()
            .map(str::to_string)
            .ok_or_else(|| {
                DeliveryError::MalformedResponse(format!(
                    "create of {} returned no stream ARN",
                    request.name
                ))
            })
    }

    async fn put_batch(&self, name: &str, records: &[Record]) -> Result<BatchResult, DeliveryError> {
        let sdk_records = records
            .iter()
            .map(Self::to_sdk_record)
            .collect::<Result<Vec<_>, _>>()?;

        let output = self
            .client
            .put_record_batch()
            .delivery_stream_name(name)
            .set_records(Some(sdk_records))
            .send()
            .await
            .map_err(map_sdk_error)?;

        let responses = output.request_responses();
        if responses.len() != records.len() {
            return Err(DeliveryError::MalformedResponse(format!(
                "sent {} records, got {} responses",
                records.len(),
                responses.len()
            )));
        }

        let outcomes = responses
            .iter()
            .map(|entry| match entry.error_code() {
                Some(code) => RecordOutcome::Rejected {
                    code: code.to_string(),
                    message: entry.error_message().map(str::to_string),
                },
                None => RecordOutcome::Accepted {
                    record_id: entry.record_id().map(str::to_string),
                },
            })
            .collect();

        let result = BatchResult::from_outcomes(outcomes);
        if result.failed() as i64 != i64::from(output.failed_put_count()) {
            debug!(
                "FailedPutCount {} disagrees with {} rejected entries; using entries",
                output.failed_put_count(),
                result.failed()
            );
        }
        Ok(result)
    }

    async fn put_single(&self, name: &str, record: &Record) -> Result<(), DeliveryError> {
        self.client
            .put_record()
            .delivery_stream_name(name)
            .record(Self::to_sdk_record(record)?)
            .send()
            .await
            .map_err(map_sdk_error)?;
        Ok(())
    }
}
