use super::{types::Config, ConfigError, SourceKind};
use crate::dispatch::MAX_BATCH_SIZE;

/// Validate configuration
/// Currently validates:
/// - Pipeline, bucket and role names are present
/// - Bucket ARN looks like an ARN
/// - Source mode and stream ARN agree
/// - Dispatch batch size is within the transport limit
/// - Activation polling can make progress
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let pipeline = &config.pipeline;

    if pipeline.name.trim().is_empty() {
        return Err(invalid("pipeline.name cannot be empty"));
    }
    if pipeline.role_name.trim().is_empty() {
        return Err(invalid("pipeline.role_name cannot be empty"));
    }
    if pipeline.bucket_arn.trim().is_empty() {
        return Err(invalid("pipeline.bucket_arn cannot be empty"));
    }
    if !pipeline.bucket_arn.starts_with("arn:") {
        return Err(ConfigError::ValidationError(format!(
            "pipeline.bucket_arn must be an ARN, got '{}'",
            pipeline.bucket_arn
        )));
    }

    let stream_arn = pipeline
        .stream_arn
        .as_deref()
        .filter(|arn| !arn.trim().is_empty());
    match (pipeline.source, stream_arn) {
        (SourceKind::StreamFed, None) => {
            return Err(invalid(
                "pipeline.stream_arn is required when source is stream_fed",
            ))
        }
        (SourceKind::DirectPush, Some(_)) => {
            return Err(invalid(
                "pipeline.stream_arn is only valid when source is stream_fed",
            ))
        }
        _ => {}
    }

    if config.dispatch.batch_size == 0 || config.dispatch.batch_size > MAX_BATCH_SIZE {
        return Err(ConfigError::ValidationError(format!(
            "dispatch.batch_size must be between 1 and {}, got {}",
            MAX_BATCH_SIZE, config.dispatch.batch_size
        )));
    }
    if config.dispatch.max_in_flight_batches == 0 {
        return Err(invalid("dispatch.max_in_flight_batches cannot be 0"));
    }

    if config.activation.poll_interval_ms == 0 {
        return Err(invalid("activation.poll_interval_ms cannot be 0"));
    }
    if config.activation.max_attempts == 0 {
        return Err(invalid("activation.max_attempts cannot be 0"));
    }

    Ok(())
}

fn invalid(message: &str) -> ConfigError {
    ConfigError::ValidationError(message.to_string())
}
