use serde::{Deserialize, Serialize};

use crate::activation::ActivationConfig;
use crate::delivery::SourceMode;
use crate::dispatch::DispatchConfig;
use crate::provision::PipelineSpec;

/// Root configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub aws: AwsConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub activation: ActivationConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
}

/// AWS client configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct AwsConfig {
    #[serde(default = "default_region")]
    pub region: String,
    /// Override for the service endpoint (e.g. a local emulator).
    #[serde(default)]
    pub endpoint_url: Option<String>,
}

impl Default for AwsConfig {
    fn default() -> Self {
        Self {
            region: default_region(),
            endpoint_url: None,
        }
    }
}

fn default_region() -> String {
    "us-east-2".to_string()
}

/// How the pipeline receives data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    #[default]
    DirectPush,
    StreamFed,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::DirectPush => "direct_push",
            SourceKind::StreamFed => "stream_fed",
        }
    }
}

impl std::str::FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "direct_push" | "direct-push" => Ok(SourceKind::DirectPush),
            "stream_fed" | "stream-fed" => Ok(SourceKind::StreamFed),
            other => Err(format!(
                "unknown source '{}' (expected direct_push or stream_fed)",
                other
            )),
        }
    }
}

/// Pipeline configuration
///
/// Every field may be left empty in the file and filled in from the
/// command line; [`validate_config`](super::validate_config) checks the
/// merged result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub bucket_arn: String,
    #[serde(default)]
    pub role_name: String,
    #[serde(default)]
    pub source: SourceKind,
    /// Upstream stream, required when `source = "stream_fed"`.
    #[serde(default)]
    pub stream_arn: Option<String>,
}

impl PipelineConfig {
    /// Build the provisioner's desired state.
    pub fn to_spec(&self) -> PipelineSpec {
        let mut spec = PipelineSpec::direct_push(&self.name, &self.bucket_arn, &self.role_name);
        if self.source == SourceKind::StreamFed {
            spec.source = SourceMode::StreamFed {
                stream_arn: self.stream_arn.clone().unwrap_or_default(),
            };
        }
        spec
    }
}
