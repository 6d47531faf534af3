pub mod activation;
pub mod aws;
pub mod clock;
pub mod config;
pub mod delivery;
pub mod dispatch;
pub mod identity;
pub mod metrics;
pub mod orchestrator;
pub mod provision;
pub mod testing;

pub use activation::{
    ActivationConfig, ActivationError, ActivationFailureKind, ActivationReport, ActivationWaiter,
};
pub use clock::{Clock, SystemClock};
pub use config::{
    load_config, load_config_from_str, load_layered, validate_config, AwsConfig, Config,
    ConfigError, PipelineConfig, SourceKind,
};
pub use delivery::{
    BatchResult, DeliveryClient, DeliveryError, FirehoseClient, PipelineStatus, Record,
    RecordOutcome, SourceMode,
};
pub use dispatch::{
    BatchDispatcher, DispatchConfig, DispatchError, DispatchReport, FailedRecord, LineFileSource,
    MemorySource, RecordSource, SourceError,
};
pub use identity::{IamRoleClient, IdentityError, RoleClient};
pub use orchestrator::{FailureKind, IngestOrchestrator, OrchestratorError, RunSummary};
pub use provision::{PipelineProvisioner, PipelineSpec, Provisioned, ProvisioningError, RoleProvisioner};
