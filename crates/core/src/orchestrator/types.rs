//! Types for the ingest orchestrator.

use serde::Serialize;
use thiserror::Error;

use crate::activation::{ActivationError, ActivationFailureKind, ActivationReport};
use crate::dispatch::{DispatchError, DispatchReport};
use crate::provision::ProvisioningError;

/// Process exit code for a run that finished without fatal errors.
pub const EXIT_OK: i32 = 0;
/// Process exit code for a strict run that left records undelivered.
pub const EXIT_RECORDS_FAILED: i32 = 1;
/// Process exit code for a cancelled run (128 + SIGINT).
pub const EXIT_CANCELLED: i32 = 130;

/// Fatal errors that end a run.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// The role or pipeline could not be provisioned.
    #[error("provisioning failed: {0}")]
    Provisioning(#[from] ProvisioningError),

    /// The pipeline never became usable.
    #[error("activation failed: {0}")]
    Activation(#[from] ActivationError),

    /// A batch submission failed outright, or the record source broke.
    #[error("dispatch failed: {0}")]
    Dispatch(#[from] DispatchError),

    /// Cancelled before any work started.
    #[error("run cancelled before provisioning")]
    Cancelled,
}

/// Which stage a fatal error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Provisioning,
    ActivationTimeout,
    ActivationTerminal,
    Transport,
    Source,
    Cancelled,
}

impl FailureKind {
    /// Returns the string representation for logs and JSON output.
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Provisioning => "provisioning",
            FailureKind::ActivationTimeout => "activation_timeout",
            FailureKind::ActivationTerminal => "activation_terminal",
            FailureKind::Transport => "transport",
            FailureKind::Source => "source",
            FailureKind::Cancelled => "cancelled",
        }
    }

    /// Process exit code for this kind of failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            FailureKind::Provisioning => 2,
            FailureKind::ActivationTimeout => 3,
            FailureKind::ActivationTerminal => 4,
            FailureKind::Transport => 5,
            FailureKind::Source => 6,
            FailureKind::Cancelled => EXIT_CANCELLED,
        }
    }
}

impl OrchestratorError {
    /// Classify this error.
    pub fn kind(&self) -> FailureKind {
        match self {
            OrchestratorError::Provisioning(_) => FailureKind::Provisioning,
            OrchestratorError::Activation(e) => match e.kind() {
                ActivationFailureKind::Timeout => FailureKind::ActivationTimeout,
                ActivationFailureKind::Terminal => FailureKind::ActivationTerminal,
                ActivationFailureKind::Cancelled => FailureKind::Cancelled,
            },
            OrchestratorError::Dispatch(DispatchError::Source(_)) => FailureKind::Source,
            // A batch size outside the transport limit is a setup problem
            // caught before anything is sent.
            OrchestratorError::Dispatch(DispatchError::InvalidBatchSize(_)) => {
                FailureKind::Provisioning
            }
            OrchestratorError::Dispatch(DispatchError::Transport { .. }) => FailureKind::Transport,
            OrchestratorError::Cancelled => FailureKind::Cancelled,
        }
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        self.kind().exit_code()
    }
}

/// Outcome of a run that reached the dispatch stage and finished it.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    /// Correlates log lines for one run.
    pub run_id: String,
    /// Pipeline name.
    pub pipeline: String,
    /// Pipeline identifier (ARN).
    pub pipeline_arn: String,
    /// Whether this run created the pipeline.
    pub created: bool,
    /// Present only when the pipeline was created and had to be waited on.
    pub activation: Option<ActivationReport>,
    pub dispatch: DispatchReport,
}

impl RunSummary {
    /// Every record delivered and dispatch ran to the end.
    pub fn is_clean(&self) -> bool {
        !self.dispatch.cancelled && self.dispatch.permanent_failures() == 0
    }

    /// Process exit code. Permanently failed records only count as a
    /// failure when `strict` is set.
    pub fn exit_code(&self, strict: bool) -> i32 {
        if self.dispatch.cancelled {
            EXIT_CANCELLED
        } else if strict && self.dispatch.permanent_failures() > 0 {
            EXIT_RECORDS_FAILED
        } else {
            EXIT_OK
        }
    }
}
