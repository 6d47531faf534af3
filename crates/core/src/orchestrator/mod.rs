//! Ingest orchestrator: the single entry point for a load run.
//!
//! Sequence per run:
//! - **Provision**: ensure role and pipeline exist (skipped if the pipeline exists)
//! - **Activate**: wait for a newly created pipeline to become active
//! - **Dispatch**: send every record in batches, retrying rejections once

mod runner;
mod types;

pub use runner::IngestOrchestrator;
pub use types::{
    FailureKind, OrchestratorError, RunSummary, EXIT_CANCELLED, EXIT_OK, EXIT_RECORDS_FAILED,
};
