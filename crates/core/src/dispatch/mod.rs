//! Batch dispatch of local records into a delivery pipeline.
//!
//! Two phases per batch: submit the batch as a unit, then resubmit each
//! rejected record once on its own. A record rejected twice is counted as a
//! permanent failure and never tried again.

mod config;
mod dispatcher;
mod report;
mod source;

pub use config::{DispatchConfig, MAX_BATCH_SIZE};
pub use dispatcher::{BatchDispatcher, DispatchError};
pub use report::{BatchReport, DispatchReport, FailedRecord};
pub use source::{LineFileSource, MemorySource, RecordIter, RecordSource, SourceError};
