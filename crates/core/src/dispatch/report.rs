//! Dispatch outcome accounting.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A record that failed its batch attempt and its single retry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedRecord {
    /// Position in the source (0-based).
    pub index: usize,
    /// Batch the record was sent in (0-based).
    pub batch: usize,
    /// Error code from the batch submission.
    pub first_error: String,
    /// Error from the single-record retry.
    pub retry_error: String,
}

/// Outcome of one batch, including its retry phase.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BatchReport {
    /// Batch number (0-based).
    pub batch: usize,
    /// Source index of the first record in the batch.
    pub offset: usize,
    /// Records in the batch.
    pub size: usize,
    /// Records resubmitted individually.
    pub retried: usize,
    /// Resubmissions that succeeded.
    pub recovered: usize,
    /// Resubmissions that failed.
    pub failed: Vec<FailedRecord>,
}

impl BatchReport {
    /// Empty report for a batch.
    pub fn new(batch: usize, offset: usize, size: usize) -> Self {
        Self {
            batch,
            offset,
            size,
            ..Default::default()
        }
    }
}

/// Aggregate outcome of a dispatch run.
///
/// Built by summing [`BatchReport`]s, so the totals do not depend on the
/// order batches complete in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchReport {
    /// Records read from the source and submitted.
    pub total_records: usize,
    /// Batch submissions made.
    pub total_batches: usize,
    /// Records resubmitted individually.
    pub retried_records: usize,
    /// Resubmissions that succeeded.
    pub recovered_records: usize,
    /// Records that failed twice, ordered by source index.
    pub permanently_failed: Vec<FailedRecord>,
    /// Whether dispatch stopped early on cancellation.
    pub cancelled: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl DispatchReport {
    /// Empty report for a run starting at `started_at`.
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            total_records: 0,
            total_batches: 0,
            retried_records: 0,
            recovered_records: 0,
            permanently_failed: Vec::new(),
            cancelled: false,
            started_at,
            finished_at: started_at,
        }
    }

    /// Add one batch's outcome.
    pub fn absorb(&mut self, batch: BatchReport) {
        self.total_records += batch.size;
        self.total_batches += 1;
        self.retried_records += batch.retried;
        self.recovered_records += batch.recovered;
        self.permanently_failed.extend(batch.failed);
    }

    /// Seal the report.
    pub fn finish(mut self, finished_at: DateTime<Utc>) -> Self {
        self.permanently_failed.sort_by_key(|f| f.index);
        self.finished_at = finished_at;
        self
    }

    /// Number of records that failed twice.
    pub fn permanent_failures(&self) -> usize {
        self.permanently_failed.len()
    }

    /// Number of records delivered.
    pub fn delivered(&self) -> usize {
        self.total_records - self.permanent_failures()
    }

    /// Source indices of records that failed twice.
    pub fn failed_indices(&self) -> Vec<usize> {
        self.permanently_failed.iter().map(|f| f.index).collect()
    }
}
