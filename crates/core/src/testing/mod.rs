//! Testing utilities and mock implementations.
//!
//! This module provides mock implementations of the cloud-facing traits and
//! the clock, so provisioning, activation and dispatch can be exercised
//! without real infrastructure or real delays.
//!
//! # Example
//!
//! ```rust,ignore
//! use streamloader_core::testing::{MockClock, MockDeliveryClient, MockRoleClient};
//!
//! let delivery = Arc::new(MockDeliveryClient::new());
//! let roles = Arc::new(MockRoleClient::new());
//! let clock = Arc::new(MockClock::new());
//!
//! // Script responses
//! delivery.add_pipeline("events", PipelineStatus::Active).await;
//! delivery.reject_in_batch(0, vec![3]).await;
//! ```

mod mock_clock;
mod mock_delivery_client;
mod mock_role_client;

pub use mock_clock::MockClock;
pub use mock_delivery_client::MockDeliveryClient;
pub use mock_role_client::{MockRoleClient, RecordedPolicy, RecordedRole};

/// Test fixtures and helper functions.
pub mod fixtures {
    use crate::delivery::Record;
    use crate::dispatch::MemorySource;
    use crate::provision::PipelineSpec;

    /// Error code the mock delivery client uses for rejected records.
    pub const REJECTION_CODE: &str = "ServiceUnavailableException";

    /// Bucket used by fixture specs.
    pub const BUCKET_ARN: &str = "arn:aws:s3:::raw-data";

    /// Upstream stream used by fixture specs.
    pub const STREAM_ARN: &str = "arn:aws:kinesis:us-east-2:000000000000:stream/upstream";

    /// The record at source position `index`: `record-{index}\n`.
    pub fn numbered_record(index: usize) -> Record {
        Record::from(format!("record-{}\n", index))
    }

    /// `count` distinct records, numbered from zero.
    pub fn numbered_records(count: usize) -> MemorySource {
        (0..count).map(numbered_record).collect()
    }

    /// A direct-push pipeline spec writing to [`BUCKET_ARN`].
    pub fn direct_push_spec(name: &str) -> PipelineSpec {
        PipelineSpec::direct_push(name, BUCKET_ARN, format!("{}_role", name))
    }

    /// A stream-fed pipeline spec reading [`STREAM_ARN`].
    pub fn stream_fed_spec(name: &str) -> PipelineSpec {
        PipelineSpec::stream_fed(name, BUCKET_ARN, format!("{}_role", name), STREAM_ARN)
    }
}
