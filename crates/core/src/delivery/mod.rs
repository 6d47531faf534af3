//! Delivery pipeline abstraction.
//!
//! This module provides a `DeliveryClient` trait for managing and feeding
//! delivery pipelines, plus the Firehose backend.

mod firehose;
mod types;

pub use firehose::FirehoseClient;
pub use types::*;
