//! Batch dispatcher implementation.

use std::sync::Arc;

use chrono::Utc;
use futures::stream::{FuturesUnordered, StreamExt};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::delivery::{DeliveryClient, DeliveryError, Record};
use crate::metrics;

use super::config::{DispatchConfig, MAX_BATCH_SIZE};
use super::report::{BatchReport, DispatchReport, FailedRecord};
use super::source::{RecordIter, RecordSource, SourceError};

/// Errors that abort a whole dispatch.
///
/// Per-record rejections are not errors; they end up in the
/// [`DispatchReport`].
#[derive(Debug, Error)]
pub enum DispatchError {
    /// A batch submission call failed outright.
    #[error("Batch {batch} (records from {offset}) to pipeline {pipeline} failed: {source}")]
    Transport {
        pipeline: String,
        batch: usize,
        offset: usize,
        #[source]
        source: DeliveryError,
    },

    /// Batch size outside what the transport accepts.
    #[error("Invalid batch size {0} (must be 1..=500)")]
    InvalidBatchSize(usize),

    /// The record source could not be read.
    #[error(transparent)]
    Source(#[from] SourceError),
}

/// A slice of the source submitted in one call.
struct Batch {
    number: usize,
    offset: usize,
    records: Vec<Record>,
}

/// Pull up to `size` records into the next batch.
fn next_batch(
    records: &mut RecordIter<'_>,
    size: usize,
    number: usize,
    offset: usize,
) -> Result<Option<Batch>, SourceError> {
    let mut batch = Vec::with_capacity(size);
    while batch.len() < size {
        match records.next() {
            Some(record) => batch.push(record?),
            None => break,
        }
    }
    if batch.is_empty() {
        return Ok(None);
    }
    Ok(Some(Batch {
        number,
        offset,
        records: batch,
    }))
}

/// Sends records to a pipeline in fixed-size batches, retrying rejected
/// records once each.
pub struct BatchDispatcher {
    delivery: Arc<dyn DeliveryClient>,
    config: DispatchConfig,
}

impl BatchDispatcher {
    /// Create a dispatcher.
    pub fn new(delivery: Arc<dyn DeliveryClient>, config: DispatchConfig) -> Self {
        Self { delivery, config }
    }

    /// Send every record from `source` to `pipeline`.
    ///
    /// Records are cut into consecutive batches of `batch_size`; only the
    /// last may be smaller. Cancellation is honoured between batches;
    /// batches already submitted are allowed to finish. A failed batch
    /// call aborts the run without a report.
    pub async fn dispatch(
        &self,
        pipeline: &str,
        source: &dyn RecordSource,
        cancel: &CancellationToken,
    ) -> Result<DispatchReport, DispatchError> {
        let batch_size = self.config.batch_size;
        if batch_size == 0 || batch_size > MAX_BATCH_SIZE {
            return Err(DispatchError::InvalidBatchSize(batch_size));
        }
        let max_in_flight = self.config.max_in_flight_batches.max(1);

        info!(
            "Dispatching records from {} to {} ({} per batch, {} in flight)",
            source.describe(),
            pipeline,
            batch_size,
            max_in_flight
        );

        let mut records = source.open()?;
        let mut report = DispatchReport::new(Utc::now());
        let mut in_flight = FuturesUnordered::new();
        let mut number = 0;
        let mut offset = 0;

        loop {
            if cancel.is_cancelled() {
                warn!("Dispatch cancelled after {} batches", number);
                report.cancelled = true;
                break;
            }

            let Some(batch) = next_batch(&mut records, batch_size, number, offset)? else {
                break;
            };
            number += 1;
            offset += batch.records.len();
            in_flight.push(self.send_batch(pipeline, batch));

            while in_flight.len() >= max_in_flight {
                match in_flight.next().await {
                    Some(result) => report.absorb(result?),
                    None => break,
                }
            }
        }

        while let Some(result) = in_flight.next().await {
            report.absorb(result?);
        }

        let report = report.finish(Utc::now());
        info!(
            "Dispatched {} records in {} batches: {} retried, {} permanently failed",
            report.total_records,
            report.total_batches,
            report.retried_records,
            report.permanent_failures()
        );
        Ok(report)
    }

    /// Submit one batch, then resubmit each rejected record exactly once.
    async fn send_batch(&self, pipeline: &str, batch: Batch) -> Result<BatchReport, DispatchError> {
        let timer = metrics::BATCH_DURATION.with_label_values(&[]).start_timer();
        let submitted = self.delivery.put_batch(pipeline, &batch.records).await;
        timer.observe_duration();

        let transport_error = |source: DeliveryError| {
            metrics::BATCHES_TOTAL
                .with_label_values(&["transport_error"])
                .inc();
            error!(
                "Batch {} to {} failed: {}",
                batch.number, pipeline, source
            );
            DispatchError::Transport {
                pipeline: pipeline.to_string(),
                batch: batch.number,
                offset: batch.offset,
                source,
            }
        };

        let result = submitted.map_err(transport_error)?;
        if result.total() != batch.records.len() {
            return Err(transport_error(DeliveryError::MalformedResponse(format!(
                "sent {} records, got {} outcomes",
                batch.records.len(),
                result.total()
            ))));
        }
        metrics::RECORDS_SUBMITTED.inc_by(batch.records.len() as u64);

        let mut report = BatchReport::new(batch.number, batch.offset, batch.records.len());
        if result.failed() == 0 {
            metrics::BATCHES_TOTAL.with_label_values(&["complete"]).inc();
            debug!(
                "Batch {} ({} records) accepted",
                batch.number,
                batch.records.len()
            );
            return Ok(report);
        }

        metrics::BATCHES_TOTAL.with_label_values(&["partial"]).inc();
        warn!(
            "Batch {}: {} of {} records rejected, resending individually",
            batch.number,
            result.failed(),
            result.total()
        );

        for (local, code) in result.rejected() {
            let index = batch.offset + local;
            metrics::RECORDS_RETRIED.inc();
            report.retried += 1;

            match self.delivery.put_single(pipeline, &batch.records[local]).await {
                Ok(()) => report.recovered += 1,
                Err(e) => {
                    metrics::RECORDS_PERMANENTLY_FAILED.inc();
                    warn!("Record {} failed again after {}: {}", index, code, e);
                    report.failed.push(FailedRecord {
                        index,
                        batch: batch.number,
                        first_error: code.to_string(),
                        retry_error: e.to_string(),
                    });
                }
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::{BatchResult, CreatePipelineRequest, PipelineDescription};
    use crate::dispatch::MemorySource;
    use crate::testing::{fixtures, MockDeliveryClient};
    use async_trait::async_trait;

    fn dispatcher(delivery: &Arc<MockDeliveryClient>, batch_size: usize) -> BatchDispatcher {
        BatchDispatcher::new(
            delivery.clone(),
            DispatchConfig {
                batch_size,
                ..Default::default()
            },
        )
    }

    #[tokio::test]
    async fn test_batch_count_is_ceiling() {
        for (n, b) in [(0, 100), (1, 100), (99, 100), (100, 100), (101, 100), (250, 100), (10, 3)] {
            let delivery = Arc::new(MockDeliveryClient::new());
            let source = fixtures::numbered_records(n);

            let report = dispatcher(&delivery, b)
                .dispatch("events", &source, &CancellationToken::new())
                .await
                .unwrap();

            let expected_batches = n.div_ceil(b);
            assert_eq!(report.total_batches, expected_batches, "n={n} b={b}");
            assert_eq!(report.total_records, n);

            let sizes: Vec<usize> = delivery.batch_calls().await.iter().map(Vec::len).collect();
            assert_eq!(sizes.len(), expected_batches);
            for (i, size) in sizes.iter().enumerate() {
                if i + 1 < sizes.len() {
                    assert_eq!(*size, b);
                } else {
                    assert!(*size >= 1 && *size <= b);
                }
            }
        }
    }

    #[tokio::test]
    async fn test_empty_source() {
        let delivery = Arc::new(MockDeliveryClient::new());

        let report = dispatcher(&delivery, 100)
            .dispatch("events", &MemorySource::default(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.total_batches, 0);
        assert_eq!(report.permanent_failures(), 0);
        assert!(delivery.batch_calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_includes_final_record() {
        let delivery = Arc::new(MockDeliveryClient::new());
        let source = fixtures::numbered_records(101);

        dispatcher(&delivery, 100)
            .dispatch("events", &source, &CancellationToken::new())
            .await
            .unwrap();

        let calls = delivery.batch_calls().await;
        assert_eq!(calls[1], vec![fixtures::numbered_record(100)]);
    }

    #[tokio::test]
    async fn test_rejected_records_resent_once_each() {
        let delivery = Arc::new(MockDeliveryClient::new());
        delivery.reject_in_batch(1, vec![3, 7]).await;
        let source = fixtures::numbered_records(250);

        let report = dispatcher(&delivery, 100)
            .dispatch("events", &source, &CancellationToken::new())
            .await
            .unwrap();

        let singles = delivery.single_calls().await;
        assert_eq!(
            singles,
            vec![fixtures::numbered_record(103), fixtures::numbered_record(107)]
        );
        assert_eq!(report.retried_records, 2);
        assert_eq!(report.recovered_records, 2);
        assert_eq!(report.permanent_failures(), 0);
    }

    #[tokio::test]
    async fn test_double_failure_is_permanent_and_not_retried_again() {
        let delivery = Arc::new(MockDeliveryClient::new());
        delivery.reject_in_batch(1, vec![3, 7]).await;
        delivery
            .fail_single(fixtures::numbered_record(107), DeliveryError::Timeout)
            .await;
        let source = fixtures::numbered_records(250);

        let report = dispatcher(&delivery, 100)
            .dispatch("events", &source, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(delivery.single_calls().await.len(), 2);
        assert_eq!(report.recovered_records, 1);
        assert_eq!(report.failed_indices(), vec![107]);
        let failed = &report.permanently_failed[0];
        assert_eq!(failed.batch, 1);
        assert_eq!(failed.first_error, fixtures::REJECTION_CODE);
        assert_eq!(failed.retry_error, "Request timeout");
        assert_eq!(report.delivered(), 249);
    }

    #[tokio::test]
    async fn test_transport_error_aborts_remaining_batches() {
        let delivery = Arc::new(MockDeliveryClient::new());
        delivery
            .fail_batch(1, DeliveryError::ConnectionFailed("reset".to_string()))
            .await;
        let source = fixtures::numbered_records(250);

        let err = dispatcher(&delivery, 100)
            .dispatch("events", &source, &CancellationToken::new())
            .await
            .unwrap_err();

        match err {
            DispatchError::Transport { batch, offset, .. } => {
                assert_eq!(batch, 1);
                assert_eq!(offset, 100);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(delivery.batch_calls().await.len(), 2);
    }

    #[tokio::test]
    async fn test_invalid_batch_size() {
        let delivery = Arc::new(MockDeliveryClient::new());
        let source = fixtures::numbered_records(3);

        for size in [0, MAX_BATCH_SIZE + 1] {
            let err = dispatcher(&delivery, size)
                .dispatch("events", &source, &CancellationToken::new())
                .await
                .unwrap_err();
            assert!(matches!(err, DispatchError::InvalidBatchSize(_)));
        }
    }

    #[tokio::test]
    async fn test_concurrent_dispatch_matches_sequential() {
        let run = |in_flight: usize| async move {
            let delivery = Arc::new(MockDeliveryClient::new());
            for i in [5, 150, 151, 420] {
                delivery.reject_record(fixtures::numbered_record(i)).await;
            }
            delivery
                .fail_single(fixtures::numbered_record(151), DeliveryError::Timeout)
                .await;
            let dispatcher = BatchDispatcher::new(
                delivery.clone(),
                DispatchConfig {
                    batch_size: 50,
                    max_in_flight_batches: in_flight,
                },
            );
            let report = dispatcher
                .dispatch(
                    "events",
                    &fixtures::numbered_records(500),
                    &CancellationToken::new(),
                )
                .await
                .unwrap();
            (report, delivery.single_calls().await.len())
        };

        let (sequential, seq_singles) = run(1).await;
        let (concurrent, con_singles) = run(4).await;

        assert_eq!(seq_singles, 4);
        assert_eq!(con_singles, 4);
        assert_eq!(sequential.total_batches, concurrent.total_batches);
        assert_eq!(sequential.retried_records, concurrent.retried_records);
        assert_eq!(sequential.failed_indices(), concurrent.failed_indices());
        assert_eq!(concurrent.failed_indices(), vec![151]);
    }

    /// Delivery client that cancels a token after the first batch call.
    struct CancelAfterFirstBatch {
        inner: MockDeliveryClient,
        cancel: CancellationToken,
    }

    #[async_trait]
    impl DeliveryClient for CancelAfterFirstBatch {
        fn name(&self) -> &str {
            "cancel-after-first"
        }

        async fn describe(
            &self,
            name: &str,
        ) -> Result<Option<PipelineDescription>, DeliveryError> {
            self.inner.describe(name).await
        }

        async fn create(&self, request: &CreatePipelineRequest) -> Result<String, DeliveryError> {
            self.inner.create(request).await
        }

        async fn put_batch(
            &self,
            name: &str,
            records: &[Record],
        ) -> Result<BatchResult, DeliveryError> {
            let result = self.inner.put_batch(name, records).await;
            self.cancel.cancel();
            result
        }

        async fn put_single(&self, name: &str, record: &Record) -> Result<(), DeliveryError> {
            self.inner.put_single(name, record).await
        }
    }

    #[tokio::test]
    async fn test_cancellation_between_batches() {
        let cancel = CancellationToken::new();
        let delivery = Arc::new(CancelAfterFirstBatch {
            inner: MockDeliveryClient::new(),
            cancel: cancel.clone(),
        });
        let dispatcher = BatchDispatcher::new(delivery.clone(), DispatchConfig::default());

        let report = dispatcher
            .dispatch("events", &fixtures::numbered_records(250), &cancel)
            .await
            .unwrap();

        assert!(report.cancelled);
        assert_eq!(report.total_batches, 1);
        assert_eq!(report.total_records, 100);
        assert_eq!(delivery.inner.batch_calls().await.len(), 1);
    }
}
