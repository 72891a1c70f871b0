//! Record dispatch: resolve a sink, deliver, report.
//!
//! Every record moves through `created -> dispatched -> delivered | failed`.
//! `failed` is terminal; retrying is left to the sinks themselves.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, error, trace, warn};

use logship_core::{defaults, Error, LogRecord, LogSink, Result};
use logship_core::logging;

use crate::router::SinkRegistry;
use crate::worker::{Job, WorkerPool};

/// Delivery state of one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryState {
    Created,
    Dispatched,
    Delivered,
    Failed,
}

impl DeliveryState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryState::Created => "created",
            DeliveryState::Dispatched => "dispatched",
            DeliveryState::Delivered => "delivered",
            DeliveryState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, DeliveryState::Delivered | DeliveryState::Failed)
    }
}

impl fmt::Display for DeliveryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event published for every terminal delivery outcome.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DispatchEvent {
    Delivered {
        record_id: String,
        record_type: String,
        sink: String,
        duration_ms: u64,
    },
    Failed {
        record_id: String,
        record_type: String,
        sink: String,
        error: String,
        /// Whether the sink failure looked transient.
        retryable: bool,
    },
    /// An async send was refused because the pool was full or closed.
    Rejected {
        record_id: String,
        record_type: String,
        reason: String,
    },
}

impl DispatchEvent {
    pub fn record_id(&self) -> &str {
        match self {
            DispatchEvent::Delivered { record_id, .. }
            | DispatchEvent::Failed { record_id, .. }
            | DispatchEvent::Rejected { record_id, .. } => record_id,
        }
    }
}

/// A record that failed inside a batch.
#[derive(Debug)]
pub struct BatchFailure {
    /// Position in the submitted batch.
    pub index: usize,
    pub record_id: String,
    pub error: Error,
}

/// Outcome of [`Dispatcher::send_batch`].
#[derive(Debug, Default)]
pub struct BatchReport {
    pub delivered: usize,
    pub failures: Vec<BatchFailure>,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.delivered + self.failures.len()
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Dispatcher configuration.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Concurrent async deliveries.
    pub workers: usize,
    /// Async sends waiting for a worker before new ones are rejected.
    pub queue_capacity: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            workers: defaults::DISPATCH_WORKERS,
            queue_capacity: defaults::DISPATCH_QUEUE_CAPACITY,
        }
    }
}

impl DispatcherConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `LOG_DISPATCH_WORKERS` | `4` | Concurrent async deliveries |
    /// | `LOG_DISPATCH_QUEUE_CAPACITY` | `1000` | Pending async sends |
    pub fn from_env() -> Self {
        let workers = std::env::var("LOG_DISPATCH_WORKERS")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(defaults::DISPATCH_WORKERS)
            .max(1);

        let queue_capacity = std::env::var("LOG_DISPATCH_QUEUE_CAPACITY")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(defaults::DISPATCH_QUEUE_CAPACITY)
            .max(1);

        Self {
            workers,
            queue_capacity,
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }
}

/// Shared delivery path used by direct sends and pool workers.
#[derive(Clone)]
pub(crate) struct Delivery {
    registry: Arc<SinkRegistry>,
    event_tx: broadcast::Sender<DispatchEvent>,
}

impl Delivery {
    pub(crate) async fn deliver(
        &self,
        record: &dyn LogRecord,
        requested: Option<&str>,
    ) -> Result<()> {
        let sink = self.registry.resolve(&record.kind(), requested);
        self.deliver_to(sink.as_ref(), record).await
    }

    async fn deliver_to(&self, sink: &dyn LogSink, record: &dyn LogRecord) -> Result<()> {
        let start = Instant::now();
        trace!(
            subsystem = logging::SUBSYSTEM_DISPATCH,
            record_id = record.id(),
            record_type = record.type_name(),
            sink = sink.name(),
            state = %DeliveryState::Dispatched,
            "Dispatching record"
        );

        match sink.send(record).await {
            Ok(()) => {
                let duration_ms = start.elapsed().as_millis() as u64;
                debug!(
                    subsystem = logging::SUBSYSTEM_DISPATCH,
                    record_id = record.id(),
                    record_type = record.type_name(),
                    sink = sink.name(),
                    state = %DeliveryState::Delivered,
                    duration_ms,
                    "Record delivered"
                );
                let _ = self.event_tx.send(DispatchEvent::Delivered {
                    record_id: record.id().to_string(),
                    record_type: record.type_name().to_string(),
                    sink: sink.name().to_string(),
                    duration_ms,
                });
                Ok(())
            }
            Err(e) => {
                let err = Error::send_failure(sink.name(), record.id(), record.type_name(), e);
                let _ = self.event_tx.send(DispatchEvent::Failed {
                    record_id: record.id().to_string(),
                    record_type: record.type_name().to_string(),
                    sink: sink.name().to_string(),
                    error: err.to_string(),
                    retryable: err.is_retryable(),
                });
                Err(err)
            }
        }
    }

    /// Deliver, logging and swallowing any failure.
    pub(crate) async fn deliver_isolated(
        &self,
        record: &dyn LogRecord,
        requested: Option<&str>,
    ) -> DeliveryState {
        match self.deliver(record, requested).await {
            Ok(()) => DeliveryState::Delivered,
            Err(e) => {
                error!(
                    subsystem = logging::SUBSYSTEM_DISPATCH,
                    record_id = record.id(),
                    record_type = record.type_name(),
                    state = %DeliveryState::Failed,
                    retryable = e.is_retryable(),
                    error = %e,
                    "Record delivery failed"
                );
                DeliveryState::Failed
            }
        }
    }
}

/// Sends records to the sink chosen by a [`SinkRegistry`].
///
/// Must be created inside a Tokio runtime; the async worker pool starts
/// immediately.
pub struct Dispatcher {
    delivery: Delivery,
    pool: WorkerPool,
}

impl Dispatcher {
    pub fn new(registry: Arc<SinkRegistry>, config: DispatcherConfig) -> Self {
        let (event_tx, _) = broadcast::channel(defaults::EVENT_BUS_CAPACITY);
        let delivery = Delivery { registry, event_tx };
        let pool = WorkerPool::start(delivery.clone(), &config);
        Self { delivery, pool }
    }

    pub fn registry(&self) -> &Arc<SinkRegistry> {
        &self.delivery.registry
    }

    /// Subscribe to delivery events.
    pub fn subscribe(&self) -> broadcast::Receiver<DispatchEvent> {
        self.delivery.event_tx.subscribe()
    }

    /// Deliver synchronously and report the outcome.
    ///
    /// Failures come back as [`Error::SendFailure`] for callers that need
    /// delivery confirmation.
    pub async fn send(&self, record: &dyn LogRecord, requested: Option<&str>) -> Result<()> {
        let result = self.delivery.deliver(record, requested).await;
        if let Err(e) = &result {
            warn!(
                subsystem = logging::SUBSYSTEM_DISPATCH,
                record_id = record.id(),
                record_type = record.type_name(),
                error = %e,
                "Record delivery failed, returning error to caller"
            );
        }
        result
    }

    /// Deliver to the named sink only, without fallback.
    ///
    /// An unknown name, or a sink that does not accept this record type,
    /// is [`Error::SinkUnavailable`].
    pub async fn send_to(&self, record: &dyn LogRecord, sink_name: &str) -> Result<()> {
        let sink = self.delivery.registry.get(sink_name)?;
        if !sink.supports(&record.kind()) {
            return Err(Error::SinkUnavailable(format!(
                "sink '{}' does not accept {}",
                sink_name,
                record.type_name()
            )));
        }
        self.delivery.deliver_to(sink.as_ref(), record).await
    }

    /// Deliver synchronously; failures are logged, never returned.
    pub async fn send_isolated(
        &self,
        record: &dyn LogRecord,
        requested: Option<&str>,
    ) -> DeliveryState {
        self.delivery.deliver_isolated(record, requested).await
    }

    /// Queue a record for background delivery.
    ///
    /// Never blocks. When the pool is saturated or shut down the record is
    /// dropped with a warning and a [`DispatchEvent::Rejected`].
    pub fn send_async(&self, record: Box<dyn LogRecord>, requested: Option<&str>) {
        let job = Job {
            record,
            requested: requested.map(str::to_string),
        };
        if let Err((job, reason)) = self.pool.try_submit(job) {
            warn!(
                subsystem = logging::SUBSYSTEM_DISPATCH,
                record_id = job.record.id(),
                record_type = job.record.type_name(),
                reason = %reason,
                "Async send rejected"
            );
            let _ = self.delivery.event_tx.send(DispatchEvent::Rejected {
                record_id: job.record.id().to_string(),
                record_type: job.record.type_name().to_string(),
                reason: reason.to_string(),
            });
        }
    }

    /// Deliver each record in turn. One failure never stops the rest.
    pub async fn send_batch(
        &self,
        records: &[&dyn LogRecord],
        requested: Option<&str>,
    ) -> BatchReport {
        let mut report = BatchReport::default();
        for (index, record) in records.iter().enumerate() {
            match self.delivery.deliver(*record, requested).await {
                Ok(()) => report.delivered += 1,
                Err(error) => report.failures.push(BatchFailure {
                    index,
                    record_id: record.id().to_string(),
                    error,
                }),
            }
        }

        if !report.is_complete() {
            warn!(
                subsystem = logging::SUBSYSTEM_DISPATCH,
                batch_size = records.len(),
                delivered = report.delivered,
                failed = report.failures.len(),
                "Batch partially delivered"
            );
        } else {
            debug!(
                subsystem = logging::SUBSYSTEM_DISPATCH,
                batch_size = records.len(),
                "Batch delivered"
            );
        }
        report
    }

    /// Stop accepting async sends and wait for queued ones to finish.
    pub async fn shutdown(&self) {
        self.pool.shutdown().await;
    }
}
