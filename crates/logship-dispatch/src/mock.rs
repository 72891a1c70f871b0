//! Mock sink for deterministic testing.
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use logship_core::{DefaultLog, LogSink, RecordKind};
//! use logship_dispatch::mock::MockSink;
//!
//! let sink = Arc::new(MockSink::new("audit").failing_on("bad-id"));
//! assert_eq!(sink.name(), "audit");
//! assert!(sink.supports(&RecordKind::of::<DefaultLog>()));
//! assert_eq!(sink.call_count(), 0);
//! ```

use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use logship_core::{Error, LogRecord, LogSink, RecordKind, Result, SinkSwitch};

/// One observed `send`.
#[derive(Debug, Clone)]
pub struct MockSend {
    pub record_id: String,
    pub record_type: &'static str,
    pub payload: Value,
}

/// In-memory sink that records every send and fails on demand.
#[derive(Debug)]
pub struct MockSink {
    name: String,
    accepts: Option<Vec<RecordKind>>,
    fail_all: bool,
    failing_ids: HashSet<String>,
    latency: Duration,
    switch: SinkSwitch,
    calls: Mutex<Vec<MockSend>>,
}

impl MockSink {
    /// A sink named `name` accepting every record type.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            accepts: None,
            fail_all: false,
            failing_ids: HashSet::new(),
            latency: Duration::ZERO,
            switch: SinkSwitch::default(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Restrict `supports` to the given kinds. May be called repeatedly.
    pub fn accepting(mut self, kind: RecordKind) -> Self {
        self.accepts.get_or_insert_with(Vec::new).push(kind);
        self
    }

    /// Fail every send.
    pub fn failing(mut self) -> Self {
        self.fail_all = true;
        self
    }

    /// Fail sends of the record with this id.
    pub fn failing_on(mut self, record_id: impl Into<String>) -> Self {
        self.failing_ids.insert(record_id.into());
        self
    }

    /// Sleep this long inside every send.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn switch(&self) -> &SinkSwitch {
        &self.switch
    }

    /// Every send observed so far, failed ones included.
    pub fn calls(&self) -> Vec<MockSend> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[async_trait]
impl LogSink for MockSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports(&self, kind: &RecordKind) -> bool {
        self.switch.is_enabled()
            && self
                .accepts
                .as_ref()
                .map(|kinds| kinds.contains(kind))
                .unwrap_or(true)
    }

    async fn send(&self, record: &dyn LogRecord) -> Result<()> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(MockSend {
                record_id: record.id().to_string(),
                record_type: record.type_name(),
                payload: record.to_json(),
            });

        if self.fail_all || self.failing_ids.contains(record.id()) {
            return Err(Error::Request(format!(
                "{} rejected record {}",
                self.name,
                record.id()
            )));
        }
        Ok(())
    }
}
