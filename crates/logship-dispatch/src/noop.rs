//! Sink of last resort.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tracing::trace;

use logship_core::{LogRecord, LogSink, RecordKind, Result};
use logship_core::logging;

/// Logical name of the no-op sink.
pub const NOOP_SINK: &str = "noop";

/// Accepts every record type and discards it.
///
/// Always present in a [`SinkRegistry`](crate::SinkRegistry) and never
/// switched off.
#[derive(Debug, Default)]
pub struct NoopSink {
    discarded: AtomicU64,
}

impl NoopSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records discarded so far.
    pub fn discarded(&self) -> u64 {
        self.discarded.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl LogSink for NoopSink {
    fn name(&self) -> &str {
        NOOP_SINK
    }

    fn supports(&self, _kind: &RecordKind) -> bool {
        true
    }

    async fn send(&self, record: &dyn LogRecord) -> Result<()> {
        self.discarded.fetch_add(1, Ordering::Relaxed);
        trace!(
            subsystem = logging::SUBSYSTEM_DISPATCH,
            component = "noop",
            record_id = record.id(),
            record_type = record.type_name(),
            "Record discarded"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logship_core::{DefaultLog, OperationLog};

    #[tokio::test]
    async fn test_noop_sink() {
        let sink = NoopSink::new();
        assert_eq!(sink.name(), NOOP_SINK);
        assert!(sink.supports(&RecordKind::of::<DefaultLog>()));
        assert!(sink.supports(&RecordKind::of::<OperationLog>()));

        sink.send(&DefaultLog::default()).await.unwrap();
        sink.send(&OperationLog::default()).await.unwrap();
        assert_eq!(sink.discarded(), 2);
    }
}
