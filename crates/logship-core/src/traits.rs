//! Core traits for sinks.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

use crate::error::Result;
use crate::record::{LogRecord, RecordKind};

/// A backend able to durably receive finished records.
///
/// Implementations hold only long-lived connection handles; no
/// per-record state survives a `send`.
#[async_trait]
pub trait LogSink: Send + Sync {
    /// Logical name used for routing ("database", "queue", ...).
    fn name(&self) -> &str;

    /// Whether this sink accepts records of `kind` right now.
    fn supports(&self, kind: &RecordKind) -> bool;

    /// Deliver one record.
    async fn send(&self, record: &dyn LogRecord) -> Result<()>;

    /// Deliver several records as independent sends.
    ///
    /// Every record is attempted; the first error is returned afterwards.
    async fn send_batch(&self, records: &[&dyn LogRecord]) -> Result<()> {
        let mut first_error = None;
        for record in records {
            if let Err(e) = self.send(*record).await {
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Administrative on/off switch shared by the pluggable sinks.
#[derive(Debug)]
pub struct SinkSwitch {
    enabled: AtomicBool,
}

impl SinkSwitch {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }
}

impl Default for SinkSwitch {
    fn default() -> Self {
        Self::new(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::record::CoreFields;
    use std::sync::atomic::AtomicUsize;

    crate::record_type! {
        #[derive(Debug, Clone, Default)]
        struct PingLog {}
    }

    struct FlakySink {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LogSink for FlakySink {
        fn name(&self) -> &str {
            "flaky"
        }

        fn supports(&self, _kind: &RecordKind) -> bool {
            true
        }

        async fn send(&self, record: &dyn LogRecord) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if record.id() == "bad" {
                Err(Error::Request("refused".into()))
            } else {
                Ok(())
            }
        }
    }

    fn ping(id: &str) -> PingLog {
        PingLog {
            core: CoreFields {
                id: id.to_string(),
                ..CoreFields::default()
            },
        }
    }

    #[tokio::test]
    async fn test_send_batch_attempts_every_record() {
        let sink = FlakySink {
            calls: AtomicUsize::new(0),
        };
        let (a, b, c) = (ping("a"), ping("bad"), ping("c"));
        let records: Vec<&dyn LogRecord> = vec![&a, &b, &c];

        let result = sink.send_batch(&records).await;
        assert!(matches!(result, Err(Error::Request(_))));
        assert_eq!(sink.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_switch_toggles() {
        let switch = SinkSwitch::default();
        assert!(switch.is_enabled());
        switch.set_enabled(false);
        assert!(!switch.is_enabled());
        assert!(!SinkSwitch::new(false).is_enabled());
    }
}
