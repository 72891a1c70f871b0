//! Redis Streams sink.
//!
//! Each record becomes one stream entry on a topic derived from its type
//! name. Entries carry three fields: `key`, `type` and `payload` (the full
//! record as JSON).
//!
//! ## Configuration
//!
//! Environment variables:
//! - `LOG_QUEUE_ENABLED`: Set to "false" to disable the sink (default: true)
//! - `LOG_QUEUE_URL`: Redis connection URL (default: redis://localhost:6379)
//! - `LOG_QUEUE_TOPIC_PREFIX`: Stream name prefix (default: log_)
//! - `LOG_QUEUE_MAX_RETRIES`: Retries for transient failures (default: 3)
//! - `LOG_QUEUE_MAXLEN`: Approximate stream length cap (default: none)

use std::time::{Duration, Instant};

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use tracing::{debug, info, warn};

use logship_core::naming::topic_name;
use logship_core::{defaults, Error, LogRecord, LogSink, RecordKind, Result, SinkSwitch};
use logship_core::logging;

/// Logical name of the queue sink.
pub const QUEUE_SINK: &str = "queue";

/// Fields checked, in order, for a caller-identifying message key.
const KEY_FIELDS: &[&str] = &["username", "user_id"];

/// Queue sink configuration.
#[derive(Debug, Clone)]
pub struct QueueSinkConfig {
    pub enabled: bool,
    pub url: String,
    pub topic_prefix: String,
    pub max_retries: u32,
    pub maxlen: Option<usize>,
}

impl Default for QueueSinkConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: defaults::QUEUE_URL.to_string(),
            topic_prefix: defaults::NAME_PREFIX.to_string(),
            max_retries: defaults::QUEUE_MAX_RETRIES,
            maxlen: None,
        }
    }
}

impl QueueSinkConfig {
    pub fn from_env() -> Self {
        let enabled = std::env::var("LOG_QUEUE_ENABLED")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);

        let url = std::env::var("LOG_QUEUE_URL").unwrap_or_else(|_| defaults::QUEUE_URL.to_string());

        let topic_prefix = std::env::var("LOG_QUEUE_TOPIC_PREFIX")
            .unwrap_or_else(|_| defaults::NAME_PREFIX.to_string());

        let max_retries = std::env::var("LOG_QUEUE_MAX_RETRIES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults::QUEUE_MAX_RETRIES);

        let maxlen = std::env::var("LOG_QUEUE_MAXLEN")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|n: &usize| *n > 0);

        Self {
            enabled,
            url,
            topic_prefix,
            max_retries,
            maxlen,
        }
    }

    pub fn with_topic_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.topic_prefix = prefix.into();
        self
    }

    pub fn with_maxlen(mut self, maxlen: usize) -> Self {
        self.maxlen = Some(maxlen);
        self
    }
}

/// Publishes records to Redis Streams.
pub struct QueueSink {
    /// Redis connection manager (None if disabled or unreachable).
    /// Cloned per send; clones share one multiplexed connection.
    connection: Option<ConnectionManager>,
    config: QueueSinkConfig,
    switch: SinkSwitch,
}

impl QueueSink {
    /// Connect to Redis. An unreachable server leaves the sink
    /// disconnected rather than failing, so routing skips it.
    pub async fn connect(config: QueueSinkConfig) -> Self {
        let connection = if config.enabled {
            match redis::Client::open(config.url.as_str()) {
                Ok(client) => match ConnectionManager::new(client).await {
                    Ok(conn) => {
                        info!(
                            subsystem = logging::SUBSYSTEM_SINK,
                            component = "queue",
                            topic_prefix = %config.topic_prefix,
                            "Queue sink connected"
                        );
                        Some(conn)
                    }
                    Err(e) => {
                        warn!(
                            subsystem = logging::SUBSYSTEM_SINK,
                            component = "queue",
                            error = %e,
                            "Failed to connect to Redis, queue sink disabled"
                        );
                        None
                    }
                },
                Err(e) => {
                    warn!(
                        subsystem = logging::SUBSYSTEM_SINK,
                        component = "queue",
                        error = %e,
                        "Invalid Redis URL, queue sink disabled"
                    );
                    None
                }
            }
        } else {
            info!(
                subsystem = logging::SUBSYSTEM_SINK,
                component = "queue",
                "Queue sink disabled via LOG_QUEUE_ENABLED=false"
            );
            None
        };

        Self::with_connection(config, connection)
    }

    /// A sink without a connection. It never supports any record type.
    pub fn disconnected(config: QueueSinkConfig) -> Self {
        Self::with_connection(config, None)
    }

    fn with_connection(config: QueueSinkConfig, connection: Option<ConnectionManager>) -> Self {
        let switch = SinkSwitch::new(config.enabled);
        Self {
            connection,
            config,
            switch,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    pub fn switch(&self) -> &SinkSwitch {
        &self.switch
    }

    pub fn config(&self) -> &QueueSinkConfig {
        &self.config
    }

    pub fn topic(&self, kind: &RecordKind) -> String {
        topic_name(kind, &self.config.topic_prefix)
    }
}

/// Message key: the first non-empty caller field, else the record id.
pub fn message_key(record: &dyn LogRecord) -> String {
    KEY_FIELDS
        .iter()
        .filter_map(|name| record.field(name))
        .filter_map(|value| value.as_text())
        .find(|text| !text.is_empty())
        .unwrap_or_else(|| record.id().to_string())
}

/// `XADD <topic> [MAXLEN ~ n] * key <key> type <type> payload <json>`
pub fn xadd_command(
    topic: &str,
    maxlen: Option<usize>,
    key: &str,
    record_type: &str,
    payload: &str,
) -> redis::Cmd {
    let mut cmd = redis::cmd("XADD");
    cmd.arg(topic);
    if let Some(maxlen) = maxlen {
        cmd.arg("MAXLEN").arg("~").arg(maxlen);
    }
    cmd.arg("*")
        .arg("key")
        .arg(key)
        .arg("type")
        .arg(record_type)
        .arg("payload")
        .arg(payload);
    cmd
}

fn is_transient(e: &redis::RedisError) -> bool {
    e.is_io_error() || e.is_timeout() || e.is_connection_dropped() || e.is_connection_refusal()
}

#[async_trait]
impl LogSink for QueueSink {
    fn name(&self) -> &str {
        QUEUE_SINK
    }

    fn supports(&self, _kind: &RecordKind) -> bool {
        self.is_connected() && self.switch.is_enabled()
    }

    async fn send(&self, record: &dyn LogRecord) -> Result<()> {
        let start = Instant::now();
        let mut conn = self
            .connection
            .clone()
            .ok_or_else(|| Error::Queue("queue sink is not connected".to_string()))?;

        let topic = self.topic(&record.kind());
        let payload = serde_json::to_string(&record.to_json())?;
        let cmd = xadd_command(
            &topic,
            self.config.maxlen,
            &message_key(record),
            record.type_name(),
            &payload,
        );

        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match cmd.query_async::<String>(&mut conn).await {
                Ok(entry_id) => {
                    debug!(
                        subsystem = logging::SUBSYSTEM_SINK,
                        component = "queue",
                        op = "xadd",
                        record_id = record.id(),
                        record_type = record.type_name(),
                        topic = %topic,
                        entry_id = %entry_id,
                        attempt,
                        duration_ms = start.elapsed().as_millis() as u64,
                        "Record published"
                    );
                    return Ok(());
                }
                Err(e) if is_transient(&e) && attempt <= self.config.max_retries => {
                    warn!(
                        subsystem = logging::SUBSYSTEM_SINK,
                        component = "queue",
                        record_id = record.id(),
                        attempt,
                        error = %e,
                        "Transient Redis failure, retrying"
                    );
                    tokio::time::sleep(Duration::from_millis(
                        defaults::QUEUE_RETRY_BACKOFF_MS * u64::from(attempt),
                    ))
                    .await;
                }
                Err(e) => return Err(Error::Queue(e.to_string())),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logship_core::{record_type, DefaultLog, UserAccessLog};

    record_type! {
        #[derive(Debug, Clone, Default)]
        struct TokenLog {
            user_id: Option<i64>,
        }
    }

    record_type! {
        #[derive(Debug, Clone, Default)]
        struct MemberLog {
            username: Option<String>,
            user_id: Option<String>,
        }
    }

    fn packed(cmd: &redis::Cmd) -> String {
        String::from_utf8_lossy(&cmd.get_packed_command()).into_owned()
    }

    #[test]
    fn test_message_key_prefers_username() {
        let mut record = MemberLog::default();
        record.core.id = "r1".into();
        assert_eq!(message_key(&record), "r1");

        record.user_id = Some("u-7".into());
        assert_eq!(message_key(&record), "u-7");

        record.username = Some("alice".into());
        assert_eq!(message_key(&record), "alice");
    }

    #[test]
    fn test_message_key_skips_empty_and_converts_numbers() {
        let mut record = TokenLog::default();
        record.core.id = "r2".into();
        assert_eq!(message_key(&record), "r2");

        record.user_id = Some(42);
        assert_eq!(message_key(&record), "42");
    }

    #[test]
    fn test_xadd_command_shape() {
        let cmd = xadd_command("log_order_log", None, "alice", "OrderLog", "{}");
        let text = packed(&cmd);
        assert!(text.contains("XADD"));
        assert!(text.contains("log_order_log"));
        assert!(!text.contains("MAXLEN"));
        assert!(text.contains("payload"));

        let capped = packed(&xadd_command("t", Some(1000), "k", "T", "{}"));
        assert!(capped.contains("MAXLEN"));
        assert!(capped.contains("~"));
        assert!(capped.contains("1000"));
    }

    #[test]
    fn test_topic_uses_prefix() {
        let sink =
            QueueSink::disconnected(QueueSinkConfig::default().with_topic_prefix("audit_"));
        assert_eq!(
            sink.topic(&RecordKind::of::<UserAccessLog>()),
            "audit_user_access_log"
        );
    }

    #[tokio::test]
    async fn test_disconnected_sink_supports_nothing() {
        let sink = QueueSink::disconnected(QueueSinkConfig::default());
        assert_eq!(sink.name(), QUEUE_SINK);
        assert!(!sink.is_connected());
        assert!(!sink.supports(&RecordKind::of::<DefaultLog>()));

        let result = sink.send(&DefaultLog::default()).await;
        assert!(matches!(result, Err(Error::Queue(_))));
    }

    #[tokio::test]
    #[ignore]
    async fn test_publish_to_live_redis() {
        let url = std::env::var("LOG_QUEUE_URL").unwrap_or_else(|_| defaults::QUEUE_URL.into());
        let config = QueueSinkConfig {
            url,
            ..QueueSinkConfig::default()
        }
        .with_topic_prefix("logship_test_")
        .with_maxlen(100);
        let sink = QueueSink::connect(config).await;
        assert!(sink.is_connected());

        let mut record = DefaultLog::default();
        record.core.id = "live-1".into();
        sink.send(&record).await.unwrap();
    }
}
