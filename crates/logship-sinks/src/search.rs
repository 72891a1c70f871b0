//! Search index sink: one document per record, in an index per record
//! type and month.
//!
//! Documents are written with `PUT {base}/{index}/_doc/{id}`, so a resend
//! of the same record overwrites rather than duplicates.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use tracing::{debug, info};

use logship_core::naming::index_name;
use logship_core::{defaults, Error, LogRecord, LogSink, RecordKind, Result, SinkSwitch};
use logship_core::logging;

/// Logical name of the search index sink.
pub const SEARCH_SINK: &str = "search";

/// Search sink configuration.
#[derive(Debug, Clone)]
pub struct SearchSinkConfig {
    pub enabled: bool,
    /// Base URL of the search cluster.
    pub url: String,
    pub index_prefix: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub connect_timeout_ms: u64,
    pub timeout_ms: u64,
}

impl Default for SearchSinkConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: defaults::SEARCH_URL.to_string(),
            index_prefix: defaults::SEARCH_INDEX_PREFIX.to_string(),
            username: None,
            password: None,
            connect_timeout_ms: defaults::SEARCH_CONNECT_TIMEOUT_MS,
            timeout_ms: defaults::SEARCH_TIMEOUT_MS,
        }
    }
}

impl SearchSinkConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `LOG_SEARCH_ENABLED` | `true` |
    /// | `LOG_SEARCH_URL` | `http://localhost:9200` |
    /// | `LOG_SEARCH_INDEX_PREFIX` | `log` |
    /// | `LOG_SEARCH_USERNAME` / `LOG_SEARCH_PASSWORD` | (none) |
    /// | `LOG_SEARCH_CONNECT_TIMEOUT_MS` | `5000` |
    /// | `LOG_SEARCH_TIMEOUT_MS` | `30000` |
    pub fn from_env() -> Self {
        Self {
            enabled: std::env::var("LOG_SEARCH_ENABLED")
                .map(|v| v != "false" && v != "0")
                .unwrap_or(true),
            url: std::env::var("LOG_SEARCH_URL")
                .unwrap_or_else(|_| defaults::SEARCH_URL.to_string()),
            index_prefix: std::env::var("LOG_SEARCH_INDEX_PREFIX")
                .unwrap_or_else(|_| defaults::SEARCH_INDEX_PREFIX.to_string()),
            username: std::env::var("LOG_SEARCH_USERNAME").ok(),
            password: std::env::var("LOG_SEARCH_PASSWORD").ok(),
            connect_timeout_ms: std::env::var("LOG_SEARCH_CONNECT_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults::SEARCH_CONNECT_TIMEOUT_MS),
            timeout_ms: std::env::var("LOG_SEARCH_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults::SEARCH_TIMEOUT_MS),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }
}

/// Indexes records into an Elasticsearch-compatible cluster.
pub struct SearchSink {
    client: Client,
    config: SearchSinkConfig,
    switch: SinkSwitch,
}

impl SearchSink {
    pub fn new(config: SearchSinkConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        info!(
            subsystem = logging::SUBSYSTEM_SINK,
            component = "search",
            url = %config.url,
            index_prefix = %config.index_prefix,
            "Initializing search sink"
        );

        let switch = SinkSwitch::new(config.enabled);
        Ok(Self {
            client,
            config,
            switch,
        })
    }

    pub fn switch(&self) -> &SinkSwitch {
        &self.switch
    }

    pub fn config(&self) -> &SearchSinkConfig {
        &self.config
    }

    /// Document URL for `record`, using its timestamp for the month.
    pub fn document_url(&self, record: &dyn LogRecord) -> String {
        let at = record.core().timestamp.unwrap_or_else(Utc::now);
        format!(
            "{}/{}/_doc/{}",
            self.config.url.trim_end_matches('/'),
            index_name(&self.config.index_prefix, &record.kind(), at),
            record.id()
        )
    }
}

#[async_trait]
impl LogSink for SearchSink {
    fn name(&self) -> &str {
        SEARCH_SINK
    }

    fn supports(&self, _kind: &RecordKind) -> bool {
        self.switch.is_enabled()
    }

    async fn send(&self, record: &dyn LogRecord) -> Result<()> {
        let start = Instant::now();
        let url = self.document_url(record);

        let mut request = self.client.put(&url).json(&record.to_json());
        if let Some(username) = &self.config.username {
            request = request.basic_auth(username, self.config.password.as_ref());
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Request(format!(
                "search index returned {}: {}",
                status, body
            )));
        }

        debug!(
            subsystem = logging::SUBSYSTEM_SINK,
            component = "search",
            op = "index",
            record_id = record.id(),
            record_type = record.type_name(),
            status = status.as_u16(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Record indexed"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use logship_core::{CoreFields, DefaultLog, OperationLog};

    #[test]
    fn test_document_url_uses_record_month() {
        let sink = SearchSink::new(SearchSinkConfig::default().with_url("http://es:9200/")).unwrap();
        let record = OperationLog {
            core: CoreFields {
                id: "abc".into(),
                timestamp: Some(Utc.with_ymd_and_hms(2026, 3, 14, 9, 0, 0).unwrap()),
                ..CoreFields::default()
            },
            ..OperationLog::default()
        };
        assert_eq!(
            sink.document_url(&record),
            "http://es:9200/log-operation-2026-03/_doc/abc"
        );
    }

    #[test]
    fn test_switch_gates_supports() {
        let sink = SearchSink::new(SearchSinkConfig::default()).unwrap();
        let kind = RecordKind::of::<DefaultLog>();
        assert!(sink.supports(&kind));
        sink.switch().set_enabled(false);
        assert!(!sink.supports(&kind));
    }

    #[test]
    fn test_disabled_config_starts_switched_off() {
        let config = SearchSinkConfig {
            enabled: false,
            ..SearchSinkConfig::default()
        };
        let sink = SearchSink::new(config).unwrap();
        assert!(!sink.supports(&RecordKind::of::<DefaultLog>()));
    }
}
