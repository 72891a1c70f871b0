//! HTTP sink: one JSON POST per record to a collector endpoint.
//!
//! Requests carry `X-Log-Record-Type` and `X-Log-Source` headers. When a
//! secret is configured the body is signed with HMAC-SHA256 and sent as
//! `X-Log-Signature: sha256=<hex>`.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::Client;
use sha2::Sha256;
use tracing::{debug, info};

use logship_core::{defaults, Error, LogRecord, LogSink, RecordKind, Result, SinkSwitch};
use logship_core::logging;

/// Logical name of the HTTP sink.
pub const HTTP_SINK: &str = "http";

pub const RECORD_TYPE_HEADER: &str = "X-Log-Record-Type";
pub const SOURCE_HEADER: &str = "X-Log-Source";
pub const SIGNATURE_HEADER: &str = "X-Log-Signature";

type HmacSha256 = Hmac<Sha256>;

/// HTTP sink configuration.
#[derive(Debug, Clone)]
pub struct HttpSinkConfig {
    pub enabled: bool,
    pub endpoint: String,
    /// Value of the `X-Log-Source` header.
    pub source: String,
    /// HMAC key for request signing.
    pub secret: Option<String>,
    pub connect_timeout_ms: u64,
    pub timeout_ms: u64,
}

impl Default for HttpSinkConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: defaults::HTTP_ENDPOINT.to_string(),
            source: defaults::HTTP_SOURCE.to_string(),
            secret: None,
            connect_timeout_ms: defaults::HTTP_CONNECT_TIMEOUT_MS,
            timeout_ms: defaults::HTTP_TIMEOUT_MS,
        }
    }
}

impl HttpSinkConfig {
    pub fn from_env() -> Self {
        Self {
            enabled: std::env::var("LOG_HTTP_ENABLED")
                .map(|v| v != "false" && v != "0")
                .unwrap_or(true),
            endpoint: std::env::var("LOG_HTTP_ENDPOINT")
                .unwrap_or_else(|_| defaults::HTTP_ENDPOINT.to_string()),
            source: std::env::var("LOG_HTTP_SOURCE")
                .unwrap_or_else(|_| defaults::HTTP_SOURCE.to_string()),
            secret: std::env::var("LOG_HTTP_SECRET")
                .ok()
                .filter(|s| !s.is_empty()),
            connect_timeout_ms: std::env::var("LOG_HTTP_CONNECT_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults::HTTP_CONNECT_TIMEOUT_MS),
            timeout_ms: std::env::var("LOG_HTTP_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults::HTTP_TIMEOUT_MS),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(secret.into());
        self
    }
}

/// `sha256=<hex>` HMAC of `body` under `secret`.
pub fn sign(secret: &str, body: &[u8]) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(body);
    Some(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
}

/// Posts records to a collector endpoint.
pub struct HttpSink {
    client: Client,
    config: HttpSinkConfig,
    switch: SinkSwitch,
}

impl HttpSink {
    pub fn new(config: HttpSinkConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        info!(
            subsystem = logging::SUBSYSTEM_SINK,
            component = "http",
            endpoint = %config.endpoint,
            signed = config.secret.is_some(),
            "Initializing HTTP sink"
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

    pub fn config(&self) -> &HttpSinkConfig {
        &self.config
    }
}

#[async_trait]
impl LogSink for HttpSink {
    fn name(&self) -> &str {
        HTTP_SINK
    }

    fn supports(&self, _kind: &RecordKind) -> bool {
        self.switch.is_enabled()
    }

    async fn send(&self, record: &dyn LogRecord) -> Result<()> {
        let start = Instant::now();
        let body = serde_json::to_vec(&record.to_json())?;

        let mut request = self
            .client
            .post(&self.config.endpoint)
            .header("Content-Type", "application/json")
            .header(RECORD_TYPE_HEADER, record.type_name())
            .header(SOURCE_HEADER, &self.config.source);

        if let Some(signature) = self.config.secret.as_deref().and_then(|s| sign(s, &body)) {
            request = request.header(SIGNATURE_HEADER, signature);
        }

        let response = request.body(body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::Request(format!(
                "collector returned {}: {}",
                status, text
            )));
        }

        debug!(
            subsystem = logging::SUBSYSTEM_SINK,
            component = "http",
            op = "post",
            record_id = record.id(),
            record_type = record.type_name(),
            status = status.as_u16(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Record posted"
        );
        Ok(())
    }
}
