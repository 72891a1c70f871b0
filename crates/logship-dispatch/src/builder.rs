//! Pipeline configuration and assembly.

use std::sync::Arc;

use tracing::{info, warn};

use logship_core::{defaults, FieldIntrospector, LogSink, RecordFactory};
use logship_core::logging;
use logship_db::{DatabaseSink, DatabaseSinkConfig};
use logship_sinks::{HttpSink, HttpSinkConfig, QueueSink, QueueSinkConfig, SearchSink, SearchSinkConfig};

use crate::dispatcher::{Dispatcher, DispatcherConfig};
use crate::pipeline::LogPipeline;
use crate::router::SinkRegistry;

/// Configuration for the whole pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Sink used when a call requests none.
    pub default_sink: String,
    /// Whether calls are dispatched in the background by default.
    pub async_dispatch: bool,
    pub dispatcher: DispatcherConfig,
    pub database: DatabaseSinkConfig,
    pub queue: QueueSinkConfig,
    pub search: SearchSinkConfig,
    pub http: HttpSinkConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            default_sink: defaults::DEFAULT_SINK.to_string(),
            async_dispatch: defaults::ASYNC_DISPATCH,
            dispatcher: DispatcherConfig::default(),
            database: DatabaseSinkConfig::default(),
            queue: QueueSinkConfig::default(),
            search: SearchSinkConfig::default(),
            http: HttpSinkConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `LOG_DEFAULT_SINK` | `queue` | Sink for calls that name none |
    /// | `LOG_ASYNC` | `true` | Dispatch in the background by default |
    ///
    /// Dispatcher and sink sections read their own variables.
    pub fn from_env() -> Self {
        let default_sink = std::env::var("LOG_DEFAULT_SINK")
            .ok()
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| defaults::DEFAULT_SINK.to_string());

        let async_dispatch = std::env::var("LOG_ASYNC")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(defaults::ASYNC_DISPATCH);

        Self {
            default_sink,
            async_dispatch,
            dispatcher: DispatcherConfig::from_env(),
            database: DatabaseSinkConfig::from_env(),
            queue: QueueSinkConfig::from_env(),
            search: SearchSinkConfig::from_env(),
            http: HttpSinkConfig::from_env(),
        }
    }

    pub fn with_default_sink(mut self, name: impl Into<String>) -> Self {
        self.default_sink = name.into();
        self
    }

    pub fn with_async(mut self, async_dispatch: bool) -> Self {
        self.async_dispatch = async_dispatch;
        self
    }

    pub fn with_dispatcher(mut self, dispatcher: DispatcherConfig) -> Self {
        self.dispatcher = dispatcher;
        self
    }
}

/// Builder for a [`LogPipeline`].
///
/// ```ignore
/// let pipeline = PipelineBuilder::from_env()
///     .with_sink(Arc::new(MyAuditSink::new()))
///     .build()
///     .await;
/// ```
pub struct PipelineBuilder {
    config: PipelineConfig,
    introspector: Arc<FieldIntrospector>,
    sinks: Vec<Arc<dyn LogSink>>,
    connect_configured: bool,
}

impl PipelineBuilder {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            introspector: Arc::new(FieldIntrospector::new()),
            sinks: Vec::new(),
            connect_configured: true,
        }
    }

    /// Builder over [`PipelineConfig::from_env`], after loading `.env`.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self::new(PipelineConfig::from_env())
    }

    /// Register an extra sink after the configured ones. A sink with the
    /// name of a configured sink replaces it.
    pub fn with_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn with_introspector(mut self, introspector: Arc<FieldIntrospector>) -> Self {
        self.introspector = introspector;
        self
    }

    /// Skip the database, queue, search and HTTP sinks.
    pub fn without_configured_sinks(mut self) -> Self {
        self.connect_configured = false;
        self
    }

    /// Connect sinks and start the dispatcher. Sinks that cannot be set
    /// up are skipped with a warning; the no-op sink is always there.
    pub async fn build(self) -> LogPipeline {
        let registry = Arc::new(SinkRegistry::new(self.config.default_sink.clone()));

        if self.connect_configured {
            for sink in connect_sinks(&self.config, &self.introspector).await {
                registry.register(sink);
            }
        }
        for sink in self.sinks {
            registry.register(sink);
        }

        info!(
            subsystem = logging::SUBSYSTEM_PIPELINE,
            sinks = ?registry.names(),
            default_sink = %self.config.default_sink,
            async_dispatch = self.config.async_dispatch,
            "Log pipeline ready"
        );

        let dispatcher = Arc::new(Dispatcher::new(registry, self.config.dispatcher.clone()));
        LogPipeline::new(
            RecordFactory::new(self.introspector),
            dispatcher,
            self.config.async_dispatch,
        )
    }
}

async fn connect_sinks(
    config: &PipelineConfig,
    introspector: &Arc<FieldIntrospector>,
) -> Vec<Arc<dyn LogSink>> {
    let mut sinks: Vec<Arc<dyn LogSink>> = Vec::new();

    if config.database.enabled {
        if config.database.database_url.is_none() {
            info!(
                subsystem = logging::SUBSYSTEM_PIPELINE,
                sink = "database",
                "DATABASE_URL not set, database sink skipped"
            );
        } else {
            match DatabaseSink::connect(&config.database, introspector.clone()).await {
                Ok(sink) => sinks.push(Arc::new(sink)),
                Err(e) => warn!(
                    subsystem = logging::SUBSYSTEM_PIPELINE,
                    sink = "database",
                    error = %e,
                    "Database sink unavailable"
                ),
            }
        }
    }

    if config.queue.enabled {
        sinks.push(Arc::new(QueueSink::connect(config.queue.clone()).await));
    }

    if config.search.enabled {
        match SearchSink::new(config.search.clone()) {
            Ok(sink) => sinks.push(Arc::new(sink)),
            Err(e) => warn!(
                subsystem = logging::SUBSYSTEM_PIPELINE,
                sink = "search",
                error = %e,
                "Search sink unavailable"
            ),
        }
    }

    if config.http.enabled {
        match HttpSink::new(config.http.clone()) {
            Ok(sink) => sinks.push(Arc::new(sink)),
            Err(e) => warn!(
                subsystem = logging::SUBSYSTEM_PIPELINE,
                sink = "http",
                error = %e,
                "HTTP sink unavailable"
            ),
        }
    }

    sinks
}
