//! Centralized default constants for logship.
//!
//! **This module is the single source of truth** for shared default values.
//! Config structs in every crate fall back to these when the corresponding
//! environment variable is unset or unparseable.

// =============================================================================
// RECORDS
// =============================================================================

/// Content used when a record is created with an empty description.
pub const FALLBACK_CONTENT: &str = "operation record";

/// Prefix for derived table and topic names.
pub const NAME_PREFIX: &str = "log_";

/// Suffix stripped from type names when deriving search index names.
pub const TYPE_NAME_SUFFIX: &str = "Log";

// =============================================================================
// ROUTING
// =============================================================================

/// Sink used when no explicit sink is requested.
pub const DEFAULT_SINK: &str = "queue";

/// Whether the interception boundary dispatches asynchronously by default.
pub const ASYNC_DISPATCH: bool = true;

// =============================================================================
// DISPATCHER
// =============================================================================

/// Number of concurrent send workers.
pub const DISPATCH_WORKERS: usize = 4;

/// Maximum queued async sends before new ones are rejected.
pub const DISPATCH_QUEUE_CAPACITY: usize = 1000;

/// Capacity of the dispatch event broadcast channel.
pub const EVENT_BUS_CAPACITY: usize = 256;

// =============================================================================
// DATABASE SINK
// =============================================================================

/// Maximum database connections for the log pool.
pub const DB_MAX_CONNECTIONS: u32 = 10;

/// Wait for a free pool connection before an insert fails (ms).
pub const DB_ACQUIRE_TIMEOUT_MS: u64 = 5_000;

/// Idle pool connections are closed after this long (seconds).
pub const DB_IDLE_TIMEOUT_SECS: u64 = 600;

/// Create missing tables automatically.
pub const DB_AUTO_CREATE: bool = true;

// =============================================================================
// QUEUE SINK
// =============================================================================

/// Redis connection URL for the queue sink.
pub const QUEUE_URL: &str = "redis://localhost:6379";

/// Attempts after the first failed publish.
pub const QUEUE_MAX_RETRIES: u32 = 3;

/// Base backoff between publish retries, multiplied by attempt number.
pub const QUEUE_RETRY_BACKOFF_MS: u64 = 100;

// =============================================================================
// SEARCH SINK
// =============================================================================

/// Elasticsearch base URL.
pub const SEARCH_URL: &str = "http://localhost:9200";

/// Index name prefix.
pub const SEARCH_INDEX_PREFIX: &str = "log";

/// Connect timeout in milliseconds.
pub const SEARCH_CONNECT_TIMEOUT_MS: u64 = 5_000;

/// Request timeout in milliseconds.
pub const SEARCH_TIMEOUT_MS: u64 = 30_000;

// =============================================================================
// HTTP SINK
// =============================================================================

/// Endpoint receiving every record.
pub const HTTP_ENDPOINT: &str = "http://localhost:8080/api/logs/generic";

/// Value of the source header identifying this component.
pub const HTTP_SOURCE: &str = "logship";

/// Connect timeout in milliseconds.
pub const HTTP_CONNECT_TIMEOUT_MS: u64 = 5_000;

/// Request timeout in milliseconds.
pub const HTTP_TIMEOUT_MS: u64 = 30_000;
