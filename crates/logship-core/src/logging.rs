//! Structured logging conventions for logship.
//!
//! Every event carries a `subsystem` field whose value is one of the
//! constants below, so log aggregation can filter each part of the
//! pipeline the same way. Other common keys: `component`, `op`,
//! `record_id`, `record_type`, `sink`, `db_table`, `duration_ms`,
//! `attempt`, `error`.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | A record was lost (swallowed send failure, schema failure) |
//! | WARN  | Recoverable issue, fallback applied (index creation, rejection) |
//! | INFO  | Lifecycle events, table creation, column additions |
//! | DEBUG | Decision points (sink resolution, cache hits, template fallback) |
//! | TRACE | Per-field and per-record detail |

/// Schema synchronization, pool and database sink.
pub const SUBSYSTEM_DB: &str = "db";

/// Routing, worker pool and delivery.
pub const SUBSYSTEM_DISPATCH: &str = "dispatch";

/// Call-logging boundary and pipeline assembly.
pub const SUBSYSTEM_PIPELINE: &str = "pipeline";

/// Queue, search and HTTP sinks.
pub const SUBSYSTEM_SINK: &str = "sink";

/// Description template resolution.
pub const SUBSYSTEM_TEMPLATE: &str = "template";
