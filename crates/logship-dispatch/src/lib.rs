//! # logship-dispatch
//!
//! Routing, dispatch and the call-logging boundary for logship.
//!
//! This crate provides:
//! - A sink registry that routes each record to exactly one sink
//! - A dispatcher with synchronous, isolated, batched and background sends
//! - A bounded worker pool that rejects work instead of blocking callers
//! - The pipeline that turns an intercepted call into a dispatched record
//!
//! ## Example
//!
//! ```ignore
//! use logship_core::OperationLog;
//! use logship_dispatch::{CallOutcome, LogCall, PipelineBuilder};
//!
//! let pipeline = PipelineBuilder::from_env().build().await;
//!
//! let call = LogCall::new("cancel order #{#orderId}")
//!     .with_type::<OperationLog>()
//!     .with_metadata("orders", "order", "CANCEL");
//! let outcome = CallOutcome::new().with_argument("orderId", serde_json::json!("X1"));
//!
//! pipeline.record(&call, &outcome).await;
//! pipeline.shutdown().await;
//! ```

pub mod builder;
pub mod dispatcher;
pub mod mock;
pub mod noop;
pub mod pipeline;
pub mod router;
mod worker;

pub use builder::{PipelineBuilder, PipelineConfig};
pub use dispatcher::{
    BatchFailure, BatchReport, DeliveryState, DispatchEvent, Dispatcher, DispatcherConfig,
};
pub use noop::{NoopSink, NOOP_SINK};
pub use pipeline::{CallOutcome, LogCall, LogPipeline, STATUS_FAILED, STATUS_SUCCESS};
pub use router::SinkRegistry;
