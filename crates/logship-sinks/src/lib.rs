//! # logship-sinks
//!
//! Network sinks for the logship record pipeline.
//!
//! - [`QueueSink`]: one Redis Streams entry per record
//! - [`SearchSink`]: one document per record in a monthly index
//! - [`HttpSink`]: one signed JSON POST per record
//!
//! Every sink carries a [`SinkSwitch`](logship_core::SinkSwitch) that
//! gates `supports` at runtime.

pub mod http;
pub mod queue;
pub mod search;

pub use http::{HttpSink, HttpSinkConfig, HTTP_SINK};
pub use queue::{QueueSink, QueueSinkConfig, QUEUE_SINK};
pub use search::{SearchSink, SearchSinkConfig, SEARCH_SINK};
