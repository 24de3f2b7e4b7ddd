//! Observability for the watch engine
//!
//! Internal counters and latency histograms; logging itself goes through
//! `tracing`.

mod metrics;

pub use metrics::*;
