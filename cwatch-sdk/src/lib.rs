//! # cwatch-sdk
//!
//! Exposition SDK for the cwatch exporter.
//!
//! This crate turns scrape results into something Prometheus can read:
//! lock-free request counters, the text exposition renderer, and (with the
//! `prometheus` feature) a small hyper server that triggers scrapes.
//!
//! ## Quick Start
//!
//! ```rust
//! use cwatch_sdk::{exposition, RequestCounters, ScrapeStats};
//!
//! let counters = RequestCounters::new();
//! let stats = ScrapeStats::new();
//!
//! counters.record_request();
//! stats.record_error();
//!
//! let text = exposition::format_scrape(&[], &stats, &counters);
//! assert!(text.contains("cloudwatch_exporter_erroneous_requests 1"));
//! assert!(text.contains("cloudwatch_requests_total 1"));
//! ```
//!
//! ## Features
//!
//! - **Thread-safe**: Counters are atomics, shared freely between tasks
//! - **Standard format**: Families grouped with HELP/TYPE headers, labels escaped
//! - **Pluggable server**: Implement [`prometheus::ScrapeHandler`] to serve scrapes

mod counters;
pub mod exposition;

#[cfg(feature = "prometheus")]
pub mod prometheus;

pub use counters::{RequestCounters, ScrapeStats};

#[cfg(feature = "prometheus")]
pub use prometheus::{HandlerError, MetricsServer, PrometheusConfig, ScrapeHandler, ScrapeParams};

// Re-export types for convenience
pub use cwatch_types::Sample;
