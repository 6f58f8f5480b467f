//! # cwatch-adapters
//!
//! Metrics provider adapters for the cwatch scrape engine.
//!
//! The engine only talks to a provider through two calls, captured by the
//! [`MetricsProvider`] trait: list the dimension combinations known for a
//! metric (paginated), and fetch statistics for one combination over a time
//! window. A [`ProviderConnector`] builds a provider for a task's region and
//! credentials.
//!
//! ## Supported Providers
//!
//! - **CloudWatch** (`cloudwatch` feature) - AWS CloudWatch via the official SDK,
//!   with optional role assumption per task
//! - **Memory** (always available) - scripted in-memory provider for tests and demos
//!
//! ## Quick Start (Memory)
//!
//! ```rust
//! use cwatch_adapters::{MemoryProvider, MetricsProvider};
//! use cwatch_types::DimensionSet;
//!
//! # tokio_test::block_on(async {
//! let provider = MemoryProvider::new();
//! provider.add_listing_page(
//!     "AWS/EC2",
//!     "CPUUtilization",
//!     vec![DimensionSet::from_pairs([("InstanceId", "i-123")])],
//! );
//!
//! let page = provider.list_metrics("AWS/EC2", "CPUUtilization", None).await?;
//! assert_eq!(page.combinations.len(), 1);
//! # Ok::<(), cwatch_adapters::AdapterError>(())
//! # });
//! ```

pub mod error;
pub mod memory;
pub mod provider;

#[cfg(feature = "cloudwatch")]
pub mod cloudwatch;

pub use error::AdapterError;
pub use memory::{MemoryConnector, MemoryProvider};
pub use provider::{MetricPage, MetricsProvider, ProviderConnector, StatisticsQuery};

// Re-export types for convenience
pub use cwatch_types::{Datapoint, DimensionSet, Statistic, TaskIdentity};
