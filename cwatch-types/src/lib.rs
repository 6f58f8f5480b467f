//! # cwatch-types
//!
//! Core types shared by the cwatch crates. This crate defines the data model
//! the scrape engine works with: what to query ([`MetricSpec`], [`Task`]),
//! what the provider returns ([`DimensionSet`], [`Datapoint`]) and what gets
//! published ([`Sample`]).
//!
//! ## Design Goals
//!
//! - **Zero required dependencies**: Core types work without any serialization framework
//! - **Optional serialization**: Enable the `serde` feature to (de)serialize specs and samples
//! - **Provider agnostic**: Nothing here knows about the AWS SDK; adapters convert at the edge
//! - **Ergonomic builders**: Fluent API for constructing metric specs and datapoints
//!
//! ## Example
//!
//! ```rust
//! use cwatch_types::{MetricSpec, Statistic, TARGET_TOKEN};
//!
//! let spec = MetricSpec::builder("AWS/EC2", "CPUUtilization")
//!     .statistic(Statistic::Average)
//!     .statistic(Statistic::Maximum)
//!     .dimension("InstanceId")
//!     .select("InstanceId", [TARGET_TOKEN])
//!     .build();
//!
//! assert!(spec.has_direct_selection());
//! assert!(!spec.needs_discovery());
//! ```

mod datapoint;
mod dimension;
mod sample;
mod spec;
mod task;

pub use datapoint::*;
pub use dimension::*;
pub use sample::*;
pub use spec::*;
pub use task::*;

/// Literal selection value replaced by the scrape target at resolution time.
pub const TARGET_TOKEN: &str = "$_target";

/// Account label value used when a task has no account configured.
pub const ACCOUNT_NOT_SPECIFIED: &str = "Not Specified";

/// Pattern assigned to declared dimensions that have no selection at all.
pub const MATCH_ALL: &str = ".*";
