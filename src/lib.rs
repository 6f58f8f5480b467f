//! # cwatch
//!
//! A CloudWatch to Prometheus exporter.
//!
//! Each scrape request names a configured task and a target. The exporter
//! queries CloudWatch for every metric of that task, in parallel, and
//! renders the latest datapoints in the Prometheus text format.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │  config.yml ──▶ Settings ──▶ Catalog (compiled templates)         │
//! │                                  │                                │
//! │  GET /scrape ──▶ Exporter ──▶ Session ──▶ ScrapeOrchestrator      │
//! │                                             │                     │
//! │                  per task:  DimensionResolver ─▶ StatisticFetcher │
//! │                                             │          │          │
//! │                                             ▼          ▼          │
//! │                                       ResultMapper ─▶ SampleSink  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! - **[`config`]**: YAML settings with `CWATCH_` environment overrides,
//!   expanded into concrete tasks
//! - **[`template`]**: metric identifiers, label schemas and dimension
//!   matchers, compiled once per configuration
//! - **[`catalog`]**: the compiled tasks plus the shared request limiter,
//!   swapped atomically on reload
//! - **[`scrape`]**: resolution, fetching and mapping, fanned out over
//!   tokio tasks
//! - **[`session`]**: one scrape request, run in the background or
//!   collected
//!
//! ## Usage
//!
//! ### As a CLI tool
//!
//! ```bash
//! # Serve scrapes on :9106
//! cwatch --config config.yml
//!
//! # Validate a configuration and print what it would publish
//! cwatch --config config.yml --check
//! ```
//!
//! ### As a library
//!
//! ```rust
//! use std::sync::Arc;
//! use cwatch::{Catalog, Session, Settings};
//! use cwatch_adapters::{MemoryConnector, MemoryProvider};
//! use cwatch_types::{Datapoint, DimensionSet, Statistic};
//!
//! # tokio_test::block_on(async {
//! let settings = Settings::from_yaml(r#"
//! tasks:
//!   - name: billing
//!     region: us-east-1
//!     metrics:
//!       - aws_namespace: AWS/Billing
//!         aws_metric_name: EstimatedCharges
//!         aws_statistics: [Maximum]
//! "#)?;
//! let catalog = Catalog::build(&settings)?;
//!
//! let provider = Arc::new(MemoryProvider::new());
//! provider.respond(
//!     "AWS/Billing",
//!     "EstimatedCharges",
//!     DimensionSet::new(),
//!     vec![Datapoint::new(0).with(Statistic::Maximum, 12.5)],
//! );
//!
//! let connector = Arc::new(MemoryConnector::new(provider));
//! let session = Session::new(&catalog, connector, Arc::default(), "", "billing", None)?;
//! let (samples, _summary) = session.collect().await;
//!
//! assert_eq!(samples[0].name, "aws_billing_estimated_charges_maximum");
//! # Ok::<(), cwatch::ConfigError>(())
//! # });
//! ```

pub mod catalog;
pub mod config;
pub mod error;
pub mod exporter;
pub mod scrape;
pub mod session;
pub mod sink;
pub mod template;

mod server;

pub use catalog::{Catalog, CatalogHandle, TaskTemplate};
pub use config::Settings;
pub use error::ConfigError;
pub use exporter::Exporter;
pub use scrape::{ScrapeOrchestrator, ScrapeSummary};
pub use session::{ScrapeRun, Session};
pub use sink::{SampleBuffer, SampleSink};
pub use template::{CompiledMetric, MetricTemplate, MetricTemplateBuilder, StatisticLayout};
