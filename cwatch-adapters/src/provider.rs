//! The provider seam used by the scrape engine.

use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use cwatch_types::{Datapoint, DimensionSet, Statistic, TaskIdentity};

use crate::AdapterError;

/// One page of a dimension listing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricPage {
    /// Dimension combinations known to the provider for the metric.
    pub combinations: Vec<DimensionSet>,
    /// Token for the next page, `None` on the last page.
    pub next_token: Option<String>,
}

/// Parameters of one statistics query.
#[derive(Debug, Clone, PartialEq)]
pub struct StatisticsQuery {
    pub namespace: String,
    pub metric_name: String,
    pub dimensions: DimensionSet,
    pub statistics: Vec<Statistic>,
    pub extended_statistics: Vec<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub period_seconds: u32,
}

/// A time-series metrics provider.
///
/// This trait abstracts the two provider calls the engine makes so the
/// resolution and orchestration logic can be tested without a real cloud.
#[async_trait]
pub trait MetricsProvider: Send + Sync + Debug {
    /// List dimension combinations known for `namespace`/`metric_name`.
    ///
    /// Callers follow `next_token` until it is `None`.
    async fn list_metrics(
        &self,
        namespace: &str,
        metric_name: &str,
        next_token: Option<&str>,
    ) -> Result<MetricPage, AdapterError>;

    /// Fetch statistics for one dimension combination.
    async fn get_metric_statistics(
        &self,
        query: &StatisticsQuery,
    ) -> Result<Vec<Datapoint>, AdapterError>;
}

/// Creates providers bound to a task's region and credentials.
///
/// A provider is created once per task per scrape and shared read-only by
/// all of that task's concurrent units.
#[async_trait]
pub trait ProviderConnector: Send + Sync + Debug {
    async fn connect(&self, identity: &TaskIdentity)
        -> Result<Arc<dyn MetricsProvider>, AdapterError>;
}
