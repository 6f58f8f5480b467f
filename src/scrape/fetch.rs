//! Statistics queries.

use chrono::{DateTime, Duration, Utc};
use tracing::warn;

use cwatch_adapters::{MetricsProvider, StatisticsQuery};
use cwatch_types::{Datapoint, DimensionSet, Window};

use super::ScrapeContext;
use crate::template::CompiledMetric;

/// Query window ending `delay` before `now` and spanning `range`.
pub fn query_window(window: &Window, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let end = now - Duration::seconds(i64::from(window.delay_seconds));
    let start = end - Duration::seconds(i64::from(window.range_seconds));
    (start, end)
}

/// The datapoint with the strictly greatest timestamp; the first one wins
/// ties.
pub fn latest_datapoint(datapoints: Vec<Datapoint>) -> Option<Datapoint> {
    datapoints.into_iter().fold(None, |latest, dp| match latest {
        Some(current) if current.timestamp_ms >= dp.timestamp_ms => Some(current),
        _ => Some(dp),
    })
}

/// Issues one statistics query per (metric, dimension set).
pub struct StatisticFetcher<'a> {
    provider: &'a dyn MetricsProvider,
    ctx: &'a ScrapeContext,
}

impl<'a> StatisticFetcher<'a> {
    pub fn new(provider: &'a dyn MetricsProvider, ctx: &'a ScrapeContext) -> Self {
        Self { provider, ctx }
    }

    /// Fetch the latest datapoint for `dimensions`.
    ///
    /// Provider errors are logged and counted by the context; like an empty
    /// response they yield `None`.
    pub async fn fetch(
        &self,
        metric: &CompiledMetric,
        dimensions: &DimensionSet,
        now: DateTime<Utc>,
    ) -> Option<Datapoint> {
        let spec = metric.spec();
        let (start, end) = query_window(&spec.window, now);
        let query = StatisticsQuery {
            namespace: spec.namespace.clone(),
            metric_name: spec.name.clone(),
            dimensions: dimensions.clone(),
            statistics: spec.statistics.clone(),
            extended_statistics: spec.extended_statistics.clone(),
            start,
            end,
            period_seconds: spec.window.period_seconds,
        };

        match self.ctx.call(self.provider.get_metric_statistics(&query)).await {
            Ok(datapoints) => latest_datapoint(datapoints),
            Err(e) if e.is_cancelled() => None,
            Err(e) => {
                warn!(
                    namespace = %spec.namespace,
                    metric = %spec.name,
                    dimensions = ?dimensions,
                    error = %e,
                    "Fetching statistics failed"
                );
                None
            }
        }
    }
}
