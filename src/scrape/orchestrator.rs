//! Fan-out of one scrape over tasks and dimension sets.
//!
//! Every task runs as its own tokio task. Within a task the metrics run one
//! after the other: resolve, fetch the direct set inline, then fetch every
//! discovered set concurrently and wait for all of them before moving to
//! the next metric. Provider calls in flight are bounded by the context's
//! limiter, not by how many units are spawned.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

use cwatch_adapters::{MetricsProvider, ProviderConnector};
use cwatch_types::{DimensionSet, TaskIdentity};

use super::{DimensionResolver, ResultMapper, ScrapeContext, StatisticFetcher};
use crate::catalog::TaskTemplate;
use crate::sink::SampleSink;
use crate::template::CompiledMetric;

/// One task to scrape, pinned to the region it runs in.
#[derive(Debug, Clone)]
pub struct ScrapeUnit {
    pub identity: TaskIdentity,
    pub template: Arc<TaskTemplate>,
}

impl ScrapeUnit {
    pub fn new(identity: TaskIdentity, template: Arc<TaskTemplate>) -> Self {
        Self { identity, template }
    }
}

/// Outcome of a finished scrape.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ScrapeSummary {
    pub erroneous_requests: u64,
    pub completed_units: u64,
    pub duration: Duration,
    pub cancelled: bool,
}

/// Runs scrape units against providers built by a connector.
pub struct ScrapeOrchestrator {
    connector: Arc<dyn ProviderConnector>,
    ctx: Arc<ScrapeContext>,
}

impl ScrapeOrchestrator {
    pub fn new(connector: Arc<dyn ProviderConnector>, ctx: Arc<ScrapeContext>) -> Self {
        Self { connector, ctx }
    }

    pub fn context(&self) -> &Arc<ScrapeContext> {
        &self.ctx
    }

    /// Scrape every unit concurrently, emitting samples into `sink`.
    ///
    /// Returns once every unit and every nested discovery unit finished.
    pub async fn run(&self, units: Vec<ScrapeUnit>, sink: Arc<dyn SampleSink>) -> ScrapeSummary {
        let started = Instant::now();
        let now = Utc::now();

        let mut tasks = JoinSet::new();
        for unit in units {
            let connector = self.connector.clone();
            let ctx = self.ctx.clone();
            let sink = sink.clone();
            tasks.spawn(async move { scrape_task(unit, connector, ctx, sink, now).await });
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Scrape task aborted");
            }
        }

        let stats = self.ctx.stats();
        stats.set_duration(started.elapsed());

        ScrapeSummary {
            erroneous_requests: stats.erroneous_requests(),
            completed_units: stats.completed_units(),
            duration: stats.duration(),
            cancelled: self.ctx.is_cancelled(),
        }
    }
}

async fn scrape_task(
    unit: ScrapeUnit,
    connector: Arc<dyn ProviderConnector>,
    ctx: Arc<ScrapeContext>,
    sink: Arc<dyn SampleSink>,
    now: DateTime<Utc>,
) {
    let provider = match connector.connect(&unit.identity).await {
        Ok(provider) => provider,
        Err(e) => {
            warn!(
                task = %unit.identity.name,
                region = unit.identity.region_label(),
                error = %e,
                "Connecting to provider failed"
            );
            ctx.stats().record_error();
            return;
        }
    };
    let identity = Arc::new(unit.identity);

    for metric in &unit.template.metrics {
        if ctx.is_cancelled() {
            return;
        }
        if metric.statistic_kinds().is_empty() {
            debug!(metric = %metric.spec().name, "No statistics requested, skipping");
            continue;
        }

        let resolution = DimensionResolver::new(metric, ctx.target())
            .resolve(provider.as_ref(), &ctx)
            .await;
        debug!(
            task = %identity.name,
            namespace = %metric.spec().namespace,
            metric = %metric.spec().name,
            units = resolution.len(),
            "Resolved dimension sets"
        );

        if let Some(direct) = resolution.direct {
            scrape_dimensions(provider.as_ref(), metric, &identity, &ctx, sink.as_ref(), direct, now)
                .await;
        }

        let mut discovered = JoinSet::new();
        for dimensions in resolution.discovered {
            let provider = provider.clone();
            let metric = metric.clone();
            let identity = identity.clone();
            let ctx = ctx.clone();
            let sink = sink.clone();
            discovered.spawn(async move {
                scrape_dimensions(
                    provider.as_ref(),
                    &metric,
                    &identity,
                    &ctx,
                    sink.as_ref(),
                    dimensions,
                    now,
                )
                .await
            });
        }
        while let Some(joined) = discovered.join_next().await {
            if let Err(e) = joined {
                error!(metric = %metric.spec().name, error = %e, "Discovery unit aborted");
            }
        }
    }
}

async fn scrape_dimensions(
    provider: &dyn MetricsProvider,
    metric: &CompiledMetric,
    identity: &TaskIdentity,
    ctx: &ScrapeContext,
    sink: &dyn SampleSink,
    dimensions: DimensionSet,
    now: DateTime<Utc>,
) {
    if ctx.is_cancelled() {
        return;
    }

    let datapoint = StatisticFetcher::new(provider, ctx)
        .fetch(metric, &dimensions, now)
        .await;

    // A response that raced the cancellation is dropped.
    if ctx.is_cancelled() {
        return;
    }

    if let Some(datapoint) = datapoint {
        let mapper = ResultMapper::new(metric, identity);
        let labels = mapper.label_values(&dimensions);
        for sample in mapper.map(&datapoint, &labels) {
            sink.emit(sample);
        }
    }
    ctx.stats().record_unit();
}
