//! One scrape request against the catalog.

use std::sync::Arc;

use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use cwatch_adapters::ProviderConnector;
use cwatch_sdk::{RequestCounters, ScrapeStats};
use cwatch_types::Sample;

use crate::catalog::Catalog;
use crate::error::ConfigError;
use crate::scrape::{ScrapeContext, ScrapeOrchestrator, ScrapeSummary, ScrapeUnit};
use crate::sink::SampleBuffer;

/// A scrape of one task for one target, ready to run.
///
/// Creating a session checks the request against the catalog; running it
/// consumes it. Each session has its own erroneous-request count and
/// duration, while request totals and the request limiter are shared.
pub struct Session {
    orchestrator: ScrapeOrchestrator,
    units: Vec<ScrapeUnit>,
}

impl Session {
    /// Prepare a scrape of every configured task named `task`.
    ///
    /// `region`, when given, overrides the configured region of each task.
    /// Fails when no task has that name or a task ends up with no region.
    pub fn new(
        catalog: &Catalog,
        connector: Arc<dyn ProviderConnector>,
        counters: Arc<RequestCounters>,
        target: &str,
        task: &str,
        region: Option<&str>,
    ) -> Result<Self, ConfigError> {
        let templates = catalog.tasks_named(task);
        if templates.is_empty() {
            return Err(ConfigError::UnknownTask(task.to_string()));
        }

        let mut units: Vec<ScrapeUnit> = Vec::with_capacity(templates.len());
        for template in templates {
            let region = region
                .or(template.identity.region.as_deref())
                .filter(|r| !r.is_empty())
                .ok_or_else(|| ConfigError::MissingRegion(task.to_string()))?;
            let identity = template.identity.in_region(region);
            if units.iter().any(|u| u.identity == identity) {
                continue;
            }
            units.push(ScrapeUnit::new(identity, template));
        }

        debug!(task, target, units = units.len(), "Session created");

        let ctx = ScrapeContext::new(target, counters, catalog.limiter());
        Ok(Self {
            orchestrator: ScrapeOrchestrator::new(connector, Arc::new(ctx)),
            units,
        })
    }

    pub fn units(&self) -> &[ScrapeUnit] {
        &self.units
    }

    /// Token that cancels this scrape. Units not yet finished emit nothing.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.orchestrator.context().cancellation_token().clone()
    }

    /// Statistics of this scrape, complete once it has finished.
    pub fn stats(&self) -> Arc<ScrapeStats> {
        self.orchestrator.context().stats().clone()
    }

    /// Run in the background, streaming samples as they are produced.
    pub fn run(self) -> ScrapeRun {
        let (tx, samples) = mpsc::unbounded_channel();
        let cancel = self.cancellation_token();
        let handle = tokio::spawn(async move {
            let Session {
                orchestrator,
                units,
            } = self;
            orchestrator.run(units, Arc::new(tx)).await
        });

        ScrapeRun {
            samples,
            handle,
            cancel,
        }
    }

    /// Run to completion and collect every sample.
    pub async fn collect(self) -> (Vec<Sample>, ScrapeSummary) {
        let buffer = SampleBuffer::new();
        let summary = self
            .orchestrator
            .run(self.units, Arc::new(buffer.clone()))
            .await;
        (buffer.take(), summary)
    }
}

/// A session running in the background.
///
/// `samples` closes once the scrape has finished; `handle` then yields the
/// summary.
pub struct ScrapeRun {
    pub samples: UnboundedReceiver<Sample>,
    pub handle: JoinHandle<ScrapeSummary>,
    cancel: CancellationToken,
}

impl ScrapeRun {
    /// Cancel the scrape.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::StatisticLayout;
    use cwatch_adapters::{MemoryConnector, MemoryProvider};
    use cwatch_types::{Datapoint, DimensionSet, MetricSpec, Statistic, Task, TaskIdentity};

    fn catalog(tasks: Vec<Task>) -> Catalog {
        Catalog::from_tasks(tasks, StatisticLayout::PerStatistic, 4).unwrap()
    }

    fn billing(identity: TaskIdentity) -> Task {
        Task::new(
            identity,
            vec![MetricSpec::builder("AWS/Billing", "EstimatedCharges")
                .statistic(Statistic::Maximum)
                .build()],
        )
    }

    fn connector() -> (Arc<MemoryProvider>, Arc<dyn ProviderConnector>) {
        let provider = Arc::new(MemoryProvider::new());
        let connector = Arc::new(MemoryConnector::new(provider.clone()));
        (provider, connector)
    }

    #[test]
    fn test_unknown_task() {
        let (_, connector) = connector();
        let catalog = catalog(vec![billing(TaskIdentity::new("billing").region("us-east-1"))]);

        let err = Session::new(&catalog, connector, Arc::default(), "", "ec2", None).err();
        assert!(matches!(err, Some(ConfigError::UnknownTask(ref t)) if t == "ec2"));
    }

    #[test]
    fn test_missing_region() {
        let (_, connector) = connector();
        let catalog = catalog(vec![billing(TaskIdentity::new("billing"))]);

        let err = Session::new(&catalog, connector.clone(), Arc::default(), "", "billing", None).err();
        assert!(matches!(err, Some(ConfigError::MissingRegion(_))));

        let session = Session::new(&catalog, connector, Arc::default(), "", "billing", Some("us-east-1")).unwrap();
        assert_eq!(session.units()[0].identity.region_label(), "us-east-1");
    }

    #[test]
    fn test_region_override_collapses_duplicates() {
        let (_, connector) = connector();
        let catalog = catalog(vec![
            billing(TaskIdentity::new("billing").region("eu-west-1")),
            billing(TaskIdentity::new("billing").region("us-east-1")),
        ]);

        let all = Session::new(&catalog, connector.clone(), Arc::default(), "", "billing", None).unwrap();
        assert_eq!(all.units().len(), 2);

        let pinned = Session::new(&catalog, connector, Arc::default(), "", "billing", Some("ap-south-1")).unwrap();
        assert_eq!(pinned.units().len(), 1);
    }

    #[tokio::test]
    async fn test_run_streams_samples() {
        let (provider, connector) = connector();
        provider.respond(
            "AWS/Billing",
            "EstimatedCharges",
            DimensionSet::new(),
            vec![Datapoint::new(1).with(Statistic::Maximum, 12.0)],
        );
        let catalog = catalog(vec![billing(TaskIdentity::new("billing").region("us-east-1"))]);

        let session = Session::new(&catalog, connector, Arc::default(), "", "billing", None).unwrap();
        let mut run = session.run();

        let sample = run.samples.recv().await.unwrap();
        assert_eq!(sample.name, "aws_billing_estimated_charges_maximum");
        assert_eq!(sample.value, 12.0);
        assert!(run.samples.recv().await.is_none());

        let summary = run.handle.await.unwrap();
        assert_eq!(summary.completed_units, 1);
    }

    #[tokio::test]
    async fn test_collect() {
        let (provider, connector) = connector();
        provider.respond(
            "AWS/Billing",
            "EstimatedCharges",
            DimensionSet::new(),
            vec![Datapoint::new(1).with(Statistic::Maximum, 3.5)],
        );
        let catalog = catalog(vec![billing(TaskIdentity::new("billing").region("us-east-1"))]);
        let counters = Arc::new(RequestCounters::new());

        let session = Session::new(&catalog, connector, counters.clone(), "", "billing", None).unwrap();
        let (samples, summary) = session.collect().await;

        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].label("region"), Some("us-east-1"));
        assert_eq!(summary.erroneous_requests, 0);
        assert_eq!(counters.total_requests(), 1);
    }
}
