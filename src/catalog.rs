//! The compiled, immutable set of scrape templates.
//!
//! A [`Catalog`] is built once from [`Settings`] and shared read-only by
//! every scrape. Reloading builds a new catalog and swaps it into the
//! [`CatalogHandle`]; scrapes already running keep the one they started
//! with. The request limiter outlives the swap unless its bound changes.

use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::json;
use tokio::sync::Semaphore;

use cwatch_types::{Task, TaskIdentity};

use crate::config::Settings;
use crate::error::ConfigError;
use crate::template::{CompiledMetric, MetricTemplateBuilder, StatisticLayout};

/// One configured task with its compiled metrics.
#[derive(Debug)]
pub struct TaskTemplate {
    pub identity: TaskIdentity,
    pub metrics: Vec<Arc<CompiledMetric>>,
}

/// Every task template plus the request limiter scrapes share.
#[derive(Debug)]
pub struct Catalog {
    tasks: Vec<Arc<TaskTemplate>>,
    layout: StatisticLayout,
    max_concurrent_requests: usize,
    limiter: Arc<Semaphore>,
}

impl Catalog {
    /// Build a catalog from settings.
    pub fn build(settings: &Settings) -> Result<Self, ConfigError> {
        Self::from_tasks(
            settings.expand_tasks()?,
            settings.statistic_layout,
            settings.max_concurrent_requests,
        )
    }

    /// Build a catalog from already expanded tasks.
    pub fn from_tasks(
        tasks: Vec<Task>,
        layout: StatisticLayout,
        max_concurrent_requests: usize,
    ) -> Result<Self, ConfigError> {
        let builder = MetricTemplateBuilder::new(layout);
        let tasks = tasks
            .into_iter()
            .map(|task| {
                let metrics = task
                    .metrics
                    .into_iter()
                    .map(|spec| builder.compile(spec).map(Arc::new))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Arc::new(TaskTemplate {
                    identity: task.identity,
                    metrics,
                }))
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        let max_concurrent_requests = max_concurrent_requests.max(1);
        Ok(Self {
            tasks,
            layout,
            max_concurrent_requests,
            limiter: Arc::new(Semaphore::new(max_concurrent_requests)),
        })
    }

    pub fn tasks(&self) -> &[Arc<TaskTemplate>] {
        &self.tasks
    }

    /// Every task configured under `name`, in configuration order.
    pub fn tasks_named(&self, name: &str) -> Vec<Arc<TaskTemplate>> {
        self.tasks
            .iter()
            .filter(|t| t.identity.name == name)
            .cloned()
            .collect()
    }

    pub fn layout(&self) -> StatisticLayout {
        self.layout
    }

    pub fn max_concurrent_requests(&self) -> usize {
        self.max_concurrent_requests
    }

    /// Limiter bounding provider calls in flight across all scrapes.
    ///
    /// Carried over by [`CatalogHandle::replace`] while the bound is
    /// unchanged, so scrapes started before and after a reload draw from the
    /// same permits. Changing the bound starts a fresh limiter; until scrapes
    /// on the old catalog drain, both bounds apply side by side.
    pub fn limiter(&self) -> Arc<Semaphore> {
        self.limiter.clone()
    }

    /// JSON summary of the catalog: tasks and the metric families each
    /// would publish.
    pub fn describe(&self) -> serde_json::Value {
        let tasks: Vec<serde_json::Value> = self
            .tasks
            .iter()
            .map(|task| {
                json!({
                    "name": task.identity.name,
                    "region": task.identity.region,
                    "account": task.identity.account_label(),
                    "role_arn": task.identity.role_arn(),
                    "metrics": task.metrics.iter().map(|m| {
                        json!({
                            "namespace": m.spec().namespace,
                            "name": m.spec().name,
                            "needs_discovery": m.spec().needs_discovery(),
                            "templates": m.templates(),
                        })
                    }).collect::<Vec<_>>(),
                })
            })
            .collect();

        json!({
            "statistic_layout": self.layout,
            "max_concurrent_requests": self.max_concurrent_requests,
            "tasks": tasks,
        })
    }
}

/// Shared, swappable reference to the current catalog.
#[derive(Debug)]
pub struct CatalogHandle {
    current: RwLock<Arc<Catalog>>,
}

impl CatalogHandle {
    pub fn new(catalog: Catalog) -> Self {
        Self {
            current: RwLock::new(Arc::new(catalog)),
        }
    }

    /// The catalog in effect right now.
    pub fn snapshot(&self) -> Arc<Catalog> {
        self.current.read().clone()
    }

    /// Swap in a new catalog, keeping the current limiter when the new
    /// catalog has the same bound.
    pub fn replace(&self, catalog: Catalog) {
        let mut current = self.current.write();
        let catalog = if catalog.max_concurrent_requests == current.max_concurrent_requests {
            Catalog {
                limiter: current.limiter.clone(),
                ..catalog
            }
        } else {
            catalog
        };
        *current = Arc::new(catalog);
    }
}
