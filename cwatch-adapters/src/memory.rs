//! In-memory provider with scripted responses.
//!
//! Listings are registered as ordered pages; page `n > 0` is reached with the
//! token `"page-n"`. Statistics responses are keyed by namespace, metric and
//! the exact dimension set queried. Anything not scripted answers with an
//! empty result. Every call is recorded for later inspection.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use cwatch_types::{Datapoint, DimensionSet, TaskIdentity};

use crate::{AdapterError, MetricPage, MetricsProvider, ProviderConnector, StatisticsQuery};

type MetricKey = (String, String);

#[derive(Debug, Default)]
struct Listing {
    pages: Vec<Vec<DimensionSet>>,
    /// Remaining scripted failures per page index.
    failures: HashMap<usize, u32>,
}

#[derive(Debug, Clone)]
enum Scripted {
    Respond(Vec<Datapoint>),
    Fail(AdapterError),
}

/// A recorded listing call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListCall {
    pub namespace: String,
    pub metric_name: String,
    pub next_token: Option<String>,
}

/// Scripted in-memory [`MetricsProvider`].
#[derive(Debug, Default)]
pub struct MemoryProvider {
    listings: Mutex<HashMap<MetricKey, Listing>>,
    statistics: Mutex<HashMap<(MetricKey, DimensionSet), Scripted>>,
    list_calls: Mutex<Vec<ListCall>>,
    statistics_calls: Mutex<Vec<StatisticsQuery>>,
    latency: Option<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MemoryProvider {
    /// Create an empty provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call by `latency` (useful to observe concurrency).
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Append a listing page for a metric.
    pub fn add_listing_page(&self, namespace: &str, metric_name: &str, combinations: Vec<DimensionSet>) {
        self.listings
            .lock()
            .entry(key(namespace, metric_name))
            .or_default()
            .pages
            .push(combinations);
    }

    /// Make the next `times` requests for listing page `index` fail.
    pub fn fail_listing_page(&self, namespace: &str, metric_name: &str, index: usize, times: u32) {
        self.listings
            .lock()
            .entry(key(namespace, metric_name))
            .or_default()
            .failures
            .insert(index, times);
    }

    /// Answer statistics queries for `dimensions` with `datapoints`.
    pub fn respond(
        &self,
        namespace: &str,
        metric_name: &str,
        dimensions: DimensionSet,
        datapoints: Vec<Datapoint>,
    ) {
        self.statistics.lock().insert(
            (key(namespace, metric_name), dimensions),
            Scripted::Respond(datapoints),
        );
    }

    /// Fail statistics queries for `dimensions` with `error`.
    pub fn fail_statistics(
        &self,
        namespace: &str,
        metric_name: &str,
        dimensions: DimensionSet,
        error: AdapterError,
    ) {
        self.statistics
            .lock()
            .insert((key(namespace, metric_name), dimensions), Scripted::Fail(error));
    }

    /// All listing calls made so far.
    pub fn list_calls(&self) -> Vec<ListCall> {
        self.list_calls.lock().clone()
    }

    /// All statistics queries made so far.
    pub fn statistics_calls(&self) -> Vec<StatisticsQuery> {
        self.statistics_calls.lock().clone()
    }

    /// Highest number of calls observed in flight at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn enter(&self) -> InFlight<'_> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        InFlight(&self.in_flight)
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

fn key(namespace: &str, metric_name: &str) -> MetricKey {
    (namespace.to_string(), metric_name.to_string())
}

fn page_index(token: Option<&str>) -> Result<usize, AdapterError> {
    match token {
        None => Ok(0),
        Some(token) => token
            .strip_prefix("page-")
            .and_then(|n| n.parse().ok())
            .ok_or_else(|| AdapterError::Parse(format!("invalid next token '{}'", token))),
    }
}

#[async_trait]
impl MetricsProvider for MemoryProvider {
    async fn list_metrics(
        &self,
        namespace: &str,
        metric_name: &str,
        next_token: Option<&str>,
    ) -> Result<MetricPage, AdapterError> {
        let _guard = self.enter().await;
        self.list_calls.lock().push(ListCall {
            namespace: namespace.to_string(),
            metric_name: metric_name.to_string(),
            next_token: next_token.map(str::to_string),
        });

        let index = page_index(next_token)?;
        let mut listings = self.listings.lock();
        let Some(listing) = listings.get_mut(&key(namespace, metric_name)) else {
            return Ok(MetricPage::default());
        };

        if let Some(remaining) = listing.failures.get_mut(&index) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(AdapterError::Request {
                    operation: "ListMetrics",
                    code: Some("InternalFailure".to_string()),
                    message: format!("scripted failure for page {}", index),
                });
            }
        }

        let combinations = listing.pages.get(index).cloned().unwrap_or_default();
        let next_token = (index + 1 < listing.pages.len()).then(|| format!("page-{}", index + 1));
        Ok(MetricPage {
            combinations,
            next_token,
        })
    }

    async fn get_metric_statistics(
        &self,
        query: &StatisticsQuery,
    ) -> Result<Vec<Datapoint>, AdapterError> {
        let _guard = self.enter().await;
        self.statistics_calls.lock().push(query.clone());

        let scripted = self
            .statistics
            .lock()
            .get(&(key(&query.namespace, &query.metric_name), query.dimensions.clone()))
            .cloned();

        match scripted {
            Some(Scripted::Respond(datapoints)) => Ok(datapoints),
            Some(Scripted::Fail(error)) => Err(error),
            None => Ok(Vec::new()),
        }
    }
}

/// Connector handing out one shared [`MemoryProvider`] to every task.
#[derive(Debug, Clone)]
pub struct MemoryConnector {
    provider: Arc<MemoryProvider>,
    connected: Arc<Mutex<Vec<TaskIdentity>>>,
}

impl MemoryConnector {
    pub fn new(provider: Arc<MemoryProvider>) -> Self {
        Self {
            provider,
            connected: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Identities connected so far, in connection order.
    pub fn connected(&self) -> Vec<TaskIdentity> {
        self.connected.lock().clone()
    }
}

#[async_trait]
impl ProviderConnector for MemoryConnector {
    async fn connect(
        &self,
        identity: &TaskIdentity,
    ) -> Result<Arc<dyn MetricsProvider>, AdapterError> {
        self.connected.lock().push(identity.clone());
        Ok(self.provider.clone())
    }
}
