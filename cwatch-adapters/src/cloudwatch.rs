//! AWS CloudWatch adapter.
//!
//! Wraps the official SDK client behind [`MetricsProvider`]. The connector
//! loads the ambient SDK configuration once and, per task, pins the region
//! and optionally assumes `arn:aws:iam::<account>:role/<role_name>`.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use aws_config::sts::AssumeRoleProvider;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_sdk_cloudwatch::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_cloudwatch::primitives::DateTime as AwsDateTime;
use aws_sdk_cloudwatch::types::{Dimension, Statistic as AwsStatistic};
use aws_sdk_cloudwatch::Client;
use parking_lot::Mutex;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use cwatch_types::{Datapoint, DimensionSet, TaskIdentity};

use crate::error::classify;
use crate::{AdapterError, MetricPage, MetricsProvider, ProviderConnector, StatisticsQuery};

const LIST_METRICS: &str = "ListMetrics";
const GET_METRIC_STATISTICS: &str = "GetMetricStatistics";

/// Default session name used when assuming task roles.
pub const DEFAULT_SESSION_NAME: &str = "cwatch";

/// CloudWatch-backed [`MetricsProvider`] bound to one region.
#[derive(Clone)]
pub struct CloudWatchProvider {
    client: Client,
    region: String,
}

impl CloudWatchProvider {
    /// Create a provider from a loaded SDK configuration.
    pub fn from_config(config: &SdkConfig) -> Self {
        let region = config
            .region()
            .map(|r| r.to_string())
            .unwrap_or_default();
        Self {
            client: Client::new(config),
            region,
        }
    }

    /// Load the ambient configuration for `region` and create a provider.
    pub async fn new(region: &str) -> Self {
        let config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .load()
            .await;
        Self::from_config(&config)
    }

    pub fn region(&self) -> &str {
        &self.region
    }
}

impl fmt::Debug for CloudWatchProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloudWatchProvider")
            .field("region", &self.region)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl MetricsProvider for CloudWatchProvider {
    async fn list_metrics(
        &self,
        namespace: &str,
        metric_name: &str,
        next_token: Option<&str>,
    ) -> Result<MetricPage, AdapterError> {
        let response = self
            .client
            .list_metrics()
            .namespace(namespace)
            .metric_name(metric_name)
            .set_next_token(next_token.map(str::to_string))
            .send()
            .await
            .map_err(|e| sdk_error(LIST_METRICS, e))?;

        let combinations = response
            .metrics()
            .iter()
            .map(|metric| {
                let mut set = DimensionSet::new();
                for dimension in metric.dimensions() {
                    if let (Some(name), Some(value)) = (dimension.name(), dimension.value()) {
                        set.push(name, value);
                    }
                }
                set
            })
            .collect::<Vec<_>>();

        debug!(
            region = %self.region,
            namespace,
            metric = metric_name,
            combinations = combinations.len(),
            "Listed metrics page"
        );

        Ok(MetricPage {
            combinations,
            next_token: response.next_token().map(str::to_string),
        })
    }

    async fn get_metric_statistics(
        &self,
        query: &StatisticsQuery,
    ) -> Result<Vec<Datapoint>, AdapterError> {
        let dimensions = query
            .dimensions
            .iter()
            .map(|d| Dimension::builder().name(&d.name).value(&d.value).build())
            .collect::<Vec<_>>();

        let statistics = query
            .statistics
            .iter()
            .map(|s| AwsStatistic::from(s.as_str()))
            .collect::<Vec<_>>();

        let period = i32::try_from(query.period_seconds)
            .map_err(|_| AdapterError::Parse(format!("period {} out of range", query.period_seconds)))?;

        let response = self
            .client
            .get_metric_statistics()
            .namespace(&query.namespace)
            .metric_name(&query.metric_name)
            .set_dimensions(Some(dimensions))
            .start_time(AwsDateTime::from_millis(query.start.timestamp_millis()))
            .end_time(AwsDateTime::from_millis(query.end.timestamp_millis()))
            .period(period)
            .set_statistics((!statistics.is_empty()).then_some(statistics))
            .set_extended_statistics(
                (!query.extended_statistics.is_empty()).then(|| query.extended_statistics.clone()),
            )
            .send()
            .await
            .map_err(|e| sdk_error(GET_METRIC_STATISTICS, e))?;

        Ok(response.datapoints().iter().map(convert_datapoint).collect())
    }
}

fn convert_datapoint(dp: &aws_sdk_cloudwatch::types::Datapoint) -> Datapoint {
    let timestamp_ms = dp
        .timestamp()
        .and_then(|t| t.to_millis().ok())
        .unwrap_or_default();

    Datapoint {
        timestamp_ms,
        sum: dp.sum(),
        average: dp.average(),
        maximum: dp.maximum(),
        minimum: dp.minimum(),
        sample_count: dp.sample_count(),
        unit: dp.unit().map(|u| u.as_str().to_string()),
        extended: dp
            .extended_statistics()
            .map(|stats| stats.iter().map(|(k, v)| (k.clone(), *v)).collect())
            .unwrap_or_default(),
    }
}

fn sdk_error<E, R>(operation: &'static str, err: SdkError<E, R>) -> AdapterError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: fmt::Debug,
{
    match &err {
        SdkError::TimeoutError(_) => AdapterError::Timeout,
        SdkError::DispatchFailure(_) => {
            AdapterError::Connection(DisplayErrorContext(&err).to_string())
        }
        _ => {
            let context = DisplayErrorContext(&err).to_string();
            classify(operation, err.code(), Some(err.message().unwrap_or(&context)))
        }
    }
}

type ProviderKey = (String, Option<String>);

/// Creates [`CloudWatchProvider`]s per task identity.
///
/// Providers are cached by `(region, role ARN)` so repeated scrapes reuse
/// the same client and credential cache.
pub struct CloudWatchConnector {
    session_name: String,
    base: OnceCell<SdkConfig>,
    providers: Mutex<HashMap<ProviderKey, Arc<CloudWatchProvider>>>,
}

impl CloudWatchConnector {
    pub fn new() -> Self {
        Self::with_session_name(DEFAULT_SESSION_NAME)
    }

    /// Use a custom session name when assuming roles.
    pub fn with_session_name(session_name: impl Into<String>) -> Self {
        Self {
            session_name: session_name.into(),
            base: OnceCell::new(),
            providers: Mutex::new(HashMap::new()),
        }
    }

    async fn base_config(&self) -> &SdkConfig {
        self.base
            .get_or_init(|| aws_config::defaults(BehaviorVersion::latest()).load())
            .await
    }
}

impl Default for CloudWatchConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CloudWatchConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloudWatchConnector")
            .field("session_name", &self.session_name)
            .field("cached_providers", &self.providers.lock().len())
            .finish()
    }
}

#[async_trait]
impl ProviderConnector for CloudWatchConnector {
    async fn connect(
        &self,
        identity: &TaskIdentity,
    ) -> Result<Arc<dyn MetricsProvider>, AdapterError> {
        let region = identity
            .region
            .clone()
            .filter(|r| !r.is_empty())
            .ok_or_else(|| {
                AdapterError::Connection(format!("task '{}' has no region", identity.name))
            })?;
        let role_arn = identity.role_arn();
        let key = (region.clone(), role_arn.clone());

        let cached = self.providers.lock().get(&key).cloned();
        if let Some(provider) = cached {
            return Ok(provider);
        }

        let base = self.base_config().await;
        let mut config = aws_sdk_cloudwatch::config::Builder::from(base)
            .region(Region::new(region.clone()));
        if let Some(arn) = &role_arn {
            info!(task = %identity.name, role = %arn, region = %region, "Assuming role");
            let credentials = AssumeRoleProvider::builder(arn)
                .session_name(&self.session_name)
                .region(Region::new(region.clone()))
                .configure(base)
                .build()
                .await;
            config = config.credentials_provider(credentials);
        }

        let provider = Arc::new(CloudWatchProvider {
            client: Client::from_conf(config.build()),
            region,
        });
        self.providers.lock().insert(key, provider.clone());
        Ok(provider)
    }
}
