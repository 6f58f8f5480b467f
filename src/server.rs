//! HTTP routes served by the exporter.

use async_trait::async_trait;
use tracing::warn;

use cwatch_sdk::{HandlerError, ScrapeHandler, ScrapeParams};

use crate::error::ConfigError;
use crate::exporter::Exporter;

#[async_trait]
impl ScrapeHandler for Exporter {
    async fn scrape(&self, params: &ScrapeParams) -> Result<String, HandlerError> {
        self.scrape_text(params).await.map_err(|e| {
            warn!(task = %params.task, target = %params.target, error = %e, "Scrape rejected");
            handler_error(e)
        })
    }

    fn metrics(&self) -> String {
        self.metrics_text()
    }

    async fn reload(&self) -> Result<(), HandlerError> {
        Exporter::reload(self).map_err(|e| {
            warn!(error = %e, "Reload failed, keeping current configuration");
            handler_error(e)
        })
    }
}

fn handler_error(err: ConfigError) -> HandlerError {
    match err {
        ConfigError::UnknownTask(_) | ConfigError::MissingRegion(_) => {
            HandlerError::BadRequest(err.to_string())
        }
        other => HandlerError::Internal(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use cwatch_adapters::{MemoryConnector, MemoryProvider};
    use cwatch_types::{MetricSpec, Statistic, Task, TaskIdentity};

    use crate::catalog::Catalog;
    use crate::template::StatisticLayout;

    fn exporter() -> Exporter {
        let catalog = Catalog::from_tasks(
            vec![Task::new(
                TaskIdentity::new("rds"),
                vec![MetricSpec::builder("AWS/RDS", "FreeStorageSpace")
                    .statistic(Statistic::Minimum)
                    .build()],
            )],
            StatisticLayout::PerStatistic,
            4,
        )
        .unwrap();
        Exporter::new(
            catalog,
            Arc::new(MemoryConnector::new(Arc::new(MemoryProvider::new()))),
        )
    }

    fn params(task: &str, region: Option<&str>) -> ScrapeParams {
        ScrapeParams {
            target: "db-1".to_string(),
            task: task.to_string(),
            region: region.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_request_errors_are_bad_requests() {
        let exporter = exporter();

        let err = ScrapeHandler::scrape(&exporter, &params("missing", None)).await.unwrap_err();
        assert!(matches!(err, HandlerError::BadRequest(_)));

        let err = ScrapeHandler::scrape(&exporter, &params("rds", None)).await.unwrap_err();
        assert!(matches!(err, HandlerError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_scrape_with_region() {
        let exporter = exporter();
        let text = ScrapeHandler::scrape(&exporter, &params("rds", Some("eu-west-1")))
            .await
            .unwrap();
        assert!(text.contains("cloudwatch_exporter_erroneous_requests 0"));
        assert!(ScrapeHandler::metrics(&exporter).contains("cloudwatch_requests_total 1"));
    }

    #[tokio::test]
    async fn test_reload_without_config_is_noop() {
        let exporter = exporter();
        assert!(ScrapeHandler::reload(&exporter).await.is_ok());
    }
}
