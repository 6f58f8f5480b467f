//! Long-lived exporter state: the current catalog, the provider connector
//! and the process-wide request counters.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use cwatch_adapters::ProviderConnector;
use cwatch_sdk::{exposition, RequestCounters, ScrapeParams};

use crate::catalog::{Catalog, CatalogHandle};
use crate::config::Settings;
use crate::error::ConfigError;
use crate::session::Session;

pub struct Exporter {
    config_path: Option<PathBuf>,
    max_concurrent_requests: Option<usize>,
    catalog: CatalogHandle,
    connector: Arc<dyn ProviderConnector>,
    counters: Arc<RequestCounters>,
}

impl Exporter {
    pub fn new(catalog: Catalog, connector: Arc<dyn ProviderConnector>) -> Self {
        Self {
            config_path: None,
            max_concurrent_requests: None,
            catalog: CatalogHandle::new(catalog),
            connector,
            counters: Arc::new(RequestCounters::new()),
        }
    }

    /// Load the catalog from a settings file, remembered for reloads.
    ///
    /// `max_concurrent_requests` overrides the file's value, now and on
    /// every reload.
    pub fn load(
        path: impl Into<PathBuf>,
        max_concurrent_requests: Option<usize>,
        connector: Arc<dyn ProviderConnector>,
    ) -> Result<Self, ConfigError> {
        let path = path.into();
        let catalog = load_catalog(&path, max_concurrent_requests)?;
        Ok(Self {
            config_path: Some(path),
            max_concurrent_requests,
            ..Self::new(catalog, connector)
        })
    }

    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    pub fn catalog(&self) -> Arc<Catalog> {
        self.catalog.snapshot()
    }

    pub fn counters(&self) -> &Arc<RequestCounters> {
        &self.counters
    }

    /// Prepare a scrape against the current catalog.
    pub fn session(&self, target: &str, task: &str, region: Option<&str>) -> Result<Session, ConfigError> {
        Session::new(
            &self.catalog.snapshot(),
            self.connector.clone(),
            self.counters.clone(),
            target,
            task,
            region,
        )
    }

    /// Run one scrape and render it with the scrape's own statistics and
    /// the process-wide request counter.
    pub async fn scrape_text(&self, params: &ScrapeParams) -> Result<String, ConfigError> {
        let session = self.session(&params.target, &params.task, params.region.as_deref())?;
        let stats = session.stats();
        let (samples, summary) = session.collect().await;

        info!(
            task = %params.task,
            target = %params.target,
            samples = samples.len(),
            erroneous_requests = summary.erroneous_requests,
            duration_ms = summary.duration.as_millis() as u64,
            "Scrape finished"
        );

        Ok(exposition::format_scrape(&samples, &stats, &self.counters))
    }

    /// Exposition text of the process-wide counters.
    pub fn metrics_text(&self) -> String {
        exposition::format_counters(&self.counters)
    }

    /// Rebuild the catalog from the settings file and swap it in.
    ///
    /// A failed reload keeps the current catalog.
    pub fn reload(&self) -> Result<(), ConfigError> {
        let Some(path) = &self.config_path else {
            warn!("Reload requested but no configuration file is set");
            return Ok(());
        };

        let catalog = load_catalog(path, self.max_concurrent_requests)?;
        info!(
            path = %path.display(),
            tasks = catalog.tasks().len(),
            "Configuration reloaded"
        );
        self.catalog.replace(catalog);
        Ok(())
    }
}

fn load_catalog(path: &Path, max_concurrent_requests: Option<usize>) -> Result<Catalog, ConfigError> {
    let mut settings = Settings::load(path)?;
    if let Some(max) = max_concurrent_requests {
        settings.max_concurrent_requests = max;
    }
    Catalog::build(&settings)
}
