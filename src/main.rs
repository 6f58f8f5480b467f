use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use cwatch::{Catalog, Exporter, Settings};
use cwatch_adapters::ProviderConnector;
use cwatch_sdk::{MetricsServer, PrometheusConfig, ScrapeHandler};

#[derive(Parser, Debug)]
#[command(name = "cwatch")]
#[command(about = "CloudWatch to Prometheus exporter")]
struct Args {
    /// Path to the YAML settings file
    #[arg(short, long, default_value = "config.yml")]
    config: PathBuf,

    /// Address to listen on (host:port)
    #[arg(short, long, default_value = "0.0.0.0:9106")]
    listen: String,

    /// Path of the scrape trigger
    #[arg(long, default_value = "/scrape")]
    scrape_path: String,

    /// Path of the exporter's own metrics
    #[arg(long, default_value = "/metrics")]
    metrics_path: String,

    /// Upper bound on CloudWatch requests in flight, overriding the settings file
    #[arg(long)]
    max_concurrent_requests: Option<usize>,

    /// Log as JSON lines
    #[arg(long)]
    log_json: bool,

    /// Validate the settings file, print the compiled catalog and exit
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.log_json);

    if args.check {
        return check(&args);
    }

    let exporter = Exporter::load(&args.config, args.max_concurrent_requests, connector()?)
        .with_context(|| format!("Failed to load {}", args.config.display()))?;

    let catalog = exporter.catalog();
    info!(
        config = %args.config.display(),
        tasks = catalog.tasks().len(),
        max_concurrent_requests = catalog.max_concurrent_requests(),
        "Loaded configuration"
    );

    let config = PrometheusConfig::builder()
        .listen_addr(&args.listen)
        .scrape_path(&args.scrape_path)
        .metrics_path(&args.metrics_path)
        .build();
    let handler: Arc<dyn ScrapeHandler> = Arc::new(exporter);
    let server = MetricsServer::bind(config, handler)
        .await
        .with_context(|| format!("Failed to listen on {}", args.listen))?;
    let server = server.start();

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutting down");
    server.abort();

    Ok(())
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// Print the compiled catalog as JSON.
fn check(args: &Args) -> Result<()> {
    let mut settings = Settings::load(&args.config)
        .with_context(|| format!("Failed to load {}", args.config.display()))?;
    if let Some(max) = args.max_concurrent_requests {
        settings.max_concurrent_requests = max;
    }
    let catalog = Catalog::build(&settings).context("Invalid configuration")?;
    println!("{}", serde_json::to_string_pretty(&catalog.describe())?);
    Ok(())
}

#[cfg(feature = "cloudwatch")]
fn connector() -> Result<Arc<dyn ProviderConnector>> {
    Ok(Arc::new(cwatch_adapters::cloudwatch::CloudWatchConnector::new()))
}

#[cfg(not(feature = "cloudwatch"))]
fn connector() -> Result<Arc<dyn ProviderConnector>> {
    anyhow::bail!("cwatch was built without the `cloudwatch` feature; no provider is available")
}
