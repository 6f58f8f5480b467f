//! HTTP surface for Prometheus.
//!
//! Serves three routes on top of a [`ScrapeHandler`]:
//!
//! - `GET <scrape_path>?target=..&task=..[&region=..]` runs one scrape
//! - `GET <metrics_path>` renders the exporter's process-wide counters
//! - `POST <reload_path>` reloads the configuration
//!
//! plus `/health` and `/healthz`.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use cwatch_sdk::prometheus::{MetricsServer, PrometheusConfig, ScrapeHandler};
//!
//! # async fn run(handler: Arc<dyn ScrapeHandler>) -> Result<(), Box<dyn std::error::Error>> {
//! let config = PrometheusConfig::builder()
//!     .listen_addr("0.0.0.0:9106")
//!     .build();
//!
//! let server = MetricsServer::bind(config, handler).await?;
//! server.start();
//! # Ok(())
//! # }
//! ```

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};
use url::form_urlencoded;

use crate::exposition;

/// Configuration for the HTTP surface.
#[derive(Debug, Clone)]
pub struct PrometheusConfig {
    /// Address to listen on (e.g., "0.0.0.0:9106")
    pub listen_addr: String,
    /// Path of the scrape trigger (e.g., "/scrape")
    pub scrape_path: String,
    /// Path for the exporter's own metrics (e.g., "/metrics")
    pub metrics_path: String,
    /// Path of the reload trigger (e.g., "/-/reload")
    pub reload_path: String,
}

const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:9106";
const DEFAULT_SCRAPE_PATH: &str = "/scrape";
const DEFAULT_METRICS_PATH: &str = "/metrics";
const DEFAULT_RELOAD_PATH: &str = "/-/reload";

impl Default for PrometheusConfig {
    fn default() -> Self {
        PrometheusConfigBuilder::default().build()
    }
}

impl PrometheusConfig {
    /// Create a new builder for PrometheusConfig.
    pub fn builder() -> PrometheusConfigBuilder {
        PrometheusConfigBuilder::default()
    }
}

/// Builder for PrometheusConfig.
#[derive(Debug, Default)]
pub struct PrometheusConfigBuilder {
    listen_addr: Option<String>,
    scrape_path: Option<String>,
    metrics_path: Option<String>,
    reload_path: Option<String>,
}

impl PrometheusConfigBuilder {
    /// Set the listen address.
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.listen_addr = Some(addr.into());
        self
    }

    /// Set the scrape trigger path.
    pub fn scrape_path(mut self, path: impl Into<String>) -> Self {
        self.scrape_path = Some(path.into());
        self
    }

    /// Set the metrics path.
    pub fn metrics_path(mut self, path: impl Into<String>) -> Self {
        self.metrics_path = Some(path.into());
        self
    }

    /// Set the reload trigger path.
    pub fn reload_path(mut self, path: impl Into<String>) -> Self {
        self.reload_path = Some(path.into());
        self
    }

    /// Build the PrometheusConfig.
    pub fn build(self) -> PrometheusConfig {
        PrometheusConfig {
            listen_addr: self
                .listen_addr
                .unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string()),
            scrape_path: self
                .scrape_path
                .unwrap_or_else(|| DEFAULT_SCRAPE_PATH.to_string()),
            metrics_path: self
                .metrics_path
                .unwrap_or_else(|| DEFAULT_METRICS_PATH.to_string()),
            reload_path: self
                .reload_path
                .unwrap_or_else(|| DEFAULT_RELOAD_PATH.to_string()),
        }
    }
}

/// Query parameters of a scrape request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapeParams {
    /// Value substituted for `$_target` selections.
    pub target: String,
    /// Name of the configured task to run.
    pub task: String,
    /// Region override for tasks without a configured region.
    pub region: Option<String>,
}

impl ScrapeParams {
    /// Parse `target`, `task` and optional `region` from a query string.
    pub fn from_query(query: Option<&str>) -> Result<Self, HandlerError> {
        let mut target = None;
        let mut task = None;
        let mut region = None;

        for (key, value) in form_urlencoded::parse(query.unwrap_or_default().as_bytes()) {
            match key.as_ref() {
                "target" => target = Some(value.into_owned()),
                "task" => task = Some(value.into_owned()),
                "region" if !value.is_empty() => region = Some(value.into_owned()),
                _ => {}
            }
        }

        Ok(Self {
            target: target
                .ok_or_else(|| HandlerError::BadRequest("missing 'target' parameter".into()))?,
            task: task
                .filter(|t| !t.is_empty())
                .ok_or_else(|| HandlerError::BadRequest("missing 'task' parameter".into()))?,
            region,
        })
    }
}

/// Errors a [`ScrapeHandler`] reports back to the HTTP client.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The request cannot be served as asked (unknown task, missing region).
    #[error("{0}")]
    BadRequest(String),

    /// The handler failed.
    #[error("{0}")]
    Internal(String),
}

impl HandlerError {
    fn status(&self) -> StatusCode {
        match self {
            HandlerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            HandlerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// What the server calls for each route.
#[async_trait]
pub trait ScrapeHandler: Send + Sync + 'static {
    /// Run one scrape and return its exposition text.
    async fn scrape(&self, params: &ScrapeParams) -> Result<String, HandlerError>;

    /// Exposition text of the exporter's own metrics.
    fn metrics(&self) -> String;

    /// Reload the configuration.
    async fn reload(&self) -> Result<(), HandlerError>;
}

/// Errors starting the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid listen address: {0}")]
    Addr(#[from] std::net::AddrParseError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// HTTP server bound to its listen address.
pub struct MetricsServer {
    listener: TcpListener,
    routes: Arc<Routes>,
}

struct Routes {
    config: PrometheusConfig,
    handler: Arc<dyn ScrapeHandler>,
}

impl MetricsServer {
    /// Bind the listen address. Use port 0 to pick a free port.
    pub async fn bind(
        config: PrometheusConfig,
        handler: Arc<dyn ScrapeHandler>,
    ) -> Result<Self, ServerError> {
        let addr: SocketAddr = config.listen_addr.parse()?;
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            routes: Arc::new(Routes { config, handler }),
        })
    }

    /// Address the server is listening on.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve in a background task until the runtime shuts down.
    ///
    /// Returns a `JoinHandle` that can be used to await the server or abort it.
    pub fn start(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            if let Err(e) = self.serve().await {
                error!(error = %e, "HTTP server error");
            }
        })
    }

    /// Accept connections until an I/O error occurs.
    pub async fn serve(self) -> Result<(), ServerError> {
        if let Ok(addr) = self.listener.local_addr() {
            info!(%addr, scrape_path = %self.routes.config.scrape_path, "Listening");
        }

        loop {
            let (stream, peer) = self.listener.accept().await?;
            let io = TokioIo::new(stream);
            let routes = self.routes.clone();

            tokio::spawn(async move {
                let service = service_fn(move |req: Request<hyper::body::Incoming>| {
                    let routes = routes.clone();
                    async move { handle_request(req, &routes).await }
                });

                if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                    debug!(%peer, error = %e, "HTTP connection error");
                }
            });
        }
    }
}

async fn handle_request(
    req: Request<hyper::body::Incoming>,
    routes: &Routes,
) -> Result<Response<Full<Bytes>>, Infallible> {
    Ok(route(req.method(), req.uri().path(), req.uri().query(), routes).await)
}

async fn route(method: &Method, path: &str, query: Option<&str>, routes: &Routes) -> Response<Full<Bytes>> {
    let config = &routes.config;

    if path == config.scrape_path {
        if method != Method::GET {
            return text(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed");
        }
        let result = match ScrapeParams::from_query(query) {
            Ok(params) => routes.handler.scrape(&params).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(body) => response(StatusCode::OK, exposition::CONTENT_TYPE, body),
            Err(e) => {
                warn!(error = %e, "Scrape request failed");
                text(e.status(), e.to_string())
            }
        }
    } else if path == config.metrics_path {
        response(StatusCode::OK, exposition::CONTENT_TYPE, routes.handler.metrics())
    } else if path == config.reload_path {
        if method != Method::POST && method != Method::PUT {
            return text(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed");
        }
        match routes.handler.reload().await {
            Ok(()) => text(StatusCode::OK, "OK"),
            Err(e) => {
                warn!(error = %e, "Reload failed");
                text(e.status(), e.to_string())
            }
        }
    } else if path == "/health" || path == "/healthz" {
        text(StatusCode::OK, "OK")
    } else {
        text(StatusCode::NOT_FOUND, "Not Found")
    }
}

fn text(status: StatusCode, body: impl Into<String>) -> Response<Full<Bytes>> {
    response(status, "text/plain", body.into())
}

fn response(status: StatusCode, content_type: &'static str, body: String) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;
    use parking_lot::Mutex;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    #[derive(Default)]
    struct FakeHandler {
        scrapes: Mutex<Vec<ScrapeParams>>,
        reloads: Mutex<u32>,
    }

    #[async_trait]
    impl ScrapeHandler for FakeHandler {
        async fn scrape(&self, params: &ScrapeParams) -> Result<String, HandlerError> {
            if params.task == "unknown" {
                return Err(HandlerError::BadRequest("unknown task 'unknown'".into()));
            }
            self.scrapes.lock().push(params.clone());
            Ok(format!("scraped {}\n", params.target))
        }

        fn metrics(&self) -> String {
            "cloudwatch_requests_total 3\n".to_string()
        }

        async fn reload(&self) -> Result<(), HandlerError> {
            *self.reloads.lock() += 1;
            Ok(())
        }
    }

    fn routes(handler: Arc<FakeHandler>) -> Routes {
        Routes {
            config: PrometheusConfig::default(),
            handler,
        }
    }

    async fn body(response: Response<Full<Bytes>>) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn test_prometheus_config_defaults() {
        let config = PrometheusConfig::default();

        assert_eq!(config.listen_addr, "0.0.0.0:9106");
        assert_eq!(config.scrape_path, "/scrape");
        assert_eq!(config.metrics_path, "/metrics");
        assert_eq!(config.reload_path, "/-/reload");
    }

    #[test]
    fn test_prometheus_config_builder() {
        let config = PrometheusConfig::builder()
            .listen_addr("127.0.0.1:8080")
            .scrape_path("/collect")
            .metrics_path("/custom-metrics")
            .build();

        assert_eq!(config.listen_addr, "127.0.0.1:8080");
        assert_eq!(config.scrape_path, "/collect");
        assert_eq!(config.metrics_path, "/custom-metrics");
        assert_eq!(config.reload_path, "/-/reload");
    }

    #[test]
    fn test_scrape_params_decoding() {
        let params =
            ScrapeParams::from_query(Some("target=my%20db&task=rds&region=eu-west-1")).unwrap();
        assert_eq!(params.target, "my db");
        assert_eq!(params.task, "rds");
        assert_eq!(params.region.as_deref(), Some("eu-west-1"));

        let params = ScrapeParams::from_query(Some("target=&task=billing&region=")).unwrap();
        assert_eq!(params.target, "");
        assert_eq!(params.region, None);
    }

    #[test]
    fn test_scrape_params_require_task() {
        assert!(matches!(
            ScrapeParams::from_query(Some("target=x")),
            Err(HandlerError::BadRequest(_))
        ));
        assert!(ScrapeParams::from_query(None).is_err());
    }

    #[tokio::test]
    async fn test_scrape_route() {
        let handler = Arc::new(FakeHandler::default());
        let routes = routes(handler.clone());

        let response = route(&Method::GET, "/scrape", Some("target=i-1&task=ec2"), &routes).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            exposition::CONTENT_TYPE
        );
        assert_eq!(body(response).await, "scraped i-1\n");
        assert_eq!(handler.scrapes.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_scrape_route_bad_request() {
        let routes = routes(Arc::new(FakeHandler::default()));

        let response = route(&Method::GET, "/scrape", Some("target=i-1&task=unknown"), &routes).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body(response).await.contains("unknown task"));

        let response = route(&Method::GET, "/scrape", None, &routes).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_reload_requires_post() {
        let handler = Arc::new(FakeHandler::default());
        let routes = routes(handler.clone());

        let response = route(&Method::GET, "/-/reload", None, &routes).await;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);

        let response = route(&Method::POST, "/-/reload", None, &routes).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(*handler.reloads.lock(), 1);
    }

    #[tokio::test]
    async fn test_metrics_health_and_not_found() {
        let routes = routes(Arc::new(FakeHandler::default()));

        let response = route(&Method::GET, "/metrics", None, &routes).await;
        assert_eq!(body(response).await, "cloudwatch_requests_total 3\n");

        let response = route(&Method::GET, "/healthz", None, &routes).await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = route(&Method::GET, "/nope", None, &routes).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_server_serves_over_tcp() {
        let config = PrometheusConfig::builder()
            .listen_addr("127.0.0.1:0")
            .build();
        let server = MetricsServer::bind(config, Arc::new(FakeHandler::default()))
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();
        let handle = server.start();

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /health HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();

        assert!(response.starts_with("HTTP/1.1 200 OK"));
        assert!(response.ends_with("OK"));
        handle.abort();
    }
}
