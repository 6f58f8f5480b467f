//! The scrape engine.
//!
//! A scrape runs in three steps per metric: resolve the dimension sets to
//! query ([`resolve`]), fetch the latest datapoint for each one ([`fetch`]),
//! and map it onto samples ([`mapper`]). The [`orchestrator`] fans those
//! steps out over tasks and dimension sets.
//!
//! Every provider call goes through [`ScrapeContext::call`], which bounds
//! calls in flight, counts requests and failures, and stops waiting once the
//! scrape is cancelled.

pub mod fetch;
pub mod mapper;
pub mod orchestrator;
pub mod resolve;

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use cwatch_adapters::AdapterError;
use cwatch_sdk::{RequestCounters, ScrapeStats};

pub use fetch::{latest_datapoint, query_window, StatisticFetcher};
pub use mapper::ResultMapper;
pub use orchestrator::{ScrapeOrchestrator, ScrapeSummary, ScrapeUnit};
pub use resolve::{DimensionResolver, Resolution, MAX_PAGE_FAILURES};

/// State shared by every unit of one scrape.
#[derive(Debug, Clone)]
pub struct ScrapeContext {
    target: String,
    counters: Arc<RequestCounters>,
    stats: Arc<ScrapeStats>,
    limiter: Arc<Semaphore>,
    cancel: CancellationToken,
}

impl ScrapeContext {
    pub fn new(
        target: impl Into<String>,
        counters: Arc<RequestCounters>,
        limiter: Arc<Semaphore>,
    ) -> Self {
        Self {
            target: target.into(),
            counters,
            stats: Arc::new(ScrapeStats::new()),
            limiter,
            cancel: CancellationToken::new(),
        }
    }

    /// Value substituted for `$_target` in selections.
    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn counters(&self) -> &Arc<RequestCounters> {
        &self.counters
    }

    pub fn stats(&self) -> &Arc<ScrapeStats> {
        &self.stats
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Run one provider call under the request limiter.
    ///
    /// The call is counted once it holds a permit. Failures other than
    /// cancellation are recorded as erroneous requests. Once the scrape is
    /// cancelled, waiting for a permit or a response ends with
    /// [`AdapterError::Cancelled`].
    pub(crate) async fn call<T, F>(&self, request: F) -> Result<T, AdapterError>
    where
        F: Future<Output = Result<T, AdapterError>>,
    {
        let _permit = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(AdapterError::Cancelled),
            permit = self.limiter.acquire() => permit.map_err(|_| AdapterError::Cancelled)?,
        };

        self.counters.record_request();

        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(AdapterError::Cancelled),
            result = request => result,
        };

        if let Err(e) = &result {
            if !e.is_cancelled() {
                self.stats.record_error();
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn context(permits: usize) -> ScrapeContext {
        ScrapeContext::new(
            "",
            Arc::new(RequestCounters::new()),
            Arc::new(Semaphore::new(permits)),
        )
    }

    #[tokio::test]
    async fn test_call_counts_requests_and_errors() {
        let ctx = context(2);

        let ok: Result<u32, AdapterError> = ctx.call(async { Ok(1) }).await;
        assert_eq!(ok.unwrap(), 1);

        let err: Result<u32, AdapterError> = ctx
            .call(async {
                Err(AdapterError::Throttled {
                    operation: "GetMetricStatistics",
                    message: "slow down".to_string(),
                })
            })
            .await;
        assert!(err.unwrap_err().is_throttled());

        assert_eq!(ctx.counters().total_requests(), 2);
        assert_eq!(ctx.stats().erroneous_requests(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_call_is_not_an_error() {
        let ctx = context(1);
        ctx.cancellation_token().cancel();

        let result: Result<(), AdapterError> = ctx.call(async { Ok(()) }).await;
        assert!(result.unwrap_err().is_cancelled());
        assert_eq!(ctx.counters().total_requests(), 0);
        assert_eq!(ctx.stats().erroneous_requests(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_slow_call() {
        let ctx = context(1);
        let token = ctx.cancellation_token().clone();

        let slow = ctx.call(async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok::<_, AdapterError>(())
        });
        let cancel = async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            token.cancel();
        };

        let (result, _) = tokio::join!(slow, cancel);
        assert!(result.unwrap_err().is_cancelled());
        assert_eq!(ctx.counters().total_requests(), 1);
    }

    #[tokio::test]
    async fn test_permit_released_after_call() {
        let ctx = context(1);
        for _ in 0..3 {
            let _: Result<(), AdapterError> = ctx.call(async { Ok(()) }).await;
        }
        assert_eq!(ctx.counters().total_requests(), 3);
    }
}
