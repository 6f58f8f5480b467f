//! Lock-free counters shared across scrapes.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Process-wide provider request counter.
///
/// Every provider call (listing pages and statistics queries) increments
/// this once, whether or not it succeeds. Lives for the whole process and
/// is shared by all sessions.
#[derive(Debug, Default)]
pub struct RequestCounters {
    total: AtomicU64,
}

impl RequestCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one provider request.
    pub fn record_request(&self) {
        self.total.fetch_add(1, Ordering::Relaxed);
    }

    /// Total requests recorded since startup.
    pub fn total_requests(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }
}

/// Per-scrape statistics.
///
/// Written concurrently by every unit of one scrape, read once the scrape
/// has finished.
#[derive(Debug, Default)]
pub struct ScrapeStats {
    erroneous: AtomicU64,
    units: AtomicU64,
    duration_micros: AtomicU64,
}

impl ScrapeStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failed provider request.
    pub fn record_error(&self) {
        self.erroneous.fetch_add(1, Ordering::Relaxed);
    }

    pub fn erroneous_requests(&self) -> u64 {
        self.erroneous.load(Ordering::Relaxed)
    }

    /// Record a completed scrape unit.
    pub fn record_unit(&self) {
        self.units.fetch_add(1, Ordering::Relaxed);
    }

    pub fn completed_units(&self) -> u64 {
        self.units.load(Ordering::Relaxed)
    }

    /// Set the wall-clock duration of the scrape.
    pub fn set_duration(&self, duration: Duration) {
        let micros = u64::try_from(duration.as_micros()).unwrap_or(u64::MAX);
        self.duration_micros.store(micros, Ordering::Relaxed);
    }

    pub fn duration(&self) -> Duration {
        Duration::from_micros(self.duration_micros.load(Ordering::Relaxed))
    }
}
