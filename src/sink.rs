//! Destinations for scraped samples.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc::UnboundedSender;

use cwatch_types::Sample;

/// Receives samples as scrape units produce them.
///
/// Called concurrently from every unit of a scrape; implementations must
/// not block.
pub trait SampleSink: Send + Sync {
    fn emit(&self, sample: Sample);
}

impl SampleSink for UnboundedSender<Sample> {
    fn emit(&self, sample: Sample) {
        // Receiver gone means nobody wants the rest of this scrape.
        let _ = self.send(sample);
    }
}

/// Collects samples in memory.
#[derive(Debug, Clone, Default)]
pub struct SampleBuffer {
    samples: Arc<Mutex<Vec<Sample>>>,
}

impl SampleBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.samples.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.lock().is_empty()
    }

    /// Take every sample collected so far.
    pub fn take(&self) -> Vec<Sample> {
        std::mem::take(&mut *self.samples.lock())
    }
}

impl SampleSink for SampleBuffer {
    fn emit(&self, sample: Sample) {
        self.samples.lock().push(sample);
    }
}
