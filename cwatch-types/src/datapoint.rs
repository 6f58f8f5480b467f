//! Provider-returned aggregate records.

use std::collections::BTreeMap;

use crate::Statistic;

/// One time-stamped aggregate returned by a statistics query.
///
/// Only the statistics that were requested are populated.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Datapoint {
    /// Unix timestamp in milliseconds of the start of the period.
    pub timestamp_ms: i64,

    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub sum: Option<f64>,

    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub average: Option<f64>,

    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub maximum: Option<f64>,

    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub minimum: Option<f64>,

    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub sample_count: Option<f64>,

    /// Unit reported by the provider (e.g., "Percent").
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub unit: Option<String>,

    /// Percentile values keyed by statistic name (e.g., "p99").
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "BTreeMap::is_empty"))]
    pub extended: BTreeMap<String, f64>,
}

impl Datapoint {
    /// Create an empty datapoint at the given timestamp.
    pub fn new(timestamp_ms: i64) -> Self {
        Self {
            timestamp_ms,
            ..Default::default()
        }
    }

    /// Set the value of a standard statistic.
    pub fn with(mut self, statistic: Statistic, value: f64) -> Self {
        *self.slot(statistic) = Some(value);
        self
    }

    /// Set the value of a percentile statistic.
    pub fn with_extended(mut self, statistic: impl Into<String>, value: f64) -> Self {
        self.extended.insert(statistic.into(), value);
        self
    }

    /// Value of a standard statistic, if present.
    pub fn value(&self, statistic: Statistic) -> Option<f64> {
        match statistic {
            Statistic::Sum => self.sum,
            Statistic::Average => self.average,
            Statistic::Maximum => self.maximum,
            Statistic::Minimum => self.minimum,
            Statistic::SampleCount => self.sample_count,
        }
    }

    /// Value of a percentile statistic, if present.
    pub fn extended_value(&self, statistic: &str) -> Option<f64> {
        self.extended.get(statistic).copied()
    }

    /// True when no statistic carries a value.
    pub fn is_empty(&self) -> bool {
        Statistic::ALL.iter().all(|s| self.value(*s).is_none()) && self.extended.is_empty()
    }

    fn slot(&mut self, statistic: Statistic) -> &mut Option<f64> {
        match statistic {
            Statistic::Sum => &mut self.sum,
            Statistic::Average => &mut self.average,
            Statistic::Maximum => &mut self.maximum,
            Statistic::Minimum => &mut self.minimum,
            Statistic::SampleCount => &mut self.sample_count,
        }
    }
}
