//! Declarative description of a metric to scrape.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::MATCH_ALL;

/// One of the standard statistics a provider can aggregate a metric into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Statistic {
    Sum,
    Average,
    Maximum,
    Minimum,
    SampleCount,
}

impl Statistic {
    /// All statistics, in the order datapoint fields are mapped.
    pub const ALL: [Statistic; 5] = [
        Statistic::Sum,
        Statistic::Average,
        Statistic::Maximum,
        Statistic::Minimum,
        Statistic::SampleCount,
    ];

    /// The provider's name for this statistic.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Statistic::Sum => "Sum",
            Statistic::Average => "Average",
            Statistic::Maximum => "Maximum",
            Statistic::Minimum => "Minimum",
            Statistic::SampleCount => "SampleCount",
        }
    }
}

impl fmt::Display for Statistic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown statistic name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseStatisticError(pub String);

impl fmt::Display for ParseStatisticError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown statistic '{}'", self.0)
    }
}

impl std::error::Error for ParseStatisticError {}

impl FromStr for Statistic {
    type Err = ParseStatisticError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Statistic::ALL
            .into_iter()
            .find(|stat| stat.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ParseStatisticError(s.to_string()))
    }
}

/// Query window parameters for a metric, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Window {
    /// How far back from the window end the query starts.
    pub range_seconds: u32,
    /// Aggregation period of each datapoint.
    pub period_seconds: u32,
    /// How far behind "now" the window ends.
    pub delay_seconds: u32,
}

impl Window {
    pub const DEFAULT_RANGE_SECONDS: u32 = 600;
    pub const DEFAULT_PERIOD_SECONDS: u32 = 60;
    pub const DEFAULT_DELAY_SECONDS: u32 = 600;

    pub fn range(&self) -> Duration {
        Duration::from_secs(u64::from(self.range_seconds))
    }

    pub fn delay(&self) -> Duration {
        Duration::from_secs(u64::from(self.delay_seconds))
    }
}

impl Default for Window {
    fn default() -> Self {
        Self {
            range_seconds: Self::DEFAULT_RANGE_SECONDS,
            period_seconds: Self::DEFAULT_PERIOD_SECONDS,
            delay_seconds: Self::DEFAULT_DELAY_SECONDS,
        }
    }
}

/// Declarative description of one metric: where it lives, which statistics
/// to fetch, and how to select the dimension combinations to query.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MetricSpec {
    /// Provider namespace (e.g., "AWS/EC2").
    pub namespace: String,

    /// Metric name within the namespace (e.g., "CPUUtilization").
    pub name: String,

    /// Standard statistics to request.
    pub statistics: Vec<Statistic>,

    /// Percentile statistics to request (e.g., "p99").
    #[cfg_attr(feature = "serde", serde(default))]
    pub extended_statistics: Vec<String>,

    /// Declared dimension names, in label order.
    #[cfg_attr(feature = "serde", serde(default))]
    pub dimensions: Vec<String>,

    /// Explicit values per dimension name.
    #[cfg_attr(feature = "serde", serde(default))]
    pub dimensions_select: BTreeMap<String, Vec<String>>,

    /// Regex filter per dimension name, applied to discovered values.
    #[cfg_attr(feature = "serde", serde(default))]
    pub dimensions_select_regex: BTreeMap<String, String>,

    /// Query window.
    #[cfg_attr(feature = "serde", serde(default))]
    pub window: Window,
}

impl MetricSpec {
    /// Create a builder for a metric in the given namespace.
    pub fn builder(namespace: impl Into<String>, name: impl Into<String>) -> MetricSpecBuilder {
        MetricSpecBuilder::new(namespace, name)
    }

    /// Whether the direct (no discovery) path produces a dimension set.
    ///
    /// True when at least one explicit selection carries a value, or when
    /// the metric declares no dimensions at all. Selections with an empty
    /// value list contribute nothing.
    pub fn has_direct_selection(&self) -> bool {
        self.dimensions_select.values().any(|v| !v.is_empty()) || self.dimensions.is_empty()
    }

    /// Regex selections with every unselected declared dimension defaulted
    /// to match-all.
    pub fn normalized_regexes(&self) -> BTreeMap<String, String> {
        let mut regexes = self.dimensions_select_regex.clone();
        for dimension in &self.dimensions {
            if !self.dimensions_select.contains_key(dimension) && !regexes.contains_key(dimension)
            {
                regexes.insert(dimension.clone(), MATCH_ALL.to_string());
            }
        }
        regexes
    }

    /// Whether resolving this metric requires a provider listing call.
    pub fn needs_discovery(&self) -> bool {
        !self.normalized_regexes().is_empty()
    }

    /// Names of explicitly selected dimensions: declared ones first in
    /// declared order, then any extra selections in name order.
    pub fn selected_dimensions(&self) -> Vec<&str> {
        let declared = self
            .dimensions
            .iter()
            .filter(|d| self.dimensions_select.contains_key(d.as_str()))
            .map(String::as_str);
        let extra = self
            .dimensions_select
            .keys()
            .filter(|k| !self.dimensions.contains(k))
            .map(String::as_str);
        declared.chain(extra).collect()
    }
}

/// Builder for `MetricSpec`.
#[derive(Debug)]
pub struct MetricSpecBuilder {
    spec: MetricSpec,
}

impl MetricSpecBuilder {
    /// Create a new builder.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            spec: MetricSpec {
                namespace: namespace.into(),
                name: name.into(),
                statistics: Vec::new(),
                extended_statistics: Vec::new(),
                dimensions: Vec::new(),
                dimensions_select: BTreeMap::new(),
                dimensions_select_regex: BTreeMap::new(),
                window: Window::default(),
            },
        }
    }

    /// Request a standard statistic.
    pub fn statistic(mut self, statistic: Statistic) -> Self {
        self.spec.statistics.push(statistic);
        self
    }

    /// Request a percentile statistic (e.g., "p99").
    pub fn extended_statistic(mut self, statistic: impl Into<String>) -> Self {
        self.spec.extended_statistics.push(statistic.into());
        self
    }

    /// Declare a dimension.
    pub fn dimension(mut self, name: impl Into<String>) -> Self {
        self.spec.dimensions.push(name.into());
        self
    }

    /// Select explicit values for a dimension.
    pub fn select<I, V>(mut self, name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        self.spec
            .dimensions_select
            .insert(name.into(), values.into_iter().map(Into::into).collect());
        self
    }

    /// Filter discovered values of a dimension with a regex.
    pub fn select_regex(mut self, name: impl Into<String>, pattern: impl Into<String>) -> Self {
        self.spec
            .dimensions_select_regex
            .insert(name.into(), pattern.into());
        self
    }

    /// Set the query window.
    pub fn window(mut self, window: Window) -> Self {
        self.spec.window = window;
        self
    }

    /// Build the metric spec.
    pub fn build(self) -> MetricSpec {
        self.spec
    }
}
