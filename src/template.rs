//! Scrape templates compiled once from configuration.
//!
//! A [`CompiledMetric`] pairs a [`MetricSpec`] with everything a scrape
//! needs that does not depend on the scrape itself: the sanitized metric
//! identifiers, the label schema and the per-dimension matchers used to
//! filter discovered combinations.

use std::collections::BTreeMap;
use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};

use cwatch_types::{MetricSpec, Statistic};

use crate::error::ConfigError;

/// Labels appended after the dimension labels, in order.
pub const TASK_LABEL: &str = "task";
pub const REGION_LABEL: &str = "region";
pub const ACCOUNT_LABEL: &str = "account";
/// Extra label carrying the statistic name in [`StatisticLayout::Label`].
pub const STATISTIC_LABEL: &str = "statistic";

/// Matches nothing; used for an explicit selection with no values.
const MATCH_NOTHING: &str = r"\b\B";

/// How statistics map onto published metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatisticLayout {
    /// One metric per statistic, the statistic name suffixed to the identifier.
    #[default]
    PerStatistic,
    /// One metric per spec, the statistic carried in a `statistic` label.
    Label,
}

/// A statistic a metric publishes: standard or percentile.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StatisticKind {
    Standard(Statistic),
    Extended(String),
}

impl StatisticKind {
    /// Provider name of the statistic (e.g., "Average", "p99").
    pub fn name(&self) -> &str {
        match self {
            StatisticKind::Standard(s) => s.as_str(),
            StatisticKind::Extended(name) => name,
        }
    }
}

impl fmt::Display for StatisticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Identity of one published metric family.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricTemplate {
    /// Sanitized metric identifier.
    pub name: String,
    pub help: String,
    /// Sanitized dimension labels, then `task`, `region`, `account` and, in
    /// the label layout, `statistic`. Dimension labels never reuse one of the
    /// fixed names.
    pub label_names: Vec<String>,
    /// The statistic this template publishes; `None` in the label layout,
    /// where one template serves every statistic.
    #[serde(serialize_with = "serialize_kind")]
    pub statistic: Option<StatisticKind>,
}

fn serialize_kind<S: serde::Serializer>(
    kind: &Option<StatisticKind>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match kind {
        Some(kind) => serializer.serialize_some(kind.name()),
        None => serializer.serialize_none(),
    }
}

/// A metric spec with its templates and precompiled matchers.
#[derive(Debug)]
pub struct CompiledMetric {
    spec: MetricSpec,
    layout: StatisticLayout,
    kinds: Vec<StatisticKind>,
    templates: Vec<MetricTemplate>,
    matchers: BTreeMap<String, Regex>,
}

impl CompiledMetric {
    pub fn spec(&self) -> &MetricSpec {
        &self.spec
    }

    pub fn layout(&self) -> StatisticLayout {
        self.layout
    }

    /// Statistics this metric requests and publishes, standard ones first.
    pub fn statistic_kinds(&self) -> &[StatisticKind] {
        &self.kinds
    }

    pub fn templates(&self) -> &[MetricTemplate] {
        &self.templates
    }

    /// Template publishing `kind`, if the statistic was requested.
    pub fn template_for(&self, kind: &StatisticKind) -> Option<&MetricTemplate> {
        if !self.kinds.contains(kind) {
            return None;
        }
        match self.layout {
            StatisticLayout::Label => self.templates.first(),
            StatisticLayout::PerStatistic => self
                .templates
                .iter()
                .find(|t| t.statistic.as_ref() == Some(kind)),
        }
    }

    /// Matcher for discovered values of `dimension`.
    pub fn matcher(&self, dimension: &str) -> Option<&Regex> {
        self.matchers.get(dimension)
    }
}

/// Compiles metric specs into [`CompiledMetric`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricTemplateBuilder {
    layout: StatisticLayout,
}

impl MetricTemplateBuilder {
    pub fn new(layout: StatisticLayout) -> Self {
        Self { layout }
    }

    /// Compile one spec. Fails only when a dimension regex is invalid.
    pub fn compile(&self, spec: MetricSpec) -> Result<CompiledMetric, ConfigError> {
        let mut kinds: Vec<StatisticKind> = Vec::new();
        for kind in spec
            .statistics
            .iter()
            .copied()
            .map(StatisticKind::Standard)
            .chain(spec.extended_statistics.iter().cloned().map(StatisticKind::Extended))
        {
            if !kinds.contains(&kind) {
                kinds.push(kind);
            }
        }

        let mut label_names = dimension_labels(&spec.dimensions);
        label_names.extend([TASK_LABEL, REGION_LABEL, ACCOUNT_LABEL].map(String::from));

        let base = format!("{}_{}", to_snake_case(&spec.namespace), to_snake_case(&spec.name));
        let templates = match self.layout {
            StatisticLayout::PerStatistic => kinds
                .iter()
                .map(|kind| MetricTemplate {
                    name: sanitize_name(&format!("{}_{}", base, to_snake_case(kind.name()))),
                    help: spec.name.clone(),
                    label_names: label_names.clone(),
                    statistic: Some(kind.clone()),
                })
                .collect(),
            StatisticLayout::Label => {
                let mut label_names = label_names;
                label_names.push(STATISTIC_LABEL.to_string());
                vec![MetricTemplate {
                    name: sanitize_name(&base),
                    help: spec.name.clone(),
                    label_names,
                    statistic: None,
                }]
            }
        };

        let matchers = compile_matchers(&spec)?;

        Ok(CompiledMetric {
            spec,
            layout: self.layout,
            kinds,
            templates,
            matchers,
        })
    }
}

/// Regex per dimension: explicit or defaulted patterns, and a
/// word-boundary alternation of the literal values for dimensions that only
/// have an explicit selection.
fn compile_matchers(spec: &MetricSpec) -> Result<BTreeMap<String, Regex>, ConfigError> {
    let mut matchers = BTreeMap::new();

    for (dimension, pattern) in spec.normalized_regexes() {
        let regex = Regex::new(&pattern).map_err(|source| ConfigError::InvalidRegex {
            metric: spec.name.clone(),
            dimension: dimension.clone(),
            pattern: pattern.clone(),
            source,
        })?;
        matchers.insert(dimension, regex);
    }

    for (dimension, values) in &spec.dimensions_select {
        if matchers.contains_key(dimension) {
            continue;
        }
        let pattern = literal_pattern(values);
        let regex = Regex::new(&pattern).map_err(|source| ConfigError::InvalidRegex {
            metric: spec.name.clone(),
            dimension: dimension.clone(),
            pattern: pattern.clone(),
            source,
        })?;
        matchers.insert(dimension.clone(), regex);
    }

    Ok(matchers)
}

fn literal_pattern(values: &[String]) -> String {
    if values.is_empty() {
        return MATCH_NOTHING.to_string();
    }
    let alternation = values
        .iter()
        .map(|v| regex::escape(v))
        .collect::<Vec<_>>()
        .join("|");
    format!(r"\b(?:{})\b", alternation)
}

/// Label names for `dimensions`, in order.
///
/// Each name is snake-cased and sanitized. A name that clashes with one of
/// the fixed labels or with an earlier dimension is prefixed with
/// `dimension_`, then suffixed with a counter until it is unique.
fn dimension_labels(dimensions: &[String]) -> Vec<String> {
    const RESERVED: [&str; 4] = [TASK_LABEL, REGION_LABEL, ACCOUNT_LABEL, STATISTIC_LABEL];

    let mut labels: Vec<String> = Vec::with_capacity(dimensions.len());
    for dimension in dimensions {
        let taken = |name: &str| RESERVED.iter().any(|r| *r == name) || labels.iter().any(|l| l == name);

        let mut label = sanitize_name(&to_snake_case(dimension));
        if taken(&label) {
            let prefixed = format!("dimension_{}", label.trim_start_matches('_'));
            label = prefixed.clone();
            let mut n = 2;
            while taken(&label) {
                label = format!("{}_{}", prefixed, n);
                n += 1;
            }
        }
        labels.push(label);
    }
    labels
}

/// Convert a provider name to snake case.
///
/// Separators (`-`, `.`, `/`, space) become `_`, and an `_` is inserted at
/// camel-case boundaries: `CPUUtilization` becomes `cpu_utilization`.
pub fn to_snake_case(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len() + 4);

    for (i, &c) in chars.iter().enumerate() {
        if matches!(c, '-' | '.' | '/' | ' ' | '_') {
            if !out.ends_with('_') {
                out.push('_');
            }
            continue;
        }
        if c.is_uppercase() && i > 0 && !out.is_empty() && !out.ends_with('_') {
            let prev_lower = chars[i - 1].is_lowercase() || chars[i - 1].is_ascii_digit();
            let next_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            if prev_lower || (next_lower && chars[i - 1].is_uppercase()) {
                out.push('_');
            }
        }
        out.extend(c.to_lowercase());
    }

    out
}

/// Restrict a metric identifier to `[A-Za-z0-9_]`, never starting with a
/// digit.
pub fn sanitize_name(name: &str) -> String {
    let mut out: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if out.is_empty() || out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use cwatch_types::TARGET_TOKEN;

    #[test]
    fn test_to_snake_case() {
        assert_eq!(to_snake_case("CPUUtilization"), "cpu_utilization");
        assert_eq!(to_snake_case("AWS/EC2"), "aws_ec2");
        assert_eq!(to_snake_case("My-Metric.Name"), "my_metric_name");
        assert_eq!(to_snake_case("InstanceId"), "instance_id");
        assert_eq!(to_snake_case("LoadBalancerName"), "load_balancer_name");
        assert_eq!(to_snake_case("Average"), "average");
        assert_eq!(to_snake_case("p99"), "p99");
        assert_eq!(to_snake_case("Free Storage  Space"), "free_storage_space");
    }

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("aws_ec2_cpu"), "aws_ec2_cpu");
        assert_eq!(sanitize_name("aws:ec2-cpu"), "aws_ec2_cpu");
        assert_eq!(sanitize_name("4xx_errors"), "_4xx_errors");
        assert_eq!(sanitize_name(""), "_");
    }

    #[test]
    fn test_per_statistic_templates() {
        let spec = MetricSpec::builder("AWS/EC2", "My-Metric.Name")
            .statistic(Statistic::Average)
            .statistic(Statistic::Maximum)
            .extended_statistic("p99")
            .dimension("InstanceId")
            .build();

        let metric = MetricTemplateBuilder::default().compile(spec).unwrap();
        let names: Vec<&str> = metric.templates().iter().map(|t| t.name.as_str()).collect();

        assert_eq!(
            names,
            vec![
                "aws_ec2_my_metric_name_average",
                "aws_ec2_my_metric_name_maximum",
                "aws_ec2_my_metric_name_p99",
            ]
        );
        assert_eq!(
            metric.templates()[0].label_names,
            vec!["instance_id", "task", "region", "account"]
        );
        assert_eq!(metric.templates()[0].help, "My-Metric.Name");
    }

    #[test]
    fn test_dimension_labels_avoid_fixed_labels() {
        let spec = MetricSpec::builder("AWS/Route53", "HealthCheckStatus")
            .statistic(Statistic::Minimum)
            .dimension("HealthCheckId")
            .dimension("Region")
            .build();

        let metric = MetricTemplateBuilder::new(StatisticLayout::Label)
            .compile(spec)
            .unwrap();

        assert_eq!(
            metric.templates()[0].label_names,
            vec!["health_check_id", "dimension_region", "task", "region", "account", "statistic"]
        );
    }

    #[test]
    fn test_dimension_labels_are_sanitized_and_unique() {
        let spec = MetricSpec::builder("Custom/App", "Hits")
            .statistic(Statistic::Sum)
            .dimension("Host:Port")
            .dimension("9Lives")
            .dimension("Instance-Id")
            .dimension("InstanceId")
            .dimension("Statistic")
            .build();

        let metric = MetricTemplateBuilder::default().compile(spec).unwrap();
        let labels = &metric.templates()[0].label_names;

        assert_eq!(
            labels,
            &vec![
                "host_port",
                "_9_lives",
                "instance_id",
                "dimension_instance_id",
                "dimension_statistic",
                "task",
                "region",
                "account",
            ]
        );
    }

    #[test]
    fn test_label_layout_single_template() {
        let spec = MetricSpec::builder("AWS/SQS", "NumberOfMessagesSent")
            .statistic(Statistic::Sum)
            .statistic(Statistic::Average)
            .dimension("QueueName")
            .build();

        let metric = MetricTemplateBuilder::new(StatisticLayout::Label)
            .compile(spec)
            .unwrap();

        assert_eq!(metric.templates().len(), 1);
        let template = &metric.templates()[0];
        assert_eq!(template.name, "aws_sqs_number_of_messages_sent");
        assert_eq!(template.label_names.last().map(String::as_str), Some("statistic"));
        assert_eq!(
            metric.template_for(&StatisticKind::Standard(Statistic::Sum)),
            Some(template)
        );
        assert_eq!(metric.template_for(&StatisticKind::Standard(Statistic::Minimum)), None);
    }

    #[test]
    fn test_duplicate_statistics_collapse() {
        let spec = MetricSpec::builder("AWS/EBS", "VolumeIdleTime")
            .statistic(Statistic::Sum)
            .statistic(Statistic::Sum)
            .build();

        let metric = MetricTemplateBuilder::default().compile(spec).unwrap();
        assert_eq!(metric.templates().len(), 1);
    }

    #[test]
    fn test_invalid_regex_is_config_error() {
        let spec = MetricSpec::builder("AWS/ELB", "Latency")
            .dimension("LoadBalancerName")
            .select_regex("LoadBalancerName", "(unclosed")
            .build();

        let err = MetricTemplateBuilder::default().compile(spec).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidRegex { ref dimension, .. } if dimension == "LoadBalancerName"));
    }

    #[test]
    fn test_matchers_cover_defaults_and_literals() {
        let spec = MetricSpec::builder("AWS/ELB", "RequestCount")
            .dimension("LoadBalancerName")
            .dimension("AvailabilityZone")
            .select("LoadBalancerName", ["web.prod", "api"])
            .select_regex("Other", "^x")
            .build();

        let metric = MetricTemplateBuilder::default().compile(spec).unwrap();

        let lb = metric.matcher("LoadBalancerName").unwrap();
        assert!(lb.is_match("web.prod"));
        assert!(!lb.is_match("webxprod"));
        assert!(lb.is_match("api"));
        assert!(!lb.is_match("apiary"));

        assert!(metric.matcher("AvailabilityZone").unwrap().is_match("anything"));
        assert!(metric.matcher("Other").is_some());
        assert!(metric.matcher("Missing").is_none());
    }

    #[test]
    fn test_empty_selection_matches_nothing() {
        let spec = MetricSpec::builder("AWS/ELB", "RequestCount")
            .dimension("LoadBalancerName")
            .dimension("AvailabilityZone")
            .select("LoadBalancerName", Vec::<String>::new())
            .build();

        let metric = MetricTemplateBuilder::default().compile(spec).unwrap();
        assert!(!metric.matcher("LoadBalancerName").unwrap().is_match(""));
        assert!(!metric.matcher("LoadBalancerName").unwrap().is_match("web"));
    }

    #[test]
    fn test_target_token_is_matched_literally() {
        let spec = MetricSpec::builder("AWS/RDS", "CPUUtilization")
            .dimension("DBInstanceIdentifier")
            .dimension("Role")
            .select("DBInstanceIdentifier", [TARGET_TOKEN])
            .build();

        let metric = MetricTemplateBuilder::default().compile(spec).unwrap();
        assert!(!metric.matcher("DBInstanceIdentifier").unwrap().is_match("db-1"));
    }
}
