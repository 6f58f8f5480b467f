//! Dimension resolution: which combinations to query this scrape.

use std::collections::HashSet;

use tracing::{debug, warn};

use cwatch_adapters::MetricsProvider;
use cwatch_types::{DimensionSet, TARGET_TOKEN};

use super::ScrapeContext;
use crate::template::CompiledMetric;

/// Consecutive failures tolerated on one listing page before pagination
/// stops with what was accumulated.
pub const MAX_PAGE_FAILURES: u32 = 3;

/// Dimension sets to query for one metric.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resolution {
    /// Set built from explicit selections, queried without discovery.
    pub direct: Option<DimensionSet>,
    /// Deduplicated sets discovered through the provider listing.
    pub discovered: Vec<DimensionSet>,
}

impl Resolution {
    pub fn len(&self) -> usize {
        self.discovered.len() + usize::from(self.direct.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Resolves the dimension sets of one metric for one scrape target.
pub struct DimensionResolver<'a> {
    metric: &'a CompiledMetric,
    target: &'a str,
}

impl<'a> DimensionResolver<'a> {
    pub fn new(metric: &'a CompiledMetric, target: &'a str) -> Self {
        Self { metric, target }
    }

    /// Run both paths.
    pub async fn resolve(&self, provider: &dyn MetricsProvider, ctx: &ScrapeContext) -> Resolution {
        let direct = self.direct();
        let discovered = if self.metric.spec().needs_discovery() {
            self.discover(provider, ctx).await
        } else {
            Vec::new()
        };
        Resolution { direct, discovered }
    }

    /// The set built from explicit selections, if the metric has any (or
    /// declares no dimensions at all).
    ///
    /// Every selected value becomes one entry, `$_target` replaced by the
    /// scrape target. A dimension with several values contributes several
    /// entries of the same name to the one set.
    pub fn direct(&self) -> Option<DimensionSet> {
        let spec = self.metric.spec();
        if !spec.has_direct_selection() {
            return None;
        }

        let mut set = DimensionSet::new();
        for name in spec.selected_dimensions() {
            for value in spec.dimensions_select.get(name).into_iter().flatten() {
                let value = if value == TARGET_TOKEN { self.target } else { value.as_str() };
                set.push(name, value);
            }
        }
        Some(set)
    }

    /// List every known combination, then keep the accepted ones, first
    /// occurrence winning.
    pub async fn discover(&self, provider: &dyn MetricsProvider, ctx: &ScrapeContext) -> Vec<DimensionSet> {
        let spec = self.metric.spec();
        let Some(combinations) = self.list_all(provider, ctx).await else {
            return Vec::new();
        };

        let mut seen = HashSet::new();
        let accepted: Vec<DimensionSet> = combinations
            .iter()
            .filter_map(|combination| self.accept(combination))
            .filter(|set| seen.insert(set.dedup_key()))
            .collect();

        debug!(
            namespace = %spec.namespace,
            metric = %spec.name,
            listed = combinations.len(),
            accepted = accepted.len(),
            "Discovered dimension sets"
        );
        accepted
    }

    /// Accept a listed combination when every declared dimension is present
    /// and matches its matcher, and nothing undeclared is present. The
    /// accepted set is returned in declared order.
    pub fn accept(&self, combination: &DimensionSet) -> Option<DimensionSet> {
        let declared = &self.metric.spec().dimensions;
        if combination.len() != declared.len() {
            return None;
        }

        let mut accepted = DimensionSet::new();
        for name in declared {
            let value = combination.value(name)?;
            let matcher = self.metric.matcher(name)?;
            if !matcher.is_match(value) {
                return None;
            }
            accepted.push(name.as_str(), value);
        }
        Some(accepted)
    }

    /// Follow listing pages until exhausted. `None` when the first page
    /// fails.
    async fn list_all(&self, provider: &dyn MetricsProvider, ctx: &ScrapeContext) -> Option<Vec<DimensionSet>> {
        let spec = self.metric.spec();
        let mut combinations = Vec::new();
        let mut token: Option<String> = None;
        let mut failures = 0;

        loop {
            let result = ctx
                .call(provider.list_metrics(&spec.namespace, &spec.name, token.as_deref()))
                .await;

            match result {
                Ok(page) => {
                    failures = 0;
                    combinations.extend(page.combinations);
                    match page.next_token {
                        Some(next) => token = Some(next),
                        None => return Some(combinations),
                    }
                }
                Err(e) if e.is_cancelled() => return None,
                Err(e) if token.is_none() => {
                    warn!(
                        namespace = %spec.namespace,
                        metric = %spec.name,
                        error = %e,
                        "Listing metrics failed, skipping discovery"
                    );
                    return None;
                }
                Err(e) => {
                    failures += 1;
                    warn!(
                        namespace = %spec.namespace,
                        metric = %spec.name,
                        error = %e,
                        attempt = failures,
                        "Listing page failed"
                    );
                    if failures >= MAX_PAGE_FAILURES {
                        return Some(combinations);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::MetricTemplateBuilder;
    use cwatch_types::{MetricSpec, Statistic};

    fn compile(spec: MetricSpec) -> CompiledMetric {
        MetricTemplateBuilder::default().compile(spec).unwrap()
    }

    #[test]
    fn test_direct_replaces_target() {
        let metric = compile(
            MetricSpec::builder("AWS/EC2", "CPUUtilization")
                .statistic(Statistic::Average)
                .dimension("InstanceId")
                .select("InstanceId", [TARGET_TOKEN])
                .build(),
        );

        let set = DimensionResolver::new(&metric, "i-abc").direct().unwrap();
        assert_eq!(set, DimensionSet::from_pairs([("InstanceId", "i-abc")]));
    }

    #[test]
    fn test_direct_folds_multiple_values() {
        let metric = compile(
            MetricSpec::builder("AWS/EC2", "CPUUtilization")
                .dimension("InstanceId")
                .select("InstanceId", ["i-1", "i-2"])
                .build(),
        );

        let set = DimensionResolver::new(&metric, "").direct().unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.label_values(&["InstanceId".to_string()]), vec!["i-1,i-2"]);
    }

    #[test]
    fn test_dimensionless_metric_has_empty_direct_set() {
        let metric = compile(MetricSpec::builder("AWS/Billing", "EstimatedCharges").build());
        assert_eq!(DimensionResolver::new(&metric, "").direct(), Some(DimensionSet::new()));
    }

    #[test]
    fn test_regex_only_metric_has_no_direct_set() {
        let metric = compile(
            MetricSpec::builder("AWS/ELB", "Latency")
                .dimension("LoadBalancerName")
                .build(),
        );
        assert_eq!(DimensionResolver::new(&metric, "").direct(), None);
    }

    #[test]
    fn test_empty_selection_has_no_direct_set() {
        let metric = compile(
            MetricSpec::builder("AWS/EC2", "CPUUtilization")
                .dimension("InstanceId")
                .select("InstanceId", Vec::<String>::new())
                .build(),
        );
        assert_eq!(DimensionResolver::new(&metric, "").direct(), None);
    }

    #[test]
    fn test_accept_reorders_to_declared_order() {
        let metric = compile(
            MetricSpec::builder("AWS/ELB", "Latency")
                .dimension("LoadBalancerName")
                .dimension("AvailabilityZone")
                .select_regex("AvailabilityZone", "^eu-")
                .build(),
        );
        let resolver = DimensionResolver::new(&metric, "");

        let listed = DimensionSet::from_pairs([("AvailabilityZone", "eu-west-1a"), ("LoadBalancerName", "web")]);
        assert_eq!(
            resolver.accept(&listed),
            Some(DimensionSet::from_pairs([("LoadBalancerName", "web"), ("AvailabilityZone", "eu-west-1a")]))
        );

        let wrong_zone = DimensionSet::from_pairs([("AvailabilityZone", "us-east-1a"), ("LoadBalancerName", "web")]);
        assert_eq!(resolver.accept(&wrong_zone), None);
    }

    #[test]
    fn test_accept_rejects_missing_and_undeclared() {
        let metric = compile(
            MetricSpec::builder("AWS/ELB", "Latency")
                .dimension("LoadBalancerName")
                .build(),
        );
        let resolver = DimensionResolver::new(&metric, "");

        assert_eq!(resolver.accept(&DimensionSet::new()), None);
        assert_eq!(
            resolver.accept(&DimensionSet::from_pairs([("LoadBalancerName", "web"), ("AvailabilityZone", "a")])),
            None
        );
        assert_eq!(
            resolver.accept(&DimensionSet::from_pairs([("AvailabilityZone", "a")])),
            None
        );
    }

    #[test]
    fn test_accept_uses_literal_fallback() {
        let metric = compile(
            MetricSpec::builder("AWS/ELB", "Latency")
                .dimension("LoadBalancerName")
                .dimension("AvailabilityZone")
                .select("LoadBalancerName", ["web"])
                .build(),
        );
        let resolver = DimensionResolver::new(&metric, "");

        let listed = DimensionSet::from_pairs([("LoadBalancerName", "web"), ("AvailabilityZone", "a")]);
        assert!(resolver.accept(&listed).is_some());

        let other = DimensionSet::from_pairs([("LoadBalancerName", "website"), ("AvailabilityZone", "a")]);
        assert!(resolver.accept(&other).is_none());
    }
}
