//! Datapoints to samples.

use cwatch_types::{Datapoint, DimensionSet, Sample, Statistic, TaskIdentity};

use crate::template::{CompiledMetric, StatisticKind, StatisticLayout};

/// Maps datapoints of one metric under one task identity onto samples.
pub struct ResultMapper<'a> {
    metric: &'a CompiledMetric,
    identity: &'a TaskIdentity,
}

impl<'a> ResultMapper<'a> {
    pub fn new(metric: &'a CompiledMetric, identity: &'a TaskIdentity) -> Self {
        Self { metric, identity }
    }

    /// Declared dimension values, then task, region and account.
    pub fn label_values(&self, dimensions: &DimensionSet) -> Vec<String> {
        let mut values = dimensions.label_values(&self.metric.spec().dimensions);
        values.push(self.identity.name.clone());
        values.push(self.identity.region_label().to_string());
        values.push(self.identity.account_label().to_string());
        values
    }

    /// One sample per requested statistic present in `datapoint`: sum,
    /// average, maximum, minimum, sample count, then percentiles in
    /// configured order.
    pub fn map(&self, datapoint: &Datapoint, label_values: &[String]) -> Vec<Sample> {
        let standard = Statistic::ALL.into_iter().filter_map(|s| {
            let value = datapoint.value(s)?;
            Some((StatisticKind::Standard(s), value))
        });
        let extended = self.metric.statistic_kinds().iter().filter_map(|kind| match kind {
            StatisticKind::Extended(name) => {
                let value = datapoint.extended_value(name)?;
                Some((kind.clone(), value))
            }
            StatisticKind::Standard(_) => None,
        });

        standard
            .chain(extended)
            .filter_map(|(kind, value)| self.sample(&kind, value, label_values))
            .collect()
    }

    fn sample(&self, kind: &StatisticKind, value: f64, label_values: &[String]) -> Option<Sample> {
        let template = self.metric.template_for(kind)?;

        let mut label_values = label_values.to_vec();
        if self.metric.layout() == StatisticLayout::Label {
            label_values.push(kind.name().to_string());
        }

        Some(Sample {
            name: template.name.clone(),
            help: template.help.clone(),
            label_names: template.label_names.clone(),
            label_values,
            value,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::MetricTemplateBuilder;
    use cwatch_types::MetricSpec;

    fn identity() -> TaskIdentity {
        TaskIdentity::new("ec2").region("eu-west-1")
    }

    #[test]
    fn test_label_values_order() {
        let metric = MetricTemplateBuilder::default()
            .compile(
                MetricSpec::builder("AWS/ELB", "Latency")
                    .statistic(Statistic::Average)
                    .dimension("LoadBalancerName")
                    .dimension("AvailabilityZone")
                    .build(),
            )
            .unwrap();
        let identity = identity();
        let mapper = ResultMapper::new(&metric, &identity);

        let dims = DimensionSet::from_pairs([("AvailabilityZone", "a"), ("LoadBalancerName", "web")]);
        assert_eq!(
            mapper.label_values(&dims),
            vec!["web", "a", "ec2", "eu-west-1", "Not Specified"]
        );
    }

    #[test]
    fn test_only_present_statistics_are_mapped() {
        let metric = MetricTemplateBuilder::default()
            .compile(
                MetricSpec::builder("AWS/EC2", "CPUUtilization")
                    .statistic(Statistic::Average)
                    .statistic(Statistic::Maximum)
                    .extended_statistic("p99")
                    .build(),
            )
            .unwrap();
        let identity = identity();
        let mapper = ResultMapper::new(&metric, &identity);

        let dp = Datapoint::new(0)
            .with(Statistic::Average, 12.5)
            .with(Statistic::Sum, 99.0)
            .with_extended("p99", 40.0);
        let samples = mapper.map(&dp, &mapper.label_values(&DimensionSet::new()));

        let names: Vec<&str> = samples.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["aws_ec2_cpu_utilization_average", "aws_ec2_cpu_utilization_p99"]
        );
        assert_eq!(samples[0].value, 12.5);
        assert_eq!(samples[0].help, "CPUUtilization");
        assert_eq!(samples[0].label("task"), Some("ec2"));
    }

    fn all_statistics_metric() -> CompiledMetric {
        let mut builder = MetricSpec::builder("AWS/ELB", "Latency").dimension("LoadBalancerName");
        for statistic in Statistic::ALL {
            builder = builder.statistic(statistic);
        }
        MetricTemplateBuilder::default().compile(builder.build()).unwrap()
    }

    #[test]
    fn test_all_null_datapoint_yields_no_samples() {
        let metric = all_statistics_metric();
        let identity = identity();
        let mapper = ResultMapper::new(&metric, &identity);

        let dp = Datapoint::new(0);
        assert!(dp.is_empty());

        let labels = mapper.label_values(&DimensionSet::from_pairs([("LoadBalancerName", "web")]));
        assert!(mapper.map(&dp, &labels).is_empty());
    }

    #[test]
    fn test_average_only_datapoint_yields_one_sample() {
        let metric = all_statistics_metric();
        let identity = identity();
        let mapper = ResultMapper::new(&metric, &identity);

        let dp = Datapoint::new(0).with(Statistic::Average, 0.75);
        let labels = mapper.label_values(&DimensionSet::from_pairs([("LoadBalancerName", "web")]));
        let samples = mapper.map(&dp, &labels);

        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].name, "aws_elb_latency_average");
        assert_eq!(samples[0].value, 0.75);
        assert_eq!(samples[0].label("load_balancer_name"), Some("web"));
    }

    #[test]
    fn test_label_layout_adds_statistic_label() {
        let metric = MetricTemplateBuilder::new(StatisticLayout::Label)
            .compile(
                MetricSpec::builder("AWS/SQS", "NumberOfMessagesSent")
                    .statistic(Statistic::Sum)
                    .statistic(Statistic::SampleCount)
                    .build(),
            )
            .unwrap();
        let identity = identity();
        let mapper = ResultMapper::new(&metric, &identity);

        let dp = Datapoint::new(0)
            .with(Statistic::Sum, 5.0)
            .with(Statistic::SampleCount, 2.0);
        let samples = mapper.map(&dp, &mapper.label_values(&DimensionSet::new()));

        assert_eq!(samples.len(), 2);
        assert!(samples.iter().all(|s| s.name == "aws_sqs_number_of_messages_sent"));
        assert_eq!(samples[0].label("statistic"), Some("Sum"));
        assert_eq!(samples[1].label("statistic"), Some("SampleCount"));
        assert_eq!(samples[0].label_names.len(), samples[0].label_values.len());
    }
}
