//! Prometheus text exposition format.
//!
//! Renders scraped [`Sample`]s and the exporter's own gauges/counters in
//! the text-based format Prometheus scrapes.
//!
//! ## Example
//!
//! ```rust
//! use cwatch_sdk::exposition::format_samples;
//! use cwatch_types::Sample;
//!
//! let sample = Sample {
//!     name: "aws_ec2_cpu_utilization_average".to_string(),
//!     help: "CPUUtilization".to_string(),
//!     label_names: vec!["instance_id".to_string()],
//!     label_values: vec!["i-123".to_string()],
//!     value: 12.5,
//! };
//!
//! let text = format_samples(&[sample]);
//! assert!(text.contains("# HELP aws_ec2_cpu_utilization_average CPUUtilization"));
//! assert!(text.contains("aws_ec2_cpu_utilization_average{instance_id=\"i-123\"} 12.5"));
//! ```

use std::collections::{BTreeMap, HashSet};
use std::fmt::Write;

use cwatch_types::Sample;

use crate::{RequestCounters, ScrapeStats};

/// Wall time of one scrape.
pub const SCRAPE_DURATION_SECONDS: &str = "cloudwatch_exporter_scrape_duration_seconds";

/// Failed provider requests during one scrape.
pub const ERRONEOUS_REQUESTS: &str = "cloudwatch_exporter_erroneous_requests";

/// Provider requests since process start.
pub const REQUESTS_TOTAL: &str = "cloudwatch_requests_total";

/// Content type of the text exposition format.
pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Format samples as gauge families.
///
/// Families are emitted in name order with one HELP/TYPE header each.
/// When two samples share a name and label values, only the first is kept.
pub fn format_samples(samples: &[Sample]) -> String {
    let mut families: BTreeMap<&str, Vec<&Sample>> = BTreeMap::new();
    for sample in samples {
        families.entry(sample.name.as_str()).or_default().push(sample);
    }

    let mut output = String::new();
    for (name, members) in families {
        let help = members.first().map(|s| s.help.as_str()).unwrap_or_default();
        write_header(&mut output, name, help, "gauge");

        let mut seen = HashSet::new();
        for sample in members {
            if !seen.insert(&sample.label_values) {
                continue;
            }
            let labels = sample
                .labels()
                .map(|(n, v)| format!("{}=\"{}\"", n, escape_label_value(v)))
                .collect::<Vec<_>>()
                .join(",");
            if labels.is_empty() {
                let _ = writeln!(output, "{} {}", name, format_value(sample.value));
            } else {
                let _ = writeln!(output, "{}{{{}}} {}", name, labels, format_value(sample.value));
            }
        }
    }
    output
}

/// Format the result of one scrape: its samples followed by the scrape
/// duration, the erroneous request count, and the process-wide request
/// counter.
pub fn format_scrape(samples: &[Sample], stats: &ScrapeStats, counters: &RequestCounters) -> String {
    let mut output = format_samples(samples);

    write_header(
        &mut output,
        SCRAPE_DURATION_SECONDS,
        "Time this CloudWatch scrape took, in seconds.",
        "gauge",
    );
    let _ = writeln!(
        output,
        "{} {}",
        SCRAPE_DURATION_SECONDS,
        format_value(stats.duration().as_secs_f64())
    );

    write_header(
        &mut output,
        ERRONEOUS_REQUESTS,
        "The number of failed requests made by this scrape.",
        "gauge",
    );
    let _ = writeln!(output, "{} {}", ERRONEOUS_REQUESTS, stats.erroneous_requests());

    output.push_str(&format_counters(counters));
    output
}

/// Format the process-wide counters.
pub fn format_counters(counters: &RequestCounters) -> String {
    let mut output = String::new();
    write_header(
        &mut output,
        REQUESTS_TOTAL,
        "API requests made to CloudWatch",
        "counter",
    );
    let _ = writeln!(output, "{} {}", REQUESTS_TOTAL, counters.total_requests());
    output
}

fn write_header(output: &mut String, name: &str, help: &str, kind: &str) {
    let _ = writeln!(output, "# HELP {} {}", name, escape_help(help));
    let _ = writeln!(output, "# TYPE {} {}", name, kind);
}

/// Format a sample value, spelling out non-finite values.
pub fn format_value(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value == f64::INFINITY {
        "+Inf".to_string()
    } else if value == f64::NEG_INFINITY {
        "-Inf".to_string()
    } else {
        value.to_string()
    }
}

/// Escape a label value for Prometheus format.
/// Backslash, double-quote, and newline must be escaped.
fn escape_label_value(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

fn escape_help(s: &str) -> String {
    s.replace('\\', "\\\\").replace('\n', "\\n")
}
