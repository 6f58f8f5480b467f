//! YAML settings.
//!
//! The settings file lists accounts, regions and tasks. It is read through
//! the `config` crate so individual top-level values can be overridden from
//! the environment with the `CWATCH_` prefix (e.g.
//! `CWATCH_MAX_CONCURRENT_REQUESTS=8`).
//!
//! ```yaml
//! accounts: ["111111111111"]
//! regions: ["eu-west-1"]
//! tasks:
//!   - name: ec2
//!     region: eu-west-1
//!     metrics:
//!       - aws_namespace: AWS/EC2
//!         aws_metric_name: CPUUtilization
//!         aws_statistics: [Average]
//!         aws_dimensions: [InstanceId]
//!         aws_dimensions_select:
//!           InstanceId: [$_target]
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use cwatch_types::{MetricSpec, Statistic, Task, TaskIdentity, Window};

use crate::error::ConfigError;
use crate::template::StatisticLayout;

/// Value of `account` / `region` that expands a task over every configured
/// account or region.
pub const ALL: &str = "all";

/// Prefix of environment overrides.
pub const ENV_PREFIX: &str = "CWATCH";

pub const DEFAULT_MAX_CONCURRENT_REQUESTS: usize = 32;

fn default_max_concurrent_requests() -> usize {
    DEFAULT_MAX_CONCURRENT_REQUESTS
}

/// Top-level settings file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Accounts used by tasks with `account: all`.
    #[serde(default)]
    pub accounts: Vec<String>,

    /// Accounts removed from `accounts` when expanding `account: all`.
    #[serde(default)]
    pub exclude_accounts: Vec<String>,

    /// Regions used by tasks with `region: all`.
    #[serde(default)]
    pub regions: Vec<String>,

    /// Upper bound on provider calls in flight at once.
    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: usize,

    #[serde(default)]
    pub statistic_layout: StatisticLayout,

    #[serde(default)]
    pub tasks: Vec<TaskConfig>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            accounts: Vec::new(),
            exclude_accounts: Vec::new(),
            regions: Vec::new(),
            max_concurrent_requests: DEFAULT_MAX_CONCURRENT_REQUESTS,
            statistic_layout: StatisticLayout::default(),
            tasks: Vec::new(),
        }
    }
}

/// One task as written in the settings file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskConfig {
    pub name: String,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub account: Option<String>,
    #[serde(default)]
    pub role_name: Option<String>,
    #[serde(default)]
    pub metrics: Vec<MetricConfig>,
}

/// One metric as written in the settings file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricConfig {
    pub aws_namespace: String,
    pub aws_metric_name: String,
    #[serde(default)]
    pub aws_statistics: Vec<String>,
    #[serde(default)]
    pub aws_extended_statistics: Vec<String>,
    #[serde(default)]
    pub aws_dimensions: Vec<String>,
    #[serde(default)]
    pub aws_dimensions_select: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub aws_dimensions_select_regex: BTreeMap<String, String>,
    #[serde(default)]
    pub range_seconds: Option<u32>,
    #[serde(default)]
    pub period_seconds: Option<u32>,
    #[serde(default)]
    pub delay_seconds: Option<u32>,
}

impl Settings {
    /// Load settings from a YAML file, applying `CWATCH_` environment
    /// overrides.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::from(path).format(FileFormat::Yaml))
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?;
        Ok(config.try_deserialize()?)
    }

    /// Parse settings from a YAML string, without environment overrides.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()?;
        Ok(config.try_deserialize()?)
    }

    /// Expand the configured tasks into concrete tasks.
    ///
    /// `account: all` yields one task per account in `accounts` minus
    /// `exclude_accounts`; `region: all` yields one task per configured
    /// region. Expanded tasks keep their name, so a scrape of that name
    /// covers all of them.
    pub fn expand_tasks(&self) -> Result<Vec<Task>, ConfigError> {
        let mut tasks = Vec::new();

        for task in &self.tasks {
            let metrics = task
                .metrics
                .iter()
                .map(MetricConfig::to_spec)
                .collect::<Result<Vec<_>, _>>()?;

            let accounts: Vec<Option<String>> = match task.account.as_deref() {
                Some(a) if a.eq_ignore_ascii_case(ALL) => {
                    let accounts: Vec<_> = self
                        .accounts
                        .iter()
                        .filter(|a| !self.exclude_accounts.contains(*a))
                        .cloned()
                        .map(Some)
                        .collect();
                    if accounts.is_empty() {
                        return Err(ConfigError::NoAccounts(task.name.clone()));
                    }
                    accounts
                }
                other => vec![other.map(str::to_string)],
            };

            let regions: Vec<Option<String>> = match task.region.as_deref() {
                Some(r) if r.eq_ignore_ascii_case(ALL) => {
                    if self.regions.is_empty() {
                        return Err(ConfigError::NoRegions(task.name.clone()));
                    }
                    self.regions.iter().cloned().map(Some).collect()
                }
                Some("") | None => vec![None],
                Some(r) => vec![Some(r.to_string())],
            };

            for account in &accounts {
                for region in &regions {
                    let identity = TaskIdentity {
                        name: task.name.clone(),
                        region: region.clone(),
                        account: account.clone(),
                        role_name: task.role_name.clone(),
                    };
                    tasks.push(Task::new(identity, metrics.clone()));
                }
            }
        }

        Ok(tasks)
    }
}

impl MetricConfig {
    /// Convert to a [`MetricSpec`], filling window defaults.
    ///
    /// Selection keys are re-keyed to the declared dimension spelling when
    /// they differ only in case.
    pub fn to_spec(&self) -> Result<MetricSpec, ConfigError> {
        let statistics = self
            .aws_statistics
            .iter()
            .map(|s| {
                s.parse::<Statistic>()
                    .map_err(|_| ConfigError::UnknownStatistic {
                        metric: self.aws_metric_name.clone(),
                        statistic: s.clone(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let window = Window {
            range_seconds: self.range_seconds.unwrap_or(Window::DEFAULT_RANGE_SECONDS),
            period_seconds: self.period_seconds.unwrap_or(Window::DEFAULT_PERIOD_SECONDS),
            delay_seconds: self.delay_seconds.unwrap_or(Window::DEFAULT_DELAY_SECONDS),
        };

        Ok(MetricSpec {
            namespace: self.aws_namespace.clone(),
            name: self.aws_metric_name.clone(),
            statistics,
            extended_statistics: self.aws_extended_statistics.clone(),
            dimensions: self.aws_dimensions.clone(),
            dimensions_select: rekey(&self.aws_dimensions, &self.aws_dimensions_select),
            dimensions_select_regex: rekey(&self.aws_dimensions, &self.aws_dimensions_select_regex),
            window,
        })
    }
}

fn rekey<V: Clone>(declared: &[String], map: &BTreeMap<String, V>) -> BTreeMap<String, V> {
    map.iter()
        .map(|(key, value)| {
            let key = declared
                .iter()
                .find(|d| *d == key)
                .or_else(|| declared.iter().find(|d| d.eq_ignore_ascii_case(key)))
                .unwrap_or(key);
            (key.clone(), value.clone())
        })
        .collect()
}
