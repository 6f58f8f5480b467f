//! Configuration errors.

use thiserror::Error;

/// Errors building a catalog or starting a scrape session.
///
/// All of these are fatal to the operation that raised them: nothing is
/// scraped when one occurs.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read or deserialized.
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    /// A scrape asked for a task that is not configured.
    #[error("unknown task '{0}'")]
    UnknownTask(String),

    /// The task has no region and the scrape did not supply one.
    #[error("task '{0}' has no region and none was requested")]
    MissingRegion(String),

    /// A dimension regex does not compile.
    #[error("invalid regex for dimension '{dimension}' of metric '{metric}': {pattern}")]
    InvalidRegex {
        metric: String,
        dimension: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// A statistic name is not one of the standard statistics.
    #[error("unknown statistic '{statistic}' for metric '{metric}'")]
    UnknownStatistic { metric: String, statistic: String },

    /// `account: all` was used but no account remains after exclusions.
    #[error("task '{0}' requests all accounts but none are configured")]
    NoAccounts(String),

    /// `region: all` was used but no regions are configured.
    #[error("task '{0}' requests all regions but none are configured")]
    NoRegions(String),
}
