//! Tasks - named groups of metrics bound to one region and account.

use crate::{MetricSpec, ACCOUNT_NOT_SPECIFIED};

/// Who and where a task scrapes: name, region, account and the role to
/// assume in that account.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TaskIdentity {
    /// Task name, used to route scrape requests.
    pub name: String,

    /// Region to query. `None` means the scrape request must supply one.
    #[cfg_attr(feature = "serde", serde(default))]
    pub region: Option<String>,

    /// Account the metrics belong to.
    #[cfg_attr(feature = "serde", serde(default))]
    pub account: Option<String>,

    /// Role assumed inside `account` to read metrics.
    #[cfg_attr(feature = "serde", serde(default))]
    pub role_name: Option<String>,
}

impl TaskIdentity {
    /// Create an identity with only a name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            region: None,
            account: None,
            role_name: None,
        }
    }

    /// Set the region.
    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Set the account.
    pub fn account(mut self, account: impl Into<String>) -> Self {
        self.account = Some(account.into());
        self
    }

    /// Set the role assumed in the account.
    pub fn role_name(mut self, role_name: impl Into<String>) -> Self {
        self.role_name = Some(role_name.into());
        self
    }

    /// Copy of this identity pinned to `region`.
    pub fn in_region(&self, region: &str) -> Self {
        Self {
            region: Some(region.to_string()),
            ..self.clone()
        }
    }

    /// Region label value (empty when unset).
    pub fn region_label(&self) -> &str {
        self.region.as_deref().unwrap_or_default()
    }

    /// Account label value, `"Not Specified"` when unset.
    pub fn account_label(&self) -> &str {
        self.account
            .as_deref()
            .filter(|a| !a.is_empty())
            .unwrap_or(ACCOUNT_NOT_SPECIFIED)
    }

    /// ARN of the role to assume, when both account and role name are set.
    pub fn role_arn(&self) -> Option<String> {
        match (self.account.as_deref(), self.role_name.as_deref()) {
            (Some(account), Some(role)) if !account.is_empty() && !role.is_empty() => {
                Some(format!("arn:aws:iam::{}:role/{}", account, role))
            }
            _ => None,
        }
    }
}

/// A named scrape unit: an identity plus the ordered metrics it covers.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Task {
    pub identity: TaskIdentity,
    pub metrics: Vec<MetricSpec>,
}

impl Task {
    pub fn new(identity: TaskIdentity, metrics: Vec<MetricSpec>) -> Self {
        Self { identity, metrics }
    }

    pub fn name(&self) -> &str {
        &self.identity.name
    }
}
