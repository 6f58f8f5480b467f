//! Published observations.

/// One labeled numeric observation, ready for exposition.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Sample {
    /// Sanitized metric identifier.
    pub name: String,

    /// Help text for the metric family.
    pub help: String,

    /// Label names, parallel to `label_values`.
    pub label_names: Vec<String>,

    /// Label values, parallel to `label_names`.
    pub label_values: Vec<String>,

    pub value: f64,
}

impl Sample {
    /// Iterate over `(name, value)` label pairs.
    pub fn labels(&self) -> impl Iterator<Item = (&str, &str)> {
        self.label_names
            .iter()
            .map(String::as_str)
            .zip(self.label_values.iter().map(String::as_str))
    }

    /// Value of the label called `name`.
    pub fn label(&self, name: &str) -> Option<&str> {
        self.labels().find(|(n, _)| *n == name).map(|(_, v)| v)
    }
}
