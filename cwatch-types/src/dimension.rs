//! Concrete dimension combinations.

/// A single dimension name/value pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Dimension {
    pub name: String,
    pub value: String,
}

impl Dimension {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// An ordered set of dimension entries identifying one queryable series.
///
/// Entries keep insertion order. A name may repeat when an explicit
/// selection lists several values for the same dimension.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DimensionSet {
    entries: Vec<Dimension>,
}

/// Duplicate-suppression key: the values of a dimension set, in order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DedupKey(Vec<String>);

impl DimensionSet {
    /// Create an empty dimension set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set from name/value pairs.
    pub fn from_pairs<I, N, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (N, V)>,
        N: Into<String>,
        V: Into<String>,
    {
        Self {
            entries: pairs
                .into_iter()
                .map(|(name, value)| Dimension::new(name, value))
                .collect(),
        }
    }

    /// Append an entry.
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push(Dimension::new(name, value));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Dimension> {
        self.entries.iter()
    }

    /// First value recorded for `name`.
    pub fn value(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|d| d.name == name)
            .map(|d| d.value.as_str())
    }

    /// Label values for the given declared dimensions.
    ///
    /// Each declared dimension contributes exactly one value; repeated
    /// entries are joined with `,` and missing ones yield an empty string.
    pub fn label_values(&self, declared: &[String]) -> Vec<String> {
        declared
            .iter()
            .map(|name| {
                self.entries
                    .iter()
                    .filter(|d| &d.name == name)
                    .map(|d| d.value.as_str())
                    .collect::<Vec<_>>()
                    .join(",")
            })
            .collect()
    }

    /// Key identifying this combination by its values, in order.
    pub fn dedup_key(&self) -> DedupKey {
        DedupKey(self.entries.iter().map(|d| d.value.clone()).collect())
    }
}

impl<'a> IntoIterator for &'a DimensionSet {
    type Item = &'a Dimension;
    type IntoIter = std::slice::Iter<'a, Dimension>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn declared(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_label_values_in_declared_order() {
        let set = DimensionSet::from_pairs([("AvailabilityZone", "eu-west-1a"), ("Name", "web")]);

        assert_eq!(
            set.label_values(&declared(&["Name", "AvailabilityZone"])),
            vec!["web", "eu-west-1a"]
        );
    }

    #[test]
    fn test_label_values_fold_repeated_and_blank_missing() {
        let set = DimensionSet::from_pairs([("InstanceId", "i-1"), ("InstanceId", "i-2")]);

        assert_eq!(
            set.label_values(&declared(&["InstanceId", "ImageId"])),
            vec!["i-1,i-2", ""]
        );
    }

    #[test]
    fn dedup_key_does_not_collide_on_separator() {
        let a = DimensionSet::from_pairs([("A", "x;y"), ("B", "z")]);
        let b = DimensionSet::from_pairs([("A", "x"), ("B", "y;z")]);

        assert_ne!(a.dedup_key(), b.dedup_key());
    }

    #[test]
    fn value_returns_first_entry() {
        let set = DimensionSet::from_pairs([("Queue", "a"), ("Queue", "b")]);
        assert_eq!(set.value("Queue"), Some("a"));
        assert_eq!(set.value("Missing"), None);
    }
}
