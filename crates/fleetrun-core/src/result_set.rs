//! Results collected across many targets

use serde::{Serialize, Serializer};

use crate::error::CoreError;
use crate::result::TargetResult;

/// Ordered collection of results, one per target
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    results: Vec<TargetResult>,
}

impl ResultSet {
    #[must_use]
    pub fn new(results: Vec<TargetResult>) -> Self {
        Self { results }
    }

    /// True when every result succeeded (vacuously true when empty)
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.results.iter().all(TargetResult::is_ok)
    }

    /// Successful results only
    #[must_use]
    pub fn ok_set(&self) -> ResultSet {
        self.results.iter().filter(|r| r.is_ok()).cloned().collect()
    }

    /// Failed results only
    #[must_use]
    pub fn error_set(&self) -> ResultSet {
        self.results.iter().filter(|r| !r.is_ok()).cloned().collect()
    }

    /// Target names in result order
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.results.iter().map(|r| r.target().name.as_str()).collect()
    }

    /// Result for a target name
    #[must_use]
    pub fn find(&self, name: &str) -> Option<&TargetResult> {
        self.results.iter().find(|r| r.target().name == name)
    }

    #[must_use]
    pub fn first(&self) -> Option<&TargetResult> {
        self.results.first()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.results.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TargetResult> {
        self.results.iter()
    }

    /// Serialize as a JSON array of status hashes
    ///
    /// # Errors
    /// Returns `CoreError::Serialization` if encoding fails
    pub fn to_json(&self) -> Result<String, CoreError> {
        Ok(serde_json::to_string(self)?)
    }
}

impl FromIterator<TargetResult> for ResultSet {
    fn from_iter<I: IntoIterator<Item = TargetResult>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl IntoIterator for ResultSet {
    type Item = TargetResult;
    type IntoIter = std::vec::IntoIter<TargetResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.into_iter()
    }
}

impl<'a> IntoIterator for &'a ResultSet {
    type Item = &'a TargetResult;
    type IntoIter = std::slice::Iter<'a, TargetResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.iter()
    }
}

impl Serialize for ResultSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.results.iter().map(TargetResult::status_hash))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::Target;

    fn sample() -> ResultSet {
        vec![
            TargetResult::for_command(Target::new("a"), "ok", "", 0, "true"),
            TargetResult::for_command(Target::new("b"), "", "", 1, "false"),
            TargetResult::for_upload(Target::new("c"), "/src", "/dst"),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_partitions() {
        let set = sample();

        assert!(!set.is_ok());
        assert_eq!(set.len(), 3);
        assert_eq!(set.ok_set().names(), ["a", "c"]);
        assert_eq!(set.error_set().names(), ["b"]);
        assert!(set.ok_set().is_ok());
    }

    #[test]
    fn test_find() {
        let set = sample();

        assert_eq!(set.find("b").map(|r| r.is_ok()), Some(false));
        assert!(set.find("missing").is_none());
        assert_eq!(set.first().map(|r| r.target().name.as_str()), Some("a"));
    }

    #[test]
    fn test_empty_is_ok() {
        let set = ResultSet::default();

        assert!(set.is_ok());
        assert!(set.is_empty());
        assert_eq!(set.to_json().unwrap(), "[]");
    }
}
