//! The record type flowing through every stage of a job.

use bincode::{Decode, Encode};
use std::fmt;

/// A single `(key, value)` pair.
///
/// Keys are not unique: every occurrence of a key emitted by any map task must
/// reach the same reduce invocation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Encode, Decode)]
pub struct KeyValue {
    pub key: String,
    pub value: String,
}

impl KeyValue {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Renders the record the way output files store it: `key value`.
///
/// Embedded spaces are not escaped, so a key containing a space cannot be
/// told apart from its value when read back.
impl fmt::Display for KeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.key, self.value)
    }
}

impl<K: Into<String>, V: Into<String>> From<(K, V)> for KeyValue {
    fn from((key, value): (K, V)) -> Self {
        Self::new(key, value)
    }
}

/// All values sharing one key within a bucket, assembled before reduction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReduceGroup {
    pub key: String,
    pub values: Vec<String>,
}

/// Splits pairs that are already sorted by key into maximal runs of equal keys.
///
/// The input order of values within a run is preserved.
pub fn group_sorted(pairs: Vec<KeyValue>) -> Vec<ReduceGroup> {
    let mut groups: Vec<ReduceGroup> = Vec::new();
    for kv in pairs {
        match groups.last_mut() {
            Some(group) if group.key == kv.key => group.values.push(kv.value),
            _ => groups.push(ReduceGroup {
                key: kv.key,
                values: vec![kv.value],
            }),
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_uses_single_space() {
        let kv = KeyValue::new("the", "2");
        assert_eq!(kv.to_string(), "the 2");
    }

    #[test]
    fn test_group_sorted_merges_equal_keys() {
        let pairs: Vec<KeyValue> = vec![
            ("fox", "1").into(),
            ("quick", "1").into(),
            ("the", "1").into(),
            ("the", "1").into(),
        ];
        let groups = group_sorted(pairs);
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0].key, "fox");
        assert_eq!(groups[2].key, "the");
        assert_eq!(groups[2].values, vec!["1".to_string(), "1".to_string()]);
    }

    #[test]
    fn test_group_sorted_empty() {
        assert!(group_sorted(Vec::new()).is_empty());
    }
}
