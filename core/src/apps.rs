//! Built-in applications selectable by name.

use crate::traits::{Application, MapFunction, ReduceFunction};
use anyhow::Context;
use mr_common::KeyValue;
use std::collections::BTreeSet;

fn words(contents: &str) -> impl Iterator<Item = &str> {
    contents
        .split(|c: char| !c.is_alphabetic())
        .filter(|w| !w.is_empty())
}

/// Counts word occurrences.
#[derive(Debug, Clone, Copy, Default)]
pub struct WordCount;

impl MapFunction for WordCount {
    fn map(&self, _input_ref: &str, contents: &str) -> anyhow::Result<Vec<KeyValue>> {
        Ok(words(contents).map(|w| KeyValue::new(w, "1")).collect())
    }
}

impl ReduceFunction for WordCount {
    fn reduce(&self, key: &str, values: &[String]) -> anyhow::Result<String> {
        let mut total: u64 = 0;
        for value in values {
            let count: u64 = value
                .parse()
                .with_context(|| format!("non-numeric count {:?} for word {:?}", value, key))?;
            total += count;
        }
        Ok(total.to_string())
    }
}

/// Builds an inverted index from words to the documents containing them.
#[derive(Debug, Clone, Copy, Default)]
pub struct Indexer;

impl MapFunction for Indexer {
    fn map(&self, input_ref: &str, contents: &str) -> anyhow::Result<Vec<KeyValue>> {
        let distinct: BTreeSet<&str> = words(contents).collect();
        Ok(distinct
            .into_iter()
            .map(|w| KeyValue::new(w, input_ref))
            .collect())
    }
}

impl ReduceFunction for Indexer {
    fn reduce(&self, _key: &str, values: &[String]) -> anyhow::Result<String> {
        let documents: BTreeSet<&str> = values.iter().map(String::as_str).collect();
        let joined = documents.iter().copied().collect::<Vec<_>>().join(",");
        Ok(format!("{} {}", documents.len(), joined))
    }
}

/// Names accepted by [`by_name`].
pub const APPLICATION_NAMES: &[&str] = &["wc", "indexer"];

/// Looks up a built-in application.
pub fn by_name(name: &str) -> Option<Application> {
    match name {
        "wc" => Some(Application::new("wc", WordCount, WordCount)),
        "indexer" => Some(Application::new("indexer", Indexer, Indexer)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_word_count_map_splits_on_non_letters() {
        let pairs = WordCount.map("pg-1.txt", "the quick fox, the!").unwrap();
        let keys: Vec<&str> = pairs.iter().map(|kv| kv.key.as_str()).collect();
        assert_eq!(keys, vec!["the", "quick", "fox", "the"]);
        assert!(pairs.iter().all(|kv| kv.value == "1"));
    }

    #[test]
    fn test_word_count_reduce_sums_values() {
        let values = vec!["1".to_string(), "2".to_string(), "1".to_string()];
        assert_eq!(WordCount.reduce("the", &values).unwrap(), "4");
    }

    #[test]
    fn test_word_count_reduce_rejects_garbage() {
        let values = vec!["one".to_string()];
        assert!(WordCount.reduce("the", &values).is_err());
    }

    #[test]
    fn test_indexer_emits_each_word_once_per_document() {
        let pairs = Indexer.map("doc-a", "to be or not to be").unwrap();
        let keys: Vec<&str> = pairs.iter().map(|kv| kv.key.as_str()).collect();
        assert_eq!(keys, vec!["be", "not", "or", "to"]);
        assert!(pairs.iter().all(|kv| kv.value == "doc-a"));
    }

    #[test]
    fn test_indexer_reduce_lists_sorted_documents() {
        let values = vec!["doc-b".to_string(), "doc-a".to_string(), "doc-b".to_string()];
        assert_eq!(Indexer.reduce("to", &values).unwrap(), "2 doc-a,doc-b");
    }

    #[test]
    fn test_by_name() {
        assert_eq!(by_name("wc").map(|app| app.name().to_string()), Some("wc".into()));
        assert!(by_name("indexer").is_some());
        assert!(by_name("grep").is_none());
        for name in APPLICATION_NAMES {
            assert!(by_name(name).is_some());
        }
    }
}
