//! User-supplied map and reduce functions.

use mr_common::KeyValue;
use std::fmt;
use std::sync::Arc;

/// Transforms one input split into intermediate pairs.
///
/// Invoked exactly once per map task with the split's reference (its path)
/// and its whole contents.
pub trait MapFunction: Send + Sync {
    fn map(&self, input_ref: &str, contents: &str) -> anyhow::Result<Vec<KeyValue>>;
}

/// Folds every value emitted for one key into a single output value.
pub trait ReduceFunction: Send + Sync {
    fn reduce(&self, key: &str, values: &[String]) -> anyhow::Result<String>;
}

impl<F> MapFunction for F
where
    F: Fn(&str, &str) -> anyhow::Result<Vec<KeyValue>> + Send + Sync,
{
    fn map(&self, input_ref: &str, contents: &str) -> anyhow::Result<Vec<KeyValue>> {
        self(input_ref, contents)
    }
}

impl<F> ReduceFunction for F
where
    F: Fn(&str, &[String]) -> anyhow::Result<String> + Send + Sync,
{
    fn reduce(&self, key: &str, values: &[String]) -> anyhow::Result<String> {
        self(key, values)
    }
}

/// A named pair of map and reduce functions.
#[derive(Clone)]
pub struct Application {
    name: String,
    map_fn: Arc<dyn MapFunction>,
    reduce_fn: Arc<dyn ReduceFunction>,
}

impl Application {
    pub fn new(
        name: impl Into<String>,
        map_fn: impl MapFunction + 'static,
        reduce_fn: impl ReduceFunction + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            map_fn: Arc::new(map_fn),
            reduce_fn: Arc::new(reduce_fn),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn map_fn(&self) -> Arc<dyn MapFunction> {
        Arc::clone(&self.map_fn)
    }

    pub fn reduce_fn(&self) -> Arc<dyn ReduceFunction> {
        Arc::clone(&self.reduce_fn)
    }
}

impl fmt::Debug for Application {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Application")
            .field("name", &self.name)
            .field("map_fn", &"<function>")
            .field("reduce_fn", &"<function>")
            .finish()
    }
}
