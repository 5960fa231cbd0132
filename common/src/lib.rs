//! Common types shared by the map/reduce worker crates.
//!
//! This module provides the key-value record, deterministic partitioning and
//! the worker error type.

pub mod error;
pub mod kv;
pub mod partitioner;

pub use error::{Result, WorkerError};
pub use kv::{KeyValue, ReduceGroup, group_sorted};
pub use partitioner::{HashPartitioner, Partitioner, ihash, partition};
