//! Partitioned intermediate data between the map and reduce phases.

pub mod intermediate;

pub use intermediate::*;
pub use mr_common::partitioner::{HashPartitioner, Partitioner};
