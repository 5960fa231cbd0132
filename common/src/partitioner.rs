//! Deterministic key-to-bucket assignment.
//!
//! Map and reduce tasks run independently, possibly in different processes
//! and on different days, so the bucket of a key must depend only on the key
//! bytes and the bucket count. FNV-1a is used rather than the std hasher,
//! whose output is not guaranteed to be stable across releases.

use crate::error::{Result, WorkerError};

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// 32-bit FNV-1a hash of the key, masked to a non-negative value.
pub fn ihash(key: &str) -> u32 {
    let mut hash = FNV_OFFSET_BASIS;
    for byte in key.as_bytes() {
        hash ^= u32::from(*byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash & 0x7fff_ffff
}

/// Bucket of `key` among `num_partitions` buckets.
///
/// # Panics
/// Panics if `num_partitions` is zero.
pub fn partition(key: &str, num_partitions: u32) -> u32 {
    assert!(num_partitions > 0, "Number of partitions must be positive.");
    ihash(key) % num_partitions
}

/// Maps keys onto a fixed number of buckets.
pub trait Partitioner: Send + Sync {
    fn num_partitions(&self) -> u32;

    fn get_partition(&self, key: &str) -> u32;
}

/// A partitioner that uses the FNV-1a hash of the key.
#[derive(Clone, Debug)]
pub struct HashPartitioner {
    num_partitions: u32,
}

impl HashPartitioner {
    pub fn new(num_partitions: u32) -> Result<Self> {
        if num_partitions == 0 {
            return Err(WorkerError::configuration_error(
                "Number of partitions must be positive",
            ));
        }
        Ok(Self { num_partitions })
    }
}

impl Partitioner for HashPartitioner {
    fn num_partitions(&self) -> u32 {
        self.num_partitions
    }

    fn get_partition(&self, key: &str) -> u32 {
        ihash(key) % self.num_partitions
    }
}
