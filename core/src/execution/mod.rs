//! Task execution: map, reduce and final output.

pub mod map;
pub mod output;
pub mod reduce;

pub use map::{MapExecutor, MapOutput, partition_pairs};
pub use output::OutputWriter;
pub use reduce::{ReduceExecutor, reduce_pairs};
