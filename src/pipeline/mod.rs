//! Bulk database passes: initial build, combination compression and shard
//! merging.

pub mod build;
pub mod index;
pub mod merge;

pub use build::build;
pub use index::index_combinations;
pub use merge::merge;
