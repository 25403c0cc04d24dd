//! Storage layer: the persistence-engine wrapper, the batched write layer
//! on top of it, and the two specialized stores built from them.

pub mod batched;
pub mod combination;
pub mod engine;
pub mod protein;

pub use batched::{BatchedStore, StreamEntry};
pub use combination::CombinationStore;
pub use engine::StoreEngine;
pub use protein::ProteinStore;
