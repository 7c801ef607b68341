//! volvue-store: the chunk store boundary
//!
//! The engine treats storage as a single async operation behind
//! [`ChunkStore`]; everything transport- or codec-specific stays on the
//! implementation side. [`MemoryStore`] is the in-process reference used
//! by the engine tests and demos.

pub mod memory;
pub mod traits;

pub use memory::{MemoryStore, MemoryStoreError};
pub use traits::ChunkStore;
