pub mod engine;

pub use engine::{MemoryStore, StorageError, VitalStore};
