pub mod store;

pub use store::{MemoryStreamStore, StreamStore};
