//! In-memory store adapter for tests and demos.

mod store;

pub use store::{InMemoryStore, InMemoryTx};
