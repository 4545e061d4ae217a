//! Document store implementations

pub mod memory;

pub use memory::InMemoryDocumentStore;
