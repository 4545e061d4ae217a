//! Realm-cache client implementations

pub mod memory;

pub use memory::InMemoryRealmCache;
