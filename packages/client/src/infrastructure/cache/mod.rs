//! Query cache implementations.

pub mod inmemory;

pub use inmemory::InMemoryQueryCache;
