//! Persistence Adapters
//!
//! Implementations of the session repository trait. Snapshots leave the
//! process through `SessionChange` notifications; nothing here touches disk.

pub mod in_memory;

pub use in_memory::InMemorySessionStore;
