//! Durable persistence for session cursors.

mod kv;

pub use kv::{MemoryStore, Persistence, SqliteStore, StoreError};
