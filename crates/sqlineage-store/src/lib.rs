//! Canonical-graph storage boundary
//!
//! This crate provides the `LineageStore` trait that the batch reprocessor,
//! the realtime coordinator and the query service talk to, plus an in-memory
//! implementation.
//!
//! ## Example
//!
//! ```rust,ignore
//! use sqlineage_store::{InMemoryStore, LineageStore};
//! use sqlineage_core::RunInfo;
//!
//! let store = InMemoryStore::new();
//! store.register_run(RunInfo::new("run-1", "git@host:repo.git", "main")).await?;
//! let tables = store.tables(&"run-1".into()).await?;
//! ```

pub mod store;
pub mod memory;

pub use store::{LineageStore, StoreError, RelationshipFilter};
pub use memory::{InMemoryStore, InMemoryStoreBuilder};
