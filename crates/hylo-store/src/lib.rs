//! Hylo Store - storage-agnostic resource repository
//!
//! This crate provides:
//! - **Repository Contract**: `ResourceStore`, the CRUD + list + watch trait
//!   every backend implements with identical client-visible semantics
//! - **Version Control**: strictly increasing per-resource `resourceVersion`
//!   with optimistic concurrency (no locks held across operations)
//! - **Backends**: in-memory and one-file-per-resource reference drivers
//! - **Watch Distribution**: a per-process event hub fanning changes out to
//!   local watchers and across replicas through a shared message bus
//! - **Pagination**: name-ordered lists with opaque continuation tokens

pub mod bus;
pub mod error;
pub mod events;
pub mod query;
pub mod store;
pub mod version;

pub use bus::{BusError, BusStream, InProcessBus, MessageBus};
pub use error::{Result, StoreError};
pub use events::{
    EventHub, EventKind, ResourceWatchEvent, WatchFilter, WatchStream, EVENTS_TOPIC,
};
pub use query::{ListQuery, Page};
pub use store::{patched_resource, FileStore, MemoryStore, ResourceStore, RetryConfig, StoreConfig};
