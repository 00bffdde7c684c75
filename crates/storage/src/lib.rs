//! Expiring key-value storage abstraction for sudogate.
//!
//! This crate provides the [`KeyValueStore`] trait and the in-memory
//! reference implementation that back every durable record in sudogate:
//! grant records, persisted scheduler jobs, and configuration.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                  sudogate-core                      │
//! │   GrantStore │ StoreScheduler │ config persistence  │
//! ├─────────────────────────────────────────────────────┤
//! │                 sudogate-storage                    │
//! │                KeyValueStore trait                  │
//! │   (get, set, insert_with_ttl, take, get_range)      │
//! ├─────────────────────────────────────────────────────┤
//! │                    MemoryStore                      │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! # TTL Guarantee
//!
//! Per-key expiry is enforced by the store itself: an expired key is
//! logically absent from `get`, `get_range`, and `insert_with_ttl`
//! precondition checks even before the background cleanup task has
//! physically removed it. Consumers never need to race the cleaner.
//!
//! # Error Handling
//!
//! All operations return [`StorageResult<T>`], which wraps potential
//! [`StorageError`] variants. Backends map their internal errors to
//! these standardized error types.

#![deny(unsafe_code)]

pub mod error;
pub mod memory;
pub mod store;
pub mod types;

pub use error::{BoxError, StorageError, StorageResult};
pub use memory::MemoryStore;
pub use store::KeyValueStore;
pub use types::{prefix_range, IdentityId, KeyValue};
