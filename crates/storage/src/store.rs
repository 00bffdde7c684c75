//! Key-value store trait definition.
//!
//! This module defines the [`KeyValueStore`] trait, the core storage
//! abstraction in sudogate. The store is deliberately narrow: keys and
//! values are bytes, per-key TTL is first-class, and the only atomic
//! primitives are the two the grant lifecycle actually needs —
//! insert-if-absent ([`insert_with_ttl`](KeyValueStore::insert_with_ttl))
//! and remove-and-return ([`take`](KeyValueStore::take)).
//!
//! Domain logic (grants, scheduled jobs, configuration) lives in
//! `sudogate-core` on top of this trait, not in the backends.

use std::{ops::Range, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;

use crate::{error::StorageResult, types::KeyValue};

/// Abstract key-value store with per-key time-to-live.
///
/// Implementations must be thread-safe (`Send + Sync`) and support
/// concurrent operations. A key whose TTL has elapsed is **guaranteed
/// absent** from every read path, even if physical cleanup has not yet
/// run — this is the defense-in-depth layer the grant lifecycle relies
/// on.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Retrieves a value by key.
    ///
    /// Returns `Ok(None)` if the key does not exist or has expired.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn get(&self, key: &[u8]) -> StorageResult<Option<Bytes>>;

    /// Stores a key-value pair without expiry.
    ///
    /// If the key already exists, its value is overwritten and any
    /// existing TTL is cleared (the key becomes non-expiring).
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn set(&self, key: Vec<u8>, value: Vec<u8>) -> StorageResult<()>;

    /// Stores a key-value pair that expires after `ttl`.
    ///
    /// The key is logically absent from all reads once `ttl` elapses;
    /// physical removal may lag behind (background cleanup).
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn set_with_ttl(&self, key: Vec<u8>, value: Vec<u8>, ttl: Duration) -> StorageResult<()>;

    /// Atomically inserts a key-value pair with a TTL, failing if the
    /// key already holds an unexpired value.
    ///
    /// This is the insert-if-absent primitive used for token collision
    /// safety: with 256-bit tokens a collision is negligible, but if one
    /// ever occurs the store rejects the second write with
    /// [`Conflict`](crate::StorageError::Conflict) instead of silently
    /// overwriting an active grant.
    ///
    /// An expired (but not yet cleaned) key counts as absent.
    #[must_use = "insert may fail with a conflict and errors must be handled"]
    async fn insert_with_ttl(
        &self,
        key: Vec<u8>,
        value: Vec<u8>,
        ttl: Duration,
    ) -> StorageResult<()>;

    /// Atomically removes a key and returns its previous value.
    ///
    /// Returns `Ok(None)` if the key was absent or expired. When two
    /// callers race on the same key, exactly one observes `Some` — this
    /// is the claim primitive the scheduler uses to guarantee a job
    /// fires at most once.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn take(&self, key: &[u8]) -> StorageResult<Option<Bytes>>;

    /// Deletes a key.
    ///
    /// If the key doesn't exist, this is a no-op (returns `Ok(())`).
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn delete(&self, key: &[u8]) -> StorageResult<()>;

    /// Retrieves all unexpired key-value pairs within a half-open key
    /// range, in key order.
    ///
    /// Pair with [`prefix_range`](crate::prefix_range) for prefix scans.
    /// The range is kept concrete (rather than generic over
    /// [`std::ops::RangeBounds`]) so the trait stays object-safe —
    /// consumers hold `Arc<dyn KeyValueStore>`.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn get_range(&self, range: Range<Vec<u8>>) -> StorageResult<Vec<KeyValue>>;

    /// Deletes all keys within a half-open key range.
    ///
    /// Uses the same range semantics as [`get_range`](Self::get_range).
    /// Safe to call on an empty range.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn clear_range(&self, range: Range<Vec<u8>>) -> StorageResult<()>;

    /// Checks that the store is responsive.
    #[must_use = "health check results indicate backend availability and must be inspected"]
    async fn health_check(&self) -> StorageResult<()>;
}
