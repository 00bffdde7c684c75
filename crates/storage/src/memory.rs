//! In-memory store implementation.
//!
//! This module provides [`MemoryStore`], the in-memory implementation of
//! [`KeyValueStore`]. It is the authoritative store for single-process
//! deployments and the backend every test runs against.
//!
//! # Features
//!
//! - **Thread-safe**: Uses [`parking_lot::RwLock`] for concurrent access
//! - **Ordered storage**: Keys live in a [`BTreeMap`] for efficient prefix scans
//! - **TTL support**: Expired keys are logically absent immediately; a background task removes
//!   them physically every second
//! - **Atomic claim primitives**: `insert_with_ttl` and `take` execute under a single write lock
//!
//! # Limitations
//!
//! - Data is not persisted; all data is lost when the process exits
//! - Physical TTL cleanup runs every second, so removal timing is not precise (logical expiry is)

use std::{
    collections::BTreeMap,
    ops::Range,
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use tokio::{select, sync::watch, time::sleep};

use crate::{
    error::{StorageError, StorageResult},
    store::KeyValueStore,
    types::KeyValue,
};

/// Holds the shutdown signal sender. When dropped, the watch channel
/// closes and the cleanup task exits.
struct ShutdownGuard {
    shutdown_tx: watch::Sender<()>,
}

impl Drop for ShutdownGuard {
    fn drop(&mut self) {
        // Sending is a best-effort signal; the receiver may already be gone.
        let _ = self.shutdown_tx.send(());
    }
}

/// In-memory key-value store using [`BTreeMap`].
///
/// # Cloning
///
/// `MemoryStore` is cheaply cloneable via [`Arc`]. All clones share the
/// same underlying data.
///
/// # Shutdown
///
/// The background TTL cleanup task stops automatically when all clones
/// are dropped (via the internal `ShutdownGuard`). Call
/// [`shutdown`](Self::shutdown) to stop it explicitly when tests need
/// deterministic timing.
#[derive(Clone)]
pub struct MemoryStore {
    data: Arc<RwLock<BTreeMap<Vec<u8>, Bytes>>>,
    ttl_data: Arc<RwLock<BTreeMap<Vec<u8>, Instant>>>,
    /// Shared ownership of the shutdown sender. When the last clone drops,
    /// the sender is dropped, which closes the watch channel and signals
    /// the cleanup task to exit.
    shutdown_guard: Arc<ShutdownGuard>,
}

impl MemoryStore {
    /// Creates a new in-memory store.
    ///
    /// Spawns a background task that periodically removes keys whose TTL
    /// has elapsed. The task stops automatically when all clones of the
    /// store are dropped.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new() -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(());
        let store = Self {
            data: Arc::new(RwLock::new(BTreeMap::new())),
            ttl_data: Arc::new(RwLock::new(BTreeMap::new())),
            shutdown_guard: Arc::new(ShutdownGuard { shutdown_tx }),
        };

        let store_clone = store.clone();
        tokio::spawn(async move {
            store_clone.cleanup_expired_keys(shutdown_rx).await;
        });

        store
    }

    /// Background task that physically removes expired keys.
    ///
    /// Runs every second. Exits when the shutdown signal is received
    /// (i.e., when the watch sender is dropped or [`shutdown`](Self::shutdown)
    /// is called). Logical expiry does not depend on this task.
    async fn cleanup_expired_keys(&self, mut shutdown_rx: watch::Receiver<()>) {
        loop {
            select! {
                _ = sleep(Duration::from_secs(1)) => {}
                _ = shutdown_rx.changed() => {
                    return;
                }
            }

            let now = Instant::now();
            let mut expired_keys = Vec::new();

            {
                let ttl_guard = self.ttl_data.read();
                for (key, expiry) in ttl_guard.iter() {
                    if *expiry <= now {
                        expired_keys.push(key.clone());
                    }
                }
            }

            if !expired_keys.is_empty() {
                let mut data_guard = self.data.write();
                let mut ttl_guard = self.ttl_data.write();
                for key in expired_keys {
                    data_guard.remove(&key);
                    ttl_guard.remove(&key);
                }
            }
        }
    }

    /// Explicitly signals the background TTL cleanup task to stop.
    ///
    /// Optional — the task also stops when all clones are dropped.
    pub fn shutdown(&self) {
        let _ = self.shutdown_guard.shutdown_tx.send(());
    }

    /// Checks if a key has expired.
    fn is_expired(&self, key: &[u8]) -> bool {
        let ttl_guard = self.ttl_data.read();
        if let Some(expiry) = ttl_guard.get(key) {
            return *expiry <= Instant::now();
        }
        false
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &[u8]) -> StorageResult<Option<Bytes>> {
        if self.is_expired(key) {
            return Ok(None);
        }

        let data = self.data.read();
        Ok(data.get(key).cloned())
    }

    async fn set(&self, key: Vec<u8>, value: Vec<u8>) -> StorageResult<()> {
        let mut data = self.data.write();
        let mut ttl_guard = self.ttl_data.write();

        data.insert(key.clone(), Bytes::from(value));
        // set without TTL clears any existing TTL
        ttl_guard.remove(&key);

        Ok(())
    }

    async fn set_with_ttl(&self, key: Vec<u8>, value: Vec<u8>, ttl: Duration) -> StorageResult<()> {
        let mut data = self.data.write();
        let mut ttl_data = self.ttl_data.write();

        let expiry = Instant::now() + ttl;

        data.insert(key.clone(), Bytes::from(value));
        ttl_data.insert(key, expiry);

        Ok(())
    }

    async fn insert_with_ttl(
        &self,
        key: Vec<u8>,
        value: Vec<u8>,
        ttl: Duration,
    ) -> StorageResult<()> {
        let mut data = self.data.write();
        let mut ttl_data = self.ttl_data.write();

        let now = Instant::now();
        let occupied = match (data.get(&key), ttl_data.get(&key)) {
            (Some(_), Some(expiry)) => *expiry > now,
            (Some(_), None) => true,
            _ => false,
        };

        if occupied {
            return Err(StorageError::Conflict);
        }

        data.insert(key.clone(), Bytes::from(value));
        ttl_data.insert(key, now + ttl);

        Ok(())
    }

    async fn take(&self, key: &[u8]) -> StorageResult<Option<Bytes>> {
        let mut data = self.data.write();
        let mut ttl_data = self.ttl_data.write();

        let expired = ttl_data.get(key).is_some_and(|expiry| *expiry <= Instant::now());

        let previous = data.remove(key);
        ttl_data.remove(key);

        // An expired value is logically absent even if still present physically.
        Ok(if expired { None } else { previous })
    }

    async fn delete(&self, key: &[u8]) -> StorageResult<()> {
        let mut data = self.data.write();
        let mut ttl_guard = self.ttl_data.write();

        data.remove(key);
        ttl_guard.remove(key);

        Ok(())
    }

    async fn get_range(&self, range: Range<Vec<u8>>) -> StorageResult<Vec<KeyValue>> {
        let data = self.data.read();

        let results: Vec<KeyValue> = data
            .range(range)
            .filter(|(key, _)| !self.is_expired(key))
            .map(|(k, v)| KeyValue::new(Bytes::copy_from_slice(k), v.clone()))
            .collect();

        Ok(results)
    }

    async fn clear_range(&self, range: Range<Vec<u8>>) -> StorageResult<()> {
        // Phase 1: Collect keys to remove under a read lock, allowing
        // concurrent reads and writes to proceed during the scan.
        let keys_to_remove: Vec<Vec<u8>> = {
            let data = self.data.read();
            data.range(range).map(|(k, _)| k.clone()).collect()
        };

        if keys_to_remove.is_empty() {
            return Ok(());
        }

        // Phase 2: Acquire both write locks in a fixed order (data → ttl_data)
        // and batch-remove all keys in a single critical section.
        let mut data = self.data.write();
        let mut ttl_guard = self.ttl_data.write();
        for key in &keys_to_remove {
            data.remove(key);
            ttl_guard.remove(key);
        }

        Ok(())
    }

    async fn health_check(&self) -> StorageResult<()> {
        // Try to acquire read lock to verify we're not deadlocked
        let _unused = self.data.read();
        Ok(())
    }
}
