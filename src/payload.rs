//! Revocable references to compressed output.
//!
//! A [`PayloadStore`] plays the part of a browser object-URL registry: bytes
//! go in, an opaque [`PayloadHandle`] comes out, and the bytes stay
//! retrievable until the handle is revoked. Handles revoke themselves on
//! drop, so every exit path releases the payload exactly once.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PayloadId(u64);

impl fmt::Display for PayloadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "blob:{}", self.0)
    }
}

#[derive(Default)]
struct StoreInner {
    next_id: AtomicU64,
    revoked: AtomicU64,
    blobs: Mutex<HashMap<PayloadId, Arc<[u8]>>>,
}

#[derive(Clone, Default)]
pub struct PayloadStore {
    inner: Arc<StoreInner>,
}

impl PayloadStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, bytes: Vec<u8>) -> PayloadHandle {
        let id = PayloadId(self.inner.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        self.blobs().insert(id, bytes.into());
        log::debug!("created payload {}", id);
        PayloadHandle {
            id,
            store: self.clone(),
            released: false,
        }
    }

    /// Bytes behind `id`, or `None` once it has been revoked.
    pub fn fetch(&self, id: PayloadId) -> Option<Arc<[u8]>> {
        self.blobs().get(&id).cloned()
    }

    pub fn live_count(&self) -> usize {
        self.blobs().len()
    }

    /// How many payloads have been revoked over the store's lifetime.
    pub fn revoked_count(&self) -> u64 {
        self.inner.revoked.load(Ordering::Relaxed)
    }

    fn revoke(&self, id: PayloadId) -> bool {
        let removed = self.blobs().remove(&id).is_some();
        if removed {
            self.inner.revoked.fetch_add(1, Ordering::Relaxed);
            log::debug!("revoked payload {}", id);
        }
        removed
    }

    fn blobs(&self) -> MutexGuard<'_, HashMap<PayloadId, Arc<[u8]>>> {
        match self.inner.blobs.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl fmt::Debug for PayloadStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PayloadStore")
            .field("live", &self.live_count())
            .field("revoked", &self.revoked_count())
            .finish()
    }
}

/// Exclusive owner of one stored payload. Not `Clone`.
#[derive(Debug)]
pub struct PayloadHandle {
    id: PayloadId,
    store: PayloadStore,
    released: bool,
}

impl PayloadHandle {
    pub fn id(&self) -> PayloadId {
        self.id
    }

    pub fn bytes(&self) -> Option<Arc<[u8]>> {
        self.store.fetch(self.id)
    }

    pub fn len(&self) -> usize {
        self.bytes().map(|b| b.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Revokes the payload now instead of on drop.
    pub fn release(mut self) {
        self.release_once();
    }

    fn release_once(&mut self) {
        if !self.released {
            self.released = true;
            self.store.revoke(self.id);
        }
    }
}

impl Drop for PayloadHandle {
    fn drop(&mut self) {
        self.release_once();
    }
}
