// Reclaimable payload handles backed by a byte-budgeted LRU pool.
//
// Chunks only hold weak handles. The pool owns the strong references and drops
// the least recently used ones once the resident size exceeds its budget, at
// which point the matching chunks turn into ghosts.

use std::mem::size_of;
use std::sync::{Arc, Weak};

use lru::LruCache;
use parking_lot::Mutex;
use tracing::debug;

use super::chunk::{Payload, Vector};

/// Weak handle to a pooled payload.
#[derive(Clone)]
pub struct Reclaimable {
    id: u64,
    payload: Weak<[Vector]>,
}

impl Reclaimable {
    /// The payload if it is still resident (or still held by a reader).
    pub fn get(&self) -> Option<Payload> {
        self.payload.upgrade()
    }

    pub fn is_live(&self) -> bool {
        self.payload.strong_count() > 0
    }
}

struct PoolInner {
    entries: LruCache<u64, Payload>,
    resident_bytes: usize,
    next_id: u64,
}

pub struct PayloadPool {
    inner: Mutex<PoolInner>,
    budget_bytes: usize,
}

impl PayloadPool {
    pub fn new(budget_bytes: usize) -> Self {
        Self {
            inner: Mutex::new(PoolInner {
                entries: LruCache::unbounded(),
                resident_bytes: 0,
                next_id: 0,
            }),
            budget_bytes,
        }
    }

    /// Take ownership of a freshly read payload and hand back a weak handle.
    ///
    /// Older payloads are evicted until the pool fits its budget again. The
    /// payload being admitted is never evicted by its own admission.
    pub fn admit(&self, payload: Payload) -> Reclaimable {
        let weight = payload_bytes(&payload);
        let weak = Arc::downgrade(&payload);

        let mut inner = self.inner.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.entries.push(id, payload);
        inner.resident_bytes += weight;

        while inner.resident_bytes > self.budget_bytes && inner.entries.len() > 1 {
            match inner.entries.pop_lru() {
                Some((evicted, old)) => {
                    inner.resident_bytes -= payload_bytes(&old);
                    debug!("reclaimed payload {} ({} vectors)", evicted, old.len());
                }
                None => break,
            }
        }

        Reclaimable { id, payload: weak }
    }

    /// Mark a payload as recently used.
    pub fn touch(&self, handle: &Reclaimable) {
        let mut inner = self.inner.lock();
        inner.entries.promote(&handle.id);
    }

    /// Drop every resident payload, as under severe memory pressure.
    pub fn reclaim_all(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.resident_bytes = 0;
    }

    /// Reclaim least recently used payloads until at most `target_bytes` remain.
    pub fn shrink_to(&self, target_bytes: usize) {
        let mut inner = self.inner.lock();
        while inner.resident_bytes > target_bytes {
            match inner.entries.pop_lru() {
                Some((_, old)) => inner.resident_bytes -= payload_bytes(&old),
                None => break,
            }
        }
    }

    pub fn resident_bytes(&self) -> usize {
        self.inner.lock().resident_bytes
    }

    pub fn resident_payloads(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn budget_bytes(&self) -> usize {
        self.budget_bytes
    }
}

impl Default for PayloadPool {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_CACHE_BUDGET_BYTES)
    }
}

fn payload_bytes(payload: &[Vector]) -> usize {
    payload
        .iter()
        .map(|v| v.len() * size_of::<f64>())
        .sum::<usize>()
        .max(1)
}
