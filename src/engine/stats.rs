// Cache counters — how requests were answered and how much was read from disk.

use std::sync::atomic::{AtomicU64, Ordering};

/// How a single resolve was answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitKind {
    /// Assembled from one or more cached chunks.
    Pieces,
    /// Sliced from a single covering chunk.
    Covering,
    /// Read from the source.
    Miss,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatsSnapshot {
    pub requests: u64,
    pub piece_hits: u64,
    pub covering_hits: u64,
    pub misses: u64,
    pub fetched_vectors: u64,
    pub served_vectors: u64,
    pub hit_rate: f64,
}

#[derive(Default)]
pub struct CacheStats {
    piece_hits: AtomicU64,
    covering_hits: AtomicU64,
    misses: AtomicU64,
    fetched_vectors: AtomicU64,
    served_vectors: AtomicU64,
}

impl CacheStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an answered request of `vectors` vectors.
    pub fn record(&self, kind: HitKind, vectors: usize) {
        let counter = match kind {
            HitKind::Pieces => &self.piece_hits,
            HitKind::Covering => &self.covering_hits,
            HitKind::Miss => &self.misses,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        if kind == HitKind::Miss {
            self.fetched_vectors
                .fetch_add(vectors as u64, Ordering::Relaxed);
        }
        self.served_vectors
            .fetch_add(vectors as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let piece_hits = self.piece_hits.load(Ordering::Relaxed);
        let covering_hits = self.covering_hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let requests = piece_hits + covering_hits + misses;
        let hit_rate = if requests > 0 {
            (piece_hits + covering_hits) as f64 / requests as f64
        } else {
            0.0
        };

        StatsSnapshot {
            requests,
            piece_hits,
            covering_hits,
            misses,
            fetched_vectors: self.fetched_vectors.load(Ordering::Relaxed),
            served_vectors: self.served_vectors.load(Ordering::Relaxed),
            hit_rate,
        }
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}
