// Range and chunk value types shared by the store and the cache.

use std::sync::Arc;

use super::reclaim::Reclaimable;
use crate::error::CacheError;

/// One dense vector. Immutable and cheaply shared between chunks and answers.
pub type Vector = Arc<[f64]>;

/// The vectors of one chunk, in index order.
pub type Payload = Arc<[Vector]>;

/// A validated inclusive index interval `[from, to]` of one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VectorRange {
    file_key: String,
    from: usize,
    to: usize,
}

impl VectorRange {
    /// Validate raw request indices. Rejects `from > to` and negative indices.
    pub fn new(file_key: &str, from: i64, to: i64) -> Result<Self, CacheError> {
        if from > to || from < 0 {
            return Err(CacheError::InvalidRange { from, to });
        }
        Ok(Self {
            file_key: file_key.to_string(),
            from: from as usize,
            to: to as usize,
        })
    }

    pub fn file_key(&self) -> &str {
        &self.file_key
    }

    pub fn from(&self) -> usize {
        self.from
    }

    pub fn to(&self) -> usize {
        self.to
    }

    /// Number of vectors in the range.
    pub fn len(&self) -> usize {
        self.to - self.from + 1
    }
}

/// A previously fetched run of vectors. Coordinates outlive the payload: once the
/// payload is reclaimed the chunk is a ghost until a fresh read replaces it.
pub struct Chunk {
    from: usize,
    to: usize,
    payload: Reclaimable,
}

impl Chunk {
    pub fn new(from: usize, to: usize, payload: Reclaimable) -> Self {
        debug_assert!(from <= to);
        Self { from, to, payload }
    }

    pub fn from(&self) -> usize {
        self.from
    }

    pub fn to(&self) -> usize {
        self.to
    }

    /// The live payload, or `None` if it has been reclaimed.
    pub fn payload(&self) -> Option<Payload> {
        self.payload.get()
    }

    pub fn handle(&self) -> &Reclaimable {
        &self.payload
    }

    /// Whether the chunk's coordinates contain all of `[from, to]`.
    pub fn covers(&self, from: usize, to: usize) -> bool {
        self.from <= from && self.to >= to
    }

    pub fn has_span(&self, from: usize, to: usize) -> bool {
        self.from == from && self.to == to
    }

    /// Element count of the live payload; 0 for a ghost.
    pub fn live_len(&self) -> usize {
        self.payload().map_or(0, |p| p.len())
    }
}

/// Per-chunk entry of a stats answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkStat {
    pub from: usize,
    pub to: usize,
    pub live: usize,
}
