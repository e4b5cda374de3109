// Per-file chunk list. Callers hold the file's RangeLock; nothing here locks.

use super::chunk::{Chunk, ChunkStat};

#[derive(Default)]
pub struct ChunkStore {
    chunks: Vec<Chunk>,
}

impl ChunkStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, chunk: Chunk) {
        self.chunks.push(chunk);
    }

    /// Put a chunk at scan position `index`, shifting later chunks back.
    pub fn insert_at(&mut self, index: usize, chunk: Chunk) {
        let index = index.min(self.chunks.len());
        self.chunks.insert(index, chunk);
    }

    pub fn remove_at(&mut self, index: usize) -> Chunk {
        self.chunks.remove(index)
    }

    /// Chunks in insertion order.
    pub fn scan(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn stats(&self) -> Vec<ChunkStat> {
        self.chunks
            .iter()
            .map(|c| ChunkStat {
                from: c.from(),
                to: c.to(),
                live: c.live_len(),
            })
            .collect()
    }
}
