// Range cache — answers index-range requests from previously fetched chunks and
// falls back to the source on a miss.

use std::sync::Arc;

use tracing::debug;

use super::chunk::{Chunk, ChunkStat, Payload, Vector, VectorRange};
use super::lock::{LockRegistry, RangeLock, SharedGuard};
use super::reclaim::PayloadPool;
use super::stats::{CacheStats, HitKind};
use super::store::ChunkStore;
use crate::error::CacheError;

/// What the miss callback produced.
pub struct Fetched {
    pub vectors: Vec<Vector>,
    /// The callback already delivered `vectors` to the client.
    pub streamed: bool,
}

impl Fetched {
    pub fn data(vectors: Vec<Vector>) -> Self {
        Self {
            vectors,
            streamed: false,
        }
    }

    pub fn streamed(vectors: Vec<Vector>) -> Self {
        Self {
            vectors,
            streamed: true,
        }
    }
}

#[derive(Debug)]
pub enum Resolved {
    /// The requested vectors, in index order.
    Data(Vec<Vector>),
    /// A miss whose answer was already streamed to the client.
    Streamed,
}

/// `None` until the first request for the file has set up its store.
type FileSlot = Option<ChunkStore>;

enum Covering {
    Live(Vec<Vector>),
    Stale { from: usize, to: usize },
    Absent,
}

pub struct RangeCache {
    files: LockRegistry<FileSlot>,
    pool: PayloadPool,
    stats: CacheStats,
}

impl RangeCache {
    pub fn new(pool: PayloadPool) -> Self {
        Self {
            files: LockRegistry::new(),
            pool,
            stats: CacheStats::new(),
        }
    }

    pub fn with_budget(budget_bytes: usize) -> Self {
        Self::new(PayloadPool::new(budget_bytes))
    }

    /// Return vectors `[from, to]` of `file_key`.
    ///
    /// Cached chunks are tried first, both stitched together piecewise and as a
    /// single covering chunk. Otherwise `on_miss` is called exactly once while the
    /// file's exclusive lock is held, and its result is cached.
    pub fn resolve<F>(
        &self,
        file_key: &str,
        from: i64,
        to: i64,
        on_miss: F,
    ) -> Result<Resolved, CacheError>
    where
        F: FnOnce(&VectorRange) -> Result<Fetched, CacheError>,
    {
        let range = VectorRange::new(file_key, from, to)?;
        let lock = self.files.get_or_create(file_key);

        let shared = self.shared_store(&lock);
        let chunks = scan(&shared);

        if let Some(vectors) = self.assemble(chunks, &range) {
            shared.release();
            debug!("{} [{}, {}] assembled from cache", file_key, from, to);
            self.stats.record(HitKind::Pieces, vectors.len());
            return Ok(Resolved::Data(vectors));
        }

        let stale = match self.find_covering(chunks, &range) {
            Covering::Live(vectors) => {
                shared.release();
                self.stats.record(HitKind::Covering, vectors.len());
                return Ok(Resolved::Data(vectors));
            }
            Covering::Stale { from, to } => Some((from, to)),
            Covering::Absent => None,
        };
        shared.release();

        self.fetch_exclusive(&lock, &range, stale, on_miss)
    }

    /// Per-chunk coordinates and live counts for `file_key`, in scan order.
    pub fn stats(&self, file_key: &str) -> Vec<ChunkStat> {
        let Some(lock) = self.files.get(file_key) else {
            return Vec::new();
        };
        let shared = lock.shared();
        match &*shared {
            Some(store) => store.stats(),
            None => Vec::new(),
        }
    }

    pub fn pool(&self) -> &PayloadPool {
        &self.pool
    }

    pub fn counters(&self) -> &CacheStats {
        &self.stats
    }

    /// Whether any request has ever touched `file_key`.
    pub fn is_tracked(&self, file_key: &str) -> bool {
        self.files.contains(file_key)
    }

    pub fn tracked_files(&self) -> usize {
        self.files.len()
    }

    /// Shared access to the file's store, creating the store on first use.
    fn shared_store<'a>(&self, lock: &'a RangeLock<FileSlot>) -> SharedGuard<'a, FileSlot> {
        let shared = lock.shared();
        if shared.is_some() {
            return shared;
        }
        shared.release();

        {
            let mut exclusive = lock.exclusive();
            if exclusive.is_none() {
                debug!("creating chunk store for {}", lock.name());
                *exclusive = Some(ChunkStore::new());
            }
        }

        lock.shared()
    }

    /// Stitch the range together from every live chunk that overlaps it. For an
    /// index covered by several chunks, the earliest chunk in scan order wins.
    fn assemble(&self, chunks: &[Chunk], range: &VectorRange) -> Option<Vec<Vector>> {
        let live: Vec<(&Chunk, Payload)> = chunks
            .iter()
            .filter(|c| c.from() <= range.to() && c.to() >= range.from())
            .filter_map(|c| c.payload().map(|p| (c, p)))
            .collect();

        // The overlaps can't add up to the range, so some index is missing.
        let overlap: usize = live
            .iter()
            .map(|(c, _)| c.to().min(range.to()) - c.from().max(range.from()) + 1)
            .sum();
        if overlap < range.len() {
            return None;
        }

        let mut slots: Vec<Option<Vector>> = vec![None; range.len()];
        let mut filled = 0;
        for (chunk, payload) in &live {
            let lo = chunk.from().max(range.from());
            let hi = chunk.to().min(range.to());
            for index in lo..=hi {
                let slot = &mut slots[index - range.from()];
                if slot.is_some() {
                    continue;
                }
                if let Some(vector) = payload.get(index - chunk.from()) {
                    *slot = Some(Arc::clone(vector));
                    filled += 1;
                }
            }
            self.pool.touch(chunk.handle());
            if filled == range.len() {
                break;
            }
        }

        slots.into_iter().collect()
    }

    fn find_covering(&self, chunks: &[Chunk], range: &VectorRange) -> Covering {
        let mut stale = None;
        for chunk in chunks {
            if !chunk.covers(range.from(), range.to()) {
                continue;
            }
            if let Some(vectors) = self.slice(chunk, range) {
                return Covering::Live(vectors);
            }
            if stale.is_none() {
                stale = Some(Covering::Stale {
                    from: chunk.from(),
                    to: chunk.to(),
                });
            }
        }
        stale.unwrap_or(Covering::Absent)
    }

    /// The requested sub-range of a covering chunk, if its payload is still live.
    fn slice(&self, chunk: &Chunk, range: &VectorRange) -> Option<Vec<Vector>> {
        let payload = chunk.payload()?;
        let start = range.from() - chunk.from();
        let end = range.to() - chunk.from();
        let vectors = payload.get(start..=end)?.to_vec();
        self.pool.touch(chunk.handle());
        Some(vectors)
    }

    /// Miss path. Runs entirely under the exclusive lock so that identical
    /// concurrent misses read from the source once.
    fn fetch_exclusive<F>(
        &self,
        lock: &RangeLock<FileSlot>,
        range: &VectorRange,
        stale: Option<(usize, usize)>,
        on_miss: F,
    ) -> Result<Resolved, CacheError>
    where
        F: FnOnce(&VectorRange) -> Result<Fetched, CacheError>,
    {
        let mut exclusive = lock.exclusive();
        let store = exclusive.get_or_insert_with(ChunkStore::new);

        // Someone may have fetched or refreshed the range while we were unlocked.
        let refreshed = store
            .scan()
            .iter()
            .filter(|c| c.covers(range.from(), range.to()))
            .find_map(|c| self.slice(c, range));
        if let Some(vectors) = refreshed {
            exclusive.release();
            debug!(
                "{} [{}, {}] filled by a concurrent read",
                range.file_key(),
                range.from(),
                range.to()
            );
            self.stats.record(HitKind::Covering, vectors.len());
            return Ok(Resolved::Data(vectors));
        }

        let replace_at = store.scan().iter().position(|c| {
            c.covers(range.from(), range.to())
                && !c.handle().is_live()
                && stale.map_or(true, |(from, to)| c.has_span(from, to))
        });
        if let Some(index) = replace_at {
            let ghost = store.remove_at(index);
            debug!(
                "dropping reclaimed chunk {} [{}, {}]",
                range.file_key(),
                ghost.from(),
                ghost.to()
            );
        }

        debug!(
            "{} [{}, {}] reading from source",
            range.file_key(),
            range.from(),
            range.to()
        );
        let fetched = on_miss(range)?;
        if fetched.vectors.len() != range.len() {
            return Err(CacheError::fetch(
                range.file_key(),
                format!(
                    "source returned {} vectors for a range of {}",
                    fetched.vectors.len(),
                    range.len()
                ),
            ));
        }

        let streamed = fetched.streamed;
        let payload: Payload = fetched.vectors.into();
        let chunk = Chunk::new(
            range.from(),
            range.to(),
            self.pool.admit(Arc::clone(&payload)),
        );
        match replace_at {
            Some(index) => store.insert_at(index, chunk),
            None => store.append(chunk),
        }
        self.stats.record(HitKind::Miss, payload.len());
        exclusive.release();

        if streamed {
            Ok(Resolved::Streamed)
        } else {
            Ok(Resolved::Data(payload.to_vec()))
        }
    }
}

impl Default for RangeCache {
    fn default() -> Self {
        Self::new(PayloadPool::default())
    }
}

fn scan(slot: &FileSlot) -> &[Chunk] {
    match slot {
        Some(store) => store.scan(),
        None => &[],
    }
}
