use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use ma_vector_cache::engine::cache::{Fetched, RangeCache, Resolved};
use ma_vector_cache::engine::chunk::{ChunkStat, Vector, VectorRange};
use ma_vector_cache::error::CacheError;
use ma_vector_cache::source::traits::{RangeFetcher, VectorSink};

/// Fake source: vector `i` is `[i, generation]`, where `generation` counts fetches.
#[derive(Default)]
struct CountingSource {
    fetches: AtomicUsize,
    delay: Option<Duration>,
}

impl CountingSource {
    fn slow(delay: Duration) -> Self {
        Self {
            fetches: AtomicUsize::new(0),
            delay: Some(delay),
        }
    }

    fn fetch(&self, range: &VectorRange) -> Result<Fetched, CacheError> {
        let generation = self.fetches.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(delay) = self.delay {
            thread::sleep(delay);
        }
        let vectors = (range.from()..=range.to())
            .map(|i| Vector::from(vec![i as f64, generation as f64]))
            .collect();
        Ok(Fetched::data(vectors))
    }

    fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

fn resolve(cache: &RangeCache, source: &CountingSource, file: &str, from: i64, to: i64) -> Vec<Vector> {
    match cache.resolve(file, from, to, |range| source.fetch(range)) {
        Ok(Resolved::Data(vectors)) => vectors,
        other => panic!("expected data, got {:?}", other),
    }
}

fn indices(vectors: &[Vector]) -> Vec<f64> {
    vectors.iter().map(|v| v[0]).collect()
}

fn generations(vectors: &[Vector]) -> Vec<f64> {
    vectors.iter().map(|v| v[1]).collect()
}

#[test]
fn test_concurrent_identical_misses_fetch_once() {
    let cache = Arc::new(RangeCache::default());
    let source = Arc::new(CountingSource::slow(Duration::from_millis(50)));
    let threads = 16;
    let barrier = Arc::new(Barrier::new(threads));

    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let cache = Arc::clone(&cache);
            let source = Arc::clone(&source);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                resolve(&cache, &source, "data.txt", 100, 199)
            })
        })
        .collect();

    for handle in handles {
        let vectors = handle.join().unwrap();
        assert_eq!(vectors.len(), 100);
        assert_eq!(vectors[0][0], 100.0);
        assert!(generations(&vectors).iter().all(|g| *g == 1.0));
    }
    assert_eq!(source.fetches(), 1);
    assert_eq!(cache.stats("data.txt").len(), 1);
}

#[test]
fn test_adjacent_chunks_reconstruct_without_fetch() {
    let cache = RangeCache::default();
    let source = CountingSource::default();
    resolve(&cache, &source, "data.txt", 0, 4);
    resolve(&cache, &source, "data.txt", 5, 9);
    assert_eq!(source.fetches(), 2);

    let vectors = resolve(&cache, &source, "data.txt", 0, 9);
    assert_eq!(indices(&vectors), (0..10).map(|i| i as f64).collect::<Vec<_>>());
    assert_eq!(source.fetches(), 2);
}

#[test]
fn test_partial_overlap_first_chunk_wins() {
    let cache = RangeCache::default();
    let source = CountingSource::default();
    resolve(&cache, &source, "data.txt", 0, 5);
    // [3, 9] is not fully cached yet, so this is a fetch of its own.
    resolve(&cache, &source, "data.txt", 3, 9);
    assert_eq!(source.fetches(), 2);

    let vectors = resolve(&cache, &source, "data.txt", 2, 7);
    assert_eq!(source.fetches(), 2);
    assert_eq!(indices(&vectors), vec![2.0, 3.0, 4.0, 5.0, 6.0, 7.0]);
    // Indices 2-5 come from the first chunk even though the second covers 3-5 too.
    assert_eq!(generations(&vectors), vec![1.0, 1.0, 1.0, 1.0, 2.0, 2.0]);
}

#[test]
fn test_reclaimed_covering_chunk_is_refetched_and_replaced() {
    let cache = RangeCache::default();
    let source = CountingSource::default();
    resolve(&cache, &source, "data.txt", 0, 9);
    cache.pool().reclaim_all();
    assert_eq!(cache.stats("data.txt"), vec![ChunkStat { from: 0, to: 9, live: 0 }]);

    let vectors = resolve(&cache, &source, "data.txt", 2, 5);
    assert_eq!(source.fetches(), 2);
    assert_eq!(indices(&vectors), vec![2.0, 3.0, 4.0, 5.0]);
    assert_eq!(generations(&vectors), vec![2.0; 4]);
    assert_eq!(cache.stats("data.txt"), vec![ChunkStat { from: 2, to: 5, live: 4 }]);
}

#[test]
fn test_reclaimed_chunk_keeps_scan_position() {
    let cache = RangeCache::default();
    let source = CountingSource::default();
    resolve(&cache, &source, "data.txt", 0, 9);
    resolve(&cache, &source, "data.txt", 20, 29);
    cache.pool().reclaim_all();

    resolve(&cache, &source, "data.txt", 0, 9);
    let spans: Vec<_> = cache.stats("data.txt").iter().map(|s| (s.from, s.to, s.live)).collect();
    assert_eq!(spans, vec![(0, 9, 10), (20, 29, 0)]);
}

#[test]
fn test_cold_miss_then_warm_hit() {
    let cache = RangeCache::default();
    let source = CountingSource::default();

    let cold = resolve(&cache, &source, "data.txt", 10, 20);
    assert_eq!(source.fetches(), 1);
    assert_eq!(indices(&cold), (10..=20).map(|i| i as f64).collect::<Vec<_>>());

    let warm = resolve(&cache, &source, "data.txt", 10, 20);
    assert_eq!(source.fetches(), 1);
    assert_eq!(warm, cold);

    let inner = resolve(&cache, &source, "data.txt", 12, 14);
    assert_eq!(source.fetches(), 1);
    assert_eq!(indices(&inner), vec![12.0, 13.0, 14.0]);

    let snapshot = cache.counters().snapshot();
    assert_eq!(snapshot.misses, 1);
    assert_eq!(snapshot.requests, 3);
}

#[test]
fn test_invalid_range_touches_nothing() {
    let cache = RangeCache::default();
    let source = CountingSource::default();

    let result = cache.resolve("data.txt", 5, 2, |range| source.fetch(range));
    assert!(matches!(result, Err(CacheError::InvalidRange { from: 5, to: 2 })));
    let result = cache.resolve("data.txt", -1, 2, |range| source.fetch(range));
    assert!(matches!(result, Err(CacheError::InvalidRange { .. })));

    assert_eq!(source.fetches(), 0);
    assert!(!cache.is_tracked("data.txt"));
    assert_eq!(cache.tracked_files(), 0);
}

#[test]
fn test_stats_follow_reclamation() {
    // Each chunk holds 5 two-dimensional vectors = 80 bytes; only one fits.
    let cache = RangeCache::with_budget(100);
    let source = CountingSource::default();
    assert!(cache.stats("data.txt").is_empty());

    resolve(&cache, &source, "data.txt", 0, 4);
    assert_eq!(cache.stats("data.txt"), vec![ChunkStat { from: 0, to: 4, live: 5 }]);

    resolve(&cache, &source, "data.txt", 5, 9);
    assert_eq!(
        cache.stats("data.txt"),
        vec![
            ChunkStat { from: 0, to: 4, live: 0 },
            ChunkStat { from: 5, to: 9, live: 5 },
        ]
    );
}

#[test]
fn test_stats_for_two_live_chunks() {
    let cache = RangeCache::default();
    let source = CountingSource::default();
    resolve(&cache, &source, "data.txt", 0, 4);
    resolve(&cache, &source, "data.txt", 5, 9);
    assert_eq!(
        cache.stats("data.txt"),
        vec![
            ChunkStat { from: 0, to: 4, live: 5 },
            ChunkStat { from: 5, to: 9, live: 5 },
        ]
    );
}

#[test]
fn test_fetch_failure_inserts_nothing_and_releases_lock() {
    let cache = RangeCache::default();
    let result = cache.resolve("data.txt", 0, 9, |range| {
        Err(CacheError::fetch(range.file_key(), "no such file"))
    });
    assert!(matches!(result, Err(CacheError::FetchFailure { .. })));
    assert!(cache.stats("data.txt").is_empty());

    let source = CountingSource::default();
    let vectors = resolve(&cache, &source, "data.txt", 0, 9);
    assert_eq!(vectors.len(), 10);
    assert_eq!(source.fetches(), 1);
}

#[test]
fn test_short_fetch_is_a_failure() {
    let cache = RangeCache::default();
    let result = cache.resolve("data.txt", 0, 9, |_| {
        Ok(Fetched::data(vec![Vector::from(vec![0.0])]))
    });
    assert!(matches!(result, Err(CacheError::FetchFailure { .. })));
    assert!(cache.stats("data.txt").is_empty());
}

#[test]
fn test_streamed_miss_is_cached() {
    let cache = RangeCache::default();
    let source = CountingSource::default();

    let result = cache.resolve("data.txt", 0, 3, |range| {
        source.fetch(range).map(|f| Fetched::streamed(f.vectors))
    });
    assert!(matches!(result, Ok(Resolved::Streamed)));

    let vectors = resolve(&cache, &source, "data.txt", 1, 2);
    assert_eq!(indices(&vectors), vec![1.0, 2.0]);
    assert_eq!(source.fetches(), 1);
}

#[test]
fn test_files_are_cached_independently() {
    let cache = RangeCache::default();
    let source = CountingSource::default();
    resolve(&cache, &source, "a.txt", 0, 4);
    resolve(&cache, &source, "b.txt", 0, 4);
    assert_eq!(source.fetches(), 2);
    assert_eq!(cache.tracked_files(), 2);
    assert!(cache.stats("c.txt").is_empty());
}

#[test]
fn test_concurrent_reads_of_reclaimed_chunk_refetch_once() {
    let cache = Arc::new(RangeCache::default());
    let source = Arc::new(CountingSource::slow(Duration::from_millis(50)));
    resolve(&cache, &source, "data.txt", 0, 9);
    cache.pool().reclaim_all();

    let threads = 8;
    let barrier = Arc::new(Barrier::new(threads));
    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let cache = Arc::clone(&cache);
            let source = Arc::clone(&source);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                resolve(&cache, &source, "data.txt", 2, 5)
            })
        })
        .collect();

    for handle in handles {
        let vectors = handle.join().unwrap();
        assert_eq!(indices(&vectors), vec![2.0, 3.0, 4.0, 5.0]);
        assert_eq!(generations(&vectors), vec![2.0; 4]);
    }
    assert_eq!(source.fetches(), 2);
    assert_eq!(cache.stats("data.txt"), vec![ChunkStat { from: 2, to: 5, live: 4 }]);
}

/// Source whose vector `i` is `[i]`.
struct IndexSource;

impl RangeFetcher for IndexSource {
    fn fetch(&self, _file_key: &str, from: usize, to: usize) -> Result<Vec<Vector>, CacheError> {
        Ok((from..=to).map(|i| Vector::from(vec![i as f64])).collect())
    }
}

/// Sink for a client that has already gone away.
struct ClosedSink;

impl VectorSink for ClosedSink {
    fn send(&mut self, _vectors: &[Vector]) -> Result<(), CacheError> {
        Err(CacheError::Transport("client disconnected".to_string()))
    }
}

#[test]
fn test_transport_failure_on_streamed_miss_releases_lock() {
    let cache = RangeCache::default();
    let result = cache.resolve("data.txt", 0, 4, |range| {
        IndexSource
            .fetch_and_stream(range.file_key(), range.from(), range.to(), &mut ClosedSink)
            .map(Fetched::streamed)
    });
    assert!(matches!(result, Err(CacheError::Transport(_))));
    assert!(cache.stats("data.txt").is_empty());

    // Same thread, same file: a lock left behind would trip the misuse check.
    let source = CountingSource::default();
    let vectors = resolve(&cache, &source, "data.txt", 0, 4);
    assert_eq!(indices(&vectors), vec![0.0, 1.0, 2.0, 3.0, 4.0]);
    assert_eq!(source.fetches(), 1);
}
