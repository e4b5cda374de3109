use crate::engine::chunk::Vector;
use crate::error::CacheError;

/// Destination for vectors delivered straight to a client.
pub trait VectorSink {
    fn send(&mut self, vectors: &[Vector]) -> Result<(), CacheError>;
}

/// Reads index ranges of vectors out of files.
pub trait RangeFetcher: Send + Sync {
    /// Vectors `[from, to]` of `file_key`, in index order.
    fn fetch(&self, file_key: &str, from: usize, to: usize) -> Result<Vec<Vector>, CacheError>;

    /// Like [`fetch`](Self::fetch), but also delivers the vectors to `sink`.
    /// The vectors are still returned so the caller can cache them.
    fn fetch_and_stream(
        &self,
        file_key: &str,
        from: usize,
        to: usize,
        sink: &mut dyn VectorSink,
    ) -> Result<Vec<Vector>, CacheError> {
        let vectors = self.fetch(file_key, from, to)?;
        sink.send(&vectors)?;
        Ok(vectors)
    }
}
