// Vector sources — read index ranges out of files on the local filesystem.

pub mod fvecs_source;
pub mod text_source;
pub mod traits;

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::engine::chunk::Vector;
use crate::error::CacheError;
use traits::RangeFetcher;

/// Reads vector files under a root directory, picking the format by extension:
/// `.fvecs` is binary, anything else the sparse text format.
pub struct FileSource {
    root: PathBuf,
}

impl FileSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Absolute names are used as-is, relative ones are resolved against the root.
    pub fn path_for(&self, file_key: &str) -> PathBuf {
        self.root.join(file_key)
    }
}

impl RangeFetcher for FileSource {
    fn fetch(&self, file_key: &str, from: usize, to: usize) -> Result<Vec<Vector>, CacheError> {
        if file_key.is_empty() {
            return Err(CacheError::fetch(file_key, "empty file name"));
        }
        let path = self.path_for(file_key);
        debug!("reading [{}, {}] from {}", from, to, path.display());
        if is_fvecs(&path) {
            fvecs_source::read_range(&path, from, to)
        } else {
            text_source::read_range(&path, from, to)
        }
    }
}

fn is_fvecs(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("fvecs"))
}
