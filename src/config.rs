use serde::Deserialize;

/// Port used when none is configured, or when the configured one is privileged.
pub const DEFAULT_PORT: u16 = 7899;

/// Lowest port accepted from configuration.
pub const MIN_PORT: u16 = 1024;

/// Floor for the blocking worker pool. Requests block on disk reads and on
/// per-file locks, so a small pool starves waiting writers.
pub const MIN_WORKERS: usize = 10_000;

/// Default memory budget for cached payloads (1 GB).
pub const DEFAULT_CACHE_BUDGET_BYTES: usize = 1024 * 1024 * 1024;

/// Top-level configuration for the cache service.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Interface to bind.
    pub host: String,
    /// TCP port to listen on.
    pub port: u16,
    /// Upper bound on concurrently running request workers.
    pub max_workers: usize,
    /// Bytes of vector payload kept resident before the oldest payloads are reclaimed.
    pub cache_budget_bytes: usize,
    /// Send range answers as one flat buffer prefixed by the dimension.
    pub compact_vectors: bool,
    /// Directory relative file names are resolved against.
    pub data_dir: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            max_workers: MIN_WORKERS,
            cache_budget_bytes: DEFAULT_CACHE_BUDGET_BYTES,
            compact_vectors: false,
            data_dir: ".".to_string(),
        }
    }
}

impl ServiceConfig {
    /// Parse a JSON configuration document. Missing fields keep their defaults.
    pub fn from_json(text: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str::<Self>(text)?.normalized())
    }

    /// Clamp values that would make the service misbehave.
    pub fn normalized(mut self) -> Self {
        if self.port < MIN_PORT {
            self.port = DEFAULT_PORT;
        }
        self.max_workers = self.max_workers.max(MIN_WORKERS);
        self
    }
}
