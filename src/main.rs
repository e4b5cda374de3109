use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use ma_vector_cache::config::ServiceConfig;
use ma_vector_cache::engine::cache::RangeCache;
use ma_vector_cache::logging::init_tracing;
use ma_vector_cache::server::handler::CacheServer;
use ma_vector_cache::source::FileSource;

/// Serve index ranges of vector files from an in-memory range cache.
#[derive(Debug, Parser)]
#[command(version)]
struct Args {
    /// Port to listen on (ports below 1024 fall back to 7899).
    port: Option<u16>,
    /// Maximum number of request workers (never below 10000).
    max_workers: Option<usize>,
    /// JSON configuration file.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Directory relative file names are resolved against.
    #[arg(long)]
    data_dir: Option<String>,
    /// Payload bytes kept resident before old chunks are reclaimed.
    #[arg(long)]
    cache_budget_bytes: Option<usize>,
    /// Answer range requests with one flat buffer.
    #[arg(long)]
    compact: bool,
}

impl Args {
    fn into_config(self) -> Result<ServiceConfig> {
        let mut config = match &self.config {
            Some(path) => ServiceConfig::from_json(&std::fs::read_to_string(path)?)?,
            None => ServiceConfig::default(),
        };
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(max_workers) = self.max_workers {
            config.max_workers = max_workers;
        }
        if let Some(data_dir) = self.data_dir {
            config.data_dir = data_dir;
        }
        if let Some(budget) = self.cache_budget_bytes {
            config.cache_budget_bytes = budget;
        }
        config.compact_vectors |= self.compact;
        Ok(config.normalized())
    }
}

fn main() -> Result<()> {
    init_tracing();
    let config = Args::parse().into_config()?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .max_blocking_threads(config.max_workers)
        .build()?;

    runtime.block_on(async move {
        let cache = Arc::new(RangeCache::with_budget(config.cache_budget_bytes));
        let source = Arc::new(FileSource::new(&config.data_dir));
        let server = CacheServer::start(&config, cache, source).await?;

        tokio::signal::ctrl_c().await?;
        info!("shutting down after {} requests", server.requests());
        server.shutdown();
        Ok::<(), anyhow::Error>(())
    })
}
