// Client for the cache server. Every call opens its own connection.

use anyhow::{anyhow, bail, Result};
use reqwest::{header, Client};

use super::protocol::{stats_triples, unflatten, Answer, Request};
use crate::engine::chunk::ChunkStat;

pub struct CacheClient {
    client: Client,
    url: String,
}

impl CacheClient {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            client: Client::new(),
            url: format!("http://{}:{}/", host, port),
        }
    }

    /// Vectors `[from, to]` of `filename` as held by the server.
    pub async fn read_vectors(&self, filename: &str, from: i64, to: i64) -> Result<Vec<Vec<f64>>> {
        if filename.is_empty() {
            bail!("wrong filename");
        }
        if from > to {
            bail!("from index {} > to index {}", from, to);
        }
        if from < 0 {
            bail!("from index {} < 0", from);
        }

        let request = Request::Range {
            filename: filename.to_string(),
            from,
            to,
        };
        match self.send(&request).await? {
            Answer::Vectors { vectors } => Ok(vectors),
            Answer::Compact { dimension, values } => unflatten(dimension, &values)
                .ok_or_else(|| anyhow!("malformed compact answer (dimension {})", dimension)),
            Answer::Error { kind, message } => Err(anyhow!("server answered {}: {}", kind, message)),
            other => Err(anyhow!("unexpected answer {:?}", other)),
        }
    }

    /// What the server currently caches for `filename`, in scan order.
    /// An empty cache comes back as a single `(0, 0, 0)` entry.
    pub async fn cache_stats(&self, filename: &str) -> Result<Vec<ChunkStat>> {
        if filename.is_empty() {
            bail!("wrong filename");
        }
        let request = Request::Stats {
            filename: filename.to_string(),
        };
        match self.send(&request).await? {
            Answer::Stats { chunks } => Ok(stats_triples(&chunks)),
            Answer::Error { kind, message } => Err(anyhow!("server answered {}: {}", kind, message)),
            other => Err(anyhow!("unexpected answer {:?}", other)),
        }
    }

    async fn send(&self, request: &Request) -> Result<Answer> {
        let resp = self
            .client
            .post(&self.url)
            .header(header::CONTENT_TYPE, "application/json")
            .body(serde_json::to_vec(request)?)
            .send()
            .await?;
        let body = resp.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }
}
