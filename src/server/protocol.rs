// Request and answer documents exchanged with clients, one of each per connection.

use serde::{Deserialize, Serialize};

use crate::engine::chunk::{ChunkStat, Vector};
use crate::error::CacheError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Vectors `[from, to]` of `filename`.
    Range { filename: String, from: i64, to: i64 },
    /// What is currently cached for `filename`.
    Stats { filename: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Answer {
    Vectors {
        vectors: Vec<Vec<f64>>,
    },
    /// All vectors back to back in one buffer, `dimension` values each.
    Compact {
        dimension: usize,
        values: Vec<f64>,
    },
    /// Flattened `(from, to, live)` triples in scan order.
    Stats {
        chunks: Vec<u64>,
    },
    Error {
        kind: String,
        message: String,
    },
}

impl Answer {
    /// Encode vectors, flattening them when `compact` is set and they share a dimension.
    pub fn from_vectors(vectors: &[Vector], compact: bool) -> Self {
        let dimension = vectors.first().map_or(0, |v| v.len());
        if compact && dimension > 0 && vectors.iter().all(|v| v.len() == dimension) {
            let mut values = Vec::with_capacity(dimension * vectors.len());
            for vector in vectors {
                values.extend_from_slice(vector);
            }
            return Answer::Compact { dimension, values };
        }
        Answer::Vectors {
            vectors: vectors.iter().map(|v| v.to_vec()).collect(),
        }
    }

    /// An empty store is reported as the single triple `(0, 0, 0)`.
    pub fn from_stats(stats: &[ChunkStat]) -> Self {
        if stats.is_empty() {
            return Answer::Stats {
                chunks: vec![0, 0, 0],
            };
        }
        let chunks = stats
            .iter()
            .flat_map(|s| [s.from as u64, s.to as u64, s.live as u64])
            .collect();
        Answer::Stats { chunks }
    }

    pub fn from_error(err: &CacheError) -> Self {
        Answer::Error {
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }

    pub fn unknown_request(message: impl Into<String>) -> Self {
        Answer::Error {
            kind: "unknown_request".to_string(),
            message: message.into(),
        }
    }
}

/// Undo [`Answer::Compact`] flattening.
pub fn unflatten(dimension: usize, values: &[f64]) -> Option<Vec<Vec<f64>>> {
    if dimension == 0 || values.len() % dimension != 0 {
        return None;
    }
    Some(values.chunks(dimension).map(<[f64]>::to_vec).collect())
}

/// Split flattened stats back into triples.
pub fn stats_triples(chunks: &[u64]) -> Vec<ChunkStat> {
    chunks
        .chunks_exact(3)
        .map(|t| ChunkStat {
            from: t[0] as usize,
            to: t[1] as usize,
            live: t[2] as usize,
        })
        .collect()
}
