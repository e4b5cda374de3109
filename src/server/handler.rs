// Axum request handler — one request per connection, answered from the range cache.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use bytes::Bytes;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use super::protocol::{Answer, Request};
use crate::config::ServiceConfig;
use crate::engine::cache::{Fetched, RangeCache, Resolved};
use crate::engine::chunk::Vector;
use crate::error::CacheError;
use crate::source::traits::{RangeFetcher, VectorSink};

pub struct ServerState {
    cache: Arc<RangeCache>,
    fetcher: Arc<dyn RangeFetcher>,
    compact: bool,
    requests: AtomicU64,
}

pub type SharedState = Arc<ServerState>;

pub struct CacheServer {
    port: u16,
    state: SharedState,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl CacheServer {
    /// Bind to the configured address and start serving in the background.
    pub async fn start(
        config: &ServiceConfig,
        cache: Arc<RangeCache>,
        fetcher: Arc<dyn RangeFetcher>,
    ) -> Result<Self> {
        let listener = TcpListener::bind((config.host.as_str(), config.port)).await?;
        let port = listener.local_addr()?.port();

        let state = Arc::new(ServerState {
            cache,
            fetcher,
            compact: config.compact_vectors,
            requests: AtomicU64::new(0),
        });

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let app = Router::new()
            .route("/", post(request_handler))
            .with_state(state.clone());

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .ok();
        });

        info!("cache server listening on {}:{}", config.host, port);

        Ok(Self {
            port,
            state,
            shutdown_tx: Some(shutdown_tx),
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn cache(&self) -> &Arc<RangeCache> {
        &self.state.cache
    }

    /// Number of requests accepted so far.
    pub fn requests(&self) -> u64 {
        self.state.requests.load(Ordering::Relaxed)
    }

    /// Shutdown the server gracefully.
    pub fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

/// A finished answer, ready to be written to the connection.
struct Reply {
    status: StatusCode,
    body: Vec<u8>,
}

impl Reply {
    fn new(status: StatusCode, answer: &Answer) -> Self {
        match serde_json::to_vec(answer) {
            Ok(body) => Self { status, body },
            Err(e) => {
                error!("failed to encode answer: {}", e);
                Self {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    body: br#"{"type":"error","kind":"internal","message":"encoding failed"}"#.to_vec(),
                }
            }
        }
    }
}

impl IntoResponse for Reply {
    fn into_response(self) -> Response {
        (
            self.status,
            [
                (header::CONTENT_TYPE, "application/json"),
                // One request per connection.
                (header::CONNECTION, "close"),
            ],
            self.body,
        )
            .into_response()
    }
}

/// Carries the single reply of a request from the blocking worker back to the
/// connection. Streamed misses write through it while the file lock is held.
struct ReplySink {
    tx: Option<oneshot::Sender<Reply>>,
    compact: bool,
}

impl ReplySink {
    fn reply(&mut self, status: StatusCode, answer: &Answer) -> Result<(), CacheError> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| CacheError::Transport("reply already sent".to_string()))?;
        tx.send(Reply::new(status, answer))
            .map_err(|_| CacheError::Transport("client disconnected".to_string()))
    }
}

impl VectorSink for ReplySink {
    fn send(&mut self, vectors: &[Vector]) -> Result<(), CacheError> {
        let answer = Answer::from_vectors(vectors, self.compact);
        self.reply(StatusCode::OK, &answer)
    }
}

/// POST / — decode one request, answer it, close the connection.
async fn request_handler(State(state): State<SharedState>, body: Bytes) -> Response {
    let seq = state.requests.fetch_add(1, Ordering::Relaxed) + 1;

    let request: Request = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            warn!("request #{}: unrecognized request: {}", seq, e);
            let answer = Answer::unknown_request(e.to_string());
            return Reply::new(StatusCode::BAD_REQUEST, &answer).into_response();
        }
    };
    debug!("request #{}: {:?}", seq, request);

    let (tx, rx) = oneshot::channel();
    let sink = ReplySink {
        tx: Some(tx),
        compact: state.compact,
    };

    // Lock waits and disk reads block, so the work runs on the blocking pool.
    let worker_state = Arc::clone(&state);
    let worker = tokio::task::spawn_blocking(move || dispatch(&worker_state, request, sink));

    match rx.await {
        Ok(reply) => reply.into_response(),
        Err(_) => {
            let reason = match worker.await {
                Err(e) => e.to_string(),
                Ok(()) => "worker finished without a reply".to_string(),
            };
            error!("request #{}: {}", seq, reason);
            let answer = Answer::Error {
                kind: "internal".to_string(),
                message: reason,
            };
            Reply::new(StatusCode::INTERNAL_SERVER_ERROR, &answer).into_response()
        }
    }
}

fn dispatch(state: &ServerState, request: Request, mut sink: ReplySink) {
    let outcome = match request {
        Request::Range { filename, from, to } => answer_range(state, &filename, from, to, &mut sink),
        Request::Stats { filename } => {
            let stats = state.cache.stats(&filename);
            sink.reply(StatusCode::OK, &Answer::from_stats(&stats))
        }
    };
    if let Err(e) = outcome {
        debug!("answer not delivered: {}", e);
    }
}

fn answer_range(
    state: &ServerState,
    filename: &str,
    from: i64,
    to: i64,
    sink: &mut ReplySink,
) -> Result<(), CacheError> {
    let fetcher = &state.fetcher;
    let resolved = state.cache.resolve(filename, from, to, |range| {
        fetcher
            .fetch_and_stream(range.file_key(), range.from(), range.to(), &mut *sink)
            .map(Fetched::streamed)
    });

    let snapshot = state.cache.counters().snapshot();
    debug!(
        "cache requests={} misses={} hit_rate={:.3}",
        snapshot.requests, snapshot.misses, snapshot.hit_rate
    );

    match resolved {
        Ok(Resolved::Data(vectors)) => {
            let answer = Answer::from_vectors(&vectors, sink.compact);
            sink.reply(StatusCode::OK, &answer)
        }
        Ok(Resolved::Streamed) => Ok(()),
        Err(e) => {
            warn!("{} [{}, {}]: {}", filename, from, to, e);
            sink.reply(status_for(&e), &Answer::from_error(&e))
        }
    }
}

fn status_for(err: &CacheError) -> StatusCode {
    match err {
        CacheError::InvalidRange { .. } => StatusCode::BAD_REQUEST,
        CacheError::FetchFailure { .. } | CacheError::Transport(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
