//! Queued HTTP client backed by reqwest.
//!
//! Every submitted request becomes a task on a tokio runtime. A semaphore
//! sized by the source's thread budget bounds how many transfers run at
//! once; the rest wait in the queue. Response bodies are streamed to the
//! listener chunk by chunk.
//!
//! # Cancellation
//!
//! Running tasks are tracked in a registry keyed by [`RequestTag`].
//! [`cancel_all`](NetworkClient::cancel_all) aborts every task carrying the
//! tag. Registry insertion happens under the same lock the finishing task
//! takes to deregister itself, so the registry never holds entries for
//! finished tasks.
//!
//! # Callback threads
//!
//! Chunks are delivered from the runtime's worker threads. Terminal
//! callbacks run on the runtime's blocking pool so that listener work such
//! as a disk cache write never stalls the async workers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use reqwest::header::CONTENT_TYPE;
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tokio::task::AbortHandle;
use tracing::{debug, error};

use super::client::{NetworkClient, ResponseListener};
use super::request::{RequestHandle, RequestTag, ResponseMetadata, TileHttpRequest};
use crate::error::NetworkError;

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// User agent sent with tile and resolver requests.
pub const USER_AGENT: &str = concat!("tile-bridge/", env!("CARGO_PKG_VERSION"));

/// Build the reqwest client shared by all sources.
pub fn build_http_client(timeout: Duration) -> Result<reqwest::Client, NetworkError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| NetworkError::InvalidRequest(format!("Failed to create HTTP client: {}", e)))
}

// =============================================================================
// In-flight registry
// =============================================================================

#[derive(Default)]
struct InFlight {
    requests: HashMap<RequestTag, Vec<(u64, AbortHandle)>>,
}

impl InFlight {
    fn insert(&mut self, tag: RequestTag, id: u64, handle: AbortHandle) {
        self.requests.entry(tag).or_default().push((id, handle));
    }

    fn remove(&mut self, tag: &RequestTag, id: u64) {
        if let Some(entries) = self.requests.get_mut(tag) {
            entries.retain(|(entry_id, _)| *entry_id != id);
            if entries.is_empty() {
                self.requests.remove(tag);
            }
        }
    }

    fn take(&mut self, tag: &RequestTag) -> Vec<(u64, AbortHandle)> {
        self.requests.remove(tag).unwrap_or_default()
    }

    fn len(&self) -> usize {
        self.requests.values().map(Vec::len).sum()
    }
}

// =============================================================================
// Client
// =============================================================================

/// [`NetworkClient`] running reqwest transfers on a tokio runtime.
pub struct QueuedHttpClient {
    client: reqwest::Client,
    runtime: Handle,
    permits: Arc<Semaphore>,
    in_flight: Arc<Mutex<InFlight>>,
    next_id: AtomicU64,
}

impl QueuedHttpClient {
    /// Create a client with its own connection pool.
    ///
    /// # Arguments
    ///
    /// * `runtime` - Runtime the transfers run on
    /// * `max_in_flight` - Maximum number of concurrent transfers
    pub fn new(runtime: Handle, max_in_flight: usize) -> Result<Self, NetworkError> {
        let client = build_http_client(DEFAULT_REQUEST_TIMEOUT)?;
        Ok(Self::with_client(client, runtime, max_in_flight))
    }

    /// Create a client sharing an existing connection pool.
    pub fn with_client(client: reqwest::Client, runtime: Handle, max_in_flight: usize) -> Self {
        Self {
            client,
            runtime,
            permits: Arc::new(Semaphore::new(max_in_flight.max(1))),
            in_flight: Arc::new(Mutex::new(InFlight::default())),
            next_id: AtomicU64::new(0),
        }
    }

    /// Number of submitted requests that have not finished or been cancelled.
    pub fn in_flight(&self) -> usize {
        self.in_flight.lock().len()
    }
}

impl NetworkClient for QueuedHttpClient {
    fn submit(
        &self,
        request: TileHttpRequest,
        listener: Arc<dyn ResponseListener>,
    ) -> RequestHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let tag = request.tag.clone();

        debug!(request_id = id, tag = %tag, url = %request.url, "Queueing tile request");

        let client = self.client.clone();
        let permits = Arc::clone(&self.permits);
        let in_flight = Arc::clone(&self.in_flight);

        // Hold the registry lock across spawn so the task cannot deregister
        // before it has been registered.
        let mut registry = self.in_flight.lock();
        let task = self.runtime.spawn(async move {
            let outcome = match permits.acquire_owned().await {
                Ok(_permit) => stream_response(&client, &request, listener.as_ref()).await,
                Err(_) => Err(NetworkError::Unavailable(
                    "request queue is closed".to_string(),
                )),
            };

            in_flight.lock().remove(&request.tag, id);
            deliver(listener, outcome).await;
        });
        registry.insert(tag.clone(), id, task.abort_handle());
        drop(registry);

        RequestHandle::new(id, tag)
    }

    fn cancel_all(&self, tag: &RequestTag) {
        let cancelled = self.in_flight.lock().take(tag);
        for (_, handle) in &cancelled {
            handle.abort();
        }
        if !cancelled.is_empty() {
            debug!(tag = %tag, count = cancelled.len(), "Cancelled tile requests");
        }
    }
}

/// Perform the GET and stream the body to the listener.
async fn stream_response(
    client: &reqwest::Client,
    request: &TileHttpRequest,
    listener: &dyn ResponseListener,
) -> Result<ResponseMetadata, NetworkError> {
    let mut builder = client.get(&request.url);
    for (name, value) in &request.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }

    let mut response = builder.send().await.map_err(classify)?;

    let status = response.status();
    if !status.is_success() {
        return Err(NetworkError::Status {
            status: status.as_u16(),
            url: request.url.clone(),
        });
    }

    let metadata = ResponseMetadata {
        status: status.as_u16(),
        content_type: response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned),
        content_length: response.content_length(),
    };

    while let Some(chunk) = response.chunk().await.map_err(classify)? {
        listener.on_chunk(chunk);
    }

    Ok(metadata)
}

/// Run the terminal callback on the blocking pool.
async fn deliver(
    listener: Arc<dyn ResponseListener>,
    outcome: Result<ResponseMetadata, NetworkError>,
) {
    let delivery = tokio::task::spawn_blocking(move || match outcome {
        Ok(metadata) => listener.on_success(metadata),
        Err(error) => listener.on_error(error),
    });

    if let Err(e) = delivery.await {
        if e.is_panic() {
            error!("Tile response listener panicked: {}", e);
        }
    }
}

fn classify(err: reqwest::Error) -> NetworkError {
    if err.is_timeout() {
        NetworkError::Timeout(err.to_string())
    } else if err.is_builder() {
        NetworkError::InvalidRequest(err.to_string())
    } else {
        NetworkError::Connection(err.to_string())
    }
}
