use std::sync::Arc;

use bytes::Bytes;

use super::request::{RequestHandle, RequestTag, ResponseMetadata, TileHttpRequest};
use crate::error::NetworkError;

/// Receiver of the callbacks for one request.
///
/// Callbacks arrive on the client's own threads. For an accepted request the
/// client calls [`on_chunk`](Self::on_chunk) zero or more times, in body
/// order, followed by exactly one of [`on_success`](Self::on_success) or
/// [`on_error`](Self::on_error). A cancelled request may stop at any point,
/// and a terminal callback that was already being delivered may still arrive
/// after cancellation.
pub trait ResponseListener: Send + Sync {
    /// A piece of the response body.
    fn on_chunk(&self, chunk: Bytes);

    /// The body is complete.
    fn on_success(&self, metadata: ResponseMetadata);

    /// The request failed; no further callbacks follow.
    fn on_error(&self, error: NetworkError);
}

/// Queue-based asynchronous network client.
///
/// `submit` never blocks on I/O: it enqueues the request and returns a
/// handle immediately.
pub trait NetworkClient: Send + Sync {
    /// Enqueue a request.
    fn submit(
        &self,
        request: TileHttpRequest,
        listener: Arc<dyn ResponseListener>,
    ) -> RequestHandle;

    /// Cancel every outstanding request carrying `tag`.
    fn cancel_all(&self, tag: &RequestTag);
}
