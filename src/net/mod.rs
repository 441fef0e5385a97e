//! Network client layer.
//!
//! The fetch engine talks to the network through the [`NetworkClient`]
//! contract: requests are submitted to a queue, results come back later
//! through a [`ResponseListener`] on the client's own threads, and
//! outstanding work can be cancelled by [`RequestTag`].
//!
//! [`QueuedHttpClient`] implements the contract on top of reqwest and a
//! tokio runtime.

mod client;
mod queued;
mod request;

pub use client::{NetworkClient, ResponseListener};
pub use queued::{build_http_client, QueuedHttpClient, DEFAULT_REQUEST_TIMEOUT, USER_AGENT};
pub use request::{RequestHandle, RequestTag, ResponseMetadata, TileHttpRequest};

#[cfg(test)]
pub use client::tests::{ScriptedClient, Submission};
