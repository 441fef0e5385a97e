//! Asynchronous tile fetching.
//!
//! # Architecture
//!
//! ```text
//! consumer thread                      network client threads
//! ───────────────                      ──────────────────────
//! FetchSlot::send_request(z/x/y)
//!   ├─ tile store hit? ──▶ Completed(Success)
//!   ├─ resolver (per-source mutex) ──▶ URL
//!   └─ NetworkClient::submit ───────▶  on_chunk  ─▶ Buffering
//!                                      on_success ─▶ Completed(Success)
//! FetchSlot::await_completion ◀─────── notify          └─▶ tile store write
//! FetchSlot::read ──▶ TileReader
//! ```
//!
//! One [`AsyncFetchEngine`] serves one tile source. Each consumer owns a
//! [`FetchSlot`]; consumers without a long-lived slot borrow one from a
//! [`SlotPool`]. [`SourceRegistry`] ties engines and pools together for
//! callers that address sources by code.

mod engine;
mod pool;
mod registry;
mod slot;
mod state;

pub use engine::AsyncFetchEngine;
pub use pool::SlotPool;
pub use registry::SourceRegistry;
pub use slot::{FetchSlot, FetchedTile};
pub use state::{Completion, SlotState};
