//! tmatch-tc library - Tutor Console client
//!
//! Per-subscriber client for the matching server: an HTTP API client, a
//! push listener (SSE) and a poll fallback, merged by the reconciler into
//! one consistent local view of the pending pool.

pub mod client;
pub mod poll;
pub mod push;
pub mod reconciler;
pub mod watch;

pub use client::ApiClient;
pub use reconciler::{Reconciler, SnapshotDiff, ViewChange};
