//! tmatch-ms library - Instant Session Matching Server
//!
//! Turns an ad-hoc "I need a tutor now" request into a live session with
//! exactly one assigned tutor, safely under concurrent access. The request
//! store's conditional update is the only mutation path; the claim
//! coordinator, lifecycle tracker and expiry sweep all funnel through it,
//! and state changes fan out to subscribers over SSE with polling as the
//! reliability backstop.

pub mod api;
pub mod coordinator;
pub mod db;
pub mod lifecycle;
pub mod provision;
pub mod sweep;

pub use api::{build_router, AppContext};
