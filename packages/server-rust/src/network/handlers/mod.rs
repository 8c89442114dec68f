//! HTTP handler definitions for the gateway.
//!
//! This module defines `AppState` (the shared state carried through axum
//! extractors) and re-exports all handler functions for building the router.

pub mod health;
pub mod operations;

pub use health::{health_handler, liveness_handler, readiness_handler};
pub use operations::{
    clear_handler, missing_id_handler, status_handler, submit_async_handler, submit_sync_handler,
    ApiDoc,
};

use std::sync::Arc;
use std::time::Instant;

use super::ShutdownController;
use crate::service::SubmissionGateway;

/// Shared application state passed to all axum handlers via `State` extraction.
///
/// Cloning is cheap: the gateway only holds `Arc`s to the shared store.
#[derive(Clone)]
pub struct AppState {
    /// Admission, enqueue, and status lookups.
    pub gateway: SubmissionGateway,
    /// Graceful shutdown controller with health state and in-flight tracking.
    pub shutdown: Arc<ShutdownController>,
    /// Process start time, used for uptime calculation.
    pub start_time: Instant,
}
