//! Tollgate usage and cost governance service.
//!
//! This crate holds the governance engine and its HTTP API:
//!
//! - Usage ingestion priced against the provider catalog
//! - Monthly rollups and time-bucketed cost breakdowns
//! - Budget thresholds that fire exactly once per period
//! - Provider health and optimization suggestions
//! - JSON/CSV exports of the ledger
//!
//! # Authentication
//!
//! 1. **Service API key** (`x-api-key`) - collectors reporting usage
//! 2. **Admin key** (`x-admin-key`) - budget and subscription writes
//!
//! Read endpoints are open to anything that can reach the listener.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
// Allow some pedantic lints that are noisy for Axum handler functions
#![allow(clippy::missing_errors_doc)] // Axum handlers all return Result
#![allow(clippy::unused_async)] // Handlers are async for the router even when the work is not

pub mod auth;
pub mod config;
pub mod crypto;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use config::{ServiceConfig, StorageBackend};
pub use engine::{
    AlertDispatcher, AlertSink, ChannelSink, LogSink, Scheduler, SchedulerConfig, UsageTracker,
    WebhookClient, WebhookSink,
};
pub use error::ApiError;
pub use routes::create_router;
pub use state::AppState;
