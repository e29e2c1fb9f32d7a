//! API handlers.
//!
//! Handlers only translate between HTTP and [`crate::engine::UsageTracker`].

pub mod budget;
pub mod health;
pub mod reports;
pub mod subscriptions;
pub mod usage;
