//! The usage and cost governance engine.

pub mod advisor;
pub mod aggregation;
pub mod alerts;
pub mod budget;
pub mod export;
pub mod health;
pub mod scheduler;
pub mod tracker;

pub use advisor::{AdvisorConfig, OptimizationAdvisor};
pub use alerts::{AlertDispatcher, AlertSink, ChannelSink, LogSink, SinkError, WebhookClient, WebhookSink};
pub use budget::{BudgetMonitor, BudgetStatus, PeriodState};
pub use export::{ExportFilters, ExportFormat, CSV_COLUMNS};
pub use health::HealthMonitor;
pub use scheduler::{MaintenanceOutcome, Scheduler, SchedulerConfig};
pub use tracker::UsageTracker;
