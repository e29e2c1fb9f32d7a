//! Tollgate Service - usage and cost governance for paid third-party APIs
//!
//! This is the main entry point for the tollgate service.

use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tollgate_core::usd_to_micros;
use tollgate_service::{
    create_router, AlertDispatcher, AppState, LogSink, Scheduler, SchedulerConfig, ServiceConfig,
    StorageBackend, UsageTracker, WebhookClient, WebhookSink,
};
use tollgate_store::{Ledger, MemoryLedger};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tollgate=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Tollgate Service");

    let config = ServiceConfig::from_env();

    tracing::info!(
        listen_addr = %config.listen_addr,
        storage = ?config.storage,
        data_dir = %config.data_dir,
        providers_file = ?config.providers_file,
        webhook_configured = %config.alert_webhook_url.is_some(),
        "Service configuration loaded"
    );

    let ledger = open_ledger(&config)?;
    let registry = config.load_registry()?;

    let webhooks = WebhookClient::new(
        Duration::from_secs(config.alert_webhook_timeout_seconds),
        config.alert_webhook_secret.clone(),
    )?;
    let mut dispatcher = AlertDispatcher::new()
        .with_sink(Arc::new(LogSink))
        .with_webhooks(webhooks.clone());
    if let Some(url) = &config.alert_webhook_url {
        dispatcher = dispatcher.with_sink(Arc::new(WebhookSink::new(url.clone(), webhooks)));
    }

    let tracker = UsageTracker::new(ledger, registry, dispatcher)?
        .with_health_window(chrono::Duration::hours(i64::from(config.health_window_hours)))
        .with_advisor(config.advisor);
    let tracker = Arc::new(tracker);

    if let Some(monthly_usd) = config.monthly_budget_usd {
        if tracker.budget_monitor().budget().is_none() {
            let budget = tracker.set_budget(usd_to_micros(monthly_usd), Vec::new())?;
            tracing::info!(monthly_usd, thresholds = budget.alerts.len(), "Applied MONTHLY_BUDGET_USD");
        }
    }

    let scheduler = Scheduler::start(
        Arc::clone(&tracker),
        SchedulerConfig {
            health_interval: Duration::from_secs(config.health_interval_seconds),
            report_interval: Duration::from_secs(config.report_interval_seconds),
        },
    );

    let state = AppState::new(tracker, config.clone());
    let app = create_router(state);
    tracing::info!("Router configured with all API endpoints");

    tracing::info!(listen_addr = %config.listen_addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    scheduler.shutdown().await;
    tracing::info!("Tollgate Service stopped");

    Ok(())
}

fn open_ledger(config: &ServiceConfig) -> Result<Arc<dyn Ledger>, Box<dyn std::error::Error>> {
    match config.storage {
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory ledger - usage is lost on restart");
            Ok(Arc::new(MemoryLedger::new()))
        }
        #[cfg(feature = "rocksdb-backend")]
        StorageBackend::Rocksdb => {
            tracing::info!(path = %config.data_dir, "Opening RocksDB ledger");
            Ok(Arc::new(tollgate_store::RocksLedger::open(&config.data_dir)?))
        }
        #[cfg(not(feature = "rocksdb-backend"))]
        StorageBackend::Rocksdb => {
            Err("STORAGE=rocksdb requires the rocksdb-backend feature".into())
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
