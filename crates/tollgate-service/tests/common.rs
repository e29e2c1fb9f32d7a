//! Common test utilities for tollgate integration tests.

#![allow(dead_code)] // Some utilities are used by different test files

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::Router;
use axum_test::TestServer;
use tokio::sync::mpsc;

use tollgate_core::{
    Budget, BudgetAlert, Period, ProviderRegistry, Subscription, UsageEvent,
};
use tollgate_service::{create_router, AlertDispatcher, AppState, ChannelSink, ServiceConfig, UsageTracker};
use tollgate_store::{Ledger, LedgerFilter, MemoryLedger, StoreError};

pub const SERVICE_API_KEY: &str = "test-service-key";
pub const ADMIN_API_KEY: &str = "test-admin-key";

/// Test harness containing everything needed for integration tests.
pub struct TestHarness {
    /// The test server for making HTTP requests.
    pub server: TestServer,
    /// The engine behind the server.
    pub tracker: Arc<UsageTracker>,
    /// Alerts delivered to the channel sink.
    pub alerts: mpsc::Receiver<BudgetAlert>,
}

impl TestHarness {
    /// A harness over a fresh in-memory ledger.
    pub fn new() -> Self {
        Self::with_ledger(Arc::new(MemoryLedger::new()))
    }

    /// A harness over the given ledger.
    pub fn with_ledger(ledger: Arc<dyn Ledger>) -> Self {
        Self::build(ledger, AlertDispatcher::new())
    }

    /// A harness whose dispatcher also carries extra sinks or a webhook client.
    pub fn build(ledger: Arc<dyn Ledger>, dispatcher: AlertDispatcher) -> Self {
        let (sink, alerts) = ChannelSink::new(256);
        let dispatcher = dispatcher.with_sink(Arc::new(sink));

        let tracker = Arc::new(
            UsageTracker::new(ledger, ProviderRegistry::with_defaults(), dispatcher)
                .expect("Failed to create tracker"),
        );

        let config = ServiceConfig {
            listen_addr: "127.0.0.1:0".into(),
            service_api_key: Some(SERVICE_API_KEY.into()),
            admin_api_key: Some(ADMIN_API_KEY.into()),
            ..ServiceConfig::default()
        };

        let state = AppState::new(Arc::clone(&tracker), config);
        let router: Router = create_router(state);
        let server = TestServer::new(router).expect("Failed to create test server");

        Self {
            server,
            tracker,
            alerts,
        }
    }

    /// Alerts delivered so far, in delivery order.
    pub fn drain_alerts(&mut self) -> Vec<BudgetAlert> {
        let mut alerts = Vec::new();
        while let Ok(alert) = self.alerts.try_recv() {
            alerts.push(alert);
        }
        alerts
    }

    /// Thresholds of the alerts delivered so far.
    pub fn fired_thresholds(&mut self) -> Vec<u32> {
        self.drain_alerts()
            .iter()
            .map(|a| a.threshold_percent)
            .collect()
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// An in-memory ledger that can be switched off to simulate an outage.
#[derive(Default)]
pub struct FlakyLedger {
    inner: MemoryLedger,
    down: AtomicBool,
}

impl FlakyLedger {
    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.down.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("ledger offline".into()))
        } else {
            Ok(())
        }
    }
}

impl Ledger for FlakyLedger {
    fn append(&self, event: &UsageEvent) -> Result<(), StoreError> {
        self.check()?;
        self.inner.append(event)
    }

    fn for_each(
        &self,
        filter: &LedgerFilter,
        visit: &mut dyn FnMut(&UsageEvent) -> Result<(), StoreError>,
    ) -> Result<(), StoreError> {
        self.check()?;
        self.inner.for_each(filter, visit)
    }

    fn put_subscription(&self, subscription: &Subscription) -> Result<(), StoreError> {
        self.check()?;
        self.inner.put_subscription(subscription)
    }

    fn get_subscription(&self, provider: &str) -> Result<Option<Subscription>, StoreError> {
        self.check()?;
        self.inner.get_subscription(provider)
    }

    fn list_subscriptions(&self) -> Result<Vec<Subscription>, StoreError> {
        self.check()?;
        self.inner.list_subscriptions()
    }

    fn update_subscription(
        &self,
        provider: &str,
        update: &mut dyn FnMut(&mut Subscription),
    ) -> Result<Option<Subscription>, StoreError> {
        self.check()?;
        self.inner.update_subscription(provider, update)
    }

    fn put_budget(&self, budget: &Budget) -> Result<(), StoreError> {
        self.check()?;
        self.inner.put_budget(budget)
    }

    fn get_budget(&self) -> Result<Option<Budget>, StoreError> {
        self.check()?;
        self.inner.get_budget()
    }

    fn claim_threshold(&self, alert: &BudgetAlert) -> Result<bool, StoreError> {
        self.check()?;
        self.inner.claim_threshold(alert)
    }

    fn list_alerts(&self, period: Period) -> Result<Vec<BudgetAlert>, StoreError> {
        self.check()?;
        self.inner.list_alerts(period)
    }
}
