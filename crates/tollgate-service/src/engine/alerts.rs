//! Budget alert sinks.
//!
//! Every fired [`BudgetAlert`] is handed to each registered [`AlertSink`] in
//! turn. A sink must return quickly: anything that touches the network is
//! spawned onto the runtime and its outcome only logged. A failing sink is
//! logged and counted, and never stops the next sink from running.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use tokio::sync::mpsc;

use tollgate_core::{micros_to_usd, AlertAction, BudgetAlert};

use crate::crypto::{signature_header_value, SIGNATURE_HEADER};

/// Error type for alert delivery.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// The alert could not be encoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP client setup failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Webhook delivery needs a tokio runtime to spawn onto.
    #[error("no async runtime available for webhook delivery")]
    NoRuntime,

    /// A rule names a webhook but no webhook client is configured.
    #[error("no webhook client configured")]
    NotConfigured,

    /// The receiving end of a channel sink was dropped.
    #[error("alert channel closed")]
    ChannelClosed,

    /// A channel sink is at capacity.
    #[error("alert channel full")]
    ChannelFull,
}

/// A destination for budget alerts.
pub trait AlertSink: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Hand off one alert without blocking on I/O.
    ///
    /// # Errors
    ///
    /// Returns an error if the alert could not be handed off.
    fn deliver(&self, alert: &BudgetAlert) -> Result<(), SinkError>;
}

/// Writes alerts to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl AlertSink for LogSink {
    fn name(&self) -> &str {
        "log"
    }

    fn deliver(&self, alert: &BudgetAlert) -> Result<(), SinkError> {
        tracing::warn!(
            alert_id = %alert.id,
            period = %alert.period,
            threshold = alert.threshold_percent,
            spent_usd = micros_to_usd(alert.spent_micros),
            budget_usd = micros_to_usd(alert.budget_micros),
            percent_used = alert.percent_used,
            over_budget = alert.is_over_budget(),
            "Budget threshold crossed"
        );
        Ok(())
    }
}

/// Shared HTTP client for webhook deliveries.
///
/// Each delivery is a separate tokio task bounded by the client timeout.
/// Failed deliveries are logged and counted.
#[derive(Debug, Clone)]
pub struct WebhookClient {
    client: Client,
    secret: Option<String>,
    failures: Arc<AtomicU64>,
}

impl WebhookClient {
    /// Create a client with a per-delivery timeout and an optional signing secret.
    ///
    /// # Errors
    ///
    /// Returns `Http` if the HTTP client cannot be built.
    pub fn new(timeout: Duration, secret: Option<String>) -> Result<Self, SinkError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            secret,
            failures: Arc::new(AtomicU64::new(0)),
        })
    }

    /// POST `alert` as JSON to `url` on a spawned task.
    ///
    /// # Errors
    ///
    /// Returns `Serialization` if the alert cannot be encoded and `NoRuntime`
    /// outside a tokio runtime. Network failures are not returned.
    pub fn send(&self, url: &str, alert: &BudgetAlert) -> Result<(), SinkError> {
        let body = serde_json::to_vec(alert)?;
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| SinkError::NoRuntime)?;

        let mut request = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json");
        if let Some(secret) = &self.secret {
            request = request.header(SIGNATURE_HEADER, signature_header_value(secret, &body));
        }
        let request = request.body(body);

        let failures = Arc::clone(&self.failures);
        let url = url.to_string();
        let alert_id = alert.id;
        runtime.spawn(async move {
            match request.send().await {
                Ok(response) if response.status().is_success() => {
                    tracing::debug!(url = %url, alert_id = %alert_id, "Alert webhook delivered");
                }
                Ok(response) => {
                    failures.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(
                        url = %url,
                        alert_id = %alert_id,
                        status = response.status().as_u16(),
                        "Alert webhook rejected"
                    );
                }
                Err(e) => {
                    failures.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(url = %url, alert_id = %alert_id, error = %e, "Alert webhook failed");
                }
            }
        });
        Ok(())
    }

    /// Deliveries that failed after being spawned.
    #[must_use]
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }
}

/// Sends every alert to one fixed webhook URL.
#[derive(Debug, Clone)]
pub struct WebhookSink {
    url: String,
    client: WebhookClient,
}

impl WebhookSink {
    /// Create a sink posting to `url`.
    #[must_use]
    pub fn new(url: impl Into<String>, client: WebhookClient) -> Self {
        Self {
            url: url.into(),
            client,
        }
    }
}

impl AlertSink for WebhookSink {
    fn name(&self) -> &str {
        "webhook"
    }

    fn deliver(&self, alert: &BudgetAlert) -> Result<(), SinkError> {
        self.client.send(&self.url, alert)
    }
}

/// Forwards alerts into a bounded tokio channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<BudgetAlert>,
}

impl ChannelSink {
    /// Create a sink and the receiver it feeds.
    #[must_use]
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<BudgetAlert>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

impl AlertSink for ChannelSink {
    fn name(&self) -> &str {
        "channel"
    }

    fn deliver(&self, alert: &BudgetAlert) -> Result<(), SinkError> {
        self.tx.try_send(alert.clone()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SinkError::ChannelFull,
            mpsc::error::TrySendError::Closed(_) => SinkError::ChannelClosed,
        })
    }
}

/// Fans one alert out to every sink, plus the rule's own webhook if it has one.
#[derive(Default)]
pub struct AlertDispatcher {
    sinks: Vec<Arc<dyn AlertSink>>,
    webhooks: Option<WebhookClient>,
    failures: AtomicU64,
}

impl AlertDispatcher {
    /// Create a dispatcher with no sinks.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a sink.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn AlertSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Client used for `webhook` actions in budget alert rules.
    #[must_use]
    pub fn with_webhooks(mut self, client: WebhookClient) -> Self {
        self.webhooks = Some(client);
        self
    }

    /// Names of the registered sinks, in dispatch order.
    #[must_use]
    pub fn sink_names(&self) -> Vec<&str> {
        self.sinks.iter().map(|s| s.name()).collect()
    }

    /// Deliver `alert` to every sink. Never fails.
    pub fn dispatch(&self, alert: &BudgetAlert) {
        for sink in &self.sinks {
            if let Err(e) = sink.deliver(alert) {
                self.failures.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    sink = sink.name(),
                    alert_id = %alert.id,
                    threshold = alert.threshold_percent,
                    error = %e,
                    "Alert delivery failed"
                );
            }
        }

        if let AlertAction::Webhook { url } = &alert.action {
            let result = match &self.webhooks {
                Some(client) => client.send(url, alert),
                None => Err(SinkError::NotConfigured),
            };
            if let Err(e) = result {
                self.failures.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(url = %url, alert_id = %alert.id, error = %e, "Rule webhook failed");
            }
        }
    }

    /// Failed deliveries so far, including failed webhook tasks.
    #[must_use]
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
            + self.webhooks.as_ref().map_or(0, WebhookClient::failures)
    }
}

impl std::fmt::Debug for AlertDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlertDispatcher")
            .field("sinks", &self.sink_names())
            .field("webhooks", &self.webhooks.is_some())
            .field("failures", &self.failures())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tollgate_core::{AlertRule, Budget, Period, MICROS_PER_USD};

    fn alert(threshold: u32) -> BudgetAlert {
        let budget = Budget::with_default_alerts(10 * MICROS_PER_USD).unwrap();
        BudgetAlert::new(
            Period::new(2026, 10).unwrap(),
            &budget,
            &AlertRule::log(threshold),
            11 * MICROS_PER_USD,
        )
    }

    struct FailingSink;

    impl AlertSink for FailingSink {
        fn name(&self) -> &str {
            "failing"
        }

        fn deliver(&self, _alert: &BudgetAlert) -> Result<(), SinkError> {
            Err(SinkError::ChannelClosed)
        }
    }

    #[test]
    fn failing_sink_does_not_stop_the_next_one() {
        let (channel, mut rx) = ChannelSink::new(8);
        let dispatcher = AlertDispatcher::new()
            .with_sink(Arc::new(FailingSink))
            .with_sink(Arc::new(LogSink))
            .with_sink(Arc::new(channel));

        dispatcher.dispatch(&alert(50));

        assert_eq!(dispatcher.failures(), 1);
        assert_eq!(rx.try_recv().unwrap().threshold_percent, 50);
    }

    #[test]
    fn full_channel_is_counted_not_raised() {
        let (channel, _rx) = ChannelSink::new(1);
        let dispatcher = AlertDispatcher::new().with_sink(Arc::new(channel));

        dispatcher.dispatch(&alert(50));
        dispatcher.dispatch(&alert(75));

        assert_eq!(dispatcher.failures(), 1);
    }

    #[test]
    fn webhook_outside_runtime_is_reported() {
        let client = WebhookClient::new(Duration::from_secs(1), None).unwrap();
        assert!(matches!(
            client.send("http://127.0.0.1:9/alerts", &alert(90)),
            Err(SinkError::NoRuntime)
        ));
    }

    #[test]
    fn rule_webhook_without_client_counts_a_failure() {
        let mut webhook_alert = alert(100);
        webhook_alert.action = AlertAction::Webhook {
            url: "http://127.0.0.1:9/alerts".into(),
        };
        let dispatcher = AlertDispatcher::new();
        dispatcher.dispatch(&webhook_alert);
        assert_eq!(dispatcher.failures(), 1);
    }
}
