//! Tollgate HTTP client implementation.

use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder};
use serde::Serialize;
use std::time::Duration;

use tollgate_core::{
    AlertRule, CostBreakdown, HealthRecord, MonthlyUsage, Period, Subscription,
    SubscriptionPlan, SuggestionReport, TimeBucket, UsageContext,
};

use crate::error::ClientError;
use crate::types::{
    ApiErrorResponse, BatchReceipt, BatchUsageRequest, BudgetStatus, SetBudgetRequest,
    UsageReceipt, UsageReport,
};

const API_KEY_HEADER: &str = "x-api-key";
const ADMIN_KEY_HEADER: &str = "x-admin-key";
const COLLECTOR_HEADER: &str = "x-collector";

/// Tollgate API client.
///
/// Reports usage on behalf of one collector and reads the reports.
#[derive(Debug, Clone)]
pub struct TollgateClient {
    client: Client,
    base_url: String,
    api_key: String,
    collector: String,
    admin_key: Option<String>,
}

#[derive(Serialize)]
struct MonthlyQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    period: Option<String>,
}

#[derive(Serialize)]
struct BreakdownQuery<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    provider: Option<&'a str>,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    group_by: TimeBucket,
}

#[derive(Serialize)]
struct ExportQuery<'a> {
    format: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    provider: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    start: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    end: Option<DateTime<Utc>>,
}

impl TollgateClient {
    /// Create a new tollgate client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Base URL of the tollgate service (e.g., `"http://tollgate:8080"`)
    /// * `api_key` - Service API key for reporting usage
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Configuration`] if the HTTP client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self, ClientError> {
        Self::with_options(base_url, api_key, ClientOptions::default())
    }

    /// Create a new tollgate client with custom options.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Configuration`] if the HTTP client cannot be built.
    pub fn with_options(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        options: ClientOptions,
    ) -> Result<Self, ClientError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(options.timeout_seconds))
            .build()
            .map_err(|e| ClientError::Configuration(format!("HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            collector: options.collector,
            admin_key: options.admin_key,
        })
    }

    /// Report one billable call, swallowing any failure.
    ///
    /// Collectors must not break because tollgate is down, so errors are
    /// logged and `None` is returned.
    pub async fn record_usage(
        &self,
        provider: &str,
        endpoint: &str,
        quantity: u64,
        context: UsageContext,
    ) -> Option<UsageReceipt> {
        let report = UsageReport::new(provider, endpoint)
            .quantity(quantity)
            .context(context);

        match self.try_record_usage(&report).await {
            Ok(receipt) => {
                if receipt.unrecognized {
                    tracing::warn!(provider, endpoint, "Tollgate does not know this endpoint");
                }
                Some(receipt)
            }
            Err(e) => {
                tracing::warn!(provider, endpoint, error = %e, "Failed to report usage to tollgate");
                None
            }
        }
    }

    /// Report one billable call.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn try_record_usage(&self, report: &UsageReport) -> Result<UsageReceipt, ClientError> {
        let request = self
            .client
            .post(self.url("/v1/usage"))
            .json(report);
        Self::send(self.service_headers(request)).await
    }

    /// Report many billable calls in one request.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn record_usage_batch(
        &self,
        reports: &[UsageReport],
    ) -> Result<BatchReceipt, ClientError> {
        let request = self
            .client
            .post(self.url("/v1/usage/batch"))
            .json(&BatchUsageRequest { events: reports });
        Self::send(self.service_headers(request)).await
    }

    /// Rollup of a calendar month; the current month when `period` is `None`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn monthly_usage(&self, period: Option<Period>) -> Result<MonthlyUsage, ClientError> {
        let query = MonthlyQuery {
            period: period.map(|p| p.to_string()),
        };
        Self::send(self.client.get(self.url("/v1/usage/monthly")).query(&query))
            .await
    }

    /// Cost series over `[start, end)`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn cost_breakdown(
        &self,
        provider: Option<&str>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        group_by: TimeBucket,
    ) -> Result<CostBreakdown, ClientError> {
        let query = BreakdownQuery {
            provider,
            start,
            end,
            group_by,
        };
        Self::send(self.client.get(self.url("/v1/usage/breakdown")).query(&query))
            .await
    }

    /// Raw export body in `format` (`json` or `csv`).
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn export_report(
        &self,
        format: &str,
        provider: Option<&str>,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<u8>, ClientError> {
        let query = ExportQuery {
            format,
            provider,
            start,
            end,
        };
        let response = self
            .client
            .get(self.url("/v1/usage/export"))
            .query(&query)
            .send()
            .await?;

        if response.status().is_success() {
            return Ok(response.bytes().await?.to_vec());
        }
        Err(Self::error_from(response).await)
    }

    /// Health of every provider.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn api_health(&self) -> Result<Vec<HealthRecord>, ClientError> {
        Self::send(self.client.get(self.url("/v1/providers/health")))
            .await
    }

    /// Ranked optimization suggestions.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn optimization_suggestions(&self) -> Result<SuggestionReport, ClientError> {
        Self::send(self.client.get(self.url("/v1/optimization/suggestions")))
            .await
    }

    /// Budget position of the current period.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn budget_status(&self) -> Result<BudgetStatus, ClientError> {
        Self::send(self.client.get(self.url("/v1/budget"))).await
    }

    /// Subscription plans and counters.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn subscriptions(&self) -> Result<Vec<Subscription>, ClientError> {
        Self::send(self.client.get(self.url("/v1/subscriptions")))
            .await
    }

    /// Replace the monthly budget. Requires an admin key.
    ///
    /// An empty `alerts` list installs the default 50/75/90/100 ladder.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Configuration`] without an admin key, or an
    /// error if the request fails or the server rejects the budget.
    pub async fn set_budget(
        &self,
        monthly_usd: f64,
        alerts: Vec<AlertRule>,
    ) -> Result<BudgetStatus, ClientError> {
        let body = SetBudgetRequest {
            monthly: monthly_usd,
            alerts,
        };
        let request = self.admin_headers(self.client.put(self.url("/v1/budget")))?;
        Self::send(request.json(&body)).await
    }

    /// Create or replace the plan of `provider`. Requires an admin key.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Configuration`] without an admin key, or an
    /// error if the request fails or the server rejects the plan.
    pub async fn upsert_subscription(
        &self,
        provider: &str,
        plan: &SubscriptionPlan,
    ) -> Result<Subscription, ClientError> {
        let url = self.url(&format!("/v1/subscriptions/{provider}"));
        let request = self.admin_headers(self.client.put(url))?;
        Self::send(request.json(plan)).await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn service_headers(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header(API_KEY_HEADER, &self.api_key)
            .header(COLLECTOR_HEADER, &self.collector)
    }

    fn admin_headers(&self, request: RequestBuilder) -> Result<RequestBuilder, ClientError> {
        let key = self
            .admin_key
            .as_ref()
            .ok_or_else(|| ClientError::Configuration("admin key not set".into()))?;
        Ok(request.header(ADMIN_KEY_HEADER, key))
    }

    async fn send<T: serde::de::DeserializeOwned>(
        request: RequestBuilder,
    ) -> Result<T, ClientError> {
        let response = request.send().await?;
        Self::handle_response(response).await
    }

    /// Handle API response and convert errors.
    async fn handle_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ClientError> {
        if response.status().is_success() {
            let bytes = response.bytes().await?;
            return Ok(serde_json::from_slice(&bytes)?);
        }
        Err(Self::error_from(response).await)
    }

    async fn error_from(response: reqwest::Response) -> ClientError {
        let status = response.status();
        let error_body: Result<ApiErrorResponse, _> = response.json().await;

        match error_body {
            Ok(api_error) => match api_error.error.code.as_str() {
                "unauthorized" => ClientError::Unauthorized,
                "service_unavailable" => ClientError::Unavailable(api_error.error.message),
                code => ClientError::Api {
                    code: code.to_string(),
                    message: api_error.error.message,
                    status: status.as_u16(),
                },
            },
            Err(_) => ClientError::Api {
                code: "unknown".to_string(),
                message: format!("HTTP {status}"),
                status: status.as_u16(),
            },
        }
    }
}

/// Client options for customization.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Request timeout in seconds (default: 30).
    pub timeout_seconds: u64,
    /// Collector name sent with every usage report.
    pub collector: String,
    /// Admin key for budget and subscription changes.
    pub admin_key: Option<String>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout_seconds: 30,
            collector: "unknown".to_string(),
            admin_key: None,
        }
    }
}

impl ClientOptions {
    /// Create options with a collector name.
    #[must_use]
    pub fn with_collector(name: impl Into<String>) -> Self {
        Self {
            collector: name.into(),
            ..Self::default()
        }
    }

    /// Attach an admin key.
    #[must_use]
    pub fn admin_key(mut self, key: impl Into<String>) -> Self {
        self.admin_key = Some(key.into());
        self
    }
}
