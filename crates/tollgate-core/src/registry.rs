//! Provider registry.
//!
//! The registry is the catalog of provider billing metadata consulted when a
//! usage event is ingested.
//!
//! # Endpoint resolution
//!
//! Collectors report endpoints inconsistently, sometimes by logical name and
//! sometimes by wire path. [`ProviderRegistry::lookup`] resolves in this fixed
//! order and returns the first hit:
//!
//! 1. exact logical name (`keywords_volume`)
//! 2. exact wire path (`/v3/keywords_data/google_ads/search_volume/live`)
//! 3. wire path after dropping the query string and trailing slash
//!
//! So when a name match and a path match would disagree, the name wins.

use std::collections::BTreeMap;

use crate::error::{MeterError, Result};
use crate::provider::{BillingPeriod, BillingType, Endpoint, Provider, SubscriptionTerms};

/// Outcome of resolving a `(provider, endpoint)` reference.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Lookup<'a> {
    /// The endpoint was resolved.
    Found {
        /// The provider entry.
        provider: &'a Provider,
        /// The resolved endpoint.
        endpoint: &'a Endpoint,
    },
    /// No provider with this name is registered.
    UnknownProvider,
    /// The provider exists but no endpoint matches.
    UnknownEndpoint,
}

impl Lookup<'_> {
    /// Whether the reference resolved.
    #[must_use]
    pub const fn is_found(&self) -> bool {
        matches!(self, Self::Found { .. })
    }
}

/// Catalog of providers keyed by name.
#[derive(Debug, Clone, Default)]
pub struct ProviderRegistry {
    providers: BTreeMap<String, Provider>,
}

impl ProviderRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from a list of providers.
    ///
    /// # Errors
    ///
    /// Fails on the first duplicate provider or invalid endpoint.
    pub fn from_providers(providers: impl IntoIterator<Item = Provider>) -> Result<Self> {
        let mut registry = Self::new();
        for provider in providers {
            registry.register(provider)?;
        }
        Ok(registry)
    }

    /// Parse a JSON array of providers.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` for malformed JSON, otherwise the same errors
    /// as [`ProviderRegistry::register`].
    pub fn from_json(json: &str) -> Result<Self> {
        let providers: Vec<Provider> =
            serde_json::from_str(json).map_err(|e| MeterError::Configuration(e.to_string()))?;
        Self::from_providers(providers)
    }

    /// Add a provider.
    ///
    /// # Errors
    ///
    /// - `DuplicateProvider` if the name is taken.
    /// - `DuplicateEndpoint` / `InvalidEndpoint` from validation.
    pub fn register(&mut self, provider: Provider) -> Result<()> {
        if self.providers.contains_key(&provider.name) {
            return Err(MeterError::DuplicateProvider {
                provider: provider.name,
            });
        }
        provider.validate()?;
        self.providers.insert(provider.name.clone(), provider);
        Ok(())
    }

    /// Replace (or insert) a provider entry as a whole.
    ///
    /// Returns the previous entry, if any.
    ///
    /// # Errors
    ///
    /// Returns validation errors; the registry is unchanged on error.
    pub fn replace(&mut self, provider: Provider) -> Result<Option<Provider>> {
        provider.validate()?;
        Ok(self.providers.insert(provider.name.clone(), provider))
    }

    /// Get a provider by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Provider> {
        self.providers.get(name)
    }

    /// All providers, ordered by name.
    pub fn providers(&self) -> impl Iterator<Item = &Provider> {
        self.providers.values()
    }

    /// Number of registered providers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Resolve an endpoint by logical name or wire path.
    ///
    /// Never fails: an unknown provider or endpoint is reported through the
    /// returned [`Lookup`] variant.
    #[must_use]
    pub fn lookup(&self, provider: &str, endpoint_ref: &str) -> Lookup<'_> {
        let Some(entry) = self.providers.get(provider) else {
            return Lookup::UnknownProvider;
        };

        let by_name = || entry.endpoints.iter().find(|e| e.name == endpoint_ref);
        let by_path = || {
            entry
                .endpoints
                .iter()
                .find(|e| e.path.as_deref() == Some(endpoint_ref))
        };
        let by_normalized_path = || {
            let wanted = normalize_path(endpoint_ref);
            entry
                .endpoints
                .iter()
                .find(|e| e.path.as_deref().map(normalize_path) == Some(wanted))
        };

        by_name()
            .or_else(by_path)
            .or_else(by_normalized_path)
            .map_or(Lookup::UnknownEndpoint, |endpoint| Lookup::Found {
                provider: entry,
                endpoint,
            })
    }

    /// List prices used when no catalog file is configured.
    #[must_use]
    pub fn with_defaults() -> Self {
        let providers = vec![
            Provider::new("dataforseo", BillingType::PayPerUse)
                .with_endpoint(
                    Endpoint::new("keywords_volume", 750)
                        .with_path("/v3/keywords_data/google_ads/search_volume/live")
                        .with_unit("keyword")
                        .with_category("keywords"),
                )
                .with_endpoint(
                    Endpoint::new("serp_organic", 2_000)
                        .with_path("/v3/serp/google/organic/live/advanced")
                        .with_unit("request")
                        .with_category("serp"),
                )
                .with_endpoint(
                    Endpoint::new("backlinks_summary", 20_000)
                        .with_path("/v3/backlinks/summary/live")
                        .with_unit("request")
                        .with_category("backlinks"),
                )
                .with_endpoint(
                    Endpoint::new("onpage_lighthouse", 4_250)
                        .with_path("/v3/on_page/lighthouse/live/json")
                        .with_unit("page")
                        .with_category("onpage"),
                )
                .with_requests_per_minute(2_000),
            Provider::new("builtwith", BillingType::Subscription)
                .with_endpoint(
                    Endpoint::new("domain_lookup", 0)
                        .with_path("/v21/api.json")
                        .with_unit("lookup")
                        .with_category("technology"),
                )
                .with_subscription(SubscriptionTerms {
                    cost_micros: 295_000_000,
                    period: BillingPeriod::Monthly,
                    credits: 2_000,
                    renewal_date: None,
                })
                .with_requests_per_minute(60),
            Provider::new("semrush", BillingType::Hybrid)
                .with_endpoint(
                    Endpoint::new("domain_overview", 500)
                        .with_path("/analytics/v1/")
                        .with_unit("line")
                        .with_category("seo"),
                )
                .with_endpoint(
                    Endpoint::new("backlinks_overview", 400)
                        .with_path("/analytics/v1/backlinks_overview")
                        .with_unit("line")
                        .with_category("backlinks"),
                )
                .with_subscription(SubscriptionTerms {
                    cost_micros: 1_679_400_000,
                    period: BillingPeriod::Yearly,
                    credits: 0,
                    renewal_date: None,
                })
                .with_requests_per_minute(600),
            Provider::new("google_places", BillingType::PayPerUse)
                .with_endpoint(
                    Endpoint::new("place_details", 17_000)
                        .with_path("/maps/api/place/details/json")
                        .with_category("listings"),
                )
                .with_endpoint(
                    Endpoint::new("text_search", 32_000)
                        .with_path("/maps/api/place/textsearch/json")
                        .with_category("listings"),
                )
                .with_requests_per_minute(6_000),
            Provider::new("social_data", BillingType::Subscription)
                .with_endpoint(
                    Endpoint::new("profile_lookup", 0)
                        .with_path("/v1/profiles")
                        .with_category("social"),
                )
                .with_subscription(SubscriptionTerms {
                    cost_micros: 100_000_000,
                    period: BillingPeriod::Monthly,
                    credits: 10_000,
                    renewal_date: None,
                })
                .with_requests_per_minute(300),
        ];

        let mut registry = Self::new();
        for provider in providers {
            registry.providers.insert(provider.name.clone(), provider);
        }
        registry
    }
}

fn normalize_path(path: &str) -> &str {
    let path = path.split_once('?').map_or(path, |(p, _)| p);
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/"
    } else {
        trimmed
    }
}
