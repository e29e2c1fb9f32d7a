//! Request authentication extractors.
//!
//! - `ServiceAuth` - collectors reporting usage, via `x-api-key`
//! - `AdminAuth` - budget and subscription writes, via `x-admin-key`
//!
//! A key that is not configured rejects every request for its scope.

use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::crypto::constant_time_eq;
use crate::error::ApiError;
use crate::state::AppState;

/// Header carrying the collector API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Header carrying the admin key.
pub const ADMIN_KEY_HEADER: &str = "x-admin-key";

/// An authenticated collector.
#[derive(Debug, Clone)]
pub struct ServiceAuth {
    /// Collector name from `x-collector`, or "unknown".
    pub collector: String,
}

impl FromRequestParts<Arc<AppState>> for ServiceAuth {
    type Rejection = ApiError;

    fn from_request_parts<'life0, 'life1, 'async_trait>(
        parts: &'life0 mut Parts,
        state: &'life1 Arc<AppState>,
    ) -> ::core::pin::Pin<
        Box<
            dyn ::core::future::Future<Output = Result<Self, Self::Rejection>>
                + ::core::marker::Send
                + 'async_trait,
        >,
    >
    where
        'life0: 'async_trait,
        'life1: 'async_trait,
        Self: 'async_trait,
    {
        Box::pin(async move {
            check_key(
                parts,
                API_KEY_HEADER,
                state.config.service_api_key.as_deref(),
            )?;

            let collector = header_str(parts, "x-collector")
                .unwrap_or("unknown")
                .to_string();

            Ok(ServiceAuth { collector })
        })
    }
}

/// An authenticated administrator.
#[derive(Debug, Clone)]
pub struct AdminAuth {
    /// Admin identifier from `x-admin-id`, for audit logging.
    pub admin_id: String,
}

impl FromRequestParts<Arc<AppState>> for AdminAuth {
    type Rejection = ApiError;

    fn from_request_parts<'life0, 'life1, 'async_trait>(
        parts: &'life0 mut Parts,
        state: &'life1 Arc<AppState>,
    ) -> ::core::pin::Pin<
        Box<
            dyn ::core::future::Future<Output = Result<Self, Self::Rejection>>
                + ::core::marker::Send
                + 'async_trait,
        >,
    >
    where
        'life0: 'async_trait,
        'life1: 'async_trait,
        Self: 'async_trait,
    {
        Box::pin(async move {
            check_key(
                parts,
                ADMIN_KEY_HEADER,
                state.config.admin_api_key.as_deref(),
            )?;

            let admin_id = header_str(parts, "x-admin-id")
                .unwrap_or("admin")
                .to_string();

            tracing::info!(admin_id = %admin_id, "Admin authenticated");

            Ok(AdminAuth { admin_id })
        })
    }
}

fn header_str<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts.headers.get(name).and_then(|v| v.to_str().ok())
}

fn check_key(parts: &Parts, header: &str, expected: Option<&str>) -> Result<(), ApiError> {
    let presented = header_str(parts, header).ok_or(ApiError::Unauthorized)?;
    let expected = expected.ok_or(ApiError::Unauthorized)?;
    if constant_time_eq(presented, expected) {
        Ok(())
    } else {
        tracing::debug!(header, "Rejected key");
        Err(ApiError::Unauthorized)
    }
}
