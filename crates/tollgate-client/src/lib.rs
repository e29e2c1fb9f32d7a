//! Tollgate Client SDK.
//!
//! Collectors call [`TollgateClient::record_usage`] after every third-party API
//! call. It never returns an error: a tollgate outage is logged and the
//! collector carries on. Dashboards and scripts use the typed read calls.
//!
//! # Example
//!
//! ```no_run
//! use tollgate_client::{ClientOptions, TollgateClient};
//! use tollgate_core::UsageContext;
//!
//! # async fn example() -> Result<(), tollgate_client::ClientError> {
//! let client = TollgateClient::with_options(
//!     "http://tollgate.internal:8080",
//!     "your-service-api-key",
//!     ClientOptions::with_collector("keyword-research"),
//! )?;
//!
//! // Report 1000 keywords looked up on DataForSEO
//! client
//!     .record_usage(
//!         "dataforseo",
//!         "keywords_volume",
//!         1000,
//!         UsageContext::default().with_status(200).with_response_time(840),
//!     )
//!     .await;
//!
//! let usage = client.monthly_usage(None).await?;
//! println!("Spent ${:.2} this month", tollgate_core::micros_to_usd(usage.costs.total));
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

mod client;
mod error;
mod types;

pub use client::{ClientOptions, TollgateClient};
pub use error::ClientError;
pub use types::*;
