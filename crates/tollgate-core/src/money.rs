//! Money representation.
//!
//! **1 USD = 1 000 000 micros.** Every stored amount is an `i64` count of
//! micro-dollars so that sums are exact regardless of the order in which
//! events are added. Floating point only appears at the edges: unit costs
//! read from configuration, and amounts rendered to JSON.

/// Micro-dollars per US dollar.
pub const MICROS_PER_USD: i64 = 1_000_000;

/// Convert a USD amount to micros, rounding half away from zero.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn usd_to_micros(usd: f64) -> i64 {
    #[allow(clippy::cast_precision_loss)]
    let scaled = usd * MICROS_PER_USD as f64;
    scaled.round() as i64
}

/// Convert micros to a USD amount for display.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn micros_to_usd(micros: i64) -> f64 {
    micros as f64 / MICROS_PER_USD as f64
}

/// `part` as a percentage of `whole`; `None` when `whole` is not positive.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn percent_of(part: i64, whole: i64) -> Option<f64> {
    (whole > 0).then(|| part as f64 * 100.0 / whole as f64)
}

/// Serde adapter rendering an `i64` micro amount as a USD number.
///
/// ```
/// # use serde::{Deserialize, Serialize};
/// #[derive(Serialize, Deserialize)]
/// struct Line {
///     #[serde(with = "tollgate_core::money::usd")]
///     cost: i64,
/// }
/// let json = serde_json::to_string(&Line { cost: 750_000 }).unwrap();
/// assert_eq!(json, r#"{"cost":0.75}"#);
/// ```
pub mod usd {
    use serde::{Deserialize, Deserializer, Serializer};

    /// Serialize micros as USD.
    ///
    /// # Errors
    ///
    /// Propagates serializer errors.
    pub fn serialize<S: Serializer>(micros: &i64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(super::micros_to_usd(*micros))
    }

    /// Deserialize USD into micros.
    ///
    /// # Errors
    ///
    /// Propagates deserializer errors.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
        f64::deserialize(deserializer).map(super::usd_to_micros)
    }
}

/// Like [`usd`], for optional amounts.
pub mod usd_opt {
    use serde::{Deserialize, Deserializer, Serializer};

    /// Serialize optional micros as USD or `null`.
    ///
    /// # Errors
    ///
    /// Propagates serializer errors.
    #[allow(clippy::ref_option)]
    pub fn serialize<S: Serializer>(micros: &Option<i64>, serializer: S) -> Result<S::Ok, S::Error> {
        match micros {
            Some(m) => serializer.serialize_some(&super::micros_to_usd(*m)),
            None => serializer.serialize_none(),
        }
    }

    /// Deserialize optional USD into micros.
    ///
    /// # Errors
    ///
    /// Propagates deserializer errors.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
        Option::<f64>::deserialize(deserializer).map(|usd| usd.map(super::usd_to_micros))
    }
}
