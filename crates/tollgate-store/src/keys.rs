//! Key encoding for the `RocksDB` backend.
//!
//! Event keys sort by time: an 8-byte order-preserving encoding of the
//! timestamp in microseconds, followed by the 16 ULID bytes of the event id.

use chrono::{DateTime, Utc};
use tollgate_core::{EventId, Period};

/// Length of an event key.
pub const EVENT_KEY_LEN: usize = 24;

/// Order-preserving big-endian encoding of a timestamp.
///
/// Flipping the sign bit makes negative values sort before positive ones.
#[must_use]
pub fn timestamp_prefix(ts: DateTime<Utc>) -> [u8; 8] {
    let mut bytes = ts.timestamp_micros().to_be_bytes();
    bytes[0] ^= 0x80;
    bytes
}

/// Create an event key.
#[must_use]
pub fn event_key(ts: DateTime<Utc>, event_id: &EventId) -> Vec<u8> {
    let mut key = Vec::with_capacity(EVENT_KEY_LEN);
    key.extend_from_slice(&timestamp_prefix(ts));
    key.extend_from_slice(&event_id.to_bytes());
    key
}

/// Extract the event id from an event key.
///
/// Returns `None` if the key has the wrong length.
#[must_use]
pub fn event_id_from_key(key: &[u8]) -> Option<EventId> {
    if key.len() != EVENT_KEY_LEN {
        return None;
    }
    let bytes: [u8; 16] = key[8..].try_into().ok()?;
    Some(EventId::from_bytes(bytes))
}

/// Create a subscription key.
#[must_use]
pub fn subscription_key(provider: &str) -> Vec<u8> {
    provider.as_bytes().to_vec()
}

/// Prefix shared by every alert of a period.
#[must_use]
pub fn alert_prefix(period: Period) -> Vec<u8> {
    period.to_string().into_bytes()
}

/// Create an alert key: `YYYY-MM || threshold (u32 BE)`.
#[must_use]
pub fn alert_key(period: Period, threshold_percent: u32) -> Vec<u8> {
    let mut key = alert_prefix(period);
    key.extend_from_slice(&threshold_percent.to_be_bytes());
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    #[test]
    fn event_keys_sort_by_time() {
        let id = EventId::generate();
        let earlier = event_key(ts("1969-12-31T23:59:59Z"), &id);
        let epoch = event_key(ts("1970-01-01T00:00:00Z"), &id);
        let later = event_key(ts("2026-10-16T00:00:00Z"), &id);
        assert!(earlier < epoch);
        assert!(epoch < later);
    }

    #[test]
    fn event_id_survives_the_key() {
        let id = EventId::generate();
        let key = event_key(Utc::now(), &id);
        assert_eq!(key.len(), EVENT_KEY_LEN);
        assert_eq!(event_id_from_key(&key), Some(id));
        assert_eq!(event_id_from_key(&key[..10]), None);
    }

    #[test]
    fn alert_keys_group_by_period() {
        let october = Period::new(2026, 10).unwrap();
        let key = alert_key(october, 75);
        assert!(key.starts_with(&alert_prefix(october)));
        assert!(alert_key(october, 50) < alert_key(october, 100));
        assert!(!key.starts_with(&alert_prefix(october.next())));
    }
}
