//! `RocksDB` ledger implementation.

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, Direction, IteratorMode,
    MultiThreaded, Options,
};
use tracing::debug;

use tollgate_core::{Budget, BudgetAlert, Period, Subscription, UsageEvent};

use crate::error::{Result, StoreError};
use crate::keys;
use crate::schema::{all_column_families, cf, BUDGET_KEY};
use crate::{Ledger, LedgerFilter};

/// RocksDB-backed [`Ledger`].
///
/// Read-modify-write operations (subscription updates, threshold claims) are
/// serialized by an in-process lock. `RocksDB` allows one process per
/// database directory, so the lock covers every writer.
pub struct RocksLedger {
    db: Arc<DBWithThreadMode<MultiThreaded>>,
    write_lock: Mutex<()>,
}

impl RocksLedger {
    /// Open or create a `RocksDB` database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<_> = all_column_families()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = DBWithThreadMode::open_cf_descriptors(&opts, path.as_ref(), cf_descriptors)
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        debug!(path = %path.as_ref().display(), "opened rocksdb ledger");

        Ok(Self {
            db: Arc::new(db),
            write_lock: Mutex::new(()),
        })
    }

    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("column family not found: {name}")))
    }

    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    fn deserialize<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T> {
        ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn get<T: serde::de::DeserializeOwned>(&self, cf_name: &str, key: &[u8]) -> Result<Option<T>> {
        let cf = self.cf(cf_name)?;
        self.db
            .get_cf(&cf, key)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn put<T: serde::Serialize>(&self, cf_name: &str, key: &[u8], value: &T) -> Result<()> {
        let cf = self.cf(cf_name)?;
        let value = Self::serialize(value)?;
        self.db
            .put_cf(&cf, key, value)
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    /// Iterate `cf_name` from `start`, while `keep(key)` holds.
    fn iterate(
        &self,
        cf_name: &str,
        start: &[u8],
        keep: impl Fn(&[u8]) -> bool,
        visit: &mut dyn FnMut(&[u8], &[u8]) -> Result<()>,
    ) -> Result<()> {
        let cf = self.cf(cf_name)?;
        let iter = self
            .db
            .iterator_cf(&cf, IteratorMode::From(start, Direction::Forward));
        for item in iter {
            let (key, value) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            if !keep(&key[..]) {
                break;
            }
            visit(&key[..], &value[..])?;
        }
        Ok(())
    }
}

impl Ledger for RocksLedger {
    // =========================================================================
    // Usage events
    // =========================================================================

    fn append(&self, event: &UsageEvent) -> Result<()> {
        let key = keys::event_key(event.timestamp, &event.event_id);
        self.put(cf::USAGE_EVENTS, &key, event)
    }

    fn for_each(
        &self,
        filter: &LedgerFilter,
        visit: &mut dyn FnMut(&UsageEvent) -> Result<()>,
    ) -> Result<()> {
        let (start, end) = match filter.range {
            Some(range) => (
                keys::timestamp_prefix(range.start).to_vec(),
                Some(keys::timestamp_prefix(range.end)),
            ),
            None => (Vec::new(), None),
        };

        self.iterate(
            cf::USAGE_EVENTS,
            &start,
            |key| end.map_or(true, |end| key < &end[..]),
            &mut |key, value| {
                if keys::event_id_from_key(key).is_none() {
                    return Err(StoreError::CorruptKey {
                        column_family: cf::USAGE_EVENTS,
                        len: key.len(),
                    });
                }
                let event: UsageEvent = Self::deserialize(value)?;
                if filter.matches(&event) {
                    visit(&event)?;
                }
                Ok(())
            },
        )
    }

    // =========================================================================
    // Subscriptions
    // =========================================================================

    fn put_subscription(&self, subscription: &Subscription) -> Result<()> {
        let _guard = self.write_lock.lock();
        self.put(
            cf::SUBSCRIPTIONS,
            &keys::subscription_key(&subscription.provider),
            subscription,
        )
    }

    fn get_subscription(&self, provider: &str) -> Result<Option<Subscription>> {
        self.get(cf::SUBSCRIPTIONS, &keys::subscription_key(provider))
    }

    fn list_subscriptions(&self) -> Result<Vec<Subscription>> {
        let mut subscriptions: Vec<Subscription> = Vec::new();
        self.iterate(cf::SUBSCRIPTIONS, &[], |_| true, &mut |_, value| {
            subscriptions.push(Self::deserialize(value)?);
            Ok(())
        })?;
        Ok(subscriptions)
    }

    fn update_subscription(
        &self,
        provider: &str,
        update: &mut dyn FnMut(&mut Subscription),
    ) -> Result<Option<Subscription>> {
        let _guard = self.write_lock.lock();
        let key = keys::subscription_key(provider);
        let Some(mut subscription) = self.get::<Subscription>(cf::SUBSCRIPTIONS, &key)? else {
            return Ok(None);
        };
        update(&mut subscription);
        self.put(cf::SUBSCRIPTIONS, &key, &subscription)?;
        Ok(Some(subscription))
    }

    // =========================================================================
    // Budget and threshold claims
    // =========================================================================

    fn put_budget(&self, budget: &Budget) -> Result<()> {
        self.put(cf::META, BUDGET_KEY, budget)
    }

    fn get_budget(&self) -> Result<Option<Budget>> {
        self.get(cf::META, BUDGET_KEY)
    }

    fn claim_threshold(&self, alert: &BudgetAlert) -> Result<bool> {
        let _guard = self.write_lock.lock();
        let key = keys::alert_key(alert.period, alert.threshold_percent);
        let cf = self.cf(cf::BUDGET_ALERTS)?;
        let existing = self
            .db
            .get_pinned_cf(&cf, &key)
            .map_err(|e| StoreError::Database(e.to_string()))?;
        if existing.is_some() {
            return Ok(false);
        }
        self.put(cf::BUDGET_ALERTS, &key, alert)?;
        Ok(true)
    }

    fn list_alerts(&self, period: Period) -> Result<Vec<BudgetAlert>> {
        let prefix = keys::alert_prefix(period);
        let mut alerts: Vec<BudgetAlert> = Vec::new();
        self.iterate(
            cf::BUDGET_ALERTS,
            &prefix,
            |key| key.starts_with(&prefix),
            &mut |_, value| {
                alerts.push(Self::deserialize(value)?);
                Ok(())
            },
        )?;
        Ok(alerts)
    }
}
