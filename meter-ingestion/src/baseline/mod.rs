mod initializer;

pub use initializer::{BaselineInitializer, BaselineOrigin, BaselineRefresh};

use std::{
    collections::BTreeMap,
    sync::{Arc, PoisonError, RwLock},
};

use meter_client::domain::MeterIndex;
use time::Date;

#[derive(Debug, Default)]
struct BaselineState {
    /// Accounting day the mapping belongs to; `None` until the first refresh.
    day: Option<Date>,
    values: BTreeMap<MeterIndex, f64>,
}

/// Start-of-day cumulative energy per meter.
///
/// Cloning yields another handle to the same state. Readers see either the
/// mapping before a `set_all` or the one after, never a mix.
#[derive(Debug, Clone, Default)]
pub struct BaselineStore {
    inner: Arc<RwLock<BaselineState>>,
}

impl BaselineStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, meter: MeterIndex) -> Option<f64> {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        guard.values.get(&meter).copied()
    }

    /// Copy of the whole mapping as of now.
    pub fn snapshot(&self) -> BTreeMap<MeterIndex, f64> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values
            .clone()
    }

    pub fn day(&self) -> Option<Date> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).day
    }

    /// True when the mapping does not belong to accounting day `day` or a
    /// later one.
    pub fn is_stale_for(&self, day: Date) -> bool {
        self.day().map_or(true, |d| d < day)
    }

    /// Replace the whole mapping with the baseline of accounting day `day`.
    pub fn set_all(&self, day: Date, baseline: BTreeMap<MeterIndex, f64>) {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        *guard = BaselineState {
            day: Some(day),
            values: baseline,
        };
    }

    /// Start accounting day `day` with no baselines, unless the mapping
    /// already belongs to it. Returns whether the mapping was cleared.
    pub fn roll_over(&self, day: Date) -> bool {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if guard.day.is_some_and(|d| d >= day) {
            return false;
        }
        *guard = BaselineState {
            day: Some(day),
            values: BTreeMap::new(),
        };
        true
    }

    /// Record `kwh` for `meter` unless a baseline already exists, returning
    /// the baseline in effect afterwards.
    pub fn set_if_absent(&self, meter: MeterIndex, kwh: f64) -> f64 {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        *guard.values.entry(meter).or_insert(kwh)
    }

    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    #[test]
    fn first_seen_value_wins() {
        let store = BaselineStore::new();
        assert_eq!(store.get(5), None);

        assert_eq!(store.set_if_absent(5, 42.0), 42.0);
        assert_eq!(store.set_if_absent(5, 99.0), 42.0);
        assert_eq!(store.get(5), Some(42.0));
    }

    #[test]
    fn set_all_replaces_wholesale() {
        let store = BaselineStore::new();
        store.set_if_absent(1, 1.0);
        store.set_if_absent(2, 2.0);

        store.set_all(date!(2024-03-01), BTreeMap::from([(3, 100.0)]));

        assert_eq!(store.get(1), None);
        assert_eq!(store.get(2), None);
        assert_eq!(store.get(3), Some(100.0));
        assert_eq!(store.len(), 1);
        assert_eq!(store.day(), Some(date!(2024-03-01)));
    }

    #[test]
    fn clones_share_state() {
        let store = BaselineStore::new();
        let other = store.clone();
        other.set_all(date!(2024-03-01), BTreeMap::from([(7, 7.0)]));
        assert_eq!(store.snapshot(), BTreeMap::from([(7, 7.0)]));
    }

    #[test]
    fn mapping_goes_stale_on_the_next_day() {
        let store = BaselineStore::new();
        assert!(store.is_stale_for(date!(2024-03-01)));

        store.set_all(date!(2024-03-01), BTreeMap::from([(3, 100.0)]));
        assert!(!store.is_stale_for(date!(2024-03-01)));
        assert!(!store.is_stale_for(date!(2024-02-29)));
        assert!(store.is_stale_for(date!(2024-03-02)));
    }

    #[test]
    fn roll_over_clears_only_older_days() {
        let store = BaselineStore::new();
        store.set_all(date!(2024-03-01), BTreeMap::from([(3, 100.0)]));

        assert!(!store.roll_over(date!(2024-03-01)));
        assert_eq!(store.get(3), Some(100.0));

        assert!(store.roll_over(date!(2024-03-02)));
        assert!(store.is_empty());
        assert_eq!(store.day(), Some(date!(2024-03-02)));
    }
}
