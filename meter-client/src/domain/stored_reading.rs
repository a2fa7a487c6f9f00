use std::collections::BTreeMap;

use time::PrimitiveDateTime;

use super::{MeterIndex, MeterReading};

/// Per-meter energy used since the accounting-day baseline.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ConsumptionRecord(BTreeMap<MeterIndex, f64>);

impl ConsumptionRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, meter: MeterIndex, kwh: f64) {
        self.0.insert(meter, kwh);
    }

    pub fn get(&self, meter: MeterIndex) -> Option<f64> {
        self.0.get(&meter).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (MeterIndex, f64)> + '_ {
        self.0.iter().map(|(m, v)| (*m, *v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(MeterIndex, f64)> for ConsumptionRecord {
    fn from_iter<I: IntoIterator<Item = (MeterIndex, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// One `sensordata` row: the raw reading plus its consumption deltas.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredReading {
    pub reading: MeterReading,
    pub consumption: ConsumptionRecord,
}

/// Cumulative energy per meter as read back from a stored row.
///
/// Meters whose column is NULL in the row are absent from `kwh`.
#[derive(Debug, Clone, PartialEq)]
pub struct EnergyProjection {
    pub ts: PrimitiveDateTime,
    pub kwh: BTreeMap<MeterIndex, f64>,
}
