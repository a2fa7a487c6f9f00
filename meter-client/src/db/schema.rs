use std::collections::HashSet;

use crate::domain::{MeterChannels, MeterIndex};

/// Highest meter channel the upstream feed can expose.
pub const MAX_METERS: MeterIndex = 70;

pub const SENSORDATA_TABLE: &str = "sensordata";

pub const TIMESTAMP_COLUMN: &str = "timestamp";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    #[error("at least one meter must be configured")]
    Empty,
    #[error("meter index {0} is outside 1..=70")]
    OutOfRange(MeterIndex),
    #[error("meter index {0} is configured more than once")]
    Duplicate(MeterIndex),
}

/// Per-meter channel columns of `sensordata`, in insert and log order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    TotalKw,
    TotalNetKwh,
    TotalKva,
    AvgPf,
    TotalNetKvah,
}

impl Channel {
    pub const ALL: [Channel; 5] = [
        Channel::TotalKw,
        Channel::TotalNetKwh,
        Channel::TotalKva,
        Channel::AvgPf,
        Channel::TotalNetKvah,
    ];

    pub fn prefix(self) -> &'static str {
        match self {
            Channel::TotalKw => "Total_KW",
            Channel::TotalNetKwh => "TotalNet_KWH",
            Channel::TotalKva => "Total_KVA",
            Channel::AvgPf => "Avg_PF",
            Channel::TotalNetKvah => "TotalNet_KVAH",
        }
    }

    /// Column (and upstream field) name for this channel of `meter`.
    pub fn column(self, meter: MeterIndex) -> String {
        format!("{}_meter_{meter}", self.prefix())
    }

    pub fn value(self, m: &MeterChannels) -> f64 {
        match self {
            Channel::TotalKw => m.total_kw,
            Channel::TotalNetKwh => m.total_net_kwh,
            Channel::TotalKva => m.total_kva,
            Channel::AvgPf => m.avg_pf,
            Channel::TotalNetKvah => m.total_net_kvah,
        }
    }
}

pub fn consumption_column(meter: MeterIndex) -> String {
    format!("energy_consumption_meter_{meter}")
}

pub(crate) fn quote_ident(ident: &str) -> String {
    format!("`{ident}`")
}

/// The set of meter channels stored in `sensordata`.
///
/// Every column name used in generated SQL is derived from a validated
/// meter index, never from caller-supplied text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeterSchema {
    meters: Vec<MeterIndex>,
}

impl MeterSchema {
    pub fn new<I>(meters: I) -> Result<Self, SchemaError>
    where
        I: IntoIterator<Item = MeterIndex>,
    {
        let meters: Vec<MeterIndex> = meters.into_iter().collect();
        if meters.is_empty() {
            return Err(SchemaError::Empty);
        }

        let mut seen = HashSet::with_capacity(meters.len());
        for &meter in &meters {
            if meter == 0 || meter > MAX_METERS {
                return Err(SchemaError::OutOfRange(meter));
            }
            if !seen.insert(meter) {
                return Err(SchemaError::Duplicate(meter));
            }
        }

        Ok(Self { meters })
    }

    pub fn meters(&self) -> &[MeterIndex] {
        &self.meters
    }

    pub fn len(&self) -> usize {
        self.meters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.meters.is_empty()
    }

    /// Columns of an insert: timestamp, every channel per meter, then the
    /// consumption column per meter.
    pub fn insert_columns(&self) -> Vec<String> {
        let mut cols = Vec::with_capacity(1 + self.meters.len() * (Channel::ALL.len() + 1));
        cols.push(TIMESTAMP_COLUMN.to_string());
        for &meter in &self.meters {
            cols.extend(Channel::ALL.iter().map(|c| c.column(meter)));
        }
        cols.extend(self.meters.iter().map(|&m| consumption_column(m)));
        cols
    }

    /// Cumulative net energy column per meter.
    pub fn energy_columns(&self) -> Vec<(MeterIndex, String)> {
        self.meters
            .iter()
            .map(|&m| (m, Channel::TotalNetKwh.column(m)))
            .collect()
    }

    pub fn create_table_sql(&self) -> String {
        let mut sql = format!("CREATE TABLE IF NOT EXISTS {} (\n", quote_ident(SENSORDATA_TABLE));
        sql.push_str("  `id` BIGINT UNSIGNED NOT NULL AUTO_INCREMENT,\n");
        sql.push_str("  `timestamp` DATETIME NOT NULL,\n");
        for col in self.insert_columns().iter().skip(1) {
            sql.push_str(&format!("  {} DOUBLE NULL,\n", quote_ident(col)));
        }
        sql.push_str("  PRIMARY KEY (`id`),\n");
        sql.push_str("  KEY `idx_sensordata_timestamp` (`timestamp`)\n");
        sql.push(')');
        sql
    }
}
