use std::time::SystemTime;

use meter_client::domain::{EnergyProjection, MeterChannels, MeterReading, StoredReading};
use time::{Date, OffsetDateTime, PrimitiveDateTime, UtcOffset};

#[derive(Debug, Clone)]
pub struct Envelope<T> {
    pub payload: T,
    pub received_at: SystemTime,
}

#[derive(thiserror::Error, Debug)]
pub enum IngestError {
    #[error("upstream fetch failed: {0}")]
    UpstreamFetch(String),
    #[error("malformed upstream payload: {reason}")]
    MalformedPayload { reason: String, payload: String },
    #[error("store write failed: {0}")]
    StoreWrite(String),
    #[error("baseline query failed: {0}")]
    BaselineQuery(String),
    #[error("log sink error: {0}")]
    LogSink(String),
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl IngestError {
    /// Short label used for metrics and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UpstreamFetch(_) => "upstream_fetch",
            Self::MalformedPayload { .. } => "malformed_payload",
            Self::StoreWrite(_) => "store_write",
            Self::BaselineQuery(_) => "baseline_query",
            Self::LogSink(_) => "log_sink",
            Self::Config(_) => "config",
        }
    }
}

/// Upstream telemetry feed.
#[async_trait::async_trait]
pub trait ReadingSource: Send + Sync {
    async fn fetch(&self) -> Result<Envelope<Vec<MeterChannels>>, IngestError>;
}

/// The only reader and writer of `sensordata` for ingestion purposes.
///
/// Each call is a single round-trip on its own connection.
#[async_trait::async_trait]
pub trait PersistenceGateway: Send + Sync {
    async fn insert_reading(&self, stored: &StoredReading) -> Result<(), IngestError>;

    async fn last_reading_for_date(&self, date: Date) -> Result<Option<EnergyProjection>, IngestError>;

    async fn first_reading_for_date(&self, date: Date) -> Result<Option<EnergyProjection>, IngestError>;
}

/// Append-only sink for raw readings.
#[async_trait::async_trait]
pub trait ReadingLog: Send + Sync {
    async fn append(&self, reading: &MeterReading) -> Result<(), IngestError>;
}

pub trait Clock: Send + Sync {
    fn now(&self) -> OffsetDateTime;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// Fixed civil time zone in which readings are stamped and accounting days
/// begin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountingZone {
    offset: UtcOffset,
}

impl AccountingZone {
    pub fn new(offset: UtcOffset) -> Self {
        Self { offset }
    }

    pub fn offset(&self) -> UtcOffset {
        self.offset
    }

    pub fn civil(&self, instant: OffsetDateTime) -> PrimitiveDateTime {
        let local = instant.to_offset(self.offset);
        PrimitiveDateTime::new(local.date(), local.time())
    }

    pub fn civil_from_system(&self, instant: SystemTime) -> PrimitiveDateTime {
        self.civil(OffsetDateTime::from(instant))
    }

    pub fn today(&self, clock: &dyn Clock) -> Date {
        self.civil(clock.now()).date()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FixedClock;
    use time::macros::{date, datetime, offset};

    #[test]
    fn civil_time_shifts_utc_into_zone() {
        let zone = AccountingZone::new(offset!(+05:30));
        let civil = zone.civil(datetime!(2024-03-01 20:00:00 UTC));
        assert_eq!(civil, datetime!(2024-03-02 01:30:00));
    }

    #[test]
    fn today_uses_zone_date_not_utc_date() {
        let clock = FixedClock(datetime!(2024-03-01 19:00:00 UTC));
        let zone = AccountingZone::new(offset!(+05:30));
        assert_eq!(zone.today(&clock), date!(2024-03-02));

        let utc = AccountingZone::new(UtcOffset::UTC);
        assert_eq!(utc.today(&clock), date!(2024-03-01));
    }
}
