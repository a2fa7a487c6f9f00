use std::{sync::Arc, time::Instant};

use meter_client::domain::{MeterReading, StoredReading};
use tokio::sync::Mutex;

use crate::{
    baseline::{BaselineInitializer, BaselineStore},
    pipeline::{AccountingZone, IngestError, PersistenceGateway, ReadingLog, ReadingSource},
    transform,
};

#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    Stored(StoredReading),
    /// Another tick was still in flight; nothing was done.
    Overlapped,
}

/// Fetch → consumption → persist → log, once per tick.
pub struct IngestionLoop<S, G, L> {
    source: Arc<S>,
    gateway: Arc<G>,
    log: Arc<L>,
    baseline: BaselineStore,
    initializer: BaselineInitializer<G>,
    zone: AccountingZone,
    active: Mutex<()>,
}

impl<S, G, L> IngestionLoop<S, G, L>
where
    S: ReadingSource,
    G: PersistenceGateway,
    L: ReadingLog,
{
    pub fn new(
        source: Arc<S>,
        gateway: Arc<G>,
        log: Arc<L>,
        baseline: BaselineStore,
        zone: AccountingZone,
    ) -> Self {
        let initializer = BaselineInitializer::new(gateway.clone(), baseline.clone());
        Self {
            source,
            gateway,
            log,
            baseline,
            initializer,
            zone,
            active: Mutex::new(()),
        }
    }

    /// Run one tick.
    ///
    /// Baselines first seen in this reading are committed to the store only
    /// after the row is written. A reading from a later accounting day than
    /// the stored baseline refreshes the baseline before consumption is
    /// computed.
    #[tracing::instrument(skip(self))]
    pub async fn tick(&self) -> Result<TickOutcome, IngestError> {
        let Ok(_active) = self.active.try_lock() else {
            metrics::counter!("ingest_ticks_overlapped_total").increment(1);
            tracing::warn!("previous ingestion tick still in flight, skipping");
            return Ok(TickOutcome::Overlapped);
        };
        let started = Instant::now();

        let envelope = self.source.fetch().await?;
        let reading = MeterReading {
            ts: self.zone.civil_from_system(envelope.received_at),
            meters: envelope.payload,
        };

        self.ensure_baseline_day(reading.ts.date()).await;

        let mut baseline = self.baseline.snapshot();
        let mut first_seen = Vec::new();
        for m in &reading.meters {
            if !baseline.contains_key(&m.meter) {
                baseline.insert(m.meter, m.total_net_kwh);
                first_seen.push((m.meter, m.total_net_kwh));
            }
        }

        let consumption = transform::compute_consumption(&reading, &baseline);
        let stored = StoredReading {
            reading,
            consumption,
        };

        if let Err(e) = self.gateway.insert_reading(&stored).await {
            tracing::error!(
                ts = %stored.reading.ts,
                error = %e,
                "store write failed, reading for this tick is dropped"
            );
            return Err(e);
        }
        metrics::counter!("sensordata_rows_inserted_total").increment(1);

        for (meter, kwh) in first_seen {
            let effective = self.baseline.set_if_absent(meter, kwh);
            tracing::info!(meter, baseline = effective, "baseline established from live reading");
        }

        for (meter, kwh) in stored.consumption.iter() {
            metrics::gauge!("meter_consumption_kwh", "meter" => meter.to_string()).set(kwh);
        }

        if let Err(e) = self.log.append(&stored.reading).await {
            metrics::counter!("reading_log_failures_total").increment(1);
            tracing::warn!(ts = %stored.reading.ts, error = %e, "failed to append reading to log");
        }

        metrics::histogram!("ingest_tick_duration_seconds").record(started.elapsed().as_secs_f64());
        Ok(TickOutcome::Stored(stored))
    }

    /// Move the store to accounting day `day` if it still holds an older one.
    ///
    /// If the refresh fails the older mapping is dropped and this day's
    /// baselines are taken from live readings instead.
    async fn ensure_baseline_day(&self, day: time::Date) {
        if !self.baseline.is_stale_for(day) {
            return;
        }

        tracing::info!(day = %day, stored_day = ?self.baseline.day(), "accounting day changed, refreshing baseline");
        if self.initializer.refresh(day).await.is_err() && self.baseline.roll_over(day) {
            tracing::warn!(day = %day, "baseline refresh failed, establishing today's baseline from live readings");
        }
    }

    /// Scheduler entry point: one tick with every failure logged and absorbed.
    pub async fn run_once(&self) {
        metrics::counter!("ingest_ticks_total").increment(1);

        match self.tick().await {
            Ok(TickOutcome::Stored(stored)) => {
                tracing::debug!(
                    ts = %stored.reading.ts,
                    meters = stored.reading.meters.len(),
                    "reading stored"
                );
            }
            Ok(TickOutcome::Overlapped) => {}
            Err(e) => {
                metrics::counter!("ingest_tick_failures_total", "kind" => e.kind()).increment(1);
                match &e {
                    IngestError::MalformedPayload { reason, payload } => {
                        tracing::error!(reason = %reason, payload = %payload, "malformed upstream payload, skipping tick");
                    }
                    _ => {
                        tracing::error!(error = %e, kind = e.kind(), "ingestion tick failed, retrying on next schedule");
                    }
                }
            }
        }
    }
}
