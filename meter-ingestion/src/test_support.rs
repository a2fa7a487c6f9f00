//! In-memory fakes for the pipeline seams.

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Mutex,
    },
    time::{Duration, SystemTime},
};

use meter_client::domain::{
    EnergyProjection, MeterChannels, MeterIndex, MeterReading, StoredReading,
};
use time::{Date, OffsetDateTime, PrimitiveDateTime};

use crate::pipeline::{
    Clock, Envelope, IngestError, PersistenceGateway, ReadingLog, ReadingSource,
};

pub(crate) fn channels(meter: MeterIndex, kwh: f64) -> MeterChannels {
    MeterChannels {
        meter,
        total_kw: 2.5,
        total_kva: 2.7,
        avg_pf: 0.93,
        total_net_kwh: kwh,
        total_net_kvah: kwh * 1.05,
    }
}

pub(crate) fn projection(ts: PrimitiveDateTime, kwh: &[(MeterIndex, f64)]) -> EnergyProjection {
    EnergyProjection {
        ts,
        kwh: kwh.iter().copied().collect(),
    }
}

#[derive(Default)]
pub(crate) struct FakeGateway {
    history: Mutex<Vec<EnergyProjection>>,
    inserted: Mutex<Vec<StoredReading>>,
    fail_inserts: AtomicBool,
    fail_queries: AtomicBool,
    insert_delay_ms: AtomicUsize,
}

impl FakeGateway {
    pub(crate) fn with_history(history: Vec<EnergyProjection>) -> Self {
        Self {
            history: Mutex::new(history),
            ..Self::default()
        }
    }

    pub(crate) fn fail_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn fail_queries(&self, fail: bool) {
        self.fail_queries.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn delay_inserts(&self, delay: Duration) {
        self.insert_delay_ms
            .store(delay.as_millis() as usize, Ordering::SeqCst);
    }

    pub(crate) fn inserted(&self) -> Vec<StoredReading> {
        self.inserted.lock().unwrap().clone()
    }

    fn on_date(&self, date: Date) -> Result<Vec<EnergyProjection>, IngestError> {
        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(IngestError::BaselineQuery("connection refused".to_string()));
        }
        let history = self.history.lock().unwrap();
        Ok(history
            .iter()
            .filter(|p| p.ts.date() == date)
            .cloned()
            .collect())
    }
}

#[async_trait::async_trait]
impl PersistenceGateway for FakeGateway {
    async fn insert_reading(&self, stored: &StoredReading) -> Result<(), IngestError> {
        let delay = self.insert_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay as u64)).await;
        }
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(IngestError::StoreWrite("lost connection".to_string()));
        }

        self.history.lock().unwrap().push(EnergyProjection {
            ts: stored.reading.ts,
            kwh: stored
                .reading
                .meters
                .iter()
                .map(|m| (m.meter, m.total_net_kwh))
                .collect(),
        });
        self.inserted.lock().unwrap().push(stored.clone());
        Ok(())
    }

    async fn last_reading_for_date(&self, date: Date) -> Result<Option<EnergyProjection>, IngestError> {
        Ok(self.on_date(date)?.into_iter().max_by_key(|p| p.ts))
    }

    async fn first_reading_for_date(&self, date: Date) -> Result<Option<EnergyProjection>, IngestError> {
        Ok(self.on_date(date)?.into_iter().min_by_key(|p| p.ts))
    }
}

pub(crate) struct FakeSource {
    responses: Mutex<VecDeque<Result<Vec<MeterChannels>, IngestError>>>,
    received_at: SystemTime,
}

impl FakeSource {
    pub(crate) fn new(received_at: OffsetDateTime) -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            received_at: received_at.into(),
        }
    }

    pub(crate) fn push(&self, response: Result<Vec<MeterChannels>, IngestError>) {
        self.responses.lock().unwrap().push_back(response);
    }
}

#[async_trait::async_trait]
impl ReadingSource for FakeSource {
    async fn fetch(&self) -> Result<Envelope<Vec<MeterChannels>>, IngestError> {
        let next = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(IngestError::UpstreamFetch("no response queued".to_string())));
        next.map(|payload| Envelope {
            payload,
            received_at: self.received_at,
        })
    }
}

#[derive(Default)]
pub(crate) struct FakeLog {
    lines: Mutex<Vec<MeterReading>>,
    fail: AtomicBool,
}

impl FakeLog {
    pub(crate) fn fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn appended(&self) -> Vec<MeterReading> {
        self.lines.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl ReadingLog for FakeLog {
    async fn append(&self, reading: &MeterReading) -> Result<(), IngestError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(IngestError::LogSink("disk full".to_string()));
        }
        self.lines.lock().unwrap().push(reading.clone());
        Ok(())
    }
}

pub(crate) struct FixedClock(pub OffsetDateTime);

impl Clock for FixedClock {
    fn now(&self) -> OffsetDateTime {
        self.0
    }
}
