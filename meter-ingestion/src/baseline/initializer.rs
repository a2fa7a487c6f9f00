use std::{collections::BTreeMap, sync::Arc};

use meter_client::domain::MeterIndex;
use time::Date;

use super::BaselineStore;
use crate::pipeline::{IngestError, PersistenceGateway};

/// Where a refreshed baseline came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaselineOrigin {
    /// Last reading of the day before `as_of`.
    PreviousDayLast,
    /// First reading of `as_of` itself.
    SameDayFirst,
    /// No history; ingestion establishes baselines lazily.
    Unestablished,
}

impl BaselineOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PreviousDayLast => "previous_day_last",
            Self::SameDayFirst => "same_day_first",
            Self::Unestablished => "unestablished",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BaselineRefresh {
    pub origin: BaselineOrigin,
    pub baseline: BTreeMap<MeterIndex, f64>,
}

/// Computes the accounting-day baseline from stored history.
pub struct BaselineInitializer<G> {
    gateway: Arc<G>,
    store: BaselineStore,
}

impl<G> BaselineInitializer<G>
where
    G: PersistenceGateway,
{
    pub fn new(gateway: Arc<G>, store: BaselineStore) -> Self {
        Self { gateway, store }
    }

    pub fn store(&self) -> &BaselineStore {
        &self.store
    }

    /// Recompute the baseline for the accounting day `as_of` and install it.
    ///
    /// On a query error the store keeps its current mapping.
    #[tracing::instrument(skip_all, fields(as_of = %as_of))]
    pub async fn refresh(&self, as_of: Date) -> Result<BaselineRefresh, IngestError> {
        match self.resolve(as_of).await {
            Ok(refresh) => {
                self.store.set_all(as_of, refresh.baseline.clone());
                metrics::counter!("baseline_refresh_total", "origin" => refresh.origin.as_str())
                    .increment(1);
                tracing::info!(
                    origin = refresh.origin.as_str(),
                    meters = refresh.baseline.len(),
                    baseline = ?refresh.baseline,
                    "baseline refreshed"
                );
                Ok(refresh)
            }
            Err(e) => {
                metrics::counter!("baseline_refresh_failures_total").increment(1);
                tracing::error!(error = %e, "baseline refresh failed, keeping existing baseline");
                Err(e)
            }
        }
    }

    async fn resolve(&self, as_of: Date) -> Result<BaselineRefresh, IngestError> {
        if let Some(previous) = as_of.previous_day() {
            if let Some(row) = self.gateway.last_reading_for_date(previous).await? {
                return Ok(BaselineRefresh {
                    origin: BaselineOrigin::PreviousDayLast,
                    baseline: row.kwh,
                });
            }
        }

        tracing::info!("no readings for the previous day, using today's first reading");
        if let Some(row) = self.gateway.first_reading_for_date(as_of).await? {
            return Ok(BaselineRefresh {
                origin: BaselineOrigin::SameDayFirst,
                baseline: row.kwh,
            });
        }

        tracing::info!("no readings for today yet, baseline will be taken from the first live reading");
        Ok(BaselineRefresh {
            origin: BaselineOrigin::Unestablished,
            baseline: BTreeMap::new(),
        })
    }
}
