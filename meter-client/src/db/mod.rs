pub mod schema;
pub mod sensordata_queries;

use crate::domain::MeterIndex;

pub use sensordata_queries::DayEdge;
pub use schema::{Channel, MeterSchema, SchemaError, MAX_METERS, SENSORDATA_TABLE};

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("reading has no channel values for meter {0}")]
    MissingMeter(MeterIndex),
    #[error("consumption record has no value for meter {0}")]
    MissingConsumption(MeterIndex),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}
