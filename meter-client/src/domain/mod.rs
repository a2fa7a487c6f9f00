mod meter_reading;
mod stored_reading;

pub use meter_reading::{MeterChannels, MeterIndex, MeterReading};
pub use stored_reading::{ConsumptionRecord, EnergyProjection, StoredReading};
