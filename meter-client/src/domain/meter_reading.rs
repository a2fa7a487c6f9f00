use time::PrimitiveDateTime;

/// Meter channel number as used in the `*_meter_<i>` column names.
pub type MeterIndex = u16;

/// Instantaneous and cumulative values reported by one meter channel.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MeterChannels {
    pub meter: MeterIndex,
    pub total_kw: f64,
    pub total_kva: f64,
    pub avg_pf: f64,
    pub total_net_kwh: f64,
    pub total_net_kvah: f64,
}

/// Snapshot of every configured meter at one instant.
///
/// `ts` is civil time in the accounting zone, not a UTC instant.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MeterReading {
    pub ts: PrimitiveDateTime,
    pub meters: Vec<MeterChannels>,
}

impl MeterReading {
    pub fn channels(&self, meter: MeterIndex) -> Option<&MeterChannels> {
        self.meters.iter().find(|m| m.meter == meter)
    }

    /// Cumulative net energy (kWh) for `meter`.
    pub fn energy(&self, meter: MeterIndex) -> Option<f64> {
        self.channels(meter).map(|m| m.total_net_kwh)
    }
}
