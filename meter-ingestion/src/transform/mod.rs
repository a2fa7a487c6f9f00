use std::collections::BTreeMap;

use meter_client::{
    db::{Channel, MeterSchema},
    domain::{ConsumptionRecord, MeterChannels, MeterIndex, MeterReading},
};
use serde_json::{Map, Value};

use crate::pipeline::IngestError;

fn malformed(reason: impl Into<String>, body: &str) -> IngestError {
    IngestError::MalformedPayload {
        reason: reason.into(),
        payload: body.to_string(),
    }
}

fn numeric_field(record: &Map<String, Value>, name: &str, body: &str) -> Result<f64, IngestError> {
    let value = match record.get(name) {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        Some(_) => None,
        None => return Err(malformed(format!("missing field '{name}'"), body)),
    };

    match value {
        Some(v) if v.is_finite() => Ok(v),
        _ => Err(malformed(format!("field '{name}' is not a finite number"), body)),
    }
}

/// Parse the upstream feed body into channel values for every schema meter.
///
/// Rules:
/// - body must be a JSON array whose first element is an object.
/// - every channel field of every meter must be present and numeric
///   (JSON numbers or numeric strings).
pub fn parse_feed_payload(body: &str, schema: &MeterSchema) -> Result<Vec<MeterChannels>, IngestError> {
    let value: Value =
        serde_json::from_str(body).map_err(|e| malformed(format!("invalid JSON: {e}"), body))?;

    let record = match value {
        Value::Array(items) => match items.into_iter().next() {
            Some(Value::Object(record)) => record,
            Some(_) => return Err(malformed("first element is not an object", body)),
            None => return Err(malformed("empty array", body)),
        },
        _ => return Err(malformed("expected a JSON array", body)),
    };

    schema
        .meters()
        .iter()
        .map(|&meter| {
            let field = |channel: Channel| numeric_field(&record, &channel.column(meter), body);
            Ok(MeterChannels {
                meter,
                total_kw: field(Channel::TotalKw)?,
                total_kva: field(Channel::TotalKva)?,
                avg_pf: field(Channel::AvgPf)?,
                total_net_kwh: field(Channel::TotalNetKwh)?,
                total_net_kvah: field(Channel::TotalNetKvah)?,
            })
        })
        .collect()
}

/// Consumption per meter since its baseline.
///
/// A negative delta means the meter reset or rolled over; it is clamped to
/// zero and reported. A meter with no baseline yields zero.
pub fn compute_consumption(
    reading: &MeterReading,
    baseline: &BTreeMap<MeterIndex, f64>,
) -> ConsumptionRecord {
    reading
        .meters
        .iter()
        .map(|m| {
            let current = m.total_net_kwh;
            let base = baseline.get(&m.meter).copied().unwrap_or(current);
            let delta = current - base;

            if delta < 0.0 {
                tracing::warn!(
                    meter = m.meter,
                    ts = %reading.ts,
                    baseline = base,
                    current,
                    "cumulative energy below baseline, clamping consumption to zero"
                );
                metrics::counter!("meter_rollover_anomalies_total", "meter" => m.meter.to_string())
                    .increment(1);
                (m.meter, 0.0)
            } else {
                (m.meter, delta)
            }
        })
        .collect()
}
