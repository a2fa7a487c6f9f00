use std::collections::BTreeMap;

use sqlx::{mysql::MySqlConnection, MySql, QueryBuilder, Row};
use time::{Date, PrimitiveDateTime};

use super::{
    schema::{quote_ident, Channel, MeterSchema, SENSORDATA_TABLE, TIMESTAMP_COLUMN},
    DbError,
};
use crate::domain::{EnergyProjection, StoredReading};

/// Which end of a civil day to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayEdge {
    First,
    Last,
}

impl DayEdge {
    fn order(self) -> &'static str {
        match self {
            DayEdge::First => "ASC",
            DayEdge::Last => "DESC",
        }
    }
}

/// Build the parameterized insert for one `sensordata` row.
pub fn insert_reading_query(
    schema: &MeterSchema,
    stored: &StoredReading,
) -> Result<QueryBuilder<'static, MySql>, DbError> {
    let columns: Vec<String> = schema.insert_columns().iter().map(|c| quote_ident(c)).collect();

    let mut builder = QueryBuilder::<MySql>::new(format!(
        "INSERT INTO {} ({}) VALUES (",
        quote_ident(SENSORDATA_TABLE),
        columns.join(", ")
    ));

    {
        let mut values = builder.separated(", ");
        values.push_bind(stored.reading.ts);

        for &meter in schema.meters() {
            let channels = stored
                .reading
                .channels(meter)
                .ok_or(DbError::MissingMeter(meter))?;
            for channel in Channel::ALL {
                values.push_bind(channel.value(channels));
            }
        }

        for &meter in schema.meters() {
            let kwh = stored
                .consumption
                .get(meter)
                .ok_or(DbError::MissingConsumption(meter))?;
            values.push_bind(kwh);
        }
    }
    builder.push(")");

    Ok(builder)
}

fn day_edge_sql(schema: &MeterSchema, edge: DayEdge) -> String {
    let energy: Vec<String> = schema
        .energy_columns()
        .iter()
        .map(|(_, c)| quote_ident(c))
        .collect();
    let ts = quote_ident(TIMESTAMP_COLUMN);

    format!(
        "SELECT {ts}, {} FROM {} WHERE {ts} >= ? AND {ts} < ? ORDER BY {ts} {} LIMIT 1",
        energy.join(", "),
        quote_ident(SENSORDATA_TABLE),
        edge.order()
    )
}

fn day_bounds(date: Date) -> (PrimitiveDateTime, PrimitiveDateTime) {
    let end = date
        .next_day()
        .map(|d| d.midnight())
        .unwrap_or(PrimitiveDateTime::MAX);
    (date.midnight(), end)
}

/// Insert one reading with its consumption deltas.
pub async fn insert_reading(
    conn: &mut MySqlConnection,
    schema: &MeterSchema,
    stored: &StoredReading,
) -> Result<(), DbError> {
    let mut builder = insert_reading_query(schema, stored)?;
    builder.build().execute(&mut *conn).await?;
    Ok(())
}

/// Earliest (`First`) or latest (`Last`) stored reading whose timestamp
/// falls on `date`.
pub async fn reading_at_day_edge(
    conn: &mut MySqlConnection,
    schema: &MeterSchema,
    date: Date,
    edge: DayEdge,
) -> Result<Option<EnergyProjection>, DbError> {
    let sql = day_edge_sql(schema, edge);
    let (start, end) = day_bounds(date);

    let row = sqlx::query(&sql)
        .bind(start)
        .bind(end)
        .fetch_optional(&mut *conn)
        .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let ts: PrimitiveDateTime = row.try_get(TIMESTAMP_COLUMN)?;
    let mut kwh = BTreeMap::new();
    for (meter, column) in schema.energy_columns() {
        let value: Option<f64> = row.try_get(column.as_str())?;
        if let Some(v) = value {
            kwh.insert(meter, v);
        }
    }

    Ok(Some(EnergyProjection { ts, kwh }))
}
