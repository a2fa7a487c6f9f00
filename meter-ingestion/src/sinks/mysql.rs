use meter_client::{
    db::{sensordata_queries, DayEdge, MeterSchema},
    domain::{EnergyProjection, StoredReading},
};
use sqlx::{
    mysql::{MySqlConnectOptions, MySqlConnection},
    ConnectOptions, Connection,
};
use time::Date;

use crate::{
    config::DatabaseConfig,
    pipeline::{IngestError, PersistenceGateway},
};

/// `PersistenceGateway` over MySQL.
///
/// Opens a fresh connection for every call and closes it before returning;
/// no connection state survives between calls.
pub struct MySqlGateway {
    options: MySqlConnectOptions,
    schema: MeterSchema,
}

impl MySqlGateway {
    pub fn new(cfg: &DatabaseConfig, schema: MeterSchema) -> Self {
        let options = MySqlConnectOptions::new()
            .host(&cfg.host)
            .port(cfg.port)
            .username(&cfg.user)
            .password(&cfg.password)
            .database(&cfg.database);

        Self { options, schema }
    }

    pub fn schema(&self) -> &MeterSchema {
        &self.schema
    }

    async fn connect(&self) -> Result<MySqlConnection, sqlx::Error> {
        self.options.connect().await
    }

    /// Create `sensordata` for the configured meters if it does not exist.
    pub async fn apply_schema(&self) -> Result<(), IngestError> {
        let ddl = self.schema.create_table_sql();
        let mut conn = self
            .connect()
            .await
            .map_err(|e| IngestError::StoreWrite(format!("failed to connect: {e}")))?;

        let res = sqlx::raw_sql(&ddl).execute(&mut conn).await;
        close(conn).await;
        res.map(|_| ())
            .map_err(|e| IngestError::StoreWrite(format!("failed to create sensordata: {e}")))
    }

    async fn reading_for_date(&self, date: Date, edge: DayEdge) -> Result<Option<EnergyProjection>, IngestError> {
        let mut conn = self
            .connect()
            .await
            .map_err(|e| IngestError::BaselineQuery(format!("failed to connect: {e}")))?;

        let res = sensordata_queries::reading_at_day_edge(&mut conn, &self.schema, date, edge).await;
        close(conn).await;

        res.map_err(|e| {
            tracing::error!(date = %date, edge = ?edge, error = %e, "sensordata query failed");
            IngestError::BaselineQuery(e.to_string())
        })
    }
}

async fn close(conn: MySqlConnection) {
    if let Err(e) = conn.close().await {
        tracing::debug!(error = %e, "error closing MySQL connection");
    }
}

#[async_trait::async_trait]
impl PersistenceGateway for MySqlGateway {
    async fn insert_reading(&self, stored: &StoredReading) -> Result<(), IngestError> {
        let mut conn = self
            .connect()
            .await
            .map_err(|e| IngestError::StoreWrite(format!("failed to connect: {e}")))?;

        let res = sensordata_queries::insert_reading(&mut conn, &self.schema, stored).await;
        close(conn).await;

        res.map_err(|e| IngestError::StoreWrite(e.to_string()))
    }

    async fn last_reading_for_date(&self, date: Date) -> Result<Option<EnergyProjection>, IngestError> {
        self.reading_for_date(date, DayEdge::Last).await
    }

    async fn first_reading_for_date(&self, date: Date) -> Result<Option<EnergyProjection>, IngestError> {
        self.reading_for_date(date, DayEdge::First).await
    }
}
