use anyhow::Result;
use meter_ingestion::{config::AppConfig, observability, sinks::MySqlGateway};
use std::env;

/// Print, or apply with `--apply`, the `sensordata` DDL for the configured meters.
///
/// Usage:
///   init_sensordata_schema [--apply]
#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let apply = env::args().skip(1).any(|a| a == "--apply");

    let cfg = AppConfig::read()?;
    let schema = cfg.meter_schema()?;

    if !apply {
        println!("{};", schema.create_table_sql());
        return Ok(());
    }

    let gateway = MySqlGateway::new(&cfg.database, schema);
    gateway.apply_schema().await?;
    tracing::info!(
        meters = gateway.schema().len(),
        database = %cfg.database.database,
        "sensordata table ensured"
    );

    Ok(())
}
