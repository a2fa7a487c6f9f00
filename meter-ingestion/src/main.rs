use std::sync::Arc;

use anyhow::Result;
use futures::FutureExt;
use meter_ingestion::{
    baseline::{BaselineInitializer, BaselineStore},
    config::AppConfig,
    ingest::IngestionLoop,
    metrics_server, observability,
    pipeline::SystemClock,
    scheduler::{RecurringTask, Schedule},
    sinks::{DailyFileLog, MySqlGateway},
    sources::HttpFeedSource,
};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    // Load configuration
    let cfg = AppConfig::load()?;
    let schema = cfg.meter_schema()?;
    let zone = cfg.zone()?;
    let refresh_at = cfg.baseline_refresh_at()?;

    let shutdown = CancellationToken::new();
    let http = metrics_server::init(&cfg.http.bind_addr, shutdown.clone()).await?;

    let gateway = Arc::new(MySqlGateway::new(&cfg.database, schema.clone()));
    let source = Arc::new(HttpFeedSource::new(cfg.feed.url.clone(), cfg.feed_timeout(), schema)?);
    let log = Arc::new(DailyFileLog::new(
        cfg.log_sink.dir.clone(),
        cfg.log_sink.file_prefix.clone(),
    ));
    let baseline = BaselineStore::new();

    // Startup baseline; a failure is retried by the first ingestion tick.
    let initializer = Arc::new(BaselineInitializer::new(gateway.clone(), baseline.clone()));
    if let Err(e) = initializer.refresh(zone.today(&SystemClock)).await {
        tracing::debug!(error = %e, "startup baseline refresh failed");
    }

    let ingestion = Arc::new(IngestionLoop::new(source, gateway, log, baseline, zone));

    let refresh_task = RecurringTask::new(
        "baseline-refresh",
        Schedule::DailyAt { at: refresh_at, zone },
        shutdown.clone(),
    );
    let refresh = tokio::spawn(refresh_task.run(move || {
        let initializer = initializer.clone();
        async move {
            if let Err(e) = initializer.refresh(zone.today(&SystemClock)).await {
                tracing::debug!(error = %e, "scheduled baseline refresh failed");
            }
        }
        .boxed()
    }));

    let ingest_task = RecurringTask::new("ingestion", Schedule::Every(cfg.ingest_interval()), shutdown.clone());
    let ingest = tokio::spawn(ingest_task.run(move || {
        let ingestion = ingestion.clone();
        async move { ingestion.run_once().await }.boxed()
    }));

    tracing::info!(
        meters = ?cfg.ingestion.meters,
        interval_secs = cfg.ingestion.interval_secs,
        utc_offset = %zone.offset(),
        "meter ingestion running"
    );

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown requested, waiting for in-flight work");
    shutdown.cancel();

    let (refresh, ingest, http) = tokio::join!(refresh, ingest, http);
    refresh?;
    ingest?;
    http?;

    Ok(())
}
