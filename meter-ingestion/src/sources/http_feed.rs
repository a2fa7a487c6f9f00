use std::time::{Duration, SystemTime};

use meter_client::{db::MeterSchema, domain::MeterChannels};

use crate::{
    pipeline::{Envelope, IngestError, ReadingSource},
    transform,
};

/// Polls the upstream telemetry endpoint for the latest multi-meter reading.
pub struct HttpFeedSource {
    client: reqwest::Client,
    url: String,
    schema: MeterSchema,
}

impl HttpFeedSource {
    pub fn new(url: impl Into<String>, timeout: Duration, schema: MeterSchema) -> Result<Self, IngestError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| IngestError::Config(format!("failed to build feed client: {e}")))?;

        Ok(Self {
            client,
            url: url.into(),
            schema,
        })
    }
}

#[async_trait::async_trait]
impl ReadingSource for HttpFeedSource {
    #[tracing::instrument(skip(self), fields(url = %self.url))]
    async fn fetch(&self) -> Result<Envelope<Vec<MeterChannels>>, IngestError> {
        metrics::counter!("upstream_fetch_requests_total").increment(1);

        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| IngestError::UpstreamFetch(e.to_string()))?;
        let received_at = SystemTime::now();

        let body = response
            .text()
            .await
            .map_err(|e| IngestError::UpstreamFetch(format!("failed to read body: {e}")))?;

        let payload = transform::parse_feed_payload(&body, &self.schema)?;

        Ok(Envelope {
            payload,
            received_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::get, Router};

    const VALID_BODY: &str = r#"[{
        "Total_KW_meter_3": 1.5, "Total_KVA_meter_3": 1.6, "Avg_PF_meter_3": 0.94,
        "TotalNet_KWH_meter_3": 107.5, "TotalNet_KVAH_meter_3": 112.0
    }]"#;

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app.into_make_service()).await.unwrap();
        });
        format!("http://{addr}/api/sensordata")
    }

    fn source(url: String, timeout: Duration) -> HttpFeedSource {
        HttpFeedSource::new(url, timeout, MeterSchema::new([3]).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn valid_body_yields_parsed_meters() {
        let url = serve(Router::new().route("/api/sensordata", get(|| async { VALID_BODY }))).await;

        let env = source(url, Duration::from_secs(5)).fetch().await.unwrap();

        assert_eq!(env.payload.len(), 1);
        assert_eq!(env.payload[0].meter, 3);
        assert_eq!(env.payload[0].total_net_kwh, 107.5);
    }

    #[tokio::test]
    async fn server_error_is_upstream_fetch() {
        let url = serve(Router::new().route(
            "/api/sensordata",
            get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, VALID_BODY) }),
        ))
        .await;

        let res = source(url, Duration::from_secs(5)).fetch().await;

        assert!(matches!(res, Err(IngestError::UpstreamFetch(_))));
    }

    #[tokio::test]
    async fn slow_response_times_out_as_upstream_fetch() {
        let url = serve(Router::new().route(
            "/api/sensordata",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                VALID_BODY
            }),
        ))
        .await;

        let res = source(url, Duration::from_millis(200)).fetch().await;

        assert!(matches!(res, Err(IngestError::UpstreamFetch(_))));
    }

    #[tokio::test]
    async fn refused_connection_is_upstream_fetch() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let res = source(format!("http://{addr}/api/sensordata"), Duration::from_secs(5))
            .fetch()
            .await;

        assert!(matches!(res, Err(IngestError::UpstreamFetch(_))));
    }

    #[tokio::test]
    async fn empty_array_is_malformed_payload() {
        let url = serve(Router::new().route("/api/sensordata", get(|| async { "[]" }))).await;

        let res = source(url, Duration::from_secs(5)).fetch().await;

        match res {
            Err(IngestError::MalformedPayload { payload, .. }) => assert_eq!(payload, "[]"),
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
