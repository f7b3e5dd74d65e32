//! Request handlers for identifier generation and counter statistics.
//!
//! Every generation request runs through the generator's async extension:
//! transactional attempts execute on Tokio's blocking pool and the jittered
//! backoff between attempts sleeps on the timer, so a contended counter never
//! stalls the executor threads serving other requests.

use std::{collections::HashMap, sync::Arc, time::Instant};

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use docseq::{
    DateSource, Domain, Error, GenerationConfig, Identifier, SequenceGenerator,
    SequenceGeneratorAsyncTokioExt, SequenceStats, SequenceStore, StoreError,
};
use serde::{Deserialize, Serialize};

use crate::server::{
    error::ApiError,
    telemetry::{
        increment_identifiers_issued, increment_requests, record_batch_size,
        record_generation_duration,
    },
};

/// State shared by all handlers: one generator over the shared store and the
/// numbering scheme of every domain.
pub struct AppState<S, D> {
    generator: Arc<SequenceGenerator<S, D>>,
    configs: Arc<HashMap<Domain, GenerationConfig>>,
}

impl<S, D> Clone for AppState<S, D> {
    fn clone(&self) -> Self {
        Self {
            generator: Arc::clone(&self.generator),
            configs: Arc::clone(&self.configs),
        }
    }
}

impl<S, D> AppState<S, D>
where
    S: SequenceStore,
    D: DateSource,
{
    /// Uses the default scheme for every domain, with factory shipments
    /// padded to `factory_shipment_digits`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for an unsupported digit count.
    pub fn new(
        generator: SequenceGenerator<S, D>,
        factory_shipment_digits: usize,
    ) -> docseq::Result<Self> {
        let configs: HashMap<_, _> = Domain::ALL
            .into_iter()
            .map(|domain| {
                let config = match domain {
                    Domain::FactoryShipment => domain.config(factory_shipment_digits)?,
                    _ => domain.default_config(),
                };
                Ok((domain, config))
            })
            .collect::<docseq::Result<_>>()?;

        Ok(Self {
            generator: Arc::new(generator),
            configs: Arc::new(configs),
        })
    }

    fn config_for(&self, domain: &str) -> Result<&GenerationConfig, ApiError> {
        domain
            .parse::<Domain>()
            .ok()
            .and_then(|domain| self.configs.get(&domain))
            .ok_or_else(|| ApiError::UnknownDomain(domain.to_string()))
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IdentifierResponse {
    pub identifier: Identifier,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BatchRequest {
    pub count: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BatchResponse {
    pub identifiers: Vec<Identifier>,
}

/// Builds the service routes. Cross-cutting layers are added by the caller.
pub fn router<S, D>(state: AppState<S, D>) -> Router
where
    S: SequenceStore + Send + Sync + 'static,
    D: DateSource + Send + Sync + 'static,
{
    Router::new()
        .route("/health", get(health))
        .route("/v1/identifiers/{domain}", post(generate::<S, D>))
        .route("/v1/identifiers/{domain}/batch", post(generate_batch::<S, D>))
        .route(
            "/v1/sequences/{sequence_type}/stats",
            get(statistics::<S, D>),
        )
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

/// Issues the next identifier for `domain`.
#[cfg_attr(feature = "tracing", tracing::instrument(skip_all, fields(domain = %domain)))]
async fn generate<S, D>(
    State(state): State<AppState<S, D>>,
    Path(domain): Path<String>,
) -> Result<Json<IdentifierResponse>, ApiError>
where
    S: SequenceStore + Send + Sync + 'static,
    D: DateSource + Send + Sync + 'static,
{
    increment_requests("generate");
    let config = state.config_for(&domain)?;

    let start = Instant::now();
    let result = state.generator.generate_async(config).await;
    record_generation_duration(start.elapsed().as_secs_f64() * 1000.0);

    let identifier = result?;
    increment_identifiers_issued(config.sequence_type(), 1);
    Ok(Json(IdentifierResponse { identifier }))
}

/// Issues `count` consecutive identifiers for `domain`.
#[cfg_attr(
    feature = "tracing",
    tracing::instrument(skip_all, fields(domain = %domain, count = req.count))
)]
async fn generate_batch<S, D>(
    State(state): State<AppState<S, D>>,
    Path(domain): Path<String>,
    Json(req): Json<BatchRequest>,
) -> Result<Json<BatchResponse>, ApiError>
where
    S: SequenceStore + Send + Sync + 'static,
    D: DateSource + Send + Sync + 'static,
{
    increment_requests("generate_batch");
    let config = state.config_for(&domain)?;
    record_batch_size(req.count as f64);

    let start = Instant::now();
    let result = state
        .generator
        .generate_batch_async(config, req.count)
        .await;
    record_generation_duration(start.elapsed().as_secs_f64() * 1000.0);

    let identifiers = result?;
    increment_identifiers_issued(config.sequence_type(), identifiers.len() as u64);
    Ok(Json(BatchResponse { identifiers }))
}

/// Reads today's counter for `sequence_type` without mutating it.
#[cfg_attr(feature = "tracing", tracing::instrument(skip_all, fields(sequence_type = %sequence_type)))]
async fn statistics<S, D>(
    State(state): State<AppState<S, D>>,
    Path(sequence_type): Path<String>,
) -> Result<Json<SequenceStats>, ApiError>
where
    S: SequenceStore + Send + Sync + 'static,
    D: DateSource + Send + Sync + 'static,
{
    increment_requests("statistics");
    let generator = Arc::clone(&state.generator);
    let stats = tokio::task::spawn_blocking(move || generator.statistics(&sequence_type))
        .await
        .map_err(|e| Error::StoreUnavailable(StoreError::Unavailable(e.to_string())))??;
    Ok(Json(stats))
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{Request, StatusCode, header},
    };
    use docseq::{ConflictPolicy, DateKey, FixedDate, MemoryStore};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use super::*;

    fn app() -> Router {
        app_with(MemoryStore::new())
    }

    fn app_with(store: MemoryStore) -> Router {
        let day = DateKey::from_ymd(2025, 1, 19).unwrap();
        let generator = SequenceGenerator::with_date_source(store, FixedDate::new(day))
            .with_policy(ConflictPolicy::immediate(3));
        router(AppState::new(generator, 6).unwrap())
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => request
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => request.body(Body::empty()),
        }
        .unwrap();

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn health_check() {
        let (status, _) = send(&app(), "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn issues_sequential_identifiers() {
        let app = app();
        let (status, body) = send(&app, "POST", "/v1/identifiers/sales_order", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "identifier": "SO202501190001" }));

        let (_, body) = send(&app, "POST", "/v1/identifiers/SO", None).await;
        assert_eq!(body["identifier"], "SO202501190002");

        let (status, body) = send(
            &app,
            "POST",
            "/v1/identifiers/sales_order/batch",
            Some(json!({ "count": 3 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({ "identifiers": ["SO202501190003", "SO202501190004", "SO202501190005"] })
        );
    }

    #[tokio::test]
    async fn factory_shipments_use_configured_width() {
        let (_, body) = send(&app(), "POST", "/v1/identifiers/factory_shipment", None).await;
        assert_eq!(body["identifier"], "FS20250119000001");
    }

    #[tokio::test]
    async fn unknown_domain_is_not_found() {
        let (status, body) = send(&app(), "POST", "/v1/identifiers/invoice", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "UNKNOWN_DOMAIN");
    }

    #[tokio::test]
    async fn invalid_batch_count_is_bad_request() {
        let app = app();
        for count in [0, 101] {
            let (status, _) = send(
                &app,
                "POST",
                "/v1/identifiers/return_order/batch",
                Some(json!({ "count": count })),
            )
            .await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
        }
        let (_, stats) = send(&app, "GET", "/v1/sequences/return_order/stats", None).await;
        assert_eq!(stats["totalIssuedToday"], 0);
    }

    #[tokio::test]
    async fn exhausted_retries_hide_store_details() {
        let store = MemoryStore::new();
        store.insert_business_identifier("purchase_order", "PO202501190001");
        let (status, body) = send(
            &app_with(store),
            "POST",
            "/v1/identifiers/purchase_order",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            body,
            json!({
                "error": "could not complete operation, please retry",
                "code": "RETRY_LATER",
            })
        );
    }

    #[tokio::test]
    async fn statistics_report_todays_counter() {
        let app = app();
        let (status, body) = send(&app, "GET", "/v1/sequences/sales_order/stats", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["sequenceType"], "sales_order");
        assert_eq!(body["dateKey"], "20250119");
        assert_eq!(body["totalIssuedToday"], 0);
        assert_eq!(body["lastUpdated"], Value::Null);

        send(
            &app,
            "POST",
            "/v1/identifiers/sales_order/batch",
            Some(json!({ "count": 4 })),
        )
        .await;
        let (_, body) = send(&app, "GET", "/v1/sequences/sales_order/stats", None).await;
        assert_eq!(body["totalIssuedToday"], 4);
        assert!(body["lastUpdated"].is_string());

        let (status, _) = send(&app, "GET", "/v1/sequences/Sales%20Order/stats", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
