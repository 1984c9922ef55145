use axum::{
    Router,
    extract::{Path, State},
    http::{HeaderValue, Request, StatusCode},
    middleware::{Next, from_fn},
    response::{Json, Response},
    routing::{get, post},
};
use claim_flow::{ClaimError, ClaimRunner, DocumentRef, Upload};
use serde_json::{Value, json};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{Instrument, error, info, warn};
use uuid::Uuid;

use crate::models::{ClaimResponse, DocumentRequest, UploadResponse, VersionsResponse};

pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<Value>)>;
type ApiError = (StatusCode, Json<Value>);

fn bad_request_error(message: &str, details: &str) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({
            "error": message,
            "details": details
        })),
    )
}

fn not_found_error(message: &str, claim_id: &str) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": message,
            "details": format!("no versions stored for claim {claim_id}"),
            "claim_id": claim_id
        })),
    )
}

fn unavailable_error(message: &str, details: &str) -> ApiError {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({
            "error": message,
            "details": details
        })),
    )
}

fn internal_error(message: &str, details: &str) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({
            "error": message,
            "details": details
        })),
    )
}

fn claim_error(err: ClaimError) -> ApiError {
    match &err {
        ClaimError::InvalidUpload(_) => bad_request_error("Invalid upload", &err.to_string()),
        _ if err.is_transient() => {
            warn!(error = %err, "Claim request failed transiently, client should retry");
            unavailable_error("Claim is temporarily unavailable, retry the request", &err.to_string())
        }
        _ => {
            error!(error = %err, "Claim request failed");
            internal_error("Failed to process claim request", &err.to_string())
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub runner: Arc<ClaimRunner>,
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/claims/uploads", post(upload_extraction))
        .route("/claims/documents", post(upload_document))
        .route("/claims/{claim_id}", get(get_claim))
        .route("/claims/{claim_id}/versions", get(list_versions))
        .layer(from_fn(correlation_id_middleware))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

/// Tags every request with a correlation id and runs it inside a span carrying it.
pub async fn correlation_id_middleware(mut request: Request<axum::body::Body>, next: Next) -> Response {
    let correlation_id = request
        .headers()
        .get(CORRELATION_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let header = HeaderValue::from_str(&correlation_id).ok();
    if let Some(header) = &header {
        request
            .headers_mut()
            .insert(CORRELATION_ID_HEADER, header.clone());
    }

    let span = tracing::info_span!("http_request", correlation_id = %correlation_id);
    let mut response = next.run(request).instrument(span).await;

    if let Some(header) = header {
        response.headers_mut().insert(CORRELATION_ID_HEADER, header);
    }
    response
}

async fn root() -> Json<Value> {
    Json(json!({
        "service": "Claims Service",
        "version": "1.0.0",
        "description": "Versioned merge and decision engine for incrementally uploaded claim documents",
        "endpoints": {
            "POST /claims/uploads": "Merge an extracted document into a claim",
            "POST /claims/documents": "Extract a document with the configured model, then merge it",
            "GET /claims/{claim_id}": "Latest claim version with its history",
            "GET /claims/{claim_id}/versions": "Every stored version, oldest first",
            "GET /health": "Health check"
        }
    }))
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn upload_extraction(
    State(state): State<AppState>,
    Json(upload): Json<Upload>,
) -> ApiResult<UploadResponse> {
    info!(
        claim_id = ?upload.claim_id,
        filename = %upload.filename,
        "Received extraction upload"
    );

    let outcome = state.runner.process(upload).await.map_err(claim_error)?;
    Ok(Json(outcome.into()))
}

async fn upload_document(
    State(state): State<AppState>,
    Json(request): Json<DocumentRequest>,
) -> ApiResult<UploadResponse> {
    if !state.runner.has_extractor() {
        return Err(unavailable_error(
            "Document extraction is not configured",
            "set OPENROUTER_API_KEY or post pre-extracted text to /claims/uploads",
        ));
    }
    if request.filename.trim().is_empty() {
        return Err(bad_request_error("Invalid upload", "filename is required"));
    }

    info!(
        claim_id = ?request.claim_id,
        filename = %request.filename,
        "Received document for extraction"
    );

    let document = DocumentRef {
        filename: request.filename,
        content: request.content,
    };
    let outcome = state
        .runner
        .ingest(request.claim_id, document)
        .await
        .map_err(claim_error)?;
    Ok(Json(outcome.into()))
}

async fn get_claim(
    State(state): State<AppState>,
    Path(claim_id): Path<String>,
) -> ApiResult<ClaimResponse> {
    let versions = state
        .runner
        .history(&claim_id)
        .await
        .map_err(claim_error)?;

    ClaimResponse::from_versions(&claim_id, versions)
        .map(Json)
        .ok_or_else(|| not_found_error("Claim not found", &claim_id))
}

async fn list_versions(
    State(state): State<AppState>,
    Path(claim_id): Path<String>,
) -> ApiResult<VersionsResponse> {
    let versions = state
        .runner
        .history(&claim_id)
        .await
        .map_err(claim_error)?;

    if versions.is_empty() {
        return Err(not_found_error("Claim not found", &claim_id));
    }
    Ok(Json(VersionsResponse { claim_id, versions }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::{Body, to_bytes};
    use chrono::{TimeZone, Utc};
    use claim_flow::{
        ClaimRecord, ClaimRepository, EngineConfig, Extractor, FixedClock,
        InMemoryClaimRepository,
    };
    use tower::ServiceExt;

    struct CannedExtractor;

    #[async_trait]
    impl Extractor for CannedExtractor {
        async fn extract(&self, document: &DocumentRef) -> claim_flow::Result<String> {
            Ok(format!(
                r#"{{"claim_id": "CLM-9", "policy_number": "POL-9", "notes": "read {}"}}"#,
                document.filename
            ))
        }
    }

    struct UnreachableRepository;

    #[async_trait]
    impl ClaimRepository for UnreachableRepository {
        async fn get_latest(&self, _claim_id: &str) -> claim_flow::Result<Option<ClaimRecord>> {
            Err(ClaimError::StorageError("connection refused".to_string()))
        }

        async fn append(&self, _claim_id: &str, _record: ClaimRecord) -> claim_flow::Result<()> {
            Err(ClaimError::StorageError("connection refused".to_string()))
        }

        async fn list_versions(&self, _claim_id: &str) -> claim_flow::Result<Vec<ClaimRecord>> {
            Err(ClaimError::StorageError("connection refused".to_string()))
        }
    }

    fn runner() -> ClaimRunner {
        ClaimRunner::new(
            &EngineConfig::default(),
            Arc::new(InMemoryClaimRepository::new()),
        )
        .unwrap()
        .with_clock(Arc::new(FixedClock(
            Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap(),
        )))
    }

    fn app(runner: ClaimRunner) -> Router {
        build_router(AppState {
            runner: Arc::new(runner),
        })
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_check_echoes_correlation_id() {
        let response = app(runner())
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .header(CORRELATION_ID_HEADER, "req-42")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CORRELATION_ID_HEADER], "req-42");
    }

    #[tokio::test]
    async fn test_upload_then_read_claim_back() {
        let app = app(runner());

        let response = app
            .clone()
            .oneshot(post_json(
                "/claims/uploads",
                json!({
                    "claim_id": "CLM-1",
                    "filename": "claim_form.pdf",
                    "extraction": r#"{"policy_number": "POL-1", "active_policy": true}"#
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["claim_id"], "CLM-1");
        assert_eq!(body["status"], "PENDING");
        assert_eq!(body["created_claim"], true);

        app.clone()
            .oneshot(post_json(
                "/claims/uploads",
                json!({
                    "claim_id": "CLM-1",
                    "filename": "damage_photo.jpg",
                    "extraction": r#"{"damage_severity": "high"}"#
                }),
            ))
            .await
            .unwrap();

        let response = app.clone().oneshot(get_request("/claims/CLM-1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["version_count"], 2);
        assert_eq!(body["latest"]["claim_details"]["policy_number"], "POL-1");
        assert_eq!(body["history"][0]["document_uploaded"], "claim_form.pdf");

        let response = app.oneshot(get_request("/claims/CLM-1/versions")).await.unwrap();
        let body = json_body(response).await;
        assert_eq!(body["versions"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_blank_filename_is_bad_request() {
        let response = app(runner())
            .oneshot(post_json(
                "/claims/uploads",
                json!({ "filename": " ", "extraction": "{}" }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["error"], "Invalid upload");
    }

    #[tokio::test]
    async fn test_unknown_claim_is_not_found() {
        let response = app(runner()).oneshot(get_request("/claims/missing")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app(runner())
            .oneshot(get_request("/claims/missing/versions"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_document_upload_requires_extractor() {
        let request = json!({ "filename": "claim_form.pdf", "content": "scan" });

        let response = app(runner())
            .oneshot(post_json("/claims/documents", request.clone()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let response = app(runner().with_extractor(Arc::new(CannedExtractor)))
            .oneshot(post_json("/claims/documents", request))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["claim_id"], "CLM-9");
        assert!(
            body["version_summary"]["document_analysis"]
                .as_str()
                .unwrap()
                .contains("read claim_form.pdf")
        );
    }

    #[tokio::test]
    async fn test_storage_outage_is_service_unavailable() {
        let runner = ClaimRunner::new(&EngineConfig::default(), Arc::new(UnreachableRepository)).unwrap();
        let app = app(runner);

        let response = app.clone().oneshot(get_request("/claims/CLM-1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = json_body(response).await;
        assert!(body["details"].as_str().unwrap().contains("connection refused"));

        let response = app
            .oneshot(post_json(
                "/claims/uploads",
                json!({ "claim_id": "CLM-1", "filename": "claim_form.pdf", "extraction": "{}" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
