//! The backend API: script upload, test plan CRUD, the internal routes the
//! timer and executor use, and the result recorder.

use axum::extract::{DefaultBodyLimit, Multipart, Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::clients::INTERNAL_SECRET_HEADER;
use crate::error::{ExtractionError, StoreError};
use crate::group::StepGrouper;
use crate::plan::{TestPlan, TestResult};
use crate::plan_from_script;
use crate::store::{NewPlan, NewTestResult, PlanStore, ResultStats, ResultStore, StatusUpdate};

pub const MAX_SCRIPT_BYTES: usize = 10 * 1024 * 1024;

pub struct AppState {
    pub plans: PlanStore,
    pub results: ResultStore,
    pub grouper: StepGrouper,
    pub internal_secret: Option<String>,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(&'static str),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Failed to process Python file: {0}")]
    Extraction(#[from] ExtractionError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::BadRequest(_) | ApiError::Extraction(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Store(StoreError::NotFound { .. }) => StatusCode::NOT_FOUND,
            ApiError::Store(e) => {
                error!("Storage failure: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/upload", post(upload_handler))
        .route("/tests", get(list_tests))
        .route("/tests/internal/all", get(list_tests_internal))
        .route("/tests/internal/{id}/status", patch(update_status))
        .route(
            "/tests/{id}",
            get(get_test).put(update_test).delete(delete_test),
        )
        .route("/results", post(record_result).get(list_results))
        .route("/results/{id}", get(get_result))
        .route("/results/test/{test_id}/latest", get(latest_result))
        .route("/results/test/{test_id}/stats", get(result_stats))
        .layer(DefaultBodyLimit::max(MAX_SCRIPT_BYTES + 64 * 1024))
        .with_state(state)
}

fn require_internal(state: &AppState, headers: &HeaderMap) -> ApiResult<()> {
    let Some(expected) = state.internal_secret.as_deref().filter(|s| !s.is_empty()) else {
        return Err(ApiError::Unauthorized("Internal secret not configured"));
    };
    let given = headers
        .get(INTERNAL_SECRET_HEADER)
        .and_then(|v| v.to_str().ok());
    if given != Some(expected) {
        return Err(ApiError::Unauthorized("Invalid internal secret"));
    }
    Ok(())
}

#[derive(Default)]
struct Upload {
    script: Option<String>,
    name: Option<String>,
    description: Option<String>,
}

async fn read_upload(mut multipart: Multipart) -> ApiResult<Upload> {
    let bad = |e: axum::extract::multipart::MultipartError| ApiError::BadRequest(e.body_text());
    let mut upload = Upload::default();

    while let Some(field) = multipart.next_field().await.map_err(bad)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let file_name = field.file_name().unwrap_or_default().to_lowercase();
                if !file_name.ends_with(".py") {
                    return Err(ApiError::BadRequest("Only Python files are allowed!".into()));
                }
                let bytes = field.bytes().await.map_err(bad)?;
                if bytes.len() > MAX_SCRIPT_BYTES {
                    return Err(ApiError::BadRequest("File is larger than 10MB".into()));
                }
                let script = String::from_utf8(bytes.to_vec())
                    .map_err(|_| ApiError::BadRequest("File must be UTF-8 text".into()))?;
                upload.script = Some(script);
            }
            "name" => upload.name = Some(field.text().await.map_err(bad)?),
            "description" => upload.description = Some(field.text().await.map_err(bad)?),
            other => warn!("Ignoring unexpected upload field '{}'", other),
        }
    }

    Ok(upload)
}

async fn upload_handler(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> ApiResult<(StatusCode, Json<TestPlan>)> {
    let upload = read_upload(multipart).await?;
    let script = upload
        .script
        .ok_or_else(|| ApiError::BadRequest("No file uploaded".into()))?;

    let planned = plan_from_script(&script, &state.grouper).await?;
    let plan = state
        .plans
        .create(NewPlan {
            start_url: planned.start_url,
            steps: planned.steps,
            name: upload.name.filter(|s| !s.is_empty()),
            description: upload.description.filter(|s| !s.is_empty()),
        })
        .await?;

    Ok((StatusCode::CREATED, Json(plan)))
}

async fn list_tests(State(state): State<Arc<AppState>>) -> Json<Vec<TestPlan>> {
    let plans = state.plans.find_all().await;
    info!("Found {} tests", plans.len());
    Json(plans)
}

async fn list_tests_internal(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<TestPlan>>> {
    require_internal(&state, &headers)?;
    Ok(list_tests(State(state)).await)
}

async fn get_test(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<TestPlan>> {
    Ok(Json(state.plans.find(&id).await?))
}

#[derive(Debug, Deserialize)]
struct DetailsUpdate {
    name: Option<String>,
    description: Option<String>,
}

async fn update_test(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(update): Json<DetailsUpdate>,
) -> ApiResult<Json<TestPlan>> {
    let plan = state
        .plans
        .update_details(&id, update.name, update.description)
        .await?;
    Ok(Json(plan))
}

async fn delete_test(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.plans.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn update_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(update): Json<StatusUpdate>,
) -> ApiResult<Json<TestPlan>> {
    require_internal(&state, &headers)?;
    Ok(Json(state.plans.update_status(&id, update).await?))
}

async fn record_result(
    State(state): State<Arc<AppState>>,
    Json(result): Json<NewTestResult>,
) -> ApiResult<(StatusCode, Json<TestResult>)> {
    let saved = state.results.record(result).await?;
    Ok((StatusCode::CREATED, Json(saved)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResultsQuery {
    test_id: Option<String>,
}

async fn list_results(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ResultsQuery>,
) -> Json<Vec<TestResult>> {
    Json(state.results.list(query.test_id.as_deref()).await)
}

async fn get_result(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<TestResult>> {
    Ok(Json(state.results.find(&id).await?))
}

async fn latest_result(
    State(state): State<Arc<AppState>>,
    Path(test_id): Path<String>,
) -> ApiResult<Json<TestResult>> {
    Ok(Json(state.results.latest(&test_id).await?))
}

async fn result_stats(
    State(state): State<Arc<AppState>>,
    Path(test_id): Path<String>,
) -> Json<ResultStats> {
    Json(state.results.stats(&test_id).await)
}
