//! HTTP surface of the gateway.
//!
//! Routes:
//! - `GET /` health check
//! - `POST /query/:dbname/write` and `POST /query/:dbname/read`
//! - `GET /databases` and `GET /status`

use crate::core::{DbError, WriteRequest};
use crate::facade::{Gateway, GatewayStatus};
use crate::result::{Row, WriteResult};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use std::sync::Arc;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Response envelope shared by every endpoint.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(result: T) -> Self {
        Self {
            success: true,
            result: Some(result),
            error: None,
            code: None,
        }
    }
}

#[derive(Debug)]
pub enum WebError {
    Database(DbError),
    Internal(String),
}

impl From<DbError> for WebError {
    fn from(err: DbError) -> Self {
        WebError::Database(err)
    }
}

impl From<JsonRejection> for WebError {
    fn from(rejection: JsonRejection) -> Self {
        WebError::Database(DbError::Validation(rejection.body_text()))
    }
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        let (status, message, code, result) = match self {
            WebError::Database(DbError::AppliedNotDurable { result, reason }) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("write applied but not durably staged: {}", reason),
                "not_durable".to_string(),
                Some(result),
            ),
            WebError::Database(err) if err.is_client_error() => (
                StatusCode::BAD_REQUEST,
                err.to_string(),
                err.code().to_string(),
                None,
            ),
            WebError::Database(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                err.to_string(),
                err.code().to_string(),
                None,
            ),
            WebError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                msg,
                "internal_error".to_string(),
                None,
            ),
        };

        let body = Json(ApiResponse::<WriteResult> {
            success: false,
            result,
            error: Some(message),
            code: Some(code),
        });

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, WebError>;

/// Builds the router with CORS, tracing, panic recovery and compression.
pub fn router(gateway: Arc<Gateway>) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/databases", get(databases))
        .route("/status", get(status))
        .route("/query/:dbname/write", post(write))
        .route("/query/:dbname/read", post(read))
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(gateway)
}

async fn health() -> Json<ApiResponse<()>> {
    Json(ApiResponse {
        success: true,
        result: None,
        error: None,
        code: None,
    })
}

// Statements run on the blocking pool: tenant connections are guarded by
// std mutexes and SQLite calls block.
async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> crate::core::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| WebError::Internal(format!("query task failed: {}", e)))?
        .map_err(WebError::from)
}

async fn write(
    State(gateway): State<Arc<Gateway>>,
    Path(dbname): Path<String>,
    payload: std::result::Result<Json<WriteRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<WriteResult>>> {
    let Json(request) = payload?;
    let result = blocking(move || gateway.write(&dbname, &request)).await?;
    Ok(Json(ApiResponse::ok(result)))
}

async fn read(
    State(gateway): State<Arc<Gateway>>,
    Path(dbname): Path<String>,
    payload: std::result::Result<Json<WriteRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<Vec<Row>>>> {
    let Json(request) = payload?;
    let rows = blocking(move || gateway.read(&dbname, &request)).await?;
    Ok(Json(ApiResponse::ok(rows)))
}

async fn databases(State(gateway): State<Arc<Gateway>>) -> Result<Json<ApiResponse<Vec<String>>>> {
    Ok(Json(ApiResponse::ok(gateway.databases()?)))
}

async fn status(State(gateway): State<Arc<Gateway>>) -> Result<Json<ApiResponse<GatewayStatus>>> {
    Ok(Json(ApiResponse::ok(gateway.status()?)))
}
