use axum::Json;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, error};

use super::AppState;
use crate::RagError;
use crate::query::{QueryRequest, Recommendation};

/// Query string of `POST /`
#[derive(Debug, Default, Deserialize)]
pub struct RecommendParams {
    pub data: Option<String>,
    /// Also accepted as `quesiton`, the spelling older clients send
    #[serde(alias = "quesiton")]
    pub question: Option<String>,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Missing required query parameter '{0}'")]
    MissingParameter(&'static str),
    #[error("{}", .0.body_text())]
    InvalidQuery(#[from] QueryRejection),
    #[error(transparent)]
    Rag(#[from] RagError),
}

impl ApiError {
    #[inline]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingParameter(_) | Self::InvalidQuery(_) => StatusCode::BAD_REQUEST,
            Self::Rag(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    #[inline]
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        } else {
            debug!("Rejected request: {}", self);
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

pub(super) async fn recommend(
    State(state): State<AppState>,
    query: Result<Query<RecommendParams>, QueryRejection>,
) -> Result<Json<Recommendation>, ApiError> {
    let Query(params) = query?;
    let data = params.data.ok_or(ApiError::MissingParameter("data"))?;
    let service = state.service().await?;

    let request = QueryRequest {
        data,
        question: params.question,
    };
    let recommendation = service.recommend(&request).await?;

    Ok(Json(recommendation))
}

pub(super) async fn health() -> &'static str {
    "OK"
}
