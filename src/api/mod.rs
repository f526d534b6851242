//! REST API module.
//!
//! Every handler answers with the same envelope: `data` plus the store
//! `revisionId` on success, an error object plus the revision on failure.

mod courses;
mod datastore;
mod session;
mod students;

pub use courses::*;
pub use datastore::*;
pub use session::*;
pub use students::*;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::db::DocumentStore;
use crate::errors::{AppError, AppErrorWithRevision};
use crate::AppState;

/// Success response envelope.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub data: T,
    pub revision_id: i64,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn new(data: T, revision_id: i64) -> Self {
        Self {
            success: true,
            data,
            revision_id,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

pub type ApiResult<T> = Result<ApiResponse<T>, AppErrorWithRevision>;

pub fn success<T: Serialize>(data: T, revision_id: i64) -> ApiResult<T> {
    Ok(ApiResponse::new(data, revision_id))
}

pub fn error<T: Serialize>(err: AppError, revision_id: i64) -> ApiResult<T> {
    Err(AppErrorWithRevision {
        error: err,
        revision_id,
    })
}

/// Store revision for the envelope; 0 when it cannot be read.
async fn revision_of(state: &AppState) -> i64 {
    state.store.revision_id().await.unwrap_or(0)
}

/// Answer a mutation: the fresh revision on success, the prior one on failure.
async fn respond<T: Serialize>(
    state: &AppState,
    prior_revision: i64,
    result: Result<T, AppError>,
) -> ApiResult<T> {
    match result {
        Ok(data) => {
            let revision_id = state.store.revision_id().await.unwrap_or(prior_revision);
            success(data, revision_id)
        }
        Err(e) => error(e, prior_revision),
    }
}
