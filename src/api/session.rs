//! View session endpoints.

use axum::{extract::State, Json};
use serde::Deserialize;

use super::{error, revision_of, success, ApiResult};
use crate::ledger::{EditorAction, Session};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct SelectCourseRequest {
    pub name: String,
}

/// GET /api/session - Active course and editor state.
pub async fn get_session(State(state): State<AppState>) -> ApiResult<Session> {
    let revision_id = revision_of(&state).await;
    success(state.ledger.session(), revision_id)
}

/// PUT /api/session/active - Select a course tab.
pub async fn select_course(
    State(state): State<AppState>,
    Json(request): Json<SelectCourseRequest>,
) -> ApiResult<Session> {
    let revision_id = revision_of(&state).await;
    match state.ledger.select_course(&request.name) {
        Ok(session) => success(session, revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// POST /api/session/editor - Open or close the editor.
pub async fn editor_action(
    State(state): State<AppState>,
    Json(action): Json<EditorAction>,
) -> ApiResult<Session> {
    let revision_id = revision_of(&state).await;
    match state.ledger.apply_editor_action(action) {
        Ok(session) => success(session, revision_id),
        Err(e) => error(e, revision_id),
    }
}
