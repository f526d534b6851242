//! Course API endpoints.

use axum::{
    extract::{Path, State},
    Json,
};

use super::{respond, revision_of, success, ApiResult};
use crate::ledger::EnrollmentReport;
use crate::models::{
    Course, CourseSummary, CreateCourseRequest, DateRangeRequest, DeleteOutcome,
    RenameCourseRequest, RenameOutcome,
};
use crate::AppState;

/// GET /api/courses - List courses, oldest first.
pub async fn list_courses(State(state): State<AppState>) -> ApiResult<Vec<Course>> {
    let revision_id = revision_of(&state).await;
    success(state.ledger.courses().list(), revision_id)
}

/// POST /api/courses - Create a course.
pub async fn create_course(
    State(state): State<AppState>,
    Json(request): Json<CreateCourseRequest>,
) -> ApiResult<Course> {
    let revision_id = revision_of(&state).await;
    let result = state.ledger.create_course(&request).await;
    respond(&state, revision_id, result).await
}

/// PATCH /api/courses/:id/name - Rename a course and its students.
pub async fn rename_course(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<RenameCourseRequest>,
) -> ApiResult<RenameOutcome> {
    let revision_id = revision_of(&state).await;
    let result = state.ledger.rename_course(&id, &request.name).await;
    respond(&state, revision_id, result).await
}

/// POST /api/courses/:id/name/commit - Finish editing a name; blank gets a generated label.
pub async fn commit_course_name(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<RenameCourseRequest>,
) -> ApiResult<RenameOutcome> {
    let revision_id = revision_of(&state).await;
    let result = state.ledger.commit_course_name(&id, &request.name).await;
    respond(&state, revision_id, result).await
}

/// PUT /api/courses/:id/date-range - Set or clear course dates.
pub async fn update_date_range(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<DateRangeRequest>,
) -> ApiResult<Course> {
    let revision_id = revision_of(&state).await;
    let result = state.ledger.update_date_range(&id, request.date_range).await;
    respond(&state, revision_id, result).await
}

/// DELETE /api/courses/:id - Delete a course and its students.
pub async fn delete_course(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<DeleteOutcome> {
    let revision_id = revision_of(&state).await;
    let result = state.ledger.remove_course(&id).await;
    respond(&state, revision_id, result).await
}

/// DELETE /api/courses/by-name/:name - Delete a course by name.
pub async fn delete_course_by_name(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<DeleteOutcome> {
    let revision_id = revision_of(&state).await;
    let result = state.ledger.delete_course(&name).await;
    respond(&state, revision_id, result).await
}

/// GET /api/courses/by-name/:name/summary - Course statistics.
pub async fn course_summary(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<CourseSummary> {
    let revision_id = revision_of(&state).await;
    respond(&state, revision_id, state.ledger.course_summary(&name)).await
}

/// POST /api/courses/by-name/:name/finish - Relay every student of the course.
///
/// Delivery problems are reported inside the report, never as an error status.
pub async fn finish_enrollment(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<EnrollmentReport> {
    let revision_id = revision_of(&state).await;
    success(state.ledger.finish_enrollment(&name).await, revision_id)
}
