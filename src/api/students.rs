//! Student API endpoints.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;

use super::{error, respond, revision_of, success, ApiResult};
use crate::errors::AppError;
use crate::models::{CreateStudentRequest, Student, UpdateStudentRequest};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct StudentListQuery {
    pub course: Option<String>,
}

/// GET /api/students - List students, newest first, optionally for one course.
pub async fn list_students(
    State(state): State<AppState>,
    Query(query): Query<StudentListQuery>,
) -> ApiResult<Vec<Student>> {
    let revision_id = revision_of(&state).await;
    let students = match query.course {
        Some(course) => state.ledger.students().by_course(&course),
        None => state.ledger.students().list(),
    };
    success(students, revision_id)
}

/// GET /api/students/:id - Get a single student.
pub async fn get_student(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Student> {
    let revision_id = revision_of(&state).await;

    match state.ledger.students().get(&id) {
        Some(student) => success(student, revision_id),
        None => error(
            AppError::NotFound(format!("Student {} not found", id)),
            revision_id,
        ),
    }
}

/// POST /api/students - Enroll a student.
pub async fn create_student(
    State(state): State<AppState>,
    Json(request): Json<CreateStudentRequest>,
) -> ApiResult<Student> {
    let revision_id = revision_of(&state).await;
    let result = state.ledger.create_student(request).await;
    respond(&state, revision_id, result).await
}

/// PUT /api/students/:id - Update a student.
pub async fn update_student(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<UpdateStudentRequest>,
) -> ApiResult<Student> {
    let revision_id = revision_of(&state).await;
    let result = state.ledger.update_student(&id, request).await;
    respond(&state, revision_id, result).await
}

/// DELETE /api/students/:id - Remove a student.
pub async fn delete_student(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Student> {
    let revision_id = revision_of(&state).await;
    let result = state.ledger.remove_student(&id).await;
    respond(&state, revision_id, result).await
}
