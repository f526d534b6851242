//! Course model matching the frontend Course interface.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A scheduled offering students enroll in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    pub id: String,
    pub name: String,
    /// Stored as integer microseconds so the store can order by it
    #[serde(with = "chrono::serde::ts_microseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_range: Option<DateRange>,
}

/// Course dates. No ordering is enforced between `from` and `to`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DateRange {
    pub from: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<NaiveDate>,
}

/// Request body for creating a course.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCourseRequest {
    pub name: String,
    #[serde(default)]
    pub date_range: Option<DateRange>,
}

/// Request body for renaming a course, also used by the commit step.
#[derive(Debug, Clone, Deserialize)]
pub struct RenameCourseRequest {
    #[serde(default)]
    pub name: String,
}

/// Request body for setting or clearing a course's dates.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DateRangeRequest {
    #[serde(default)]
    pub date_range: Option<DateRange>,
}

/// Result of a rename request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum RenameOutcome {
    /// The course and its students now carry the new name.
    #[serde(rename_all = "camelCase")]
    Renamed {
        course: Course,
        students_updated: usize,
    },
    /// The new name equals the current one.
    Unchanged { course: Course },
    /// The new name was blank; nothing was written.
    Skipped { course: Course },
}

impl RenameOutcome {
    pub fn course(&self) -> &Course {
        match self {
            RenameOutcome::Renamed { course, .. }
            | RenameOutcome::Unchanged { course }
            | RenameOutcome::Skipped { course } => course,
        }
    }
}

/// Result of a course delete.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteOutcome {
    pub course: Course,
    pub students_removed: usize,
}

/// Per-course statistics shown on the course tab.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseSummary {
    pub total_students: usize,
    pub total_income: f64,
    pub students_with_video: usize,
    pub video_percentage: f64,
}
