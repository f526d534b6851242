//! Datastore export matching the frontend Datastore interface.

use serde::{Deserialize, Serialize};

use super::{Course, Student};

pub const SCHEMA_VERSION: i32 = 1;

/// Both live collections as currently projected.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Datastore {
    pub schema_version: i32,
    pub generated_at: String,
    pub revision_id: i64,
    pub courses: Vec<Course>,
    pub students: Vec<Student>,
}

/// Revision information for change detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevisionInfo {
    pub revision_id: i64,
    pub generated_at: String,
}
