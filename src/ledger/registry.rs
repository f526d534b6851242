//! Course registry: the live, creation-ordered set of courses.
//!
//! Renames and deletes touch students too, so they go through
//! [`CascadeController`](super::CascadeController) rather than this type.

use std::sync::Arc;

use chrono::{SubsecRound, Utc};
use serde_json::Value;

use super::projection::{Feed, LiveProjection, Record};
use crate::db::{DocumentStore, Fields, OrderBy};
use crate::errors::AppError;
use crate::models::{Course, DateRange};

impl Record for Course {
    const COLLECTION: &'static str = "courses";

    fn order_by() -> OrderBy {
        OrderBy::asc("createdAt")
    }

    fn id(&self) -> &str {
        &self.id
    }
}

pub struct CourseRegistry {
    store: Arc<dyn DocumentStore>,
    projection: LiveProjection<Course>,
}

impl CourseRegistry {
    pub async fn open(store: Arc<dyn DocumentStore>) -> Result<Self, AppError> {
        let projection = LiveProjection::open(store.as_ref()).await?;
        Ok(Self { store, projection })
    }

    /// Independent feed of full course snapshots. Dropping it unsubscribes.
    pub async fn subscribe(&self) -> Result<Feed<Course>, AppError> {
        Feed::open(self.store.as_ref()).await
    }

    pub(crate) fn projection(&self) -> &LiveProjection<Course> {
        &self.projection
    }

    pub fn list(&self) -> Vec<Course> {
        self.projection.snapshot()
    }

    pub fn get(&self, id: &str) -> Option<Course> {
        self.projection.get(id)
    }

    pub fn require(&self, id: &str) -> Result<Course, AppError> {
        self.get(id)
            .ok_or_else(|| AppError::NotFound(format!("Course {} not found", id)))
    }

    pub fn find_by_name(&self, name: &str) -> Option<Course> {
        self.projection.find(|course| course.name == name)
    }

    /// Whether a live course other than `except_id` already uses `name`.
    pub fn name_taken(&self, name: &str, except_id: Option<&str>) -> bool {
        self.projection
            .find(|course| course.name == name && Some(course.id.as_str()) != except_id)
            .is_some()
    }

    /// Create a course. The uniqueness check runs against the local projection,
    /// so two concurrent creators can still both succeed.
    pub async fn create(
        &self,
        name: &str,
        date_range: Option<DateRange>,
    ) -> Result<Course, AppError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AppError::EmptyName(
                "Course name cannot be empty".to_string(),
            ));
        }
        if self.name_taken(name, None) {
            return Err(AppError::DuplicateName(format!(
                "A course named \"{}\" already exists",
                name
            )));
        }

        let mut course = Course {
            id: String::new(),
            name: name.to_string(),
            created_at: Utc::now().trunc_subsecs(6),
            date_range,
        };
        course.id = self
            .store
            .create(Course::COLLECTION, course.to_fields()?)
            .await
            .map_err(|e| e.into_remote_write("Failed to create course"))?;

        tracing::info!("Created course {} ({})", course.name, course.id);
        Ok(course)
    }

    /// Set or clear the dates of a course, optimistically.
    pub async fn update_date_range(
        &self,
        id: &str,
        date_range: Option<DateRange>,
    ) -> Result<Course, AppError> {
        let current = self.require(id)?;
        let proposed = Course {
            date_range: date_range.clone(),
            ..current
        };

        let tentative = self
            .projection
            .apply_tentative(proposed.clone())
            .ok_or_else(|| AppError::NotFound(format!("Course {} not found", id)))?;

        let value = match &date_range {
            Some(range) => serde_json::to_value(range)?,
            None => Value::Null,
        };
        let mut fields = Fields::new();
        fields.insert("dateRange".to_string(), value);

        match self.store.update(Course::COLLECTION, id, fields).await {
            Ok(()) => {
                self.projection.commit(&tentative);
                tracing::info!("Updated dates of course {}", proposed.name);
                Ok(proposed)
            }
            Err(AppError::NotFound(msg)) => {
                self.projection.revert(tentative);
                Err(AppError::NotFound(msg))
            }
            Err(e) => {
                tracing::warn!("Reverting dates of course {}: {}", id, e);
                self.projection.revert(tentative);
                Err(e.into_remote_write("Failed to save course dates"))
            }
        }
    }

    /// Label for a course whose name was left blank: `Curso {n}` with `n` the
    /// course count, bumped past labels other courses already use.
    pub fn fallback_name(&self, id: &str) -> String {
        let courses = self.list();
        let taken = |candidate: &str| {
            courses
                .iter()
                .any(|course| course.name == candidate && course.id != id)
        };

        let mut counter = 1;
        let mut candidate = format!("Curso {}", courses.len());
        while taken(&candidate) {
            counter += 1;
            candidate = format!("Curso {}", courses.len() + counter);
        }
        candidate
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::setup;
    use super::*;
    use crate::db::{init_database, SqliteStore};
    use crate::ledger::CascadeMode;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    async fn setup_registry() -> (CourseRegistry, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let pool = init_database(&temp_dir.path().join("courses.sqlite"))
            .await
            .expect("Failed to init DB");
        let registry = CourseRegistry::open(Arc::new(SqliteStore::new(pool)))
            .await
            .unwrap();
        (registry, temp_dir)
    }

    #[tokio::test]
    async fn test_create_trims_and_orders_by_creation() {
        let (registry, _dir) = setup_registry().await;

        registry.create("  Panadería ", None).await.unwrap();
        registry.create("Repostería", None).await.unwrap();

        let names: Vec<String> = registry.list().into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["Panadería", "Repostería"]);
    }

    #[tokio::test]
    async fn test_create_rejects_blank_and_duplicates() {
        let (registry, _dir) = setup_registry().await;
        registry.create("Pan", None).await.unwrap();

        assert!(matches!(
            registry.create("   ", None).await,
            Err(AppError::EmptyName(_))
        ));
        assert!(matches!(
            registry.create("Pan", None).await,
            Err(AppError::DuplicateName(_))
        ));
        assert_eq!(registry.list().len(), 1);
    }

    #[tokio::test]
    async fn test_update_and_clear_date_range() {
        let (registry, _dir) = setup_registry().await;
        let course = registry.create("Pan", None).await.unwrap();
        let range = DateRange {
            from: NaiveDate::from_ymd_opt(2026, 5, 4).unwrap(),
            to: Some(NaiveDate::from_ymd_opt(2026, 5, 1).unwrap()),
        };

        let updated = registry
            .update_date_range(&course.id, Some(range.clone()))
            .await
            .unwrap();
        assert_eq!(updated.date_range, Some(range.clone()));
        assert_eq!(registry.get(&course.id).unwrap().date_range, Some(range));

        registry.update_date_range(&course.id, None).await.unwrap();
        assert_eq!(registry.get(&course.id).unwrap().date_range, None);

        assert!(matches!(
            registry.update_date_range("missing", None).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_failed_date_range_write_reverts() {
        let ctx = setup(CascadeMode::Atomic).await;
        let registry = ctx.ledger.courses();
        let range = DateRange {
            from: NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
            to: None,
        };
        let course = registry.create("Pan", Some(range.clone())).await.unwrap();

        ctx.store.fail_writes(true);
        let err = registry
            .update_date_range(&course.id, None)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::RemoteWrite(_)));
        assert_eq!(registry.get(&course.id).unwrap().date_range, Some(range));
    }

    #[tokio::test]
    async fn test_failed_course_create_is_remote_write() {
        let ctx = setup(CascadeMode::Atomic).await;
        ctx.store.fail_writes(true);

        let err = ctx.ledger.courses().create("Pan", None).await.unwrap_err();
        assert!(matches!(err, AppError::RemoteWrite(_)));
        assert!(ctx.ledger.courses().list().is_empty());
    }

    #[tokio::test]
    async fn test_fallback_name_skips_taken_labels() {
        let (registry, _dir) = setup_registry().await;
        let first = registry.create("Curso 3", None).await.unwrap();
        registry.create("Pan", None).await.unwrap();
        let third = registry.create("Curso 5", None).await.unwrap();

        // The course being named does not count against its own label
        assert_eq!(registry.fallback_name(&first.id), "Curso 3");
        assert_eq!(registry.fallback_name(&third.id), "Curso 5");
        // "Curso 3" is taken, "Curso 5" (3 + 2) is taken, so "Curso 6"
        assert_eq!(registry.fallback_name("other"), "Curso 6");
    }
}
