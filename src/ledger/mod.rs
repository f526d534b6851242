//! Ledger domain: course registry, student ledger, cascades and view session.
//!
//! `Ledger` is the entry point the API uses. It owns the live projections,
//! routes course renames and deletes through the cascade controller and keeps
//! the view session in step with every completed mutation.

mod cascade;
mod enrollment;
mod projection;
mod registry;
mod session;
mod students;

#[cfg(test)]
pub(crate) mod testing;

pub use cascade::CascadeController;
pub use enrollment::{finish_enrollment, EnrollmentReport};
pub use registry::CourseRegistry;
pub use session::{EditorAction, Session};
pub use students::StudentLedger;

use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{Local, Utc};

use crate::db::DocumentStore;
use crate::errors::AppError;
use crate::models::{
    Course, CourseSummary, CreateCourseRequest, CreateStudentRequest, Datastore, DateRange,
    DeleteOutcome, RenameOutcome, Student, UpdateStudentRequest, SCHEMA_VERSION,
};
use crate::relay::NotificationRelay;

/// How course renames and deletes reach the students collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CascadeMode {
    /// Course and student writes go out as one cross-collection batch.
    #[default]
    Atomic,
    /// Course write first, then one batch for the students. A failure in
    /// between leaves students pointing at the old course name.
    TwoPhase,
}

impl CascadeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CascadeMode::Atomic => "atomic",
            CascadeMode::TwoPhase => "two-phase",
        }
    }
}

impl FromStr for CascadeMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "atomic" => Ok(CascadeMode::Atomic),
            "two-phase" | "two_phase" | "twophase" => Ok(CascadeMode::TwoPhase),
            other => Err(format!("unknown cascade mode: {}", other)),
        }
    }
}

/// The ledger as one unit: projections, cascades, relay and session.
pub struct Ledger {
    store: Arc<dyn DocumentStore>,
    registry: Arc<CourseRegistry>,
    students: StudentLedger,
    cascade: CascadeController,
    relay: Arc<dyn NotificationRelay>,
    session: Mutex<Session>,
}

impl Ledger {
    pub async fn open(
        store: Arc<dyn DocumentStore>,
        relay: Arc<dyn NotificationRelay>,
        mode: CascadeMode,
    ) -> Result<Self, AppError> {
        let registry = Arc::new(CourseRegistry::open(store.clone()).await?);
        let students = StudentLedger::open(store.clone(), registry.clone(), relay.clone()).await?;
        let cascade = CascadeController::new(store.clone(), registry.clone(), mode);

        tracing::info!("Ledger ready (cascade mode: {})", mode.as_str());

        Ok(Self {
            store,
            registry,
            students,
            cascade,
            relay,
            session: Mutex::new(Session::default()),
        })
    }

    pub fn courses(&self) -> &CourseRegistry {
        &self.registry
    }

    pub fn students(&self) -> &StudentLedger {
        &self.students
    }

    fn session_mut(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub async fn create_course(&self, request: &CreateCourseRequest) -> Result<Course, AppError> {
        let course = self
            .registry
            .create(&request.name, request.date_range.clone())
            .await?;
        self.session_mut().course_created(&course.name);
        Ok(course)
    }

    pub async fn rename_course(&self, id: &str, new_name: &str) -> Result<RenameOutcome, AppError> {
        let old_name = self.registry.require(id)?.name;
        let outcome = self.cascade.rename_course(id, new_name).await?;

        if let RenameOutcome::Renamed { course, .. } = &outcome {
            self.session_mut().course_renamed(&old_name, &course.name);
        }
        Ok(outcome)
    }

    /// Blur/commit step of the name editor: a blank name gets a generated label.
    pub async fn commit_course_name(
        &self,
        id: &str,
        name: &str,
    ) -> Result<RenameOutcome, AppError> {
        if !name.trim().is_empty() {
            return self.rename_course(id, name).await;
        }

        self.registry.require(id)?;
        let fallback = self.registry.fallback_name(id);
        tracing::debug!("Blank course name committed, using {}", fallback);
        self.rename_course(id, &fallback).await
    }

    pub async fn update_date_range(
        &self,
        id: &str,
        date_range: Option<DateRange>,
    ) -> Result<Course, AppError> {
        self.registry.update_date_range(id, date_range).await
    }

    pub async fn delete_course(&self, name: &str) -> Result<DeleteOutcome, AppError> {
        let outcome = self.cascade.delete_course(name).await?;
        let remaining = self.registry.list();
        self.session_mut().course_deleted(name, &remaining);
        Ok(outcome)
    }

    /// Delete by id: resolve the current name, then run the name-based delete.
    pub async fn remove_course(&self, id: &str) -> Result<DeleteOutcome, AppError> {
        let course = self.registry.require(id)?;
        self.delete_course(&course.name).await
    }

    pub fn course_summary(&self, name: &str) -> Result<CourseSummary, AppError> {
        if self.registry.find_by_name(name).is_none() {
            return Err(AppError::NotFound(format!("Course \"{}\" not found", name)));
        }
        Ok(self.students.summary(name))
    }

    pub async fn create_student(&self, request: CreateStudentRequest) -> Result<Student, AppError> {
        let student = self.students.create(request).await?;
        self.session_mut().student_saved(&student.course);
        Ok(student)
    }

    pub async fn update_student(
        &self,
        id: &str,
        request: UpdateStudentRequest,
    ) -> Result<Student, AppError> {
        let student = self.students.update(id, request).await?;
        self.session_mut().student_saved(&student.course);
        Ok(student)
    }

    pub async fn remove_student(&self, id: &str) -> Result<Student, AppError> {
        let student = self.students.remove(id).await?;
        self.session_mut().student_removed(&student.id);
        Ok(student)
    }

    /// Relay every student of a course in flattened form, stamped with today's local date.
    pub async fn finish_enrollment(&self, course_name: &str) -> EnrollmentReport {
        let date = Local::now().format("%-d/%-m/%Y").to_string();
        let students = self.students.by_course(course_name);
        finish_enrollment(course_name, students, self.relay.clone(), &date).await
    }

    /// Current view state; selects the first course when none is active.
    pub fn session(&self) -> Session {
        let courses = self.registry.list();
        let mut session = self.session_mut();
        session.ensure_active(&courses);
        session.clone()
    }

    pub fn select_course(&self, name: &str) -> Result<Session, AppError> {
        if self.registry.find_by_name(name).is_none() {
            return Err(AppError::NotFound(format!("Course \"{}\" not found", name)));
        }
        let mut session = self.session_mut();
        session.select_course(name);
        Ok(session.clone())
    }

    pub fn apply_editor_action(&self, action: EditorAction) -> Result<Session, AppError> {
        if let EditorAction::Edit { student_id } = &action {
            if self.students.get(student_id).is_none() {
                return Err(AppError::NotFound(format!("Student {} not found", student_id)));
            }
        }
        let mut session = self.session_mut();
        session.apply(action);
        Ok(session.clone())
    }

    /// Both projections as one export, tagged with the store revision.
    pub async fn datastore(&self) -> Result<Datastore, AppError> {
        let revision = self.store.revision().await?;
        Ok(Datastore {
            schema_version: SCHEMA_VERSION,
            generated_at: Utc::now().to_rfc3339(),
            revision_id: revision.revision_id,
            courses: self.registry.list(),
            students: self.students.list(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::enrollment::EnrollmentStatus;
    use super::projection::Record;
    use super::testing::{setup, FlakyStore};
    use super::*;
    use crate::db::{FieldEquals, OrderBy};
    use crate::models::QrPaymentUpload;

    fn enroll(name: &str, course: &str, total: f64, on_account: f64) -> CreateStudentRequest {
        CreateStudentRequest {
            name: name.to_string(),
            phone: "555 123 4567".to_string(),
            total,
            on_account,
            course: course.to_string(),
            observations: String::new(),
            qr_payment: None,
            has_video: false,
        }
    }

    fn course(name: &str) -> CreateCourseRequest {
        CreateCourseRequest {
            name: name.to_string(),
            date_range: None,
        }
    }

    async fn stored_courses(store: &FlakyStore, name: &str) -> usize {
        store
            .query("courses", &FieldEquals::new("name", name))
            .await
            .unwrap()
            .len()
    }

    async fn stored_students(store: &FlakyStore, course: &str) -> usize {
        store
            .query("students", &FieldEquals::new("course", course))
            .await
            .unwrap()
            .len()
    }

    #[test]
    fn test_cascade_mode_parsing() {
        assert_eq!("atomic".parse::<CascadeMode>().unwrap(), CascadeMode::Atomic);
        assert_eq!(
            "Two-Phase".parse::<CascadeMode>().unwrap(),
            CascadeMode::TwoPhase
        );
        assert!("eventual".parse::<CascadeMode>().is_err());
    }

    #[tokio::test]
    async fn test_balance_round_trip() {
        let ctx = setup(CascadeMode::Atomic).await;
        ctx.ledger.create_course(&course("Pan")).await.unwrap();

        let student = ctx
            .ledger
            .create_student(enroll("Ana", "Pan", 500.0, 150.0))
            .await
            .unwrap();
        assert_eq!(student.balance, 350.0);

        let updated = ctx
            .ledger
            .update_student(
                &student.id,
                UpdateStudentRequest {
                    on_account: Some(500.0),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.balance, 0.0);
        assert_eq!(updated.total, 500.0);

        let projected = ctx.ledger.students().get(&student.id).unwrap();
        assert_eq!(projected.balance, projected.total - projected.on_account);
    }

    #[tokio::test]
    async fn test_duplicate_names_leave_both_courses_unchanged() {
        let ctx = setup(CascadeMode::Atomic).await;
        let a = ctx.ledger.create_course(&course("A")).await.unwrap();
        let b = ctx.ledger.create_course(&course("B")).await.unwrap();

        let err = ctx.ledger.create_course(&course(" A ")).await.unwrap_err();
        assert!(matches!(err, AppError::DuplicateName(_)));

        let err = ctx.ledger.rename_course(&b.id, "A").await.unwrap_err();
        assert!(matches!(err, AppError::DuplicateName(_)));

        assert_eq!(ctx.ledger.courses().get(&a.id).unwrap().name, "A");
        assert_eq!(ctx.ledger.courses().get(&b.id).unwrap().name, "B");
        assert_eq!(ctx.ledger.courses().list().len(), 2);
    }

    #[tokio::test]
    async fn test_rename_moves_every_student() {
        for mode in [CascadeMode::Atomic, CascadeMode::TwoPhase] {
            let ctx = setup(mode).await;
            let a = ctx.ledger.create_course(&course("A")).await.unwrap();
            ctx.ledger.create_course(&course("Other")).await.unwrap();
            for name in ["Ana", "Luis", "Marta"] {
                ctx.ledger
                    .create_student(enroll(name, "A", 100.0, 0.0))
                    .await
                    .unwrap();
            }
            ctx.ledger
                .create_student(enroll("Pedro", "Other", 100.0, 0.0))
                .await
                .unwrap();

            let outcome = ctx.ledger.rename_course(&a.id, "  B ").await.unwrap();
            assert_eq!(
                outcome,
                RenameOutcome::Renamed {
                    course: Course {
                        name: "B".to_string(),
                        ..a.clone()
                    },
                    students_updated: 3,
                }
            );

            assert_eq!(ctx.ledger.students().by_course("B").len(), 3);
            assert!(ctx.ledger.students().by_course("A").is_empty());
            assert_eq!(ctx.ledger.students().by_course("Other").len(), 1);
            assert!(ctx.ledger.courses().find_by_name("A").is_none());
            assert_eq!(stored_students(&ctx.store, "A").await, 0);
        }
    }

    #[tokio::test]
    async fn test_blank_rename_is_a_noop() {
        let ctx = setup(CascadeMode::Atomic).await;
        let a = ctx.ledger.create_course(&course("A")).await.unwrap();
        let writes = ctx.store.write_count();

        let outcome = ctx.ledger.rename_course(&a.id, "   ").await.unwrap();
        assert!(matches!(outcome, RenameOutcome::Skipped { .. }));
        let outcome = ctx.ledger.rename_course(&a.id, "A").await.unwrap();
        assert!(matches!(outcome, RenameOutcome::Unchanged { .. }));

        assert_eq!(ctx.store.write_count(), writes);
        assert_eq!(ctx.ledger.courses().get(&a.id).unwrap().name, "A");
    }

    #[tokio::test]
    async fn test_failed_rename_reverts_projection() {
        let ctx = setup(CascadeMode::Atomic).await;
        let a = ctx.ledger.create_course(&course("A")).await.unwrap();
        ctx.ledger
            .create_student(enroll("Ana", "A", 100.0, 0.0))
            .await
            .unwrap();

        ctx.store.fail_batches(true);
        let err = ctx.ledger.rename_course(&a.id, "B").await.unwrap_err();
        assert!(matches!(err, AppError::RemoteWrite(_)));

        assert_eq!(ctx.ledger.courses().get(&a.id).unwrap().name, "A");
        assert_eq!(ctx.ledger.students().by_course("A").len(), 1);
        assert_eq!(stored_courses(&ctx.store, "A").await, 1);
    }

    #[tokio::test]
    async fn test_two_phase_rename_failure_leaves_students_behind() {
        let ctx = setup(CascadeMode::TwoPhase).await;
        let a = ctx.ledger.create_course(&course("A")).await.unwrap();
        ctx.ledger
            .create_student(enroll("Ana", "A", 100.0, 0.0))
            .await
            .unwrap();

        ctx.store.fail_batches(true);
        let err = ctx.ledger.rename_course(&a.id, "B").await.unwrap_err();
        assert!(matches!(err, AppError::RemoteWrite(_)));

        // The course write landed; the student batch did not
        assert_eq!(stored_courses(&ctx.store, "B").await, 1);
        assert_eq!(stored_students(&ctx.store, "A").await, 1);
        assert_eq!(ctx.ledger.courses().get(&a.id).unwrap().name, "B");
    }

    #[tokio::test]
    async fn test_delete_removes_course_and_students() {
        for mode in [CascadeMode::Atomic, CascadeMode::TwoPhase] {
            let ctx = setup(mode).await;
            ctx.ledger.create_course(&course("A")).await.unwrap();
            for name in ["Ana", "Luis", "Marta"] {
                ctx.ledger
                    .create_student(enroll(name, "A", 100.0, 0.0))
                    .await
                    .unwrap();
            }

            let outcome = ctx.ledger.delete_course("A").await.unwrap();
            assert_eq!(outcome.students_removed, 3);
            assert!(ctx.ledger.courses().find_by_name("A").is_none());
            assert!(ctx.ledger.students().by_course("A").is_empty());
            assert_eq!(stored_students(&ctx.store, "A").await, 0);
        }
    }

    #[tokio::test]
    async fn test_delete_failure_depends_on_cascade_mode() {
        let atomic = setup(CascadeMode::Atomic).await;
        atomic.ledger.create_course(&course("A")).await.unwrap();
        atomic
            .ledger
            .create_student(enroll("Ana", "A", 100.0, 0.0))
            .await
            .unwrap();
        atomic.store.fail_batches(true);
        let err = atomic.ledger.delete_course("A").await.unwrap_err();
        assert!(matches!(err, AppError::RemoteWrite(_)));
        assert_eq!(stored_courses(&atomic.store, "A").await, 1);
        assert_eq!(stored_students(&atomic.store, "A").await, 1);

        let two_phase = setup(CascadeMode::TwoPhase).await;
        two_phase.ledger.create_course(&course("A")).await.unwrap();
        two_phase
            .ledger
            .create_student(enroll("Ana", "A", 100.0, 0.0))
            .await
            .unwrap();
        two_phase.store.fail_batches(true);
        let err = two_phase.ledger.delete_course("A").await.unwrap_err();
        assert!(matches!(err, AppError::RemoteWrite(_)));
        assert_eq!(stored_courses(&two_phase.store, "A").await, 0);
        assert_eq!(stored_students(&two_phase.store, "A").await, 1);
    }

    #[tokio::test]
    async fn test_delete_unknown_course() {
        let ctx = setup(CascadeMode::Atomic).await;
        let err = ctx.ledger.delete_course("Nope").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        let err = ctx.ledger.remove_course("missing-id").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_finish_enrollment_without_students() {
        let ctx = setup(CascadeMode::Atomic).await;
        ctx.ledger.create_course(&course("A")).await.unwrap();

        let report = ctx.ledger.finish_enrollment("A").await;
        assert_eq!(report.status, EnrollmentStatus::NoStudents);
        assert_eq!(report.attempted, 0);
        assert_eq!(ctx.relay.flattened_calls(), 0);
    }

    #[tokio::test]
    async fn test_finish_enrollment_partial_failure() {
        let ctx = setup(CascadeMode::Atomic).await;
        ctx.ledger.create_course(&course("A")).await.unwrap();
        for name in ["Ana", "Luis", "Marta"] {
            ctx.ledger
                .create_student(enroll(name, "A", 100.0, 0.0))
                .await
                .unwrap();
        }
        ctx.relay.fail_for("Luis");

        let report = ctx.ledger.finish_enrollment("A").await;
        assert_eq!(report.status, EnrollmentStatus::PartiallyDelivered);
        assert_eq!(report.attempted, 3);
        assert_eq!(report.delivered, 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].name, "Luis");
        assert_eq!(ctx.relay.flattened_calls(), 3);
    }

    #[tokio::test]
    async fn test_student_validation_performs_no_write() {
        let ctx = setup(CascadeMode::Atomic).await;
        ctx.ledger.create_course(&course("A")).await.unwrap();
        let writes = ctx.store.write_count();

        let err = ctx
            .ledger
            .create_student(enroll("Ana", "Ghost course", 100.0, 0.0))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let err = ctx
            .ledger
            .create_student(enroll("Ana", "A", 100.0, -5.0))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        assert_eq!(ctx.store.write_count(), writes);
        assert_eq!(ctx.relay.structured_calls(), 0);
    }

    #[tokio::test]
    async fn test_relay_failure_does_not_fail_student_create() {
        let ctx = setup(CascadeMode::Atomic).await;
        ctx.ledger.create_course(&course("A")).await.unwrap();
        ctx.relay.fail_for("Ana");

        let mut request = enroll("Ana", "A", 100.0, 0.0);
        request.qr_payment = Some(QrPaymentUpload {
            file_name: "pago.png".to_string(),
            data_uri: "data:image/png;base64,AAAA".to_string(),
        });
        let student = ctx.ledger.create_student(request).await.unwrap();

        assert_eq!(student.qr_payment_file_name.as_deref(), Some("pago.png"));
        assert_eq!(ctx.relay.structured_calls(), 1);
        let stored = ctx
            .store
            .query("students", &FieldEquals::new("name", "Ana"))
            .await
            .unwrap();
        assert!(stored[0].get("qrPaymentUrl").is_none());
    }

    #[tokio::test]
    async fn test_session_follows_course_mutations() {
        let ctx = setup(CascadeMode::Atomic).await;
        let a = ctx.ledger.create_course(&course("A")).await.unwrap();
        ctx.ledger.create_course(&course("B")).await.unwrap();
        assert_eq!(ctx.ledger.session().active_course.as_deref(), Some("B"));

        ctx.ledger.select_course("A").unwrap();
        ctx.ledger.rename_course(&a.id, "A2").await.unwrap();
        assert_eq!(ctx.ledger.session().active_course.as_deref(), Some("A2"));

        ctx.ledger.delete_course("A2").await.unwrap();
        assert_eq!(ctx.ledger.session().active_course.as_deref(), Some("B"));

        let err = ctx.ledger.select_course("A2").unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_commit_blank_name_uses_fallback() {
        let ctx = setup(CascadeMode::Atomic).await;
        let a = ctx.ledger.create_course(&course("A")).await.unwrap();
        ctx.ledger.create_course(&course("Curso 2")).await.unwrap();

        let outcome = ctx.ledger.commit_course_name(&a.id, "  ").await.unwrap();
        assert_eq!(outcome.course().name, "Curso 4");
    }

    #[tokio::test]
    async fn test_subscribe_delivers_ordered_courses() {
        let ctx = setup(CascadeMode::Atomic).await;
        ctx.ledger.create_course(&course("First")).await.unwrap();
        let mut feed = ctx.ledger.courses().subscribe().await.unwrap();
        ctx.ledger.create_course(&course("Second")).await.unwrap();

        let mut latest = feed.next().await.unwrap();
        if latest.len() < 2 {
            latest = feed.next().await.unwrap();
        }
        let names: Vec<&str> = latest.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["First", "Second"]);
        assert_eq!(OrderBy::asc("createdAt"), <Course as Record>::order_by());
    }
}
