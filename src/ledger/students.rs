//! Student ledger: the live, newest-first set of enrollments.

use std::sync::Arc;

use chrono::{SubsecRound, Utc};

use super::projection::{LiveProjection, Record};
use super::registry::CourseRegistry;
use crate::db::{DocumentStore, OrderBy};
use crate::errors::AppError;
use crate::models::{
    balance, validate_amounts, validate_name, validate_observations, validate_phone,
    validate_qr_payment, CourseSummary, CreateStudentRequest, QrPaymentUpload, Student,
    UpdateStudentRequest,
};
use crate::relay::{NotificationRelay, StudentPayload};

impl Record for Student {
    const COLLECTION: &'static str = "students";

    fn order_by() -> OrderBy {
        OrderBy::desc("createdAt")
    }

    fn id(&self) -> &str {
        &self.id
    }
}

pub struct StudentLedger {
    store: Arc<dyn DocumentStore>,
    projection: LiveProjection<Student>,
    courses: Arc<CourseRegistry>,
    relay: Arc<dyn NotificationRelay>,
}

impl StudentLedger {
    pub async fn open(
        store: Arc<dyn DocumentStore>,
        courses: Arc<CourseRegistry>,
        relay: Arc<dyn NotificationRelay>,
    ) -> Result<Self, AppError> {
        let projection = LiveProjection::open(store.as_ref()).await?;
        Ok(Self {
            store,
            projection,
            courses,
            relay,
        })
    }

    pub fn list(&self) -> Vec<Student> {
        self.projection.snapshot()
    }

    pub fn get(&self, id: &str) -> Option<Student> {
        self.projection.get(id)
    }

    /// Students enrolled in a course, newest first.
    pub fn by_course(&self, course: &str) -> Vec<Student> {
        self.list()
            .into_iter()
            .filter(|student| student.course == course)
            .collect()
    }

    pub fn summary(&self, course: &str) -> CourseSummary {
        let students = self.by_course(course);
        let total_students = students.len();
        let total_income: f64 = students.iter().map(|s| s.total).sum();
        let students_with_video = students.iter().filter(|s| s.has_video).count();
        let video_percentage = if total_students == 0 {
            0.0
        } else {
            students_with_video as f64 * 100.0 / total_students as f64
        };

        CourseSummary {
            total_students,
            total_income,
            students_with_video,
            video_percentage,
        }
    }

    fn require_live_course(&self, course: &str) -> Result<(), AppError> {
        if self.courses.find_by_name(course).is_none() {
            return Err(AppError::Validation(format!(
                "Course \"{}\" does not exist",
                course
            )));
        }
        Ok(())
    }

    pub async fn create(&self, request: CreateStudentRequest) -> Result<Student, AppError> {
        request.validate()?;
        let course = request.course.trim().to_string();
        self.require_live_course(&course)?;

        let mut student = Student {
            id: String::new(),
            name: request.name.trim().to_string(),
            phone: request.phone.trim().to_string(),
            total: request.total,
            on_account: request.on_account,
            balance: balance(request.total, request.on_account),
            course,
            observations: request.observations.trim().to_string(),
            qr_payment_file_name: request.qr_payment.as_ref().map(|u| u.file_name.clone()),
            has_video: request.has_video,
            created_at: Utc::now().trunc_subsecs(6),
        };
        student.id = self
            .store
            .create(Student::COLLECTION, student.to_fields()?)
            .await
            .map_err(|e| e.into_remote_write("Failed to save student"))?;

        tracing::info!("Enrolled {} in {} ({})", student.name, student.course, student.id);
        self.notify(&student, request.qr_payment.as_ref()).await;
        Ok(student)
    }

    /// Merge the request into the current record. Balance follows total and
    /// on-account; the payment file name survives when no new file is sent.
    pub async fn update(
        &self,
        id: &str,
        request: UpdateStudentRequest,
    ) -> Result<Student, AppError> {
        let current = self
            .get(id)
            .ok_or_else(|| AppError::NotFound(format!("Student {} not found", id)))?;

        let name = request.name.map(|n| n.trim().to_string()).unwrap_or(current.name);
        let phone = request.phone.map(|p| p.trim().to_string()).unwrap_or(current.phone);
        let total = request.total.unwrap_or(current.total);
        let on_account = request.on_account.unwrap_or(current.on_account);
        let observations = request
            .observations
            .map(|o| o.trim().to_string())
            .unwrap_or(current.observations);

        validate_name(&name)?;
        validate_phone(&phone)?;
        validate_amounts(total, on_account)?;
        validate_observations(&observations)?;

        let course = match request.course {
            Some(course) => {
                let course = course.trim().to_string();
                if course != current.course {
                    self.require_live_course(&course)?;
                }
                course
            }
            None => current.course,
        };

        if let Some(upload) = &request.qr_payment {
            validate_qr_payment(upload)?;
        }
        let qr_payment_file_name = request
            .qr_payment
            .as_ref()
            .map(|u| u.file_name.clone())
            .or(current.qr_payment_file_name);

        let student = Student {
            id: current.id,
            name,
            phone,
            total,
            on_account,
            balance: balance(total, on_account),
            course,
            observations,
            qr_payment_file_name,
            has_video: request.has_video.unwrap_or(current.has_video),
            created_at: current.created_at,
        };

        self.store
            .update(Student::COLLECTION, id, student.to_fields()?)
            .await
            .map_err(|e| e.into_remote_write("Failed to save student"))?;

        tracing::info!("Updated student {} ({})", student.name, student.id);
        self.notify(&student, request.qr_payment.as_ref()).await;
        Ok(student)
    }

    /// Delete one student. Nothing else references students.
    pub async fn remove(&self, id: &str) -> Result<Student, AppError> {
        let student = self
            .get(id)
            .ok_or_else(|| AppError::NotFound(format!("Student {} not found", id)))?;

        self.store
            .delete(Student::COLLECTION, id)
            .await
            .map_err(|e| e.into_remote_write("Failed to remove student"))?;

        tracing::info!("Removed student {} from {}", student.name, student.course);
        Ok(student)
    }

    async fn notify(&self, student: &Student, upload: Option<&QrPaymentUpload>) {
        let payload = StudentPayload::new(student, upload);
        if let Err(e) = self.relay.send_structured(&payload).await {
            tracing::warn!("Failed to relay student {}: {}", student.id, e);
        }
    }
}
