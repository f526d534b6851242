//! Enrollment finalization: relay every student of a course at once.

use std::sync::Arc;

use serde::Serialize;

use crate::models::Student;
use crate::relay::{FlattenedRecord, NotificationRelay};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum EnrollmentStatus {
    /// The course had nobody to relay; no calls were made.
    NoStudents,
    Delivered,
    PartiallyDelivered,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryFailure {
    pub student_id: String,
    pub name: String,
    pub reason: String,
}

/// Aggregate outcome of one finalization run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentReport {
    pub course: String,
    pub status: EnrollmentStatus,
    pub attempted: usize,
    pub delivered: usize,
    pub failures: Vec<DeliveryFailure>,
}

/// Send one flattened record per student concurrently and wait for all of them.
///
/// A failed delivery never cancels the others.
pub async fn finish_enrollment(
    course: &str,
    students: Vec<Student>,
    relay: Arc<dyn NotificationRelay>,
    date: &str,
) -> EnrollmentReport {
    if students.is_empty() {
        tracing::info!("No students to relay for course {}", course);
        return EnrollmentReport {
            course: course.to_string(),
            status: EnrollmentStatus::NoStudents,
            attempted: 0,
            delivered: 0,
            failures: Vec::new(),
        };
    }

    let attempted = students.len();

    // All deliveries are in flight before the first one is awaited
    let deliveries: Vec<_> = students
        .iter()
        .map(|student| {
            let record = FlattenedRecord::new(student, date);
            let relay = relay.clone();
            tokio::spawn(async move { relay.send_flattened(&record).await })
        })
        .collect();

    let mut failures = Vec::new();
    for (student, delivery) in students.iter().zip(deliveries) {
        let reason = match delivery.await {
            Ok(Ok(())) => continue,
            Ok(Err(e)) => e.message(),
            Err(e) => format!("delivery task failed: {}", e),
        };

        tracing::warn!("Failed to relay {} for {}: {}", student.name, course, reason);
        failures.push(DeliveryFailure {
            student_id: student.id.clone(),
            name: student.name.clone(),
            reason,
        });
    }

    let delivered = attempted - failures.len();

    let status = if failures.is_empty() {
        EnrollmentStatus::Delivered
    } else if delivered == 0 {
        EnrollmentStatus::Failed
    } else {
        EnrollmentStatus::PartiallyDelivered
    };

    tracing::info!(
        "Finished enrollment for {}: {}/{} delivered",
        course,
        delivered,
        attempted
    );

    EnrollmentReport {
        course: course.to_string(),
        status,
        attempted,
        delivered,
        failures,
    }
}
