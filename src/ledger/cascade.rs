//! Course rename and delete, carried through to the students that reference
//! the course by name.

use std::sync::Arc;

use serde_json::Value;

use super::projection::Record;
use super::registry::CourseRegistry;
use super::CascadeMode;
use crate::db::{BatchOp, Document, DocumentStore, FieldEquals, Fields};
use crate::errors::AppError;
use crate::models::{Course, DeleteOutcome, RenameOutcome, Student};

pub struct CascadeController {
    store: Arc<dyn DocumentStore>,
    registry: Arc<CourseRegistry>,
    mode: CascadeMode,
}

fn single_field(field: &str, value: &str) -> Fields {
    let mut fields = Fields::new();
    fields.insert(field.to_string(), Value::String(value.to_string()));
    fields
}

impl CascadeController {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        registry: Arc<CourseRegistry>,
        mode: CascadeMode,
    ) -> Self {
        Self {
            store,
            registry,
            mode,
        }
    }

    async fn students_of(&self, course_name: &str) -> Result<Vec<Document>, AppError> {
        self.store
            .query(Student::COLLECTION, &FieldEquals::new("course", course_name))
            .await
    }

    /// Rename a course and every student enrolled under its old name.
    ///
    /// Blank names are skipped and an identical name is reported unchanged,
    /// both without writing. The registry shows the new name while the writes
    /// are in flight and falls back to the old one if they fail.
    pub async fn rename_course(
        &self,
        id: &str,
        new_name: &str,
    ) -> Result<RenameOutcome, AppError> {
        let course = self.registry.require(id)?;

        let new_name = new_name.trim();
        if new_name.is_empty() {
            tracing::debug!("Ignoring blank rename of course {}", course.name);
            return Ok(RenameOutcome::Skipped { course });
        }
        if new_name == course.name {
            return Ok(RenameOutcome::Unchanged { course });
        }
        if self.registry.name_taken(new_name, Some(id)) {
            return Err(AppError::DuplicateName(format!(
                "A course named \"{}\" already exists",
                new_name
            )));
        }

        let old_name = course.name.clone();
        let proposed = Course {
            name: new_name.to_string(),
            ..course
        };
        let tentative = self
            .registry
            .projection()
            .apply_tentative(proposed.clone())
            .ok_or_else(|| AppError::NotFound(format!("Course {} not found", id)))?;

        let written = match self.mode {
            CascadeMode::Atomic => self.rename_atomic(id, &old_name, new_name).await,
            CascadeMode::TwoPhase => self.rename_two_phase(id, &old_name, new_name).await,
        };

        match written {
            Ok(students_updated) => {
                self.registry.projection().commit(&tentative);
                tracing::info!(
                    "Renamed course {} to {} ({} students)",
                    old_name,
                    new_name,
                    students_updated
                );
                Ok(RenameOutcome::Renamed {
                    course: proposed,
                    students_updated,
                })
            }
            Err(e) => {
                tracing::warn!("Rename of course {} failed, reverting: {}", old_name, e);
                self.registry.projection().revert(tentative);
                Err(e.into_remote_write("Failed to rename course"))
            }
        }
    }

    async fn rename_atomic(
        &self,
        id: &str,
        old_name: &str,
        new_name: &str,
    ) -> Result<usize, AppError> {
        let students = self.students_of(old_name).await?;

        let mut ops = Vec::with_capacity(students.len() + 1);
        ops.push(BatchOp::update(Course::COLLECTION, id, single_field("name", new_name)));
        ops.extend(students.iter().map(|student| {
            BatchOp::update(Student::COLLECTION, &student.id, single_field("course", new_name))
        }));

        self.store.batch_write(ops).await?;
        Ok(students.len())
    }

    async fn rename_two_phase(
        &self,
        id: &str,
        old_name: &str,
        new_name: &str,
    ) -> Result<usize, AppError> {
        self.store
            .update(Course::COLLECTION, id, single_field("name", new_name))
            .await?;

        // Students still on the old name stay there if this half fails
        let students = self.students_of(old_name).await?;
        if !students.is_empty() {
            let ops = students
                .iter()
                .map(|student| {
                    BatchOp::update(
                        Student::COLLECTION,
                        &student.id,
                        single_field("course", new_name),
                    )
                })
                .collect();
            self.store.batch_write(ops).await?;
        }
        Ok(students.len())
    }

    /// Delete a course by name together with its students.
    pub async fn delete_course(&self, name: &str) -> Result<DeleteOutcome, AppError> {
        let course = self
            .registry
            .find_by_name(name)
            .ok_or_else(|| AppError::NotFound(format!("Course \"{}\" not found", name)))?;

        let students_removed = match self.mode {
            CascadeMode::Atomic => self.delete_atomic(&course).await?,
            CascadeMode::TwoPhase => self.delete_two_phase(&course).await?,
        };

        tracing::info!(
            "Deleted course {} and {} students",
            course.name,
            students_removed
        );
        Ok(DeleteOutcome {
            course,
            students_removed,
        })
    }

    async fn delete_atomic(&self, course: &Course) -> Result<usize, AppError> {
        let written = async {
            let students = self.students_of(&course.name).await?;

            let mut ops = Vec::with_capacity(students.len() + 1);
            ops.push(BatchOp::delete(Course::COLLECTION, &course.id));
            ops.extend(
                students
                    .iter()
                    .map(|student| BatchOp::delete(Student::COLLECTION, &student.id)),
            );

            self.store.batch_write(ops).await?;
            Ok::<usize, AppError>(students.len())
        }
        .await;

        written.map_err(|e| e.into_remote_write("Failed to delete course"))
    }

    async fn delete_two_phase(&self, course: &Course) -> Result<usize, AppError> {
        self.store
            .delete(Course::COLLECTION, &course.id)
            .await
            .map_err(|e| e.into_remote_write("Failed to delete course"))?;

        let removed = async {
            let students = self.students_of(&course.name).await?;
            if !students.is_empty() {
                let ops = students
                    .iter()
                    .map(|student| BatchOp::delete(Student::COLLECTION, &student.id))
                    .collect();
                self.store.batch_write(ops).await?;
            }
            Ok::<usize, AppError>(students.len())
        }
        .await;

        removed.map_err(|e| {
            tracing::warn!(
                "Course {} deleted but its students could not be removed: {}",
                course.name,
                e
            );
            e.into_remote_write(&format!(
                "Course \"{}\" deleted, its students were left behind",
                course.name
            ))
        })
    }
}
