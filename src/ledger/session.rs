//! View session: which course tab is active and what the editor is doing.

use serde::{Deserialize, Serialize};

use crate::models::Course;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "camelCase")]
pub enum EditorMode {
    #[default]
    Idle,
    #[serde(rename_all = "camelCase")]
    Editing { student_id: String },
    AddingCourse,
}

/// Editor transitions a client can request.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum EditorAction {
    #[serde(rename_all = "camelCase")]
    Edit { student_id: String },
    AddCourse,
    Close,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub editor: EditorMode,
    pub active_course: Option<String>,
}

impl Session {
    pub fn apply(&mut self, action: EditorAction) {
        match action {
            EditorAction::Edit { student_id } => self.start_editing(&student_id),
            EditorAction::AddCourse => self.start_adding_course(),
            EditorAction::Close => self.close_editor(),
        }
    }

    pub fn start_editing(&mut self, student_id: &str) {
        self.editor = EditorMode::Editing {
            student_id: student_id.to_string(),
        };
    }

    pub fn start_adding_course(&mut self) {
        self.editor = EditorMode::AddingCourse;
    }

    pub fn close_editor(&mut self) {
        self.editor = EditorMode::Idle;
    }

    pub fn select_course(&mut self, name: &str) {
        self.active_course = Some(name.to_string());
    }

    /// The tab follows the saved student's course and the editor closes.
    pub fn student_saved(&mut self, course: &str) {
        self.select_course(course);
        self.close_editor();
    }

    pub fn student_removed(&mut self, student_id: &str) {
        if matches!(&self.editor, EditorMode::Editing { student_id: id } if id == student_id) {
            self.close_editor();
        }
    }

    pub fn course_created(&mut self, name: &str) {
        self.select_course(name);
        if self.editor == EditorMode::AddingCourse {
            self.close_editor();
        }
    }

    pub fn course_renamed(&mut self, old_name: &str, new_name: &str) {
        if self.active_course.as_deref() == Some(old_name) {
            self.select_course(new_name);
        }
    }

    /// `remaining` is the registry after the delete, in display order.
    pub fn course_deleted(&mut self, name: &str, remaining: &[Course]) {
        if self.active_course.as_deref() == Some(name) {
            self.active_course = remaining.first().map(|course| course.name.clone());
        }
    }

    /// Select the first course when nothing (or a vanished course) is active.
    pub fn ensure_active(&mut self, courses: &[Course]) {
        let still_live = self
            .active_course
            .as_deref()
            .is_some_and(|active| courses.iter().any(|course| course.name == active));
        if !still_live {
            self.active_course = courses.first().map(|course| course.name.clone());
        }
    }
}
