//! Student ledger entry model and its field validation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;

pub const MIN_NAME_CHARS: usize = 2;
pub const MAX_OBSERVATION_CHARS: usize = 500;
pub const MAX_QR_BYTES: usize = 5 * 1024 * 1024;
pub const QR_MIME_TYPES: [&str; 4] = ["image/jpeg", "image/jpg", "image/png", "image/webp"];

/// One enrollment record with payment state, tied to a course by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub name: String,
    pub phone: String,
    pub total: f64,
    #[serde(default)]
    pub on_account: f64,
    /// Always `total - on_account`, recomputed on write
    pub balance: f64,
    pub course: String,
    #[serde(default)]
    pub observations: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qr_payment_file_name: Option<String>,
    #[serde(default)]
    pub has_video: bool,
    #[serde(with = "chrono::serde::ts_microseconds")]
    pub created_at: DateTime<Utc>,
}

/// Payment-proof image attached to a create or update request.
///
/// Only the file name is persisted; the data URI is forwarded to the relay.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QrPaymentUpload {
    pub file_name: String,
    pub data_uri: String,
}

/// Request body for enrolling a student.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateStudentRequest {
    pub name: String,
    pub phone: String,
    pub total: f64,
    #[serde(default)]
    pub on_account: f64,
    pub course: String,
    #[serde(default)]
    pub observations: String,
    #[serde(default)]
    pub qr_payment: Option<QrPaymentUpload>,
    #[serde(default)]
    pub has_video: bool,
}

/// Request body for editing a student. Absent fields keep their value.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStudentRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub total: Option<f64>,
    #[serde(default)]
    pub on_account: Option<f64>,
    #[serde(default)]
    pub course: Option<String>,
    #[serde(default)]
    pub observations: Option<String>,
    #[serde(default)]
    pub qr_payment: Option<QrPaymentUpload>,
    #[serde(default)]
    pub has_video: Option<bool>,
}

pub fn balance(total: f64, on_account: f64) -> f64 {
    total - on_account
}

pub fn validate_name(name: &str) -> Result<(), AppError> {
    if name.trim().chars().count() < MIN_NAME_CHARS {
        return Err(AppError::Validation(format!(
            "Name must have at least {} characters",
            MIN_NAME_CHARS
        )));
    }
    Ok(())
}

/// Optional leading `+`, then 7 to 15 digits, spaces or hyphens.
pub fn validate_phone(phone: &str) -> Result<(), AppError> {
    let body = phone.strip_prefix('+').unwrap_or(phone);
    let length = body.chars().count();
    let allowed = body
        .chars()
        .all(|c| c.is_ascii_digit() || c == ' ' || c == '-');

    if !allowed || !(7..=15).contains(&length) {
        return Err(AppError::Validation(format!("Invalid phone number: {}", phone)));
    }
    Ok(())
}

pub fn validate_amounts(total: f64, on_account: f64) -> Result<(), AppError> {
    if !total.is_finite() {
        return Err(AppError::Validation("Total must be a number".to_string()));
    }
    if !on_account.is_finite() || on_account < 0.0 {
        return Err(AppError::Validation(
            "Amount on account must be zero or positive".to_string(),
        ));
    }
    Ok(())
}

pub fn validate_observations(observations: &str) -> Result<(), AppError> {
    if observations.chars().count() > MAX_OBSERVATION_CHARS {
        return Err(AppError::Validation(format!(
            "Observations cannot exceed {} characters",
            MAX_OBSERVATION_CHARS
        )));
    }
    Ok(())
}

/// Check the MIME type and estimated decoded size of an uploaded image.
pub fn validate_qr_payment(upload: &QrPaymentUpload) -> Result<(), AppError> {
    let invalid = || AppError::Validation("QR payment must be an image data URI".to_string());

    let rest = upload.data_uri.strip_prefix("data:").ok_or_else(invalid)?;
    let (header, payload) = rest.split_once(',').ok_or_else(invalid)?;
    let mime = header.split(';').next().unwrap_or_default().to_ascii_lowercase();

    if !QR_MIME_TYPES.contains(&mime.as_str()) {
        return Err(AppError::Validation(format!(
            "Unsupported QR payment image type: {}",
            mime
        )));
    }

    let estimated_bytes = payload.len() * 3 / 4;
    if estimated_bytes > MAX_QR_BYTES {
        return Err(AppError::Validation(
            "QR payment image cannot exceed 5MB".to_string(),
        ));
    }
    Ok(())
}

impl CreateStudentRequest {
    /// Field checks that need no store access.
    pub fn validate(&self) -> Result<(), AppError> {
        validate_name(&self.name)?;
        validate_phone(self.phone.trim())?;
        validate_amounts(self.total, self.on_account)?;
        if self.course.trim().is_empty() {
            return Err(AppError::Validation("Course is required".to_string()));
        }
        validate_observations(&self.observations)?;
        if let Some(upload) = &self.qr_payment {
            validate_qr_payment(upload)?;
        }
        Ok(())
    }
}
