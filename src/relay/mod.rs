//! Notification relay to the external automation webhook.
//!
//! Deliveries are best effort. Callers decide whether a failure matters:
//! student create/update log and continue, enrollment finalization aggregates.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client};
use serde::Serialize;

use crate::errors::AppError;
use crate::models::{QrPaymentUpload, Student};

/// Outbound side of the ledger: one call per student event.
#[async_trait]
pub trait NotificationRelay: Send + Sync {
    /// POST the student as a JSON object.
    async fn send_structured(&self, payload: &StudentPayload) -> Result<(), AppError>;

    /// POST the student as one slash-separated line of text.
    async fn send_flattened(&self, record: &FlattenedRecord) -> Result<(), AppError>;
}

/// Structured-mode body sent after a student is created or updated.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentPayload {
    pub id: String,
    pub name: String,
    pub phone: String,
    pub on_account: f64,
    pub balance: f64,
    pub total: f64,
    pub course: String,
    pub observations: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qr_payment_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qr_payment_file_name: Option<String>,
    pub has_video: bool,
}

impl StudentPayload {
    /// The upload's data URI rides along only when the request carried one.
    pub fn new(student: &Student, upload: Option<&QrPaymentUpload>) -> Self {
        Self {
            id: student.id.clone(),
            name: student.name.clone(),
            phone: student.phone.clone(),
            on_account: student.on_account,
            balance: student.balance,
            total: student.total,
            course: student.course.clone(),
            observations: student.observations.clone(),
            qr_payment_url: upload.map(|u| u.data_uri.clone()),
            qr_payment_file_name: student.qr_payment_file_name.clone(),
            has_video: student.has_video,
        }
    }
}

/// Flattened-mode record sent when enrollment for a course is finished.
#[derive(Debug, Clone, PartialEq)]
pub struct FlattenedRecord {
    pub date: String,
    pub name: String,
    pub phone: String,
    pub course: String,
    pub on_account: f64,
    pub balance: f64,
    pub total: f64,
    pub qr_payment: String,
    pub observations: String,
    pub video: String,
}

impl FlattenedRecord {
    pub fn new(student: &Student, date: &str) -> Self {
        let qr_payment = student
            .qr_payment_file_name
            .clone()
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| "No".to_string());
        let observations = if student.observations.is_empty() {
            "Ninguna".to_string()
        } else {
            student.observations.clone()
        };
        let video = if student.has_video { "Sí" } else { "No" };

        Self {
            date: date.to_string(),
            name: student.name.clone(),
            phone: student.phone.clone(),
            course: student.course.clone(),
            on_account: student.on_account,
            balance: student.balance,
            total: student.total,
            qr_payment,
            observations,
            video: video.to_string(),
        }
    }

    /// `date/name/phone/course/onAccount/balance/total/qrPayment/observations/video`
    pub fn to_line(&self) -> String {
        [
            self.date.clone(),
            self.name.clone(),
            self.phone.clone(),
            self.course.clone(),
            self.on_account.to_string(),
            self.balance.to_string(),
            self.total.to_string(),
            self.qr_payment.clone(),
            self.observations.clone(),
            self.video.clone(),
        ]
        .join("/")
    }
}

/// Relay that POSTs to a configured webhook endpoint.
pub struct WebhookRelay {
    client: Client,
    endpoint: Option<String>,
}

impl WebhookRelay {
    pub fn new(endpoint: Option<String>, timeout: Duration) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build http client: {}", e)))?;
        Ok(Self { client, endpoint })
    }

    pub fn is_enabled(&self) -> bool {
        self.endpoint.is_some()
    }

    fn endpoint(&self, mode: &str) -> Option<&str> {
        if self.endpoint.is_none() {
            tracing::info!("Webhook endpoint not configured, skipping {} delivery", mode);
        }
        self.endpoint.as_deref()
    }

    async fn check(response: reqwest::Response) -> Result<(), AppError> {
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(AppError::Relay(format!(
            "Webhook responded {}: {}",
            status, body
        )))
    }
}

#[async_trait]
impl NotificationRelay for WebhookRelay {
    async fn send_structured(&self, payload: &StudentPayload) -> Result<(), AppError> {
        let Some(url) = self.endpoint("structured") else {
            return Ok(());
        };

        let response = self.client.post(url).json(payload).send().await?;
        Self::check(response).await?;

        tracing::debug!("Relayed student {} to webhook", payload.id);
        Ok(())
    }

    async fn send_flattened(&self, record: &FlattenedRecord) -> Result<(), AppError> {
        let Some(url) = self.endpoint("flattened") else {
            return Ok(());
        };

        let response = self
            .client
            .post(url)
            .header(header::CONTENT_TYPE, "text/plain")
            .body(record.to_line())
            .send()
            .await?;
        Self::check(response).await?;

        tracing::debug!("Relayed enrollment of {} to webhook", record.name);
        Ok(())
    }
}
