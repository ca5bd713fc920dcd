//! Data models for DocSign API

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared_types::{
    Envelope, EnvelopeStatus, Field, FieldType, ParseError, Recipient, RecipientStatus,
    SigningMode,
};
use sqlx::FromRow;

use crate::error::ApiError;

// ============================================================
// Database rows
// ============================================================

#[derive(Debug, Clone, FromRow)]
pub struct EnvelopeRow {
    pub id: String,
    pub owner_id: String,
    pub owner_name: String,
    pub owner_email: String,
    pub title: String,
    pub status: String,
    pub signing_mode: String,
    pub pdf_url: Option<String>,
    pub pdf_key: Option<String>,
    pub pdf_sha256: Option<String>,
    pub page_count: u32,
    pub signed_pdf_url: Option<String>,
    pub signed_pdf_key: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<EnvelopeRow> for Envelope {
    type Error = ParseError;

    fn try_from(row: EnvelopeRow) -> Result<Self, Self::Error> {
        Ok(Envelope {
            status: row.status.parse::<EnvelopeStatus>()?,
            signing_mode: row.signing_mode.parse::<SigningMode>()?,
            id: row.id,
            owner_id: row.owner_id,
            owner_name: row.owner_name,
            owner_email: row.owner_email,
            title: row.title,
            pdf_url: row.pdf_url,
            pdf_key: row.pdf_key,
            pdf_sha256: row.pdf_sha256,
            page_count: row.page_count,
            signed_pdf_url: row.signed_pdf_url,
            signed_pdf_key: row.signed_pdf_key,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct RecipientRow {
    pub id: String,
    pub envelope_id: String,
    pub name: String,
    pub email: String,
    pub sort_order: i64,
    pub token: String,
    pub status: String,
    pub signed_at: Option<DateTime<Utc>>,
}

impl TryFrom<RecipientRow> for Recipient {
    type Error = ParseError;

    fn try_from(row: RecipientRow) -> Result<Self, Self::Error> {
        Ok(Recipient {
            status: row.status.parse::<RecipientStatus>()?,
            id: row.id,
            envelope_id: row.envelope_id,
            name: row.name,
            email: row.email,
            order: row.sort_order,
            token: row.token,
            signed_at: row.signed_at,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct FieldRow {
    pub id: String,
    pub envelope_id: String,
    pub recipient_id: String,
    pub page: u32,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub field_type: String,
    pub required: bool,
    pub value: Option<String>,
}

impl TryFrom<FieldRow> for Field {
    type Error = ParseError;

    fn try_from(row: FieldRow) -> Result<Self, Self::Error> {
        Ok(Field {
            field_type: row.field_type.parse::<FieldType>()?,
            id: row.id,
            recipient_id: row.recipient_id,
            page: row.page,
            x: row.x,
            y: row.y,
            width: row.width,
            height: row.height,
            required: row.required,
            value: row.value,
        })
    }
}

// ============================================================
// Owner requests
// ============================================================

#[derive(Debug, Clone, Deserialize)]
pub struct CreateEnvelopeRequest {
    pub title: String,
    #[serde(default)]
    pub owner_name: String,
    #[serde(default)]
    pub owner_email: String,
    #[serde(default)]
    pub signing_mode: Option<SigningMode>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateEnvelopeRequest {
    pub title: Option<String>,
    pub page_count: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadRequest {
    pub pdf_base64: String,
    /// Page count as reported by the client's renderer
    pub page_count: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResponse {
    pub pdf_url: String,
    pub pdf_key: String,
    pub pdf_sha256: String,
    pub page_count: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecipientInput {
    pub name: String,
    pub email: String,
    pub order: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FieldInput {
    pub recipient_id: String,
    pub page: i64,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    #[serde(rename = "type")]
    pub field_type: String,
    pub required: Option<bool>,
}

impl FieldInput {
    /// Check the parts the placement UI can get wrong and build the field.
    /// Geometry is stored as given.
    pub fn into_field(self, id: String) -> Result<Field, ApiError> {
        let field_type = self
            .field_type
            .parse::<FieldType>()
            .map_err(|e| ApiError::bad_request(e.to_string()))?;
        let page = u32::try_from(self.page)
            .ok()
            .filter(|p| *p >= 1)
            .ok_or_else(|| ApiError::bad_request(format!("invalid page: {}", self.page)))?;
        if ![self.x, self.y, self.width, self.height]
            .iter()
            .all(|v| v.is_finite())
        {
            return Err(ApiError::bad_request("field geometry must be finite"));
        }
        Ok(Field {
            id,
            recipient_id: self.recipient_id,
            page,
            x: self.x,
            y: self.y,
            width: self.width,
            height: self.height,
            field_type,
            required: self.required.unwrap_or(true),
            value: None,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvelopeDetail {
    pub envelope: Envelope,
    pub recipients: Vec<Recipient>,
    pub fields: Vec<Field>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailFailure {
    pub email: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendResponse {
    pub ok: bool,
    pub status: EnvelopeStatus,
    pub recipient_count: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub email_errors: Vec<EmailFailure>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SigningLink {
    pub recipient_id: String,
    pub name: String,
    pub email: String,
    pub status: RecipientStatus,
    pub signing_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinksResponse {
    pub links: Vec<SigningLink>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadResponse {
    pub signed_pdf_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OkResponse {
    pub ok: bool,
}

// ============================================================
// Signer requests
// ============================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvelopeSummary {
    pub id: String,
    pub title: String,
    pub pdf_url: Option<String>,
    pub page_count: u32,
    pub signing_mode: SigningMode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipientSummary {
    pub id: String,
    pub name: String,
    pub email: String,
    pub status: RecipientStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SigningView {
    pub envelope: EnvelopeSummary,
    pub recipient: RecipientSummary,
    pub fields: Vec<Field>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FieldValue {
    pub field_id: String,
    pub value: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubmitRequest {
    pub values: Vec<FieldValue>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub ok: bool,
    pub all_signed: bool,
}

/// Trimmed, lowercased address
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
