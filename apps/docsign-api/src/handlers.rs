//! HTTP handlers for DocSign API

use axum::{
    async_trait,
    extract::{FromRequestParts, Path, State},
    http::request::Parts,
    Json,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::Utc;
use sha2::{Digest, Sha256};
use shared_types::{
    all_signed, awaiting_turn, may_sign, Envelope, EnvelopeStatus, Recipient, RecipientStatus,
    SigningMode,
};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use docsign_core::{CompletionJob, CompletionReport};

use crate::email::invite_email;
use crate::error::ApiError;
use crate::models::*;
use crate::state::AppState;
use crate::store;

pub const OWNER_HEADER: &str = "x-owner-id";

/// Owner identity, as asserted by the upstream auth layer
#[derive(Debug, Clone)]
pub struct OwnerId(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for OwnerId
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(OWNER_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| OwnerId(v.to_string()))
            .ok_or(ApiError::Unauthorized)
    }
}

/// Health check endpoint
pub async fn health() -> &'static str {
    "OK"
}

// ============================================================
// Owner endpoints
// ============================================================

pub async fn list_envelopes(
    State(state): State<Arc<AppState>>,
    OwnerId(owner): OwnerId,
) -> Result<Json<Vec<Envelope>>, ApiError> {
    Ok(Json(store::list_envelopes(&state.db, &owner).await?))
}

pub async fn create_envelope(
    State(state): State<Arc<AppState>>,
    OwnerId(owner): OwnerId,
    Json(req): Json<CreateEnvelopeRequest>,
) -> Result<Json<Envelope>, ApiError> {
    let title = req.title.trim();
    if title.is_empty() {
        return Err(ApiError::bad_request("title is required"));
    }

    let now = Utc::now();
    let envelope = Envelope {
        id: Uuid::new_v4().to_string(),
        owner_id: owner,
        owner_name: req.owner_name.trim().to_string(),
        owner_email: normalize_email(&req.owner_email),
        title: title.to_string(),
        status: EnvelopeStatus::Draft,
        signing_mode: req.signing_mode.unwrap_or_default(),
        pdf_url: None,
        pdf_key: None,
        pdf_sha256: None,
        page_count: 1,
        signed_pdf_url: None,
        signed_pdf_key: None,
        created_at: now,
        updated_at: now,
    };
    store::insert_envelope(&state.db, &envelope).await?;

    info!(envelope_id = %envelope.id, mode = %envelope.signing_mode.as_str(), "created envelope");
    Ok(Json(envelope))
}

pub async fn get_envelope(
    State(state): State<Arc<AppState>>,
    OwnerId(owner): OwnerId,
    Path(id): Path<String>,
) -> Result<Json<EnvelopeDetail>, ApiError> {
    let envelope = store::owned_envelope(&state.db, &id, &owner).await?;
    let recipients = store::list_recipients(&state.db, &id).await?;
    let fields = store::list_fields(&state.db, &id).await?;
    Ok(Json(EnvelopeDetail {
        envelope,
        recipients,
        fields,
    }))
}

pub async fn patch_envelope(
    State(state): State<Arc<AppState>>,
    OwnerId(owner): OwnerId,
    Path(id): Path<String>,
    Json(req): Json<UpdateEnvelopeRequest>,
) -> Result<Json<Envelope>, ApiError> {
    let envelope = store::owned_envelope(&state.db, &id, &owner).await?;

    let title = req
        .title
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or(envelope.title.as_str())
        .to_string();
    let page_count = req
        .page_count
        .and_then(|n| u32::try_from(n).ok())
        .filter(|n| *n > 0)
        .unwrap_or(envelope.page_count);

    store::update_envelope_meta(&state.db, &id, &title, page_count).await?;
    let updated = store::owned_envelope(&state.db, &id, &owner).await?;
    Ok(Json(updated))
}

pub async fn delete_envelope(
    State(state): State<Arc<AppState>>,
    OwnerId(owner): OwnerId,
    Path(id): Path<String>,
) -> Result<Json<OkResponse>, ApiError> {
    let envelope = store::owned_envelope(&state.db, &id, &owner).await?;
    if envelope.status != EnvelopeStatus::Draft {
        return Err(ApiError::bad_request("Only draft envelopes can be deleted"));
    }
    store::delete_envelope(&state.db, &id).await?;
    info!(envelope_id = %id, "deleted envelope");
    Ok(Json(OkResponse { ok: true }))
}

pub async fn upload_pdf(
    State(state): State<Arc<AppState>>,
    OwnerId(owner): OwnerId,
    Path(id): Path<String>,
    Json(req): Json<UploadRequest>,
) -> Result<Json<UploadResponse>, ApiError> {
    let envelope = store::owned_envelope(&state.db, &id, &owner).await?;

    let pdf_data = BASE64
        .decode(req.pdf_base64.trim())
        .map_err(|e| ApiError::bad_request(format!("Invalid PDF base64: {}", e)))?;
    if pdf_data.len() > state.config.max_upload_bytes {
        return Err(ApiError::PayloadTooLarge(format!(
            "PDF is {} bytes, limit is {}",
            pdf_data.len(),
            state.config.max_upload_bytes
        )));
    }

    let page_count = docsign_core::page_count(&pdf_data)
        .map_err(|e| ApiError::bad_request(format!("Not a readable PDF: {}", e)))?;
    if let Some(declared) = req.page_count {
        if declared != i64::from(page_count) {
            warn!(
                envelope_id = %id,
                declared,
                decoded = page_count,
                "declared page count differs from document, using decoded count"
            );
        }
    }

    let pdf_sha256 = hex::encode(Sha256::digest(&pdf_data));
    let key = format!("envelopes/{}/{}.pdf", envelope.id, Utc::now().timestamp_millis());
    let stored = state
        .blobs
        .write(&key, &pdf_data)
        .await
        .map_err(|e| ApiError::Internal(e.into()))?;

    store::set_source(&state.db, &id, &stored.url, &stored.key, &pdf_sha256, page_count).await?;
    info!(envelope_id = %id, size = pdf_data.len(), page_count, "uploaded source document");

    Ok(Json(UploadResponse {
        pdf_url: stored.url,
        pdf_key: stored.key,
        pdf_sha256,
        page_count,
    }))
}

pub async fn put_recipients(
    State(state): State<Arc<AppState>>,
    OwnerId(owner): OwnerId,
    Path(id): Path<String>,
    Json(inputs): Json<Vec<RecipientInput>>,
) -> Result<Json<Vec<Recipient>>, ApiError> {
    store::owned_envelope(&state.db, &id, &owner).await?;

    let mut recipients = Vec::with_capacity(inputs.len());
    for (index, input) in inputs.into_iter().enumerate() {
        let name = input.name.trim();
        let email = normalize_email(&input.email);
        if name.is_empty() || email.is_empty() {
            return Err(ApiError::bad_request(format!(
                "recipient {} needs a name and an email",
                index + 1
            )));
        }
        recipients.push(Recipient {
            id: Uuid::new_v4().to_string(),
            envelope_id: id.clone(),
            name: name.to_string(),
            email,
            order: input.order.unwrap_or(index as i64),
            token: Uuid::new_v4().to_string(),
            status: RecipientStatus::Pending,
            signed_at: None,
        });
    }

    store::replace_recipients(&state.db, &id, &recipients).await?;
    info!(envelope_id = %id, count = recipients.len(), "replaced recipients");
    Ok(Json(store::list_recipients(&state.db, &id).await?))
}

pub async fn put_fields(
    State(state): State<Arc<AppState>>,
    OwnerId(owner): OwnerId,
    Path(id): Path<String>,
    Json(inputs): Json<Vec<FieldInput>>,
) -> Result<Json<Vec<shared_types::Field>>, ApiError> {
    store::owned_envelope(&state.db, &id, &owner).await?;
    let recipients = store::list_recipients(&state.db, &id).await?;
    let known: HashSet<&str> = recipients.iter().map(|r| r.id.as_str()).collect();

    let mut fields = Vec::with_capacity(inputs.len());
    for input in inputs {
        if !known.contains(input.recipient_id.as_str()) {
            return Err(ApiError::bad_request(format!(
                "unknown recipient: {}",
                input.recipient_id
            )));
        }
        fields.push(input.into_field(Uuid::new_v4().to_string())?);
    }

    store::replace_fields(&state.db, &id, &fields).await?;
    info!(envelope_id = %id, count = fields.len(), "replaced fields");
    Ok(Json(store::list_fields(&state.db, &id).await?))
}

/// Mail each recipient whose turn it is, collecting failures
async fn invite(state: &AppState, envelope: &Envelope, to: &[&Recipient]) -> Vec<EmailFailure> {
    let mut failures = Vec::new();
    for recipient in to {
        let email = invite_email(
            &recipient.name,
            &recipient.email,
            &envelope.title,
            &state.config.signing_url(&recipient.token),
        );
        if let Err(e) = state.mailer.send(&email).await {
            warn!(envelope_id = %envelope.id, recipient_id = %recipient.id, error = %e, "invite failed");
            failures.push(EmailFailure {
                email: recipient.email.clone(),
                error: e.to_string(),
            });
        }
    }
    failures
}

pub async fn send_envelope(
    State(state): State<Arc<AppState>>,
    OwnerId(owner): OwnerId,
    Path(id): Path<String>,
) -> Result<Json<SendResponse>, ApiError> {
    let envelope = store::owned_envelope(&state.db, &id, &owner).await?;
    if envelope.status == EnvelopeStatus::Completed {
        return Err(ApiError::bad_request("Envelope is already completed"));
    }
    if envelope.pdf_url.is_none() {
        return Err(ApiError::bad_request("Upload a PDF before sending"));
    }
    let recipients = store::list_recipients(&state.db, &id).await?;
    if recipients.is_empty() {
        return Err(ApiError::bad_request("Add at least one recipient"));
    }

    let to_invite = awaiting_turn(envelope.signing_mode, &recipients);
    let email_errors = invite(&state, &envelope, &to_invite).await;
    store::set_status(&state.db, &id, EnvelopeStatus::Sent).await?;

    info!(
        envelope_id = %id,
        invited = to_invite.len(),
        failed = email_errors.len(),
        "sent envelope"
    );
    Ok(Json(SendResponse {
        ok: true,
        status: EnvelopeStatus::Sent,
        recipient_count: recipients.len(),
        email_errors,
    }))
}

pub async fn signing_links(
    State(state): State<Arc<AppState>>,
    OwnerId(owner): OwnerId,
    Path(id): Path<String>,
) -> Result<Json<LinksResponse>, ApiError> {
    let envelope = store::owned_envelope(&state.db, &id, &owner).await?;
    if envelope.status == EnvelopeStatus::Draft {
        return Err(ApiError::bad_request("Envelope has not been sent"));
    }
    let links = store::list_recipients(&state.db, &id)
        .await?
        .into_iter()
        .map(|r| SigningLink {
            signing_url: state.config.signing_url(&r.token),
            recipient_id: r.id,
            name: r.name,
            email: r.email,
            status: r.status,
        })
        .collect();
    Ok(Json(LinksResponse { links }))
}

pub async fn download(
    State(state): State<Arc<AppState>>,
    OwnerId(owner): OwnerId,
    Path(id): Path<String>,
) -> Result<Json<DownloadResponse>, ApiError> {
    let envelope = store::owned_envelope(&state.db, &id, &owner).await?;
    if envelope.status != EnvelopeStatus::Completed {
        return Err(ApiError::bad_request("Envelope is not completed"));
    }
    let signed_pdf_url = envelope
        .signed_pdf_url
        .ok_or_else(|| ApiError::NotFound("Signed PDF not available".to_string()))?;
    Ok(Json(DownloadResponse { signed_pdf_url }))
}

// ============================================================
// Signer endpoints
// ============================================================

/// Recipient behind a token, with their envelope
async fn signing_context(
    state: &AppState,
    token: &str,
) -> Result<(Recipient, Envelope), ApiError> {
    let recipient = store::recipient_by_token(&state.db, token)
        .await?
        .ok_or_else(|| ApiError::NotFound("Invalid signing link".to_string()))?;
    let envelope = store::find_envelope(&state.db, &recipient.envelope_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Envelope not found".to_string()))?;
    if !envelope.status.is_signable() {
        return Err(ApiError::bad_request("Envelope has not been sent"));
    }
    Ok((recipient, envelope))
}

pub async fn get_signing_view(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Result<Json<SigningView>, ApiError> {
    let (recipient, envelope) = signing_context(&state, &token).await?;
    let fields = store::list_fields(&state.db, &envelope.id)
        .await?
        .into_iter()
        .filter(|f| f.recipient_id == recipient.id)
        .collect();

    Ok(Json(SigningView {
        envelope: EnvelopeSummary {
            id: envelope.id,
            title: envelope.title,
            pdf_url: envelope.pdf_url,
            page_count: envelope.page_count,
            signing_mode: envelope.signing_mode,
        },
        recipient: RecipientSummary {
            id: recipient.id,
            name: recipient.name,
            email: recipient.email,
            status: recipient.status,
        },
        fields,
    }))
}

pub async fn submit_signature(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
    Json(req): Json<SubmitRequest>,
) -> Result<Json<SubmitResponse>, ApiError> {
    let (recipient, envelope) = signing_context(&state, &token).await?;
    if recipient.is_signed() {
        return Err(ApiError::bad_request("Already signed"));
    }
    let recipients = store::list_recipients(&state.db, &envelope.id).await?;
    if !may_sign(envelope.signing_mode, &recipients, &recipient.id) {
        return Err(ApiError::Conflict(
            "Waiting for earlier recipients to sign".to_string(),
        ));
    }

    let values: Vec<(String, Option<String>)> = req
        .values
        .into_iter()
        .map(|v| (v.field_id, v.value))
        .collect();
    let updated =
        store::sign_with_values(&state.db, &envelope.id, &recipient.id, &values, Utc::now())
            .await?
            .ok_or_else(|| ApiError::bad_request("Already signed"))?;
    info!(
        envelope_id = %envelope.id,
        recipient_id = %recipient.id,
        updated_fields = updated,
        "recipient signed"
    );

    let recipients = store::list_recipients(&state.db, &envelope.id).await?;
    let done = all_signed(&recipients);
    if done {
        complete(&state, &envelope.id, recipients).await?;
    } else if envelope.signing_mode == SigningMode::Sequential {
        let next = awaiting_turn(SigningMode::Sequential, &recipients);
        let failures = invite(&state, &envelope, &next).await;
        if !failures.is_empty() {
            warn!(envelope_id = %envelope.id, failed = failures.len(), "could not invite next signer");
        }
    }

    Ok(Json(SubmitResponse {
        ok: true,
        all_signed: done,
    }))
}

/// Mark the envelope completed, then render and distribute the signed PDF
async fn complete(
    state: &AppState,
    envelope_id: &str,
    recipients: Vec<Recipient>,
) -> Result<(), ApiError> {
    store::set_status(&state.db, envelope_id, EnvelopeStatus::Completed).await?;
    let envelope = store::find_envelope(&state.db, envelope_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Envelope not found".to_string()))?;
    let fields = store::list_fields(&state.db, envelope_id).await?;

    let report = state
        .completion
        .finalize(CompletionJob {
            envelope,
            recipients,
            fields,
        })
        .await;
    match report {
        CompletionReport::Finished(summary) => {
            if let Some(blob) = summary.signed_pdf {
                store::set_signed_pdf(&state.db, envelope_id, &blob.url, &blob.key).await?;
            }
            if let Some(error) = summary.artifact_error {
                warn!(envelope_id, error = %error, "completed without a signed PDF");
            }
        }
        CompletionReport::AlreadyRunning | CompletionReport::NotReady => {}
    }
    Ok(())
}
