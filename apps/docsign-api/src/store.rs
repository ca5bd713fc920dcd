//! SQLite queries for envelopes, recipients and fields

use chrono::{DateTime, Utc};
use shared_types::{Envelope, EnvelopeStatus, Field, Recipient, RecipientStatus};
use sqlx::SqlitePool;

use crate::error::ApiError;
use crate::models::{EnvelopeRow, FieldRow, RecipientRow};

const ENVELOPE_COLUMNS: &str = "id, owner_id, owner_name, owner_email, title, status, signing_mode, \
     pdf_url, pdf_key, pdf_sha256, page_count, signed_pdf_url, signed_pdf_key, created_at, updated_at";

const RECIPIENT_COLUMNS: &str =
    "id, envelope_id, name, email, sort_order, token, status, signed_at";

const FIELD_COLUMNS: &str =
    "id, envelope_id, recipient_id, page, x, y, width, height, field_type, required, value";

pub async fn insert_envelope(db: &SqlitePool, envelope: &Envelope) -> Result<(), ApiError> {
    sqlx::query(
        r#"
        INSERT INTO envelopes (id, owner_id, owner_name, owner_email, title, status, signing_mode,
                               page_count, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&envelope.id)
    .bind(&envelope.owner_id)
    .bind(&envelope.owner_name)
    .bind(&envelope.owner_email)
    .bind(&envelope.title)
    .bind(envelope.status.as_str())
    .bind(envelope.signing_mode.as_str())
    .bind(envelope.page_count)
    .bind(envelope.created_at.to_rfc3339())
    .bind(envelope.updated_at.to_rfc3339())
    .execute(db)
    .await?;
    Ok(())
}

pub async fn list_envelopes(db: &SqlitePool, owner_id: &str) -> Result<Vec<Envelope>, ApiError> {
    let rows: Vec<EnvelopeRow> = sqlx::query_as(&format!(
        "SELECT {} FROM envelopes WHERE owner_id = ? ORDER BY created_at DESC, id DESC",
        ENVELOPE_COLUMNS
    ))
    .bind(owner_id)
    .fetch_all(db)
    .await?;
    rows.into_iter()
        .map(|row| Envelope::try_from(row).map_err(ApiError::from))
        .collect()
}

pub async fn find_envelope(db: &SqlitePool, id: &str) -> Result<Option<Envelope>, ApiError> {
    let row: Option<EnvelopeRow> = sqlx::query_as(&format!(
        "SELECT {} FROM envelopes WHERE id = ?",
        ENVELOPE_COLUMNS
    ))
    .bind(id)
    .fetch_optional(db)
    .await?;
    row.map(Envelope::try_from).transpose().map_err(ApiError::from)
}

/// The envelope, if it exists and belongs to `owner_id`
pub async fn owned_envelope(
    db: &SqlitePool,
    id: &str,
    owner_id: &str,
) -> Result<Envelope, ApiError> {
    find_envelope(db, id)
        .await?
        .filter(|e| e.owner_id == owner_id)
        .ok_or_else(|| ApiError::NotFound("Not found".to_string()))
}

pub async fn update_envelope_meta(
    db: &SqlitePool,
    id: &str,
    title: &str,
    page_count: u32,
) -> Result<(), ApiError> {
    sqlx::query("UPDATE envelopes SET title = ?, page_count = ?, updated_at = ? WHERE id = ?")
        .bind(title)
        .bind(page_count)
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(db)
        .await?;
    Ok(())
}

pub async fn set_source(
    db: &SqlitePool,
    id: &str,
    url: &str,
    key: &str,
    sha256: &str,
    page_count: u32,
) -> Result<(), ApiError> {
    sqlx::query(
        r#"
        UPDATE envelopes
        SET pdf_url = ?, pdf_key = ?, pdf_sha256 = ?, page_count = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(url)
    .bind(key)
    .bind(sha256)
    .bind(page_count)
    .bind(Utc::now().to_rfc3339())
    .bind(id)
    .execute(db)
    .await?;
    Ok(())
}

pub async fn set_status(
    db: &SqlitePool,
    id: &str,
    status: EnvelopeStatus,
) -> Result<(), ApiError> {
    sqlx::query("UPDATE envelopes SET status = ?, updated_at = ? WHERE id = ?")
        .bind(status.as_str())
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(db)
        .await?;
    Ok(())
}

pub async fn set_signed_pdf(
    db: &SqlitePool,
    id: &str,
    url: &str,
    key: &str,
) -> Result<(), ApiError> {
    sqlx::query(
        "UPDATE envelopes SET signed_pdf_url = ?, signed_pdf_key = ?, updated_at = ? WHERE id = ?",
    )
    .bind(url)
    .bind(key)
    .bind(Utc::now().to_rfc3339())
    .bind(id)
    .execute(db)
    .await?;
    Ok(())
}

pub async fn delete_envelope(db: &SqlitePool, id: &str) -> Result<(), ApiError> {
    let mut tx = db.begin().await?;
    sqlx::query("DELETE FROM fields WHERE envelope_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM recipients WHERE envelope_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM envelopes WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(())
}

/// Recipients of an envelope, by signing order
pub async fn list_recipients(
    db: &SqlitePool,
    envelope_id: &str,
) -> Result<Vec<Recipient>, ApiError> {
    let rows: Vec<RecipientRow> = sqlx::query_as(&format!(
        "SELECT {} FROM recipients WHERE envelope_id = ? ORDER BY sort_order ASC, rowid ASC",
        RECIPIENT_COLUMNS
    ))
    .bind(envelope_id)
    .fetch_all(db)
    .await?;
    rows.into_iter()
        .map(|row| Recipient::try_from(row).map_err(ApiError::from))
        .collect()
}

pub async fn replace_recipients(
    db: &SqlitePool,
    envelope_id: &str,
    recipients: &[Recipient],
) -> Result<(), ApiError> {
    let mut tx = db.begin().await?;
    sqlx::query("DELETE FROM recipients WHERE envelope_id = ?")
        .bind(envelope_id)
        .execute(&mut *tx)
        .await?;
    for r in recipients {
        sqlx::query(
            r#"
            INSERT INTO recipients (id, envelope_id, name, email, sort_order, token, status, signed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&r.id)
        .bind(envelope_id)
        .bind(&r.name)
        .bind(&r.email)
        .bind(r.order)
        .bind(&r.token)
        .bind(r.status.as_str())
        .bind(r.signed_at.map(|t| t.to_rfc3339()))
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    Ok(())
}

pub async fn recipient_by_token(
    db: &SqlitePool,
    token: &str,
) -> Result<Option<Recipient>, ApiError> {
    let row: Option<RecipientRow> = sqlx::query_as(&format!(
        "SELECT {} FROM recipients WHERE token = ?",
        RECIPIENT_COLUMNS
    ))
    .bind(token)
    .fetch_optional(db)
    .await?;
    row.map(Recipient::try_from)
        .transpose()
        .map_err(ApiError::from)
}

pub async fn list_fields(db: &SqlitePool, envelope_id: &str) -> Result<Vec<Field>, ApiError> {
    let rows: Vec<FieldRow> = sqlx::query_as(&format!(
        "SELECT {} FROM fields WHERE envelope_id = ? ORDER BY rowid ASC",
        FIELD_COLUMNS
    ))
    .bind(envelope_id)
    .fetch_all(db)
    .await?;
    rows.into_iter()
        .map(|row| Field::try_from(row).map_err(ApiError::from))
        .collect()
}

pub async fn replace_fields(
    db: &SqlitePool,
    envelope_id: &str,
    fields: &[Field],
) -> Result<(), ApiError> {
    let mut tx = db.begin().await?;
    sqlx::query("DELETE FROM fields WHERE envelope_id = ?")
        .bind(envelope_id)
        .execute(&mut *tx)
        .await?;
    for f in fields {
        sqlx::query(
            r#"
            INSERT INTO fields (id, envelope_id, recipient_id, page, x, y, width, height,
                                field_type, required, value)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&f.id)
        .bind(envelope_id)
        .bind(&f.recipient_id)
        .bind(f.page)
        .bind(f.x)
        .bind(f.y)
        .bind(f.width)
        .bind(f.height)
        .bind(f.field_type.as_str())
        .bind(f.required)
        .bind(&f.value)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    Ok(())
}

/// Flip a pending recipient to signed and store their submitted values in one
/// transaction. Only fields owned by `recipient_id` are touched.
///
/// Returns `None`, leaving every field as it was, when the recipient was no
/// longer pending. Otherwise returns how many fields were updated.
pub async fn sign_with_values(
    db: &SqlitePool,
    envelope_id: &str,
    recipient_id: &str,
    values: &[(String, Option<String>)],
    at: DateTime<Utc>,
) -> Result<Option<u64>, ApiError> {
    let mut tx = db.begin().await?;
    let marked = sqlx::query(
        "UPDATE recipients SET status = ?, signed_at = ? WHERE id = ? AND envelope_id = ? AND status = ?",
    )
    .bind(RecipientStatus::Signed.as_str())
    .bind(at.to_rfc3339())
    .bind(recipient_id)
    .bind(envelope_id)
    .bind(RecipientStatus::Pending.as_str())
    .execute(&mut *tx)
    .await?;
    if marked.rows_affected() != 1 {
        tx.rollback().await?;
        return Ok(None);
    }

    let mut updated = 0;
    for (field_id, value) in values {
        let result = sqlx::query(
            "UPDATE fields SET value = ? WHERE id = ? AND envelope_id = ? AND recipient_id = ?",
        )
        .bind(value)
        .bind(field_id)
        .bind(envelope_id)
        .bind(recipient_id)
        .execute(&mut *tx)
        .await?;
        updated += result.rows_affected();
    }
    tx.commit().await?;
    Ok(Some(updated))
}
