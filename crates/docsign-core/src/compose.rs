//! Bake recipient values into the source PDF
//!
//! One run decodes the source, walks the fields in the order given and hands
//! each filled, in-range field to the renderer. Per-field failures are
//! recorded in the run's outcomes; only fetch, decode and serialize errors
//! abort the run.

use lopdf::Document;
use shared_types::Field;
use tracing::{debug, info, warn};

use crate::coords::{map_field, page_size};
use crate::error::{ComposeError, RenderError};
use crate::fetch::SourceFetcher;
use crate::render::{render_field, RenderState};

/// What happened to one field during a run
#[derive(Debug, Clone, PartialEq)]
pub enum FieldOutcome {
    Rendered,
    SkippedEmpty,
    SkippedPageOutOfRange { page: u32, page_count: u32 },
    Failed(RenderError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldReport {
    pub field_id: String,
    pub outcome: FieldOutcome,
}

/// Output of a successful run
#[derive(Debug, Clone)]
pub struct ComposedDocument {
    pub bytes: Vec<u8>,
    pub page_count: u32,
    /// One entry per input field, in input order
    pub outcomes: Vec<FieldReport>,
}

impl ComposedDocument {
    pub fn rendered_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|r| r.outcome == FieldOutcome::Rendered)
            .count()
    }

    pub fn failed_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|r| matches!(r.outcome, FieldOutcome::Failed(_)))
            .count()
    }
}

/// Open a PDF, tolerating encryption metadata that carries no user password
fn decode_source(source: &[u8]) -> Result<Document, ComposeError> {
    let mut doc =
        Document::load_mem(source).map_err(|e| ComposeError::Decode(e.to_string()))?;
    if doc.is_encrypted() {
        match doc.decrypt("") {
            Ok(()) => debug!("decrypted source with empty password"),
            Err(e) => warn!(error = %e, "source is encrypted, continuing without decryption"),
        }
    }
    if doc.get_pages().is_empty() {
        return Err(ComposeError::Decode("document has no pages".into()));
    }
    Ok(doc)
}

/// Number of pages in a PDF
pub fn page_count(source: &[u8]) -> Result<u32, ComposeError> {
    let doc = decode_source(source)?;
    Ok(doc.get_pages().len() as u32)
}

/// Compose `fields` onto already-fetched source bytes
pub fn compose_document(source: &[u8], fields: &[Field]) -> Result<ComposedDocument, ComposeError> {
    let mut doc = decode_source(source)?;
    let pages = doc.get_pages();
    let page_count = pages.len() as u32;
    let mut state = RenderState::new();
    let mut outcomes = Vec::with_capacity(fields.len());

    for field in fields {
        let outcome = match field.filled_value() {
            None => {
                debug!(field_id = %field.id, "field has no value, skipping");
                FieldOutcome::SkippedEmpty
            }
            Some(value) => match pages.get(&field.page) {
                None => {
                    debug!(
                        field_id = %field.id,
                        page = field.page,
                        page_count,
                        "field page out of range, skipping"
                    );
                    FieldOutcome::SkippedPageOutOfRange {
                        page: field.page,
                        page_count,
                    }
                }
                Some(&page_id) => {
                    let rect = map_field(field, page_size(&doc, page_id));
                    match render_field(&mut doc, &mut state, page_id, &rect, field, value) {
                        Ok(()) => FieldOutcome::Rendered,
                        Err(e) => {
                            warn!(
                                field_id = %field.id,
                                field_type = %field.field_type,
                                error = %e,
                                "skipping field"
                            );
                            FieldOutcome::Failed(e)
                        }
                    }
                }
            },
        };
        outcomes.push(FieldReport {
            field_id: field.id.clone(),
            outcome,
        });
    }

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes)
        .map_err(|e| ComposeError::Serialize(e.to_string()))?;

    let composed = ComposedDocument {
        bytes,
        page_count,
        outcomes,
    };
    info!(
        fields = fields.len(),
        rendered = composed.rendered_count(),
        failed = composed.failed_count(),
        page_count,
        "composed signed document"
    );
    Ok(composed)
}

/// Fetch the source from `location`, then compose on the blocking pool
pub async fn compose_from_source<F>(
    fetcher: &F,
    location: &str,
    fields: &[Field],
) -> Result<ComposedDocument, ComposeError>
where
    F: SourceFetcher + ?Sized,
{
    let source = fetcher.fetch_bytes(location).await?;
    let fields = fields.to_vec();
    match tokio::task::spawn_blocking(move || compose_document(&source, &fields)).await {
        Ok(result) => result,
        Err(join_error) => Err(ComposeError::Interrupted(join_error.to_string())),
    }
}
