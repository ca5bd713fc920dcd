//! Envelope completion: compose the signed PDF, store it, tell everyone
//!
//! Artifact generation never blocks completion. A failed fetch, decode or
//! upload is logged and reported, and the completion notice still goes out,
//! just without a download link.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use shared_types::{Envelope, Field, Recipient};
use tracing::{error, info, warn};

use crate::compose::compose_from_source;
use crate::error::CompletionError;
use crate::fetch::SourceFetcher;

pub use shared_types::all_signed;

/// Where a stored blob ended up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    pub key: String,
    pub url: String,
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<StoredBlob, CompletionError>;
}

/// Message sent to the owner and every recipient once all have signed
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionNotice {
    pub envelope_id: String,
    pub title: String,
    pub owner_name: String,
    pub owner_email: String,
    pub recipients: Vec<Recipient>,
    pub download_url: Option<String>,
}

impl CompletionNotice {
    /// Owner first, then recipients, without duplicate addresses
    pub fn addresses(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        std::iter::once(self.owner_email.as_str())
            .chain(self.recipients.iter().map(|r| r.email.as_str()))
            .map(|e| e.trim().to_lowercase())
            .filter(|e| !e.is_empty() && seen.insert(e.clone()))
            .collect()
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_completion(&self, notice: &CompletionNotice) -> Result<(), CompletionError>;
}

#[async_trait]
impl<T: BlobStore + ?Sized> BlobStore for Arc<T> {
    async fn put(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<StoredBlob, CompletionError> {
        (**self).put(key, bytes, content_type).await
    }
}

#[async_trait]
impl<T: Notifier + ?Sized> Notifier for Arc<T> {
    async fn send_completion(&self, notice: &CompletionNotice) -> Result<(), CompletionError> {
        (**self).send_completion(notice).await
    }
}

/// Everything needed to finish one envelope
#[derive(Debug, Clone)]
pub struct CompletionJob {
    pub envelope: Envelope,
    pub recipients: Vec<Recipient>,
    pub fields: Vec<Field>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionSummary {
    /// The uploaded signed document, when one was produced
    pub signed_pdf: Option<StoredBlob>,
    /// Why no signed document exists
    pub artifact_error: Option<String>,
    pub rendered_fields: usize,
    pub notified: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CompletionReport {
    /// Some recipient has not signed yet
    NotReady,
    /// Another finalize for the same envelope is in progress
    AlreadyRunning,
    Finished(CompletionSummary),
}

/// Blob key for a signed document produced at `unix_ms`
pub fn signed_pdf_key(envelope_id: &str, unix_ms: i64) -> String {
    format!("envelopes/{}/signed-{}.pdf", envelope_id, unix_ms)
}

/// Removes the envelope from the in-flight set when dropped
struct InFlight {
    set: Arc<Mutex<HashSet<String>>>,
    envelope_id: String,
}

impl InFlight {
    fn acquire(set: &Arc<Mutex<HashSet<String>>>, envelope_id: &str) -> Option<Self> {
        let mut guard = set.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if !guard.insert(envelope_id.to_string()) {
            return None;
        }
        Some(Self {
            set: Arc::clone(set),
            envelope_id: envelope_id.to_string(),
        })
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        let mut guard = self
            .set
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.remove(&self.envelope_id);
    }
}

pub struct CompletionOrchestrator<F, B, N> {
    fetcher: F,
    blobs: B,
    notifier: N,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl<F, B, N> CompletionOrchestrator<F, B, N>
where
    F: SourceFetcher,
    B: BlobStore,
    N: Notifier,
{
    pub fn new(fetcher: F, blobs: B, notifier: N) -> Self {
        Self {
            fetcher,
            blobs,
            notifier,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn blobs(&self) -> &B {
        &self.blobs
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    /// Produce and distribute the signed document once every recipient has signed
    pub async fn finalize(&self, job: CompletionJob) -> CompletionReport {
        let envelope_id = job.envelope.id.clone();
        if !all_signed(&job.recipients) {
            return CompletionReport::NotReady;
        }
        let Some(_guard) = InFlight::acquire(&self.in_flight, &envelope_id) else {
            warn!(envelope_id = %envelope_id, "completion already running, ignoring trigger");
            return CompletionReport::AlreadyRunning;
        };

        let (signed_pdf, artifact_error, rendered_fields) = match self.produce_artifact(&job).await
        {
            Ok((blob, rendered)) => (Some(blob), None, rendered),
            Err(message) => (None, Some(message), 0),
        };

        let notice = CompletionNotice {
            envelope_id: envelope_id.clone(),
            title: job.envelope.title.clone(),
            owner_name: job.envelope.owner_name.clone(),
            owner_email: job.envelope.owner_email.clone(),
            recipients: job.recipients.clone(),
            download_url: signed_pdf.as_ref().map(|b| b.url.clone()),
        };
        let notified = match self.notifier.send_completion(&notice).await {
            Ok(()) => true,
            Err(e) => {
                warn!(envelope_id = %envelope_id, error = %e, "completion notice failed");
                false
            }
        };

        info!(
            envelope_id = %envelope_id,
            has_artifact = signed_pdf.is_some(),
            rendered_fields,
            notified,
            "envelope completed"
        );
        CompletionReport::Finished(CompletionSummary {
            signed_pdf,
            artifact_error,
            rendered_fields,
            notified,
        })
    }

    async fn produce_artifact(&self, job: &CompletionJob) -> Result<(StoredBlob, usize), String> {
        let envelope_id = &job.envelope.id;
        let Some(location) = job.envelope.pdf_url.as_deref() else {
            error!(envelope_id = %envelope_id, "envelope has no source document");
            return Err("envelope has no source document".to_string());
        };

        let composed = compose_from_source(&self.fetcher, location, &job.fields)
            .await
            .map_err(|e| {
                error!(envelope_id = %envelope_id, error = %e, "signed document generation failed");
                e.to_string()
            })?;

        let rendered = composed.rendered_count();
        let key = signed_pdf_key(envelope_id, Utc::now().timestamp_millis());
        let blob = self
            .blobs
            .put(&key, composed.bytes, "application/pdf")
            .await
            .map_err(|e| {
                error!(envelope_id = %envelope_id, error = %e, "signed document upload failed");
                e.to_string()
            })?;
        Ok((blob, rendered))
    }
}
