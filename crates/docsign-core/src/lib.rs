//! Signed-PDF composition
//!
//! Takes a stored PDF plus recipient-submitted field values and bakes them
//! into the pages: hand-drawn signatures as images, everything else as
//! Helvetica text. Positions arrive as fractions of the page with a top-left
//! origin and are mapped into PDF user space by [`coords::map_field`].
//!
//! One bad field never blocks the document: per-field failures are logged
//! and reported in [`ComposedDocument::outcomes`]. Only fetching or decoding
//! the source aborts a run.
//!
//! ```no_run
//! use docsign_core::{compose_document, Field, FieldType};
//!
//! # fn demo(source: &[u8]) -> Result<(), docsign_core::ComposeError> {
//! let fields = vec![Field::placed("date", FieldType::Date, 1, [0.5, 0.1, 0.2, 0.05])
//!     .with_value("2024-01-01")];
//! let signed = compose_document(source, &fields)?;
//! assert_eq!(signed.outcomes.len(), 1);
//! # Ok(())
//! # }
//! ```

pub mod completion;
pub mod compose;
pub mod coords;
pub mod error;
pub mod fetch;
pub mod image;
mod page;
pub mod render;
pub mod text;

pub use completion::{
    signed_pdf_key, BlobStore, CompletionJob, CompletionNotice, CompletionOrchestrator,
    CompletionReport, CompletionSummary, Notifier, StoredBlob,
};
pub use compose::{
    compose_document, compose_from_source, page_count, ComposedDocument, FieldOutcome,
    FieldReport,
};
pub use coords::{map_field, PageSize, RenderRect};
pub use error::{CompletionError, ComposeError, FetchError, RenderError};
pub use fetch::{HttpFetcher, MemoryFetcher, SourceFetcher};
pub use shared_types::{all_signed, Field, FieldType};
