//! Envelope domain model shared across the workspace
//!
//! An envelope is one source document, the recipients who must sign it and
//! the fields placed on its pages. These types are plain data: persistence,
//! rendering and delivery live in the crates that consume them.

pub mod envelope;
pub mod field;
pub mod workflow;

pub use envelope::{Envelope, EnvelopeStatus, Recipient, RecipientStatus, SigningMode};
pub use field::{is_present, Field, FieldKind, FieldType};
pub use workflow::{all_signed, awaiting_turn, may_sign};

use thiserror::Error;

/// Failure to parse one of the string-backed enums in this crate
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("unknown field type: {0}")]
    FieldType(String),

    #[error("unknown envelope status: {0}")]
    EnvelopeStatus(String),

    #[error("unknown recipient status: {0}")]
    RecipientStatus(String),

    #[error("unknown signing mode: {0}")]
    SigningMode(String),
}
