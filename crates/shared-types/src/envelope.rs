//! Envelopes and their recipients

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::ParseError;

/// Envelope lifecycle: `draft -> sent -> completed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeStatus {
    Draft,
    Sent,
    Completed,
}

impl EnvelopeStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            EnvelopeStatus::Draft => "draft",
            EnvelopeStatus::Sent => "sent",
            EnvelopeStatus::Completed => "completed",
        }
    }

    /// Recipients can only open or sign once the envelope has gone out
    pub fn is_signable(self) -> bool {
        !matches!(self, EnvelopeStatus::Draft)
    }
}

impl fmt::Display for EnvelopeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EnvelopeStatus {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(EnvelopeStatus::Draft),
            "sent" => Ok(EnvelopeStatus::Sent),
            "completed" => Ok(EnvelopeStatus::Completed),
            other => Err(ParseError::EnvelopeStatus(other.to_string())),
        }
    }
}

/// How recipients take turns
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SigningMode {
    /// Every pending recipient may sign as soon as the envelope is sent
    #[default]
    Parallel,
    /// Recipients sign in ascending `order`; equal orders sign together
    Sequential,
}

impl SigningMode {
    pub fn as_str(self) -> &'static str {
        match self {
            SigningMode::Parallel => "parallel",
            SigningMode::Sequential => "sequential",
        }
    }
}

impl fmt::Display for SigningMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SigningMode {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "parallel" => Ok(SigningMode::Parallel),
            "sequential" => Ok(SigningMode::Sequential),
            other => Err(ParseError::SigningMode(other.to_string())),
        }
    }
}

/// A document-plus-workflow unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub id: String,
    pub owner_id: String,
    pub owner_name: String,
    pub owner_email: String,
    pub title: String,
    pub status: EnvelopeStatus,
    #[serde(default)]
    pub signing_mode: SigningMode,
    pub pdf_url: Option<String>,
    pub pdf_key: Option<String>,
    /// Hex SHA-256 of the uploaded source document
    pub pdf_sha256: Option<String>,
    pub page_count: u32,
    pub signed_pdf_url: Option<String>,
    pub signed_pdf_key: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecipientStatus {
    Pending,
    Signed,
}

impl RecipientStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RecipientStatus::Pending => "pending",
            RecipientStatus::Signed => "signed",
        }
    }
}

impl fmt::Display for RecipientStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecipientStatus {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RecipientStatus::Pending),
            "signed" => Ok(RecipientStatus::Signed),
            other => Err(ParseError::RecipientStatus(other.to_string())),
        }
    }
}

/// Someone who must fill fields on an envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipient {
    pub id: String,
    pub envelope_id: String,
    pub name: String,
    pub email: String,
    pub order: i64,
    /// Secret that appears in the recipient's signing link
    pub token: String,
    pub status: RecipientStatus,
    pub signed_at: Option<DateTime<Utc>>,
}

impl Recipient {
    pub fn is_signed(&self) -> bool {
        self.status == RecipientStatus::Signed
    }
}
