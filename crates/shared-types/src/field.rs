//! Signature fields placed on an envelope's pages
//!
//! Positions are fractions of the rendered page with a top-left origin, exactly
//! as the placement UI recorded them. Nothing here clamps or validates the
//! geometry; out-of-range values are carried through to the renderer.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::ParseError;

/// The kind of content a recipient supplies for a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Signature,
    Initials,
    Name,
    Email,
    Date,
    Text,
}

/// Rendering strategy selected by a field's type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Hand-drawn raster captured from a canvas
    Image,
    /// Plain string drawn in the built-in font
    Text,
}

impl FieldType {
    pub const ALL: [FieldType; 6] = [
        FieldType::Signature,
        FieldType::Initials,
        FieldType::Name,
        FieldType::Email,
        FieldType::Date,
        FieldType::Text,
    ];

    pub fn kind(self) -> FieldKind {
        match self {
            FieldType::Signature | FieldType::Initials => FieldKind::Image,
            FieldType::Name | FieldType::Email | FieldType::Date | FieldType::Text => {
                FieldKind::Text
            }
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FieldType::Signature => "signature",
            FieldType::Initials => "initials",
            FieldType::Name => "name",
            FieldType::Email => "email",
            FieldType::Date => "date",
            FieldType::Text => "text",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldType {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FieldType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ParseError::FieldType(s.to_string()))
    }
}

fn default_required() -> bool {
    true
}

/// A positioned, typed placeholder for one piece of recipient content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub id: String,
    pub recipient_id: String,
    /// 1-based page index
    pub page: u32,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    /// Checked by the signing client; the server stores values as given
    #[serde(default = "default_required")]
    pub required: bool,
    /// Image data URL or plain text; `None` until the recipient signs
    #[serde(default)]
    pub value: Option<String>,
}

impl Field {
    /// Create an unfilled field at `[x, y, width, height]` on `page`
    pub fn placed(id: &str, field_type: FieldType, page: u32, rect: [f64; 4]) -> Self {
        let [x, y, width, height] = rect;
        Self {
            id: id.to_string(),
            recipient_id: String::new(),
            page,
            x,
            y,
            width,
            height,
            field_type,
            required: true,
            value: None,
        }
    }

    pub fn for_recipient(mut self, recipient_id: &str) -> Self {
        self.recipient_id = recipient_id.to_string();
        self
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    /// The value to render, or `None` when the field was left blank
    pub fn filled_value(&self) -> Option<&str> {
        self.value.as_deref().filter(|v| is_present(Some(v)))
    }
}

/// A value counts as filled when it is non-null and not the empty string.
///
/// `"0"` and whitespace are real values a signer typed.
pub fn is_present(value: Option<&str>) -> bool {
    matches!(value, Some(v) if !v.is_empty())
}
