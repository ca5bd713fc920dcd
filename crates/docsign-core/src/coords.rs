//! Field placement to PDF user space
//!
//! Fields are stored as fractions of the rendered page with a top-left origin.
//! PDF user space has a bottom-left origin in points, so the y axis is flipped
//! and the box height subtracted so the box's top edge lands where the owner
//! placed it.

use lopdf::{Dictionary, Document, Object, ObjectId};
use shared_types::Field;

/// US Letter, used when a page tree carries no usable MediaBox
pub const FALLBACK_PAGE_SIZE: PageSize = PageSize {
    width: 612.0,
    height: 792.0,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSize {
    pub width: f64,
    pub height: f64,
}

/// Largest coordinate magnitude written into a content stream. Readers are
/// only required to handle reals up to this size.
pub const MAX_COORDINATE: f64 = 32_767.0;

/// Absolute rectangle in PDF points, bottom-left origin
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl RenderRect {
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.width.is_finite() && self.height.is_finite()
    }

    /// Every edge lies within `MAX_COORDINATE` of the origin
    pub fn is_within_limits(&self) -> bool {
        [
            self.x,
            self.y,
            self.x + self.width,
            self.y + self.height,
        ]
        .iter()
        .all(|v| v.abs() <= MAX_COORDINATE)
    }
}

/// Map a field's fractional box onto a page.
///
/// Pure arithmetic: no clamping or rounding, negative and >1 fractions map
/// mechanically. Non-positive page sizes produce meaningless but finite
/// rectangles; the renderer only rejects non-finite ones.
pub fn map_field(field: &Field, page: PageSize) -> RenderRect {
    let width = field.width * page.width;
    let height = field.height * page.height;
    RenderRect {
        x: field.x * page.width,
        y: page.height - (field.y * page.height) - height,
        width,
        height,
    }
}

/// Size of a page from its MediaBox, following `/Parent` for inherited boxes
pub fn page_size(doc: &Document, page_id: ObjectId) -> PageSize {
    let mut current = Some(page_id);
    while let Some(id) = current {
        let Ok(dict) = doc.get_object(id).and_then(Object::as_dict) else {
            break;
        };
        if let Some(size) = media_box_size(doc, dict) {
            return size;
        }
        current = dict.get(b"Parent").and_then(Object::as_reference).ok();
    }
    FALLBACK_PAGE_SIZE
}

fn media_box_size(doc: &Document, dict: &Dictionary) -> Option<PageSize> {
    let raw = dict.get(b"MediaBox").ok()?;
    let resolved = match raw {
        Object::Reference(id) => doc.get_object(*id).ok()?,
        other => other,
    };
    let arr = resolved.as_array().ok()?;
    if arr.len() != 4 {
        return None;
    }
    let llx = number(&arr[0])?;
    let lly = number(&arr[1])?;
    let urx = number(&arr[2])?;
    let ury = number(&arr[3])?;
    Some(PageSize {
        width: urx - llx,
        height: ury - lly,
    })
}

pub(crate) fn number(obj: &Object) -> Option<f64> {
    match obj {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(f) => Some(f64::from(*f)),
        _ => None,
    }
}
