//! Draw a single field value onto a page

use std::collections::HashMap;

use lopdf::{Document, ObjectId};
use shared_types::{Field, FieldKind};

use crate::coords::RenderRect;
use crate::error::RenderError;
use crate::image::{decode_data_url, decode_png, embed_image};
use crate::page::{
    append_content, fmt_num, isolate_existing_content, materialize_resources, register_resource,
};
use crate::text::{embed_helvetica, encode_win_ansi, text_content};

const IMAGE_PREFIX: &str = "DsImg";
const FONT_PREFIX: &str = "DsHelv";

#[derive(Debug, Default)]
struct PageState {
    font_name: Option<String>,
}

/// Mutable bookkeeping for one compositor run
///
/// Holds the shared font object and the name counters so the same inputs
/// always allocate the same object ids and resource names.
#[derive(Debug, Default)]
pub struct RenderState {
    font_id: Option<ObjectId>,
    image_counter: u32,
    font_counter: u32,
    pages: HashMap<ObjectId, PageState>,
}

impl RenderState {
    pub fn new() -> Self {
        Self::default()
    }

    /// First overlay on a page: isolate its content and give it own resources
    fn prepare_page(&mut self, doc: &mut Document, page_id: ObjectId) -> Result<(), RenderError> {
        if self.pages.contains_key(&page_id) {
            return Ok(());
        }
        isolate_existing_content(doc, page_id)?;
        materialize_resources(doc, page_id)?;
        self.pages.insert(page_id, PageState::default());
        Ok(())
    }

    fn font_on_page(&mut self, doc: &mut Document, page_id: ObjectId) -> Result<String, RenderError> {
        if let Some(name) = self.pages.get(&page_id).and_then(|p| p.font_name.clone()) {
            return Ok(name);
        }
        let font_id = *self.font_id.get_or_insert_with(|| embed_helvetica(doc));
        let name = register_resource(
            doc,
            page_id,
            b"Font",
            FONT_PREFIX,
            &mut self.font_counter,
            font_id,
        )?;
        self.pages.entry(page_id).or_default().font_name = Some(name.clone());
        Ok(name)
    }
}

/// Draw `value` for `field` inside `rect` on the given page.
///
/// Everything that can fail on the value itself is checked before the
/// document is touched, so an error leaves the page unchanged.
pub fn render_field(
    doc: &mut Document,
    state: &mut RenderState,
    page_id: ObjectId,
    rect: &RenderRect,
    field: &Field,
    value: &str,
) -> Result<(), RenderError> {
    if !rect.is_finite() {
        return Err(RenderError::NonFiniteGeometry);
    }
    if !rect.is_within_limits() {
        return Err(RenderError::GeometryOutOfRange);
    }
    match field.field_type.kind() {
        FieldKind::Image => draw_image(doc, state, page_id, rect, value),
        FieldKind::Text => draw_text(doc, state, page_id, rect, value),
    }
}

fn draw_image(
    doc: &mut Document,
    state: &mut RenderState,
    page_id: ObjectId,
    rect: &RenderRect,
    value: &str,
) -> Result<(), RenderError> {
    let raster = decode_png(&decode_data_url(value)?)?;

    state.prepare_page(doc, page_id)?;
    let image_id = embed_image(doc, &raster)?;
    let name = register_resource(
        doc,
        page_id,
        b"XObject",
        IMAGE_PREFIX,
        &mut state.image_counter,
        image_id,
    )?;

    // Stretched to the box, aspect ratio is not preserved
    let content = format!(
        "q\n{} 0 0 {} {} {} cm\n/{} Do\nQ\n",
        fmt_num(rect.width),
        fmt_num(rect.height),
        fmt_num(rect.x),
        fmt_num(rect.y),
        name
    );
    append_content(doc, page_id, content.into_bytes())
}

fn draw_text(
    doc: &mut Document,
    state: &mut RenderState,
    page_id: ObjectId,
    rect: &RenderRect,
    value: &str,
) -> Result<(), RenderError> {
    encode_win_ansi(value)?;

    state.prepare_page(doc, page_id)?;
    let font_name = state.font_on_page(doc, page_id)?;
    let content = text_content(rect, &font_name, value)?;
    append_content(doc, page_id, content)
}
