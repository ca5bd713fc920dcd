//! Low-level page mutation: resources, content streams and annotation-free overlays

use std::collections::HashSet;

use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};

use crate::error::RenderError;

fn draw_error(context: &str, e: impl std::fmt::Display) -> RenderError {
    RenderError::Draw(format!("{}: {}", context, e))
}

fn page_dict_mut(doc: &mut Document, page_id: ObjectId) -> Result<&mut Dictionary, RenderError> {
    doc.get_object_mut(page_id)
        .and_then(Object::as_dict_mut)
        .map_err(|e| draw_error("page is not a dictionary", e))
}

fn resolve_dict(doc: &Document, obj: &Object) -> Option<Dictionary> {
    match obj {
        Object::Dictionary(dict) => Some(dict.clone()),
        Object::Reference(id) => doc
            .get_object(*id)
            .and_then(Object::as_dict)
            .ok()
            .cloned(),
        _ => None,
    }
}

/// Resources the page would use when rendered, including inherited ones
fn effective_resources(doc: &Document, page_id: ObjectId) -> Dictionary {
    let mut current = Some(page_id);
    while let Some(id) = current {
        let Ok(dict) = doc.get_object(id).and_then(Object::as_dict) else {
            break;
        };
        if let Ok(res) = dict.get(b"Resources") {
            return resolve_dict(doc, res).unwrap_or_default();
        }
        current = dict.get(b"Parent").and_then(Object::as_reference).ok();
    }
    Dictionary::new()
}

/// Give the page its own direct `/Resources` with direct `/Font` and `/XObject`
/// dictionaries so names can be added without touching shared objects.
pub(crate) fn materialize_resources(
    doc: &mut Document,
    page_id: ObjectId,
) -> Result<(), RenderError> {
    let mut resources = effective_resources(doc, page_id);
    for key in [b"Font".as_slice(), b"XObject".as_slice()] {
        let inline = resources
            .get(key)
            .ok()
            .and_then(|obj| resolve_dict(doc, obj))
            .unwrap_or_default();
        resources.set(key.to_vec(), Object::Dictionary(inline));
    }
    page_dict_mut(doc, page_id)?.set("Resources", Object::Dictionary(resources));
    Ok(())
}

/// Mutable access to a named sub-dictionary of the page resources.
/// Call [`materialize_resources`] first.
fn resource_category_mut<'a>(
    doc: &'a mut Document,
    page_id: ObjectId,
    category: &[u8],
) -> Result<&'a mut Dictionary, RenderError> {
    let resources = page_dict_mut(doc, page_id)?
        .get_mut(b"Resources")
        .and_then(Object::as_dict_mut)
        .map_err(|e| draw_error("page resources missing", e))?;
    resources
        .get_mut(category)
        .and_then(Object::as_dict_mut)
        .map_err(|e| draw_error("resource category missing", e))
}

/// Register `object_id` under a fresh name in the page's `category` resources.
///
/// The name is `prefix` followed by the first counter value not already taken.
pub(crate) fn register_resource(
    doc: &mut Document,
    page_id: ObjectId,
    category: &[u8],
    prefix: &str,
    counter: &mut u32,
    object_id: ObjectId,
) -> Result<String, RenderError> {
    let dict = resource_category_mut(doc, page_id, category)?;
    let taken: HashSet<Vec<u8>> = dict.iter().map(|(k, _)| k.clone()).collect();
    let name = loop {
        *counter += 1;
        let candidate = format!("{}{}", prefix, counter);
        if !taken.contains(candidate.as_bytes()) {
            break candidate;
        }
    };
    dict.set(name.as_bytes().to_vec(), Object::Reference(object_id));
    Ok(name)
}

fn content_refs(doc: &Document, page_id: ObjectId) -> Result<Vec<Object>, RenderError> {
    let page = doc
        .get_object(page_id)
        .and_then(Object::as_dict)
        .map_err(|e| draw_error("page is not a dictionary", e))?;
    let refs = match page.get(b"Contents") {
        Ok(Object::Reference(id)) => match doc.get_object(*id) {
            Ok(Object::Array(items)) => items.clone(),
            _ => vec![Object::Reference(*id)],
        },
        Ok(Object::Array(items)) => items.clone(),
        _ => Vec::new(),
    };
    Ok(refs)
}

fn set_contents(
    doc: &mut Document,
    page_id: ObjectId,
    contents: Vec<Object>,
) -> Result<(), RenderError> {
    page_dict_mut(doc, page_id)?.set("Contents", Object::Array(contents));
    Ok(())
}

fn add_stream(doc: &mut Document, content: Vec<u8>) -> ObjectId {
    doc.add_object(Stream::new(dictionary! {}, content))
}

/// Wrap the page's existing content in `q ... Q` so an overlay appended after
/// it starts from the default graphics state.
pub(crate) fn isolate_existing_content(
    doc: &mut Document,
    page_id: ObjectId,
) -> Result<(), RenderError> {
    let existing = content_refs(doc, page_id)?;
    if existing.is_empty() {
        return Ok(());
    }
    let open = add_stream(doc, b"q\n".to_vec());
    let close = add_stream(doc, b"\nQ\n".to_vec());
    let mut wrapped = Vec::with_capacity(existing.len() + 2);
    wrapped.push(Object::Reference(open));
    wrapped.extend(existing);
    wrapped.push(Object::Reference(close));
    set_contents(doc, page_id, wrapped)
}

/// Append one content stream to the end of the page's content
pub(crate) fn append_content(
    doc: &mut Document,
    page_id: ObjectId,
    content: Vec<u8>,
) -> Result<(), RenderError> {
    let mut contents = content_refs(doc, page_id)?;
    let stream = add_stream(doc, content);
    contents.push(Object::Reference(stream));
    set_contents(doc, page_id, contents)
}

/// Format a number for a content stream: integral values without a fraction,
/// everything else with at most four decimals.
pub(crate) fn fmt_num(value: f64) -> String {
    let text = format!("{:.4}", value);
    let trimmed = text.trim_end_matches('0').trim_end_matches('.');
    match trimmed {
        "-0" | "" => "0".to_string(),
        _ => trimmed.to_string(),
    }
}
