//! Typed values drawn with the standard Helvetica font

use lopdf::{dictionary, Document, ObjectId};

use crate::coords::RenderRect;
use crate::error::RenderError;
use crate::page::fmt_num;

pub const MIN_FONT_SIZE: f64 = 8.0;
pub const MAX_FONT_SIZE: f64 = 12.0;
const FONT_SCALE: f64 = 0.55;
const TEXT_INSET: f64 = 2.0;
/// Clip box, in multiples of the font size: it starts this far below the
/// baseline so descenders survive
const CLIP_DESCENT: f64 = 1.0;
/// and is this tall, enough for ascenders at any clamped size
const CLIP_HEIGHT: f64 = 3.0;

/// Font size for a box of the given height in points
pub fn font_size(height: f64) -> f64 {
    (height * FONT_SCALE).clamp(MIN_FONT_SIZE, MAX_FONT_SIZE)
}

/// Add a Helvetica font dictionary to the object pool
pub fn embed_helvetica(doc: &mut Document) -> ObjectId {
    doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    })
}

/// Map a Unicode scalar onto its WinAnsiEncoding byte
fn win_ansi_byte(c: char) -> Option<u8> {
    let code = c as u32;
    match code {
        0x20..=0x7E | 0xA0..=0xFF => Some(code as u8),
        _ => {
            let byte = match c {
                '\u{20AC}' => 0x80,
                '\u{201A}' => 0x82,
                '\u{0192}' => 0x83,
                '\u{201E}' => 0x84,
                '\u{2026}' => 0x85,
                '\u{2020}' => 0x86,
                '\u{2021}' => 0x87,
                '\u{02C6}' => 0x88,
                '\u{2030}' => 0x89,
                '\u{0160}' => 0x8A,
                '\u{2039}' => 0x8B,
                '\u{0152}' => 0x8C,
                '\u{017D}' => 0x8E,
                '\u{2018}' => 0x91,
                '\u{2019}' => 0x92,
                '\u{201C}' => 0x93,
                '\u{201D}' => 0x94,
                '\u{2022}' => 0x95,
                '\u{2013}' => 0x96,
                '\u{2014}' => 0x97,
                '\u{02DC}' => 0x98,
                '\u{2122}' => 0x99,
                '\u{0161}' => 0x9A,
                '\u{203A}' => 0x9B,
                '\u{0153}' => 0x9C,
                '\u{017E}' => 0x9E,
                '\u{0178}' => 0x9F,
                _ => return None,
            };
            Some(byte)
        }
    }
}

/// Encode a value for the Helvetica font. Line breaks collapse to spaces;
/// anything else outside WinAnsi fails the draw.
pub fn encode_win_ansi(value: &str) -> Result<Vec<u8>, RenderError> {
    let mut out = Vec::with_capacity(value.len());
    let mut chars = value.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                out.push(b' ');
            }
            '\n' => out.push(b' '),
            _ => out.push(win_ansi_byte(c).ok_or_else(|| {
                RenderError::Draw(format!("character U+{:04X} cannot be encoded", c as u32))
            })?),
        }
    }
    Ok(out)
}

fn hex_string(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2 + 2);
    out.push('<');
    for b in bytes {
        out.push_str(&format!("{:02X}", b));
    }
    out.push('>');
    out
}

/// Content stream for a single line of text inside `rect`.
///
/// Black fill, baseline inset 2pt from the left and vertically centred on
/// the font size. Overflow past the right edge is clipped, never wrapped.
pub fn text_content(rect: &RenderRect, font_name: &str, value: &str) -> Result<Vec<u8>, RenderError> {
    let encoded = encode_win_ansi(value)?;
    let size = font_size(rect.height);
    let tx = rect.x + TEXT_INSET;
    let ty = rect.y + (rect.height - size) / 2.0;
    let clip_width = (rect.width - 2.0 * TEXT_INSET).max(0.0);

    let ops = [
        "q".to_string(),
        format!(
            "{} {} {} {} re W n",
            fmt_num(tx),
            fmt_num(ty - CLIP_DESCENT * size),
            fmt_num(clip_width),
            fmt_num(CLIP_HEIGHT * size)
        ),
        "0 0 0 rg".to_string(),
        "BT".to_string(),
        format!("/{} {} Tf", font_name, fmt_num(size)),
        format!("1 0 0 1 {} {} Tm", fmt_num(tx), fmt_num(ty)),
        format!("{} Tj", hex_string(&encoded)),
        "ET".to_string(),
        "Q".to_string(),
    ];
    let mut content = ops.join("\n");
    content.push('\n');
    Ok(content.into_bytes())
}
