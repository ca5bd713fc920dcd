//! Hand-drawn signature images
//!
//! Signature and initials values arrive as canvas exports:
//! `data:image/png;base64,<payload>`. The declared MIME type is ignored and
//! the payload is always decoded as PNG.

use std::io::{Cursor, Write};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use lopdf::{dictionary, Document, ObjectId, Stream};

use crate::error::RenderError;

const DATA_URL_PREFIX: &str = "data:";

/// Decoded 8-bit raster, colour and alpha planes split for PDF embedding
#[derive(Debug, Clone, PartialEq)]
pub struct RasterImage {
    pub width: u32,
    pub height: u32,
    pub color: ColorPlanes,
    pub alpha: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ColorPlanes {
    Gray(Vec<u8>),
    Rgb(Vec<u8>),
}

/// Strip the data-URL wrapper and return the raw image bytes
pub fn decode_data_url(value: &str) -> Result<Vec<u8>, RenderError> {
    let rest = value
        .strip_prefix(DATA_URL_PREFIX)
        .ok_or_else(|| RenderError::MalformedImage("value is not a data URL".into()))?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| RenderError::MalformedImage("data URL has no payload".into()))?;
    if !header.split(';').any(|part| part.eq_ignore_ascii_case("base64")) {
        return Err(RenderError::MalformedImage(
            "data URL payload is not base64".into(),
        ));
    }
    let compact: String = payload
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    BASE64
        .decode(compact.as_bytes())
        .map_err(|e| RenderError::MalformedImage(format!("invalid base64: {}", e)))
}

/// Decode PNG bytes, normalizing palette, sub-byte and 16-bit input to 8 bits
pub fn decode_png(bytes: &[u8]) -> Result<RasterImage, RenderError> {
    let mut decoder = png::Decoder::new(Cursor::new(bytes));
    decoder.set_transformations(png::Transformations::EXPAND | png::Transformations::STRIP_16);
    let mut reader = decoder
        .read_info()
        .map_err(|e| RenderError::MalformedImage(format!("invalid PNG: {}", e)))?;

    let mut buf = vec![0; reader.output_buffer_size()];
    let info = reader
        .next_frame(&mut buf)
        .map_err(|e| RenderError::MalformedImage(format!("invalid PNG frame: {}", e)))?;
    buf.truncate(info.buffer_size());

    if info.width == 0 || info.height == 0 {
        return Err(RenderError::UnsupportedImage("image has no pixels".into()));
    }
    if info.bit_depth != png::BitDepth::Eight {
        return Err(RenderError::UnsupportedImage(format!(
            "unexpected bit depth {:?}",
            info.bit_depth
        )));
    }

    let (color, alpha) = match info.color_type {
        png::ColorType::Rgb => (ColorPlanes::Rgb(buf), None),
        png::ColorType::Grayscale => (ColorPlanes::Gray(buf), None),
        png::ColorType::Rgba => {
            let (rgb, alpha) = split_alpha(&buf, 3);
            (ColorPlanes::Rgb(rgb), Some(alpha))
        }
        png::ColorType::GrayscaleAlpha => {
            let (gray, alpha) = split_alpha(&buf, 1);
            (ColorPlanes::Gray(gray), Some(alpha))
        }
        png::ColorType::Indexed => {
            return Err(RenderError::UnsupportedImage(
                "palette image was not expanded".into(),
            ))
        }
    };

    Ok(RasterImage {
        width: info.width,
        height: info.height,
        color,
        alpha,
    })
}

fn split_alpha(pixels: &[u8], color_channels: usize) -> (Vec<u8>, Vec<u8>) {
    let stride = color_channels + 1;
    let count = pixels.len() / stride;
    let mut color = Vec::with_capacity(count * color_channels);
    let mut alpha = Vec::with_capacity(count);
    for px in pixels.chunks_exact(stride) {
        color.extend_from_slice(&px[..color_channels]);
        alpha.push(px[color_channels]);
    }
    (color, alpha)
}

fn deflate(data: &[u8]) -> Result<Vec<u8>, RenderError> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .and_then(|_| encoder.finish())
        .map_err(|e| RenderError::Draw(format!("image compression failed: {}", e)))
}

fn image_stream(
    width: u32,
    height: u32,
    color_space: &str,
    data: &[u8],
) -> Result<Stream, RenderError> {
    let dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => i64::from(width),
        "Height" => i64::from(height),
        "ColorSpace" => color_space,
        "BitsPerComponent" => 8,
        "Filter" => "FlateDecode",
    };
    Ok(Stream::new(dict, deflate(data)?))
}

/// Add the image (and its soft mask) to the document's object pool
pub fn embed_image(doc: &mut Document, image: &RasterImage) -> Result<ObjectId, RenderError> {
    let (color_space, samples) = match &image.color {
        ColorPlanes::Rgb(data) => ("DeviceRGB", data),
        ColorPlanes::Gray(data) => ("DeviceGray", data),
    };
    let mut stream = image_stream(image.width, image.height, color_space, samples)?;

    if let Some(alpha) = &image.alpha {
        let mask = image_stream(image.width, image.height, "DeviceGray", alpha)?;
        let mask_id = doc.add_object(mask);
        stream.dict.set("SMask", mask_id);
    }

    Ok(doc.add_object(stream))
}
