use std::io::Cursor;

use anyhow::Context;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use bytes::Bytes;
use image::{codecs::jpeg::JpegEncoder, imageops::FilterType, DynamicImage};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::storage::StorageClient;

const START_QUALITY: u8 = 90;
const QUALITY_STEP: u8 = 10;
const FLOOR_QUALITY: u8 = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageKind {
    Avatar,
    Logo,
    Gallery,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageLimits {
    /// Longest side after scaling, in pixels.
    pub max_dim: u32,
    pub max_bytes: usize,
}

impl ImageKind {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "avatar" => Some(ImageKind::Avatar),
            "logo" => Some(ImageKind::Logo),
            "gallery" => Some(ImageKind::Gallery),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ImageKind::Avatar => "avatar",
            ImageKind::Logo => "logo",
            ImageKind::Gallery => "gallery",
        }
    }

    pub fn limits(self) -> ImageLimits {
        match self {
            ImageKind::Avatar => ImageLimits {
                max_dim: 512,
                max_bytes: 200 * 1024,
            },
            ImageKind::Logo => ImageLimits {
                max_dim: 512,
                max_bytes: 150 * 1024,
            },
            ImageKind::Gallery => ImageLimits {
                max_dim: 1600,
                max_bytes: 600 * 1024,
            },
        }
    }
}

pub(crate) fn ext_from_mime(ct: &str) -> Option<&'static str> {
    match ct {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        "image/gif" => Some("gif"),
        _ => None,
    }
}

#[derive(Debug)]
pub struct Compressed {
    pub bytes: Vec<u8>,
    pub quality: u8,
    pub width: u32,
    pub height: u32,
}

fn encode_jpeg(img: &DynamicImage, quality: u8) -> anyhow::Result<Vec<u8>> {
    let rgb = img.to_rgb8();
    let mut out = Cursor::new(Vec::new());
    JpegEncoder::new_with_quality(&mut out, quality)
        .encode_image(&rgb)
        .context("jpeg encode")?;
    Ok(out.into_inner())
}

/// Scales so the longer side fits, then steps JPEG quality down from 90 until the
/// output fits the byte budget. At the floor quality the last result is kept as is.
pub fn compress(raw: &[u8], limits: ImageLimits) -> anyhow::Result<Compressed> {
    let img = image::load_from_memory(raw).context("decode image")?;
    let img = if img.width() > limits.max_dim || img.height() > limits.max_dim {
        img.resize(limits.max_dim, limits.max_dim, FilterType::Triangle)
    } else {
        img
    };

    let mut quality = START_QUALITY;
    loop {
        let bytes = encode_jpeg(&img, quality)?;
        if bytes.len() <= limits.max_bytes || quality <= FLOOR_QUALITY {
            debug!(quality, size = bytes.len(), budget = limits.max_bytes, "image encoded");
            return Ok(Compressed {
                bytes,
                quality,
                width: img.width(),
                height: img.height(),
            });
        }
        quality = quality.saturating_sub(QUALITY_STEP).max(FLOOR_QUALITY);
    }
}

pub fn data_url(jpeg: &[u8]) -> String {
    format!("data:image/jpeg;base64,{}", BASE64.encode(jpeg))
}

/// Accepts raw base64 or a full `data:` URL.
pub fn decode_base64_image(input: &str) -> anyhow::Result<Vec<u8>> {
    let payload = match input.split_once(";base64,") {
        Some((_, rest)) => rest,
        None => input,
    };
    BASE64
        .decode(payload.trim())
        .context("invalid base64 image")
}

/// Object storage when configured; otherwise the image travels inline as a data URL.
pub async fn publish(
    storage: Option<&dyn StorageClient>,
    kind: ImageKind,
    image: Compressed,
) -> anyhow::Result<String> {
    match storage {
        Some(storage) => {
            let key = format!("{}/{}.jpg", kind.as_str(), Uuid::new_v4());
            storage
                .put_object(&key, Bytes::from(image.bytes), "image/jpeg")
                .await
                .with_context(|| format!("put_object {}", key))?;
            Ok(storage.public_url(&key))
        }
        None => Ok(data_url(&image.bytes)),
    }
}
