//! 多模态处理模块：图片 MIME 嗅探与 base64 / data URL 编码。
//!
//! Image attachment helpers shared by every backend.
//!
//! MIME types are attributed from magic bytes; anything inconclusive is sent
//! as [`DEFAULT_IMAGE_MIME`].

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

pub const DEFAULT_IMAGE_MIME: &str = "image/png";

const SIGNATURES: &[(&[u8], &str)] = &[
    (b"\x89PNG\r\n\x1a\n", "image/png"),
    (b"\xFF\xD8\xFF", "image/jpeg"),
    (b"GIF87a", "image/gif"),
    (b"GIF89a", "image/gif"),
    (b"BM", "image/bmp"),
    (b"\x00\x00\x01\x00", "image/x-icon"),
    (b"\x00\x00\x02\x00", "image/x-icon"),
];

/// Sniffs the image type of `blob`.
pub fn sniff_image_mime(blob: &[u8]) -> &'static str {
    // RIFF....WEBPVP
    if blob.len() >= 14 && &blob[..4] == b"RIFF" && &blob[8..14] == b"WEBPVP" {
        return "image/webp";
    }
    SIGNATURES
        .iter()
        .find(|(magic, _)| blob.starts_with(magic))
        .map(|(_, mime)| *mime)
        .unwrap_or(DEFAULT_IMAGE_MIME)
}

pub fn encode_base64(blob: &[u8]) -> String {
    STANDARD.encode(blob)
}

/// An image ready to embed in a JSON request body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineImage {
    pub mime_type: &'static str,
    /// Standard base64, padded.
    pub data: String,
}

impl InlineImage {
    pub fn from_bytes(blob: &[u8]) -> Self {
        Self {
            mime_type: sniff_image_mime(blob),
            data: encode_base64(blob),
        }
    }

    /// `data:<mime>;base64,<data>`
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }
}
