use std::io::Cursor;
use std::path::Path;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chartsight_contracts::runs::receipts::ImageDigest;
use image::{ImageFormat, ImageReader};
use sha2::{Digest, Sha256};

use crate::failure::AnalysisFailure;

pub const SUPPORTED_MIME_TYPES: [&str; 2] = ["image/jpeg", "image/png"];

/// A chart screenshot that decoded cleanly.
///
/// The bytes and declared mime type are kept exactly as uploaded; decoding only
/// proves integrity. Constructed solely through [`encode_upload`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedImage {
    bytes: Vec<u8>,
    mime_type: String,
    detected_mime_type: &'static str,
    width: u32,
    height: u32,
}

impl UploadedImage {
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// Mime type implied by the decoded container, which may differ from the declared one.
    pub fn detected_mime_type(&self) -> &'static str {
        self.detected_mime_type
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn to_base64(&self) -> String {
        BASE64.encode(&self.bytes)
    }

    pub fn digest(&self) -> ImageDigest {
        let mut hasher = Sha256::new();
        hasher.update(&self.bytes);
        ImageDigest {
            mime_type: self.mime_type.clone(),
            byte_len: self.bytes.len() as u64,
            width: self.width,
            height: self.height,
            sha256: hex::encode(hasher.finalize()),
        }
    }
}

pub fn encode_upload(bytes: Vec<u8>, declared_mime: &str) -> Result<UploadedImage, AnalysisFailure> {
    if bytes.is_empty() {
        return Err(AnalysisFailure::InvalidImage("upload is empty".to_string()));
    }
    let mime_type = normalize_mime(declared_mime).ok_or_else(|| {
        AnalysisFailure::InvalidImage(format!(
            "unsupported image type '{}'; expected one of {}",
            declared_mime.trim(),
            SUPPORTED_MIME_TYPES.join(", ")
        ))
    })?;

    let format = image::guess_format(&bytes).map_err(|err| {
        AnalysisFailure::InvalidImage(format!("unrecognized image data ({err})"))
    })?;
    let detected_mime_type = match format {
        ImageFormat::Png => "image/png",
        ImageFormat::Jpeg => "image/jpeg",
        other => {
            return Err(AnalysisFailure::InvalidImage(format!(
                "image format {other:?} is not supported"
            )))
        }
    };

    let decoded = ImageReader::with_format(Cursor::new(bytes.as_slice()), format)
        .decode()
        .map_err(|err| {
            AnalysisFailure::InvalidImage(format!("failed to decode {detected_mime_type}: {err}"))
        })?;

    Ok(UploadedImage {
        width: decoded.width(),
        height: decoded.height(),
        bytes,
        mime_type,
        detected_mime_type,
    })
}

pub fn mime_for_path(path: &Path) -> Option<&'static str> {
    let ext = path
        .extension()
        .and_then(|value| value.to_str())
        .map(|value| value.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        _ => None,
    }
}

fn normalize_mime(raw: &str) -> Option<String> {
    let essence = raw
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    let essence = match essence.as_str() {
        "image/jpg" | "image/pjpeg" => "image/jpeg".to_string(),
        _ => essence,
    };
    SUPPORTED_MIME_TYPES
        .iter()
        .find(|supported| **supported == essence)
        .map(|supported| (*supported).to_string())
}

#[cfg(test)]
pub(crate) mod tests {
    use std::io::Cursor;
    use std::path::Path;

    use image::{ImageFormat, Rgb, RgbImage};

    use super::{encode_upload, mime_for_path};
    use crate::failure::FailureKind;

    pub(crate) fn chart_bytes(format: ImageFormat) -> Vec<u8> {
        let mut image = RgbImage::new(24, 16);
        for (x, y, pixel) in image.enumerate_pixels_mut() {
            let shade = if (x + y) % 3 == 0 { 40 } else { 220 };
            *pixel = Rgb([shade, 180, 90]);
        }
        let mut out = Cursor::new(Vec::new());
        image
            .write_to(&mut out, format)
            .expect("encode test chart");
        out.into_inner()
    }

    #[test]
    fn png_upload_keeps_original_bytes_and_mime() {
        let bytes = chart_bytes(ImageFormat::Png);
        let uploaded = encode_upload(bytes.clone(), "image/png").expect("valid png");
        assert_eq!(uploaded.bytes(), bytes.as_slice());
        assert_eq!(uploaded.mime_type(), "image/png");
        assert_eq!(uploaded.dimensions(), (24, 16));
    }

    #[test]
    fn jpeg_upload_accepts_mime_parameters_and_case() {
        let uploaded =
            encode_upload(chart_bytes(ImageFormat::Jpeg), " Image/JPEG; q=0.9").expect("valid jpeg");
        assert_eq!(uploaded.mime_type(), "image/jpeg");
        assert_eq!(uploaded.detected_mime_type(), "image/jpeg");
    }

    #[test]
    fn jpg_and_pjpeg_aliases_resolve_to_jpeg() {
        for alias in ["image/jpg", "image/pjpeg"] {
            let uploaded =
                encode_upload(chart_bytes(ImageFormat::Jpeg), alias).expect("decodable jpeg");
            assert_eq!(uploaded.mime_type(), "image/jpeg");
        }
    }

    #[test]
    fn declared_mime_is_forwarded_even_when_container_differs() {
        let uploaded =
            encode_upload(chart_bytes(ImageFormat::Png), "image/jpeg").expect("decodable");
        assert_eq!(uploaded.mime_type(), "image/jpeg");
        assert_eq!(uploaded.detected_mime_type(), "image/png");
    }

    #[test]
    fn corrupted_stream_is_invalid_image() {
        let err = encode_upload(b"definitely not a chart".to_vec(), "image/png").unwrap_err();
        assert_eq!(err.kind(), FailureKind::InvalidImage);

        let mut truncated = chart_bytes(ImageFormat::Png);
        truncated.truncate(40);
        let err = encode_upload(truncated, "image/png").unwrap_err();
        assert_eq!(err.kind(), FailureKind::InvalidImage);
    }

    #[test]
    fn empty_and_unsupported_uploads_are_rejected() {
        let err = encode_upload(Vec::new(), "image/png").unwrap_err();
        assert_eq!(err.detail(), "upload is empty");

        let err = encode_upload(chart_bytes(ImageFormat::Png), "image/gif").unwrap_err();
        assert!(err.detail().contains("unsupported image type 'image/gif'"));
    }

    #[test]
    fn digest_hashes_bytes_without_embedding_them() {
        let uploaded = encode_upload(chart_bytes(ImageFormat::Png), "image/png").expect("valid");
        let digest = uploaded.digest();
        assert_eq!(digest.byte_len, uploaded.bytes().len() as u64);
        assert_eq!(digest.sha256.len(), 64);
        assert_eq!((digest.width, digest.height), (24, 16));
    }

    #[test]
    fn mime_for_path_covers_supported_extensions() {
        assert_eq!(mime_for_path(Path::new("chart.PNG")), Some("image/png"));
        assert_eq!(mime_for_path(Path::new("chart.jpg")), Some("image/jpeg"));
        assert_eq!(mime_for_path(Path::new("chart.webp")), None);
    }
}
