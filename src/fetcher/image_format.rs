//! Image type detection from leading bytes.

use std::path::Path;
use tokio::io::AsyncReadExt;

/// Fewer bytes than this can't hold any supported signature.
pub const MIN_SIGNATURE_LEN: usize = 4;

/// Image formats accepted from the metadata service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpeg,
    Gif,
    Bmp,
    Tiff,
    Webp,
}

impl ImageFormat {
    /// Detects the format from the first bytes of a payload.
    pub fn detect(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < MIN_SIGNATURE_LEN {
            return None;
        }
        let kind = infer::get(bytes)?;
        match kind.mime_type() {
            "image/png" => Some(ImageFormat::Png),
            "image/jpeg" => Some(ImageFormat::Jpeg),
            "image/gif" => Some(ImageFormat::Gif),
            "image/bmp" => Some(ImageFormat::Bmp),
            "image/tiff" => Some(ImageFormat::Tiff),
            "image/webp" => Some(ImageFormat::Webp),
            _ => None,
        }
    }

    /// Detects the format of a file on disk. Missing or unreadable files
    /// yield `None`.
    pub async fn detect_file(path: &Path) -> Option<Self> {
        let mut file = tokio::fs::File::open(path).await.ok()?;
        let mut buffer = [0u8; 64];
        let mut read = 0;
        while read < buffer.len() {
            let n = file.read(&mut buffer[read..]).await.ok()?;
            if n == 0 {
                break;
            }
            read += n;
        }
        Self::detect(&buffer[..read])
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpg",
            ImageFormat::Gif => "gif",
            ImageFormat::Bmp => "bmp",
            ImageFormat::Tiff => "tiff",
            ImageFormat::Webp => "webp",
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub const PNG_BYTES: &[u8] = &[
        0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, b'I', b'H', b'D',
        b'R',
    ];
    pub const JPEG_BYTES: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F'];
    pub const GIF_BYTES: &[u8] = b"GIF89a\x01\x00\x01\x00";

    #[test]
    fn test_detects_common_formats() {
        assert_eq!(ImageFormat::detect(PNG_BYTES), Some(ImageFormat::Png));
        assert_eq!(ImageFormat::detect(JPEG_BYTES), Some(ImageFormat::Jpeg));
        assert_eq!(ImageFormat::detect(GIF_BYTES), Some(ImageFormat::Gif));
    }

    #[test]
    fn test_short_or_unknown_payload_is_rejected() {
        assert_eq!(ImageFormat::detect(&[0x89, b'P', b'N']), None);
        assert_eq!(ImageFormat::detect(&[]), None);
        assert_eq!(ImageFormat::detect(b"plain text, not an image"), None);
    }

    #[test]
    fn test_extensions() {
        assert_eq!(ImageFormat::Png.extension(), "png");
        assert_eq!(ImageFormat::Jpeg.extension(), "jpg");
        assert_eq!(ImageFormat::Webp.extension(), "webp");
    }

    #[tokio::test]
    async fn test_detect_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cover.png");
        std::fs::write(&path, PNG_BYTES).unwrap();
        assert_eq!(ImageFormat::detect_file(&path).await, Some(ImageFormat::Png));
        assert_eq!(
            ImageFormat::detect_file(&dir.path().join("missing.png")).await,
            None
        );
    }
}
