//! Input resolution: turn a user-supplied image reference into bytes.
//!
//! The capture surface may hand us a file path, an HTTP(S) URL, a `data:`
//! URI, or bare base64 (what a browser `FileReader` produces). All four end
//! up as the same [`LoadedImage`] so the rest of the pipeline never cares
//! where the picture came from.

use crate::error::ScanError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::path::PathBuf;
use tracing::{debug, info};

/// Raw image bytes plus a note on where they came from.
#[derive(Debug, Clone)]
pub struct LoadedImage {
    pub bytes: Vec<u8>,
    /// MIME type declared by the source (data-URI prefix or HTTP header), if any.
    pub declared_mime: Option<String>,
    pub origin: ImageOrigin,
}

/// Where an image was loaded from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageOrigin {
    File(PathBuf),
    Url(String),
    Inline,
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Check if the input string is a `data:` URI.
pub fn is_data_uri(input: &str) -> bool {
    input.starts_with("data:")
}

/// Resolve the input string to image bytes.
///
/// Order: URL, data URI, existing file, bare base64. Anything else is
/// reported as a missing file, since that is by far the likeliest mistake.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<LoadedImage, ScanError> {
    let input = input.trim();
    if is_url(input) {
        return download_url(input, timeout_secs).await;
    }
    if is_data_uri(input) {
        return decode_data_uri(input);
    }

    let path = PathBuf::from(input);
    if path.exists() {
        return read_local(path).await;
    }

    if looks_like_base64(input) {
        return decode_base64(input, None);
    }

    Err(ScanError::ImageNotFound { path })
}

/// Decode bare base64, as handed over by a browser capture surface.
pub fn decode_base64(b64: &str, mime: Option<&str>) -> Result<LoadedImage, ScanError> {
    let cleaned: String = b64.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    let bytes = STANDARD
        .decode(cleaned.as_bytes())
        .map_err(|e| ScanError::InvalidImage {
            detail: format!("base64 payload does not decode: {e}"),
        })?;
    if bytes.is_empty() {
        return Err(ScanError::InvalidImage {
            detail: "image payload is empty".into(),
        });
    }
    debug!("Decoded inline image: {} bytes", bytes.len());
    Ok(LoadedImage {
        bytes,
        declared_mime: mime.map(str::to_string),
        origin: ImageOrigin::Inline,
    })
}

/// Decode `data:image/jpeg;base64,....`.
fn decode_data_uri(uri: &str) -> Result<LoadedImage, ScanError> {
    let rest = &uri["data:".len()..];
    let (header, payload) = rest.split_once(',').ok_or_else(|| ScanError::InvalidImage {
        detail: "data URI has no ',' separator".into(),
    })?;
    let Some(mime) = header.strip_suffix(";base64") else {
        return Err(ScanError::InvalidImage {
            detail: "only base64 data URIs are supported".into(),
        });
    };
    let mime = (!mime.is_empty()).then_some(mime);
    decode_base64(payload, mime)
}

async fn read_local(path: PathBuf) -> Result<LoadedImage, ScanError> {
    let bytes = tokio::fs::read(&path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => ScanError::ImageNotFound { path: path.clone() },
        _ => ScanError::InvalidImage {
            detail: format!("cannot read '{}': {e}", path.display()),
        },
    })?;
    if bytes.is_empty() {
        return Err(ScanError::InvalidImage {
            detail: format!("'{}' is empty", path.display()),
        });
    }
    debug!("Read local image {}: {} bytes", path.display(), bytes.len());
    Ok(LoadedImage {
        bytes,
        declared_mime: None,
        origin: ImageOrigin::File(path),
    })
}

/// Download a URL into memory.
async fn download_url(url: &str, timeout_secs: u64) -> Result<LoadedImage, ScanError> {
    info!("Downloading image from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| ScanError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| ScanError::DownloadFailed {
            url: url.to_string(),
            reason: if e.is_timeout() {
                format!("timed out after {timeout_secs}s")
            } else {
                e.to_string()
            },
        })?;

    if !response.status().is_success() {
        return Err(ScanError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let declared_mime = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(';').next().unwrap_or(v).trim().to_string());

    let bytes = response
        .bytes()
        .await
        .map_err(|e| ScanError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    info!("Downloaded {} bytes", bytes.len());

    Ok(LoadedImage {
        bytes: bytes.to_vec(),
        declared_mime,
        origin: ImageOrigin::Url(url.to_string()),
    })
}

/// Heuristic for bare base64: long, and only base64 alphabet characters.
fn looks_like_base64(input: &str) -> bool {
    input.len() >= 64
        && input
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '/' | '=' | '\n' | '\r'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/receipt.jpg"));
        assert!(is_url("http://example.com/receipt.jpg"));
        assert!(!is_url("/tmp/receipt.jpg"));
        assert!(!is_url("receipt.jpg"));
        assert!(!is_url(""));
    }

    #[test]
    fn decodes_data_uri() {
        let b64 = STANDARD.encode(b"\xFF\xD8\xFFhello");
        let img = decode_data_uri(&format!("data:image/jpeg;base64,{b64}")).unwrap();
        assert_eq!(img.declared_mime.as_deref(), Some("image/jpeg"));
        assert_eq!(img.origin, ImageOrigin::Inline);
        assert_eq!(&img.bytes[..3], b"\xFF\xD8\xFF");
    }

    #[test]
    fn rejects_non_base64_data_uri() {
        let err = decode_data_uri("data:text/plain,hello").unwrap_err();
        assert!(matches!(err, ScanError::InvalidImage { .. }));
    }

    #[test]
    fn decode_base64_ignores_whitespace() {
        let b64 = STANDARD.encode([1u8, 2, 3, 4, 5, 6]);
        let wrapped = format!("{}\n{}", &b64[..4], &b64[4..]);
        let img = decode_base64(&wrapped, None).unwrap();
        assert_eq!(img.bytes, vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn decode_base64_rejects_garbage() {
        assert!(decode_base64("***", None).is_err());
        assert!(decode_base64("", None).is_err());
    }

    #[tokio::test]
    async fn missing_file_is_reported() {
        let err = resolve_input("/definitely/not/a/receipt.jpg", 5)
            .await
            .unwrap_err();
        assert!(matches!(err, ScanError::ImageNotFound { .. }));
    }

    #[tokio::test]
    async fn reads_local_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("r.jpg");
        std::fs::write(&path, b"\xFF\xD8\xFFdata").unwrap();
        let img = resolve_input(path.to_str().unwrap(), 5).await.unwrap();
        assert_eq!(img.origin, ImageOrigin::File(path));
        assert_eq!(img.bytes.len(), 7);
    }

    #[tokio::test]
    async fn bare_base64_is_accepted() {
        let b64 = STANDARD.encode(vec![7u8; 96]);
        let img = resolve_input(&b64, 5).await.unwrap();
        assert_eq!(img.bytes.len(), 96);
    }
}
