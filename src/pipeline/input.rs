//! Input resolution: turn a user-supplied path or URL into PDF bytes.
//!
//! The pipeline itself only ever sees bytes; this module exists for callers
//! (the CLI, batch jobs) that start from a location rather than a buffer.

use crate::error::ParseError;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve the input string to the PDF's bytes.
///
/// URLs are downloaded with a `timeout_secs` budget; anything else is read
/// as a local file.
pub async fn read_input(input: &str, timeout_secs: u64) -> Result<Vec<u8>, ParseError> {
    if input.trim().is_empty() {
        return Err(ParseError::InvalidInput {
            input: input.to_string(),
        });
    }
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        read_local(input).await
    }
}

async fn read_local(path_str: &str) -> Result<Vec<u8>, ParseError> {
    let path = PathBuf::from(path_str);

    match tokio::fs::read(&path).await {
        Ok(bytes) => {
            debug!("Read local PDF: {} ({} bytes)", path.display(), bytes.len());
            Ok(bytes)
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            Err(ParseError::PermissionDenied { path })
        }
        Err(_) => Err(ParseError::FileNotFound { path }),
    }
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<Vec<u8>, ParseError> {
    info!("Downloading PDF from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| ParseError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            ParseError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            ParseError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(ParseError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| ParseError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    info!("Downloaded {} bytes", bytes.len());
    Ok(bytes.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/doc.pdf"));
        assert!(is_url("http://example.com/doc.pdf"));
        assert!(!is_url("/tmp/doc.pdf"));
        assert!(!is_url("doc.pdf"));
        assert!(!is_url(""));
    }

    #[tokio::test]
    async fn missing_file_is_reported() {
        let err = read_input("/definitely/not/a/real/file.pdf", 5)
            .await
            .unwrap_err();
        assert!(matches!(err, ParseError::FileNotFound { .. }));
    }

    #[tokio::test]
    async fn blank_input_is_invalid() {
        let err = read_input("  ", 5).await.unwrap_err();
        assert!(matches!(err, ParseError::InvalidInput { .. }));
    }

    #[tokio::test]
    async fn reads_local_bytes() {
        let path = std::env::temp_dir().join(format!("pdfparse-input-{}.pdf", std::process::id()));
        tokio::fs::write(&path, b"%PDF-1.4 test").await.unwrap();
        let bytes = read_input(path.to_str().unwrap(), 5).await.unwrap();
        assert_eq!(bytes, b"%PDF-1.4 test");
        tokio::fs::remove_file(&path).await.ok();
    }
}
