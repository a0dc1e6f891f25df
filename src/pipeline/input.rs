//! Input resolution: read a user-supplied path or URL into memory.
//!
//! pdfium can open a byte slice directly, so nothing is written to disk:
//! local files are read, URLs are downloaded, and both are checked against
//! `max_input_bytes` and the `%PDF` magic bytes before any parsing happens.

use crate::error::AnalysisError;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

/// Raw PDF bytes plus the name they were loaded from.
#[derive(Debug, Clone)]
pub struct ResolvedInput {
    pub source: String,
    pub bytes: Vec<u8>,
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve the input string to in-memory PDF bytes.
pub async fn resolve_input(
    input: &str,
    timeout_secs: u64,
    max_bytes: u64,
) -> Result<ResolvedInput, AnalysisError> {
    let resolved = if is_url(input) {
        download_url(input, timeout_secs, max_bytes).await?
    } else {
        read_local(input, max_bytes).await?
    };
    validate_pdf_bytes(&resolved.source, &resolved.bytes, max_bytes)?;
    Ok(resolved)
}

/// Enforce the size limit and the `%PDF` magic bytes.
pub fn validate_pdf_bytes(source: &str, bytes: &[u8], max_bytes: u64) -> Result<(), AnalysisError> {
    let size = bytes.len() as u64;
    if size > max_bytes {
        return Err(AnalysisError::InputTooLarge {
            input: source.to_string(),
            size,
            limit: max_bytes,
        });
    }
    if bytes.len() < 4 || &bytes[..4] != b"%PDF" {
        let mut magic = [0u8; 4];
        let n = bytes.len().min(4);
        magic[..n].copy_from_slice(&bytes[..n]);
        return Err(AnalysisError::NotAPdf {
            input: source.to_string(),
            magic,
        });
    }
    Ok(())
}

/// Read a local file, checking the size before reading it.
async fn read_local(path_str: &str, max_bytes: u64) -> Result<ResolvedInput, AnalysisError> {
    let path = PathBuf::from(path_str);

    let meta = tokio::fs::metadata(&path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::PermissionDenied => AnalysisError::PermissionDenied { path: path.clone() },
        _ => AnalysisError::FileNotFound { path: path.clone() },
    })?;
    if !meta.is_file() {
        return Err(AnalysisError::FileNotFound { path });
    }
    if meta.len() > max_bytes {
        return Err(AnalysisError::InputTooLarge {
            input: path_str.to_string(),
            size: meta.len(),
            limit: max_bytes,
        });
    }

    let bytes = tokio::fs::read(&path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::PermissionDenied => AnalysisError::PermissionDenied { path: path.clone() },
        _ => AnalysisError::FileNotFound { path: path.clone() },
    })?;

    debug!("Read local PDF: {} ({} bytes)", path.display(), bytes.len());
    Ok(ResolvedInput {
        source: path_str.to_string(),
        bytes,
    })
}

/// Download a URL into memory.
async fn download_url(
    url: &str,
    timeout_secs: u64,
    max_bytes: u64,
) -> Result<ResolvedInput, AnalysisError> {
    info!("Downloading PDF from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| AnalysisError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let transfer_error = |e: reqwest::Error| {
        if e.is_timeout() {
            AnalysisError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            AnalysisError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    };

    let mut response = client.get(url).send().await.map_err(transfer_error)?;

    if !response.status().is_success() {
        return Err(AnalysisError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    if let Some(len) = response.content_length() {
        if len > max_bytes {
            return Err(AnalysisError::InputTooLarge {
                input: url.to_string(),
                size: len,
                limit: max_bytes,
            });
        }
    }

    // Content-Length is absent for chunked bodies; enforce the cap as we go.
    let mut bytes: Vec<u8> = Vec::new();
    while let Some(chunk) = response.chunk().await.map_err(transfer_error)? {
        let size = (bytes.len() + chunk.len()) as u64;
        if size > max_bytes {
            return Err(AnalysisError::InputTooLarge {
                input: url.to_string(),
                size,
                limit: max_bytes,
            });
        }
        bytes.extend_from_slice(&chunk);
    }

    info!("Downloaded {} bytes", bytes.len());
    Ok(ResolvedInput {
        source: url.to_string(),
        bytes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Answer one GET with `response` verbatim and return the URL.
    async fn serve_once(response: Vec<u8>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let _ = socket.read(&mut buf).await;
            let _ = socket.write_all(&response).await;
            let _ = socket.shutdown().await;
        });
        format!("http://{addr}/annual-report.pdf")
    }

    fn chunked(chunks: &[&[u8]]) -> Vec<u8> {
        let mut out =
            b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n".to_vec();
        for c in chunks {
            out.extend_from_slice(format!("{:x}\r\n", c.len()).as_bytes());
            out.extend_from_slice(c);
            out.extend_from_slice(b"\r\n");
        }
        out.extend_from_slice(b"0\r\n\r\n");
        out
    }

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/annual-report.pdf"));
        assert!(is_url("http://example.com/annual-report.pdf"));
        assert!(!is_url("/tmp/annual-report.pdf"));
        assert!(!is_url("annual-report.pdf"));
        assert!(!is_url(""));
    }

    #[test]
    fn validate_rejects_non_pdf() {
        let err = validate_pdf_bytes("x.pdf", b"PK\x03\x04rest", 1024).unwrap_err();
        match err {
            AnalysisError::NotAPdf { magic, .. } => assert_eq!(&magic, b"PK\x03\x04"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn validate_rejects_short_input() {
        assert!(matches!(
            validate_pdf_bytes("x.pdf", b"%P", 1024),
            Err(AnalysisError::NotAPdf { .. })
        ));
    }

    #[test]
    fn validate_enforces_limit() {
        let err = validate_pdf_bytes("x.pdf", b"%PDF-1.7 padding", 8).unwrap_err();
        assert!(matches!(err, AnalysisError::InputTooLarge { size: 16, limit: 8, .. }));
    }

    #[tokio::test]
    async fn missing_file_is_file_not_found() {
        let err = resolve_input("/definitely/not/here.pdf", 5, 1024)
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::FileNotFound { .. }));
    }

    #[tokio::test]
    async fn local_file_over_limit_is_rejected_before_read() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"%PDF-1.7\n").unwrap();
        tmp.write_all(&[b' '; 64]).unwrap();
        let path = tmp.path().to_string_lossy().to_string();

        let err = resolve_input(&path, 5, 16).await.unwrap_err();
        assert!(matches!(err, AnalysisError::InputTooLarge { .. }));

        let ok = resolve_input(&path, 5, 1024).await.unwrap();
        assert!(ok.bytes.starts_with(b"%PDF"));
    }

    #[tokio::test]
    async fn chunked_download_stops_at_limit() {
        let block = [b'x'; 64];
        let body = [b"%PDF-1.7\n".as_slice(), &block[..], &block[..], &block[..]];
        let url = serve_once(chunked(&body)).await;

        let err = resolve_input(&url, 5, 100).await.unwrap_err();
        match err {
            AnalysisError::InputTooLarge { size, limit, .. } => {
                assert_eq!(limit, 100);
                assert!(size > 100 && size <= 9 + 3 * 64);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn chunked_download_under_limit_is_read_whole() {
        let url = serve_once(chunked(&[b"%PDF-1.7\n".as_slice(), b"body".as_slice()])).await;

        let ok = resolve_input(&url, 5, 1024).await.unwrap();
        assert_eq!(ok.bytes, b"%PDF-1.7\nbody");
        assert_eq!(ok.source, url);
    }
}
