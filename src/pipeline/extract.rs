//! Text, table and metadata extraction via pdfium.
//!
//! ## Why spawn_blocking?
//!
//! `pdfium-render` wraps the pdfium C++ library, which is CPU-bound and not
//! async-aware. All pdfium work runs on the blocking pool so Tokio worker
//! threads never stall while a large report is parsed.
//!
//! The extractor sits behind [`DocumentExtractor`] so callers (and tests)
//! can supply text and tables from another source.

use crate::error::AnalysisError;
use crate::output::{DocumentMetadata, ExtractedDocument};
use crate::pipeline::tables::detect_tables;
use async_trait::async_trait;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Turns raw PDF bytes into text, tables and metadata.
#[async_trait]
pub trait DocumentExtractor: Send + Sync {
    /// `source` is only used in error messages.
    async fn extract(&self, bytes: Vec<u8>, source: &str) -> Result<ExtractedDocument, AnalysisError>;

    /// Metadata only; the default runs a full extraction.
    async fn metadata(&self, bytes: Vec<u8>, source: &str) -> Result<DocumentMetadata, AnalysisError> {
        Ok(self.extract(bytes, source).await?.metadata)
    }
}

/// pdfium-backed extractor.
#[derive(Debug, Clone, Default)]
pub struct PdfiumExtractor {
    lib_path: Option<PathBuf>,
    password: Option<String>,
}

impl PdfiumExtractor {
    pub fn new(lib_path: Option<PathBuf>, password: Option<String>) -> Self {
        Self { lib_path, password }
    }
}

#[async_trait]
impl DocumentExtractor for PdfiumExtractor {
    async fn extract(&self, bytes: Vec<u8>, source: &str) -> Result<ExtractedDocument, AnalysisError> {
        let lib_path = self.lib_path.clone();
        let password = self.password.clone();
        let source = source.to_string();

        tokio::task::spawn_blocking(move || {
            extract_blocking(&bytes, &source, lib_path.as_deref(), password.as_deref())
        })
        .await
        .map_err(|e| AnalysisError::Internal(format!("Extraction task panicked: {}", e)))?
    }

    async fn metadata(&self, bytes: Vec<u8>, source: &str) -> Result<DocumentMetadata, AnalysisError> {
        let lib_path = self.lib_path.clone();
        let password = self.password.clone();
        let source = source.to_string();

        tokio::task::spawn_blocking(move || {
            let pdfium = bind_pdfium(lib_path.as_deref())?;
            let document = open_document(&pdfium, &bytes, &source, password.as_deref())?;
            Ok(read_metadata(&document))
        })
        .await
        .map_err(|e| AnalysisError::Internal(format!("Metadata task panicked: {}", e)))?
    }
}

/// Bind to pdfium in `lib_path`, else the working directory, else the
/// system library path.
fn bind_pdfium(lib_path: Option<&Path>) -> Result<Pdfium, AnalysisError> {
    let bindings = match lib_path {
        Some(dir) => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(dir)),
        None => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library()),
    }
    .map_err(|e| AnalysisError::PdfiumBindingFailed(format!("{:?}", e)))?;
    Ok(Pdfium::new(bindings))
}

fn open_document<'a>(
    pdfium: &'a Pdfium,
    bytes: &'a [u8],
    source: &str,
    password: Option<&'a str>,
) -> Result<PdfDocument<'a>, AnalysisError> {
    pdfium.load_pdf_from_byte_slice(bytes, password).map_err(|e| {
        let err_str = format!("{:?}", e);
        if err_str.contains("Password") || err_str.contains("password") {
            if password.is_some() {
                AnalysisError::WrongPassword {
                    input: source.to_string(),
                }
            } else {
                AnalysisError::PasswordRequired {
                    input: source.to_string(),
                }
            }
        } else {
            AnalysisError::CorruptPdf {
                input: source.to_string(),
                detail: err_str,
            }
        }
    })
}

/// Blocking implementation of extraction.
fn extract_blocking(
    bytes: &[u8],
    source: &str,
    lib_path: Option<&Path>,
    password: Option<&str>,
) -> Result<ExtractedDocument, AnalysisError> {
    let pdfium = bind_pdfium(lib_path)?;
    let document = open_document(&pdfium, bytes, source, password)?;

    let metadata = read_metadata(&document);
    info!("PDF loaded: {} pages", metadata.page_count);

    let mut page_texts = Vec::with_capacity(metadata.page_count);
    let mut tables = Vec::new();

    for (idx, page) in document.pages().iter().enumerate() {
        let page_num = idx + 1;
        let text = page
            .text()
            .map_err(|e| AnalysisError::ExtractionFailed {
                page: page_num,
                detail: format!("{:?}", e),
            })?
            .all();
        let found = detect_tables(&text, page_num);
        debug!(
            "Page {}: {} chars, {} tables",
            page_num,
            text.len(),
            found.len()
        );
        tables.extend(found);
        page_texts.push(text);
    }

    Ok(ExtractedDocument {
        text: join_pages(&page_texts),
        tables,
        metadata,
    })
}

/// Join page texts, each followed by a newline.
pub fn join_pages(pages: &[String]) -> String {
    let mut out = String::with_capacity(pages.iter().map(|p| p.len() + 1).sum());
    for page in pages {
        out.push_str(page);
        out.push('\n');
    }
    out
}

fn read_metadata(document: &PdfDocument<'_>) -> DocumentMetadata {
    let metadata = document.metadata();

    let get_meta = |tag: PdfDocumentMetadataTagType| -> Option<String> {
        metadata.get(tag).and_then(|t| {
            let v = t.value().trim().to_string();
            if v.is_empty() {
                None
            } else {
                Some(v)
            }
        })
    };

    DocumentMetadata {
        title: get_meta(PdfDocumentMetadataTagType::Title),
        author: get_meta(PdfDocumentMetadataTagType::Author),
        subject: get_meta(PdfDocumentMetadataTagType::Subject),
        creator: get_meta(PdfDocumentMetadataTagType::Creator),
        producer: get_meta(PdfDocumentMetadataTagType::Producer),
        creation_date: get_meta(PdfDocumentMetadataTagType::CreationDate),
        page_count: document.pages().len() as usize,
        pdf_version: format!("{:?}", document.version()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_pages_terminates_each_page() {
        let joined = join_pages(&["one".to_string(), "two".to_string()]);
        assert_eq!(joined, "one\ntwo\n");
        assert_eq!(join_pages(&[]), "");
    }

    #[test]
    fn extractor_is_object_safe() {
        let _boxed: Box<dyn DocumentExtractor> = Box::new(PdfiumExtractor::default());
    }
}
