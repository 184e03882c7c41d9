//! Document extraction for PDF, plain text and Markdown files

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::types::{DocumentFormat, ExtractedDocument, PageText};

/// Upper bound for whole-document PDF extraction
const PDF_EXTRACT_TIMEOUT: Duration = Duration::from_secs(60);

/// Whole-document extractions allowed to run at once, including timed-out ones
const MAX_STALLED_PDF_EXTRACTIONS: usize = 4;

static PDF_EXTRACTIONS_RUNNING: AtomicUsize = AtomicUsize::new(0);

/// Replace characters PDF fonts commonly emit that embed poorly
fn cleanup_pdf_text(text: &str) -> String {
    let cleaned = text
        .replace('\0', "")
        .replace('\u{00A0}', " ")
        .replace('\u{FB00}', "ff")
        .replace('\u{FB01}', "fi")
        .replace('\u{FB02}', "fl")
        .replace('\u{FB03}', "ffi")
        .replace('\u{FB04}', "ffl")
        .replace('\u{2010}', "-")
        .replace('\u{2011}', "-");

    cleaned
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Converts document files into page-ordered text
pub struct DocumentExtractor;

impl DocumentExtractor {
    /// Read and extract a single file
    pub fn extract_file(path: &Path) -> Result<ExtractedDocument> {
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        let data = std::fs::read(path)?;
        Self::extract(&filename, &data)
    }

    /// Extract text from in-memory file contents, dispatching on the extension
    pub fn extract(filename: &str, data: &[u8]) -> Result<ExtractedDocument> {
        let format = DocumentFormat::from_path(Path::new(filename))
            .ok_or_else(|| Error::UnsupportedFileType(filename.to_string()))?;

        let pages = match format {
            DocumentFormat::Pdf => Self::extract_pdf(filename, data)?,
            DocumentFormat::Txt | DocumentFormat::Markdown => Self::extract_text(filename, data)?,
        };

        tracing::debug!(
            "Extracted {} ({}): {} pages",
            filename,
            format.display_name(),
            pages.len()
        );

        Ok(ExtractedDocument {
            source: filename.to_string(),
            format,
            pages,
        })
    }

    fn extract_text(filename: &str, data: &[u8]) -> Result<Vec<PageText>> {
        let text = match std::str::from_utf8(data) {
            Ok(s) => s.to_string(),
            Err(_) => {
                tracing::warn!("{} is not valid UTF-8, replacing invalid bytes", filename);
                String::from_utf8_lossy(data).into_owned()
            }
        };

        Ok(vec![PageText {
            page_number: None,
            text: text.replace("\r\n", "\n"),
        }])
    }

    /// Page-by-page extraction, with whole-document extraction as the fallback
    fn extract_pdf(filename: &str, data: &[u8]) -> Result<Vec<PageText>> {
        match Self::extract_pdf_pages(data) {
            Ok(pages) if pages.iter().any(|p| !p.text.trim().is_empty()) => return Ok(pages),
            Ok(_) => tracing::debug!("{}: per-page extraction found no text", filename),
            Err(e) => tracing::debug!("{}: per-page extraction failed: {}", filename, e),
        }

        let text = Self::extract_pdf_with_timeout(filename, data)?;
        let pages: Vec<PageText> = if text.contains('\u{c}') {
            // Form feeds mark page breaks
            text.split('\u{c}')
                .enumerate()
                .map(|(i, page)| PageText {
                    page_number: Some(i as u32 + 1),
                    text: cleanup_pdf_text(page),
                })
                .collect()
        } else {
            vec![PageText {
                page_number: None,
                text: cleanup_pdf_text(&text),
            }]
        };

        if pages.iter().all(|p| p.text.trim().is_empty()) {
            return Err(Error::file_parse(
                filename,
                "no extractable text; the PDF may be scanned and OCR is not supported",
            ));
        }

        Ok(pages)
    }

    fn extract_pdf_pages(data: &[u8]) -> std::result::Result<Vec<PageText>, lopdf::Error> {
        let doc = lopdf::Document::load_mem(data)?;
        let mut pages = Vec::new();

        for page_number in doc.get_pages().into_keys() {
            let text = match doc.extract_text(&[page_number]) {
                Ok(text) => cleanup_pdf_text(&text),
                Err(e) => {
                    tracing::debug!("Could not extract page {}: {}", page_number, e);
                    String::new()
                }
            };
            pages.push(PageText {
                page_number: Some(page_number),
                text,
            });
        }

        Ok(pages)
    }

    /// Run pdf-extract on its own thread so a pathological font cannot hang ingestion.
    ///
    /// A thread that times out cannot be stopped and keeps its copy of the PDF until
    /// pdf-extract returns, so at most `MAX_STALLED_PDF_EXTRACTIONS` may be outstanding.
    fn extract_pdf_with_timeout(filename: &str, data: &[u8]) -> Result<String> {
        let Some(slot) = ExtractionSlot::claim() else {
            return Err(Error::file_parse(
                filename,
                "too many earlier PDF extractions are still running; retry once they finish",
            ));
        };

        let data = data.to_vec();
        let name = filename.to_string();
        let (tx, rx) = mpsc::channel();

        thread::Builder::new()
            .name("pdf-extract".into())
            .spawn(move || {
                let _slot = slot;
                let result = pdf_extract::extract_text_from_mem(&data);
                if tx.send(result).is_err() {
                    tracing::warn!("PDF extraction of {} finished after its timeout; result discarded", name);
                }
            })
            .map_err(|e| Error::file_parse(filename, format!("could not start extraction: {}", e)))?;

        match rx.recv_timeout(PDF_EXTRACT_TIMEOUT) {
            Ok(Ok(text)) => Ok(text),
            Ok(Err(e)) => Err(Error::file_parse(filename, format!("failed to read PDF: {}", e))),
            Err(mpsc::RecvTimeoutError::Timeout) => {
                tracing::warn!(
                    "PDF extraction of {} timed out after {:?}; its thread is left to finish",
                    filename,
                    PDF_EXTRACT_TIMEOUT
                );
                Err(Error::file_parse(
                    filename,
                    format!("extraction timed out after {:?}", PDF_EXTRACT_TIMEOUT),
                ))
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                Err(Error::file_parse(filename, "PDF extraction crashed"))
            }
        }
    }
}

/// One running whole-document PDF extraction, released on drop
struct ExtractionSlot;

impl ExtractionSlot {
    fn claim() -> Option<Self> {
        let claimed = PDF_EXTRACTIONS_RUNNING.fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
            (n < MAX_STALLED_PDF_EXTRACTIONS).then_some(n + 1)
        });
        claimed.ok().map(|_| Self)
    }
}

impl Drop for ExtractionSlot {
    fn drop(&mut self) {
        PDF_EXTRACTIONS_RUNNING.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Eligible document files directly inside `dir`, sorted by file name
pub fn list_documents(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(Error::not_found(
            format!("Data directory '{}'", dir.display()),
            "Create it and add the regulatory documents (.pdf, .txt, .md) to index.",
        ));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|e| Error::Io(e.into()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        if DocumentFormat::from_path(entry.path()).is_some() {
            files.push(entry.into_path());
        } else {
            tracing::debug!("Skipping {}: unsupported extension", entry.path().display());
        }
    }

    if files.is_empty() {
        return Err(Error::EmptyCorpus(dir.to_path_buf()));
    }

    Ok(files)
}

/// Extract every eligible document in `dir`, failing on the first unreadable one
pub fn load_directory(dir: &Path) -> Result<Vec<ExtractedDocument>> {
    let files = list_documents(dir)?;
    tracing::info!("Loading {} documents from {}", files.len(), dir.display());

    files
        .iter()
        .map(|path| DocumentExtractor::extract_file(path))
        .collect()
}
