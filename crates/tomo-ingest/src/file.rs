//! Text extraction for the supported document containers.
//!
//! Every container is normalized into one contiguous UTF-8 buffer; byte
//! offsets into that buffer are what chapter detection and paging work on.

use std::io::Read;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;

use quick_xml::events::Event;
use quick_xml::Reader;
use tomo_core::{Document, Error, Result};
use tracing::debug;

/// Supported document formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Txt,
    Pdf,
    Docx,
}

impl FileType {
    /// Select the format from a file extension. `None` means unsupported.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "txt" => Some(Self::Txt),
            "pdf" => Some(Self::Pdf),
            "docx" => Some(Self::Docx),
            _ => None,
        }
    }

    /// Format of the file at `path`, by extension.
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        Self::from_extension(ext).ok_or_else(|| {
            Error::UnsupportedFormat(if ext.is_empty() {
                path.display().to_string()
            } else {
                format!(".{}", ext)
            })
        })
    }

    /// Extractor implementing this format.
    pub fn extractor(&self) -> &'static dyn TextExtractor {
        match self {
            Self::Txt => &TxtExtractor,
            Self::Pdf => &PdfExtractor,
            Self::Docx => &DocxExtractor,
        }
    }
}

/// Turns one container format into plain text.
pub trait TextExtractor: Send + Sync {
    fn extract(&self, path: &Path) -> Result<String>;
}

/// UTF-8 plain text; a leading byte-order mark is dropped.
pub struct TxtExtractor;

impl TextExtractor for TxtExtractor {
    fn extract(&self, path: &Path) -> Result<String> {
        let bytes = std::fs::read(path)?;
        let bytes = bytes
            .strip_prefix(&[0xEF, 0xBB, 0xBF])
            .unwrap_or(bytes.as_slice());
        String::from_utf8(bytes.to_vec())
            .map_err(|e| Error::Extraction(format!("{}: not valid UTF-8: {}", path.display(), e)))
    }
}

/// PDF via `pdf-extract`; pages are joined by the newlines it emits.
pub struct PdfExtractor;

impl TextExtractor for PdfExtractor {
    fn extract(&self, path: &Path) -> Result<String> {
        // pdf_extract can panic on malformed PDFs.
        let result = catch_unwind(AssertUnwindSafe(|| pdf_extract::extract_text(path)));
        match result {
            Ok(Ok(text)) => Ok(text),
            Ok(Err(e)) => Err(Error::Extraction(format!("{}: {}", path.display(), e))),
            Err(_) => Err(Error::Extraction(format!(
                "{}: PDF parser panicked on malformed input",
                path.display()
            ))),
        }
    }
}

/// DOCX: paragraphs of `word/document.xml`, one per line.
pub struct DocxExtractor;

impl TextExtractor for DocxExtractor {
    fn extract(&self, path: &Path) -> Result<String> {
        let file = std::fs::File::open(path)?;
        let mut archive = zip::ZipArchive::new(file)
            .map_err(|e| Error::Extraction(format!("{}: {}", path.display(), e)))?;
        let mut entry = archive
            .by_name("word/document.xml")
            .map_err(|e| Error::Extraction(format!("{}: {}", path.display(), e)))?;
        let mut xml = String::new();
        entry.read_to_string(&mut xml)?;
        docx_xml_to_text(&xml).map_err(|e| Error::Extraction(format!("{}: {}", path.display(), e)))
    }
}

/// Flatten WordprocessingML body XML into newline-separated paragraphs.
///
/// Only text inside `w:t` runs is kept; `w:tab` becomes a tab and `w:br`/`w:cr`
/// a newline. A paragraph nested in another (text boxes) is emitted as its own
/// line when it closes.
pub fn docx_xml_to_text(xml: &str) -> Result<String> {
    let mut reader = Reader::from_str(xml);
    // xml:space="preserve" runs carry significant whitespace.
    reader.trim_text(false);

    let mut paragraphs: Vec<String> = Vec::new();
    let mut open: Vec<String> = Vec::new();
    let mut in_text = 0usize;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.name().as_ref() {
                b"w:p" => open.push(String::new()),
                b"w:t" => in_text += 1,
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.name().as_ref() {
                b"w:p" => paragraphs.push(String::new()),
                b"w:tab" => push_to(&mut open, "\t"),
                b"w:br" | b"w:cr" => push_to(&mut open, "\n"),
                _ => {}
            },
            Ok(Event::Text(e)) if in_text > 0 => {
                let text = e
                    .unescape()
                    .map_err(|e| Error::Extraction(format!("document.xml: {}", e)))?;
                push_to(&mut open, &text);
            }
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"w:p" => {
                    if let Some(paragraph) = open.pop() {
                        paragraphs.push(paragraph);
                    }
                }
                b"w:t" => in_text = in_text.saturating_sub(1),
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(Error::Extraction(format!(
                    "document.xml at byte {}: {}",
                    reader.buffer_position(),
                    e
                )))
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(paragraphs.join("\n"))
}

/// Append to the innermost open paragraph; text outside paragraphs is dropped.
fn push_to(open: &mut [String], text: &str) {
    if let Some(paragraph) = open.last_mut() {
        paragraph.push_str(text);
    }
}

/// Extract the text of a supported file.
pub fn extract_text(path: &Path) -> Result<String> {
    let file_type = FileType::from_path(path)?;
    debug!("Extracting {:?} text from {}", file_type, path.display());
    file_type.extractor().extract(path)
}

/// Load a document: existence check, format check, extraction, naming.
pub fn load_document(path: &Path) -> Result<Document> {
    if !path.exists() {
        return Err(Error::NotFound(path.display().to_string()));
    }
    let text = extract_text(path)?;
    Ok(Document::from_source(path, text))
}
