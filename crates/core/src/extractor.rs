use crate::error::IngestError;
use lopdf::Document;
use quick_xml::events::Event;
use quick_xml::Reader;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{Cursor, Read};
use std::path::Path;

pub const ALLOWED_EXTENSIONS: [&str; 3] = [
    DocumentFormat::Pdf.extension(),
    DocumentFormat::Docx.extension(),
    DocumentFormat::Text.extension(),
];

/// Upper bound on the decompressed size of `word/document.xml`.
const MAX_DOCX_XML_BYTES: u64 = 50 * 1024 * 1024;

const DOCX_BODY_ENTRY: &str = "word/document.xml";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    Pdf,
    Docx,
    Text,
}

impl DocumentFormat {
    pub const ALL: [DocumentFormat; 3] = [Self::Pdf, Self::Docx, Self::Text];

    /// Picks the format from the declared file name. Content is never sniffed.
    pub fn from_filename(filename: &str) -> Result<Self, IngestError> {
        let extension = Path::new(filename)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .unwrap_or_default();

        Self::from_extension(&extension)
    }

    pub fn from_extension(extension: &str) -> Result<Self, IngestError> {
        let normalized = extension.trim_start_matches('.').to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|format| format.extension() == normalized)
            .ok_or_else(|| {
                IngestError::UnsupportedFormat(if normalized.is_empty() {
                    "(no extension)".to_string()
                } else {
                    normalized
                })
            })
    }

    pub const fn extension(&self) -> &'static str {
        match self {
            DocumentFormat::Pdf => "pdf",
            DocumentFormat::Docx => "docx",
            DocumentFormat::Text => "txt",
        }
    }

    fn extractor(&self) -> &'static dyn TextExtractor {
        match self {
            DocumentFormat::Pdf => &LopdfExtractor,
            DocumentFormat::Docx => &DocxExtractor,
            DocumentFormat::Text => &PlainTextExtractor,
        }
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

pub trait TextExtractor: Sync {
    fn extract(&self, bytes: &[u8]) -> Result<String, IngestError>;
}

#[derive(Default)]
pub struct LopdfExtractor;

impl TextExtractor for LopdfExtractor {
    fn extract(&self, bytes: &[u8]) -> Result<String, IngestError> {
        let document = Document::load_mem(bytes).map_err(|error| pdf_error(error.to_string()))?;

        // get_pages is keyed by page number, so iteration is in page order.
        let mut text = String::new();
        for (page_no, _page_id) in document.get_pages() {
            let page_text = document
                .extract_text(&[page_no])
                .map_err(|error| pdf_error(format!("page {page_no}: {error}")))?;
            text.push_str(&page_text);
        }

        Ok(text)
    }
}

fn pdf_error(details: String) -> IngestError {
    IngestError::Extraction {
        format: DocumentFormat::Pdf.to_string(),
        details,
    }
}

#[derive(Default)]
pub struct DocxExtractor;

impl TextExtractor for DocxExtractor {
    fn extract(&self, bytes: &[u8]) -> Result<String, IngestError> {
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
            .map_err(|error| docx_error(error.to_string()))?;
        let entry = archive
            .by_name(DOCX_BODY_ENTRY)
            .map_err(|error| docx_error(format!("{DOCX_BODY_ENTRY}: {error}")))?;

        let mut xml = Vec::new();
        entry
            .take(MAX_DOCX_XML_BYTES)
            .read_to_end(&mut xml)
            .map_err(|error| docx_error(error.to_string()))?;
        if xml.len() as u64 >= MAX_DOCX_XML_BYTES {
            return Err(docx_error(format!(
                "{DOCX_BODY_ENTRY} exceeds size limit ({MAX_DOCX_XML_BYTES} bytes)"
            )));
        }

        let paragraphs = docx_paragraphs(&xml).map_err(docx_error)?;
        Ok(paragraphs.join("\n"))
    }
}

fn docx_error(details: String) -> IngestError {
    IngestError::Extraction {
        format: DocumentFormat::Docx.to_string(),
        details,
    }
}

/// Text of every `w:p` in document order. Nested paragraphs (text boxes)
/// are emitted when they close, ahead of their enclosing paragraph.
fn docx_paragraphs(xml: &[u8]) -> Result<Vec<String>, String> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut paragraphs = Vec::new();
    let mut open: Vec<String> = Vec::new();
    let mut in_text = false;
    // Tabs and breaks count only inside a run; `w:pPr/w:tabs` holds tab stops.
    let mut run_depth = 0usize;

    loop {
        match reader
            .read_event_into(&mut buf)
            .map_err(|error| error.to_string())?
        {
            Event::Start(element) => match element.local_name().as_ref() {
                b"p" => open.push(String::new()),
                b"r" => run_depth += 1,
                b"t" => in_text = true,
                _ => {}
            },
            Event::Empty(element) => match element.local_name().as_ref() {
                b"p" => paragraphs.push(String::new()),
                b"tab" if run_depth > 0 => push_to_open(&mut open, "\t"),
                b"br" | b"cr" if run_depth > 0 => push_to_open(&mut open, "\n"),
                _ => {}
            },
            Event::Text(text) if in_text => {
                let unescaped = text.unescape().map_err(|error| error.to_string())?;
                push_to_open(&mut open, &unescaped);
            }
            Event::End(element) => match element.local_name().as_ref() {
                b"p" => {
                    if let Some(paragraph) = open.pop() {
                        paragraphs.push(paragraph);
                    }
                }
                b"r" => run_depth = run_depth.saturating_sub(1),
                b"t" => in_text = false,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(paragraphs)
}

fn push_to_open(open: &mut [String], text: &str) {
    if let Some(current) = open.last_mut() {
        current.push_str(text);
    }
}

#[derive(Default)]
pub struct PlainTextExtractor;

impl TextExtractor for PlainTextExtractor {
    fn extract(&self, bytes: &[u8]) -> Result<String, IngestError> {
        let text = std::str::from_utf8(bytes).map_err(|error| IngestError::Extraction {
            format: DocumentFormat::Text.to_string(),
            details: error.to_string(),
        })?;
        Ok(text.trim_start_matches('\u{feff}').to_string())
    }
}

/// Extracts trimmed plain text. An empty result is returned as-is; callers
/// decide that an empty document is a failure.
pub fn extract_text(bytes: &[u8], format: DocumentFormat) -> Result<String, IngestError> {
    let text = format.extractor().extract(bytes)?;
    Ok(text.trim().to_string())
}

/// Resolves the format from the declared file name, then extracts.
pub fn extract_declared(bytes: &[u8], filename: &str) -> Result<String, IngestError> {
    let format = DocumentFormat::from_filename(filename)?;
    extract_text(bytes, format)
}
