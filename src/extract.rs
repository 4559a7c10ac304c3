//! Paged text extraction for ingestible documents.
//!
//! Turns a file into ordered [`PageText`]s for the chunker:
//!
//! | Extension | Pages |
//! |-----------|-------|
//! | `.txt`, `.md` | one page |
//! | `.pdf` | `pdf-extract` text split on form feeds |
//! | `.docx` | paragraphs grouped into pages of about 3000 characters |
//!
//! Any other extension is [`ScanError::UnsupportedFormat`]; read or parse
//! failures are [`ScanError::Extraction`]. Extraction never panics; the
//! ingestion pipeline skips the failing document.

use std::io::Read;
use std::path::Path;

use chunkscan_core::error::ScanError;
use chunkscan_core::models::PageText;

/// DOCX has no stored pagination; paragraphs are grouped until a page
/// holds at least this many characters.
pub const DOCX_CHARS_PER_PAGE: usize = 3000;

/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

const SUPPORTED_EXTENSIONS: &[&str] = &["txt", "md", "pdf", "docx"];

pub fn is_supported(path: &Path) -> bool {
    SUPPORTED_EXTENSIONS.contains(&extension_of(path).as_str())
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase()
}

/// Read `path` and extract its pages.
pub fn extract_pages(path: &Path) -> Result<Vec<PageText>, ScanError> {
    let file = path.display().to_string();
    if !is_supported(path) {
        return Err(ScanError::UnsupportedFormat {
            file,
            extension: extension_of(path),
        });
    }
    let bytes = std::fs::read(path).map_err(|e| ScanError::Extraction {
        file: file.clone(),
        reason: e.to_string(),
    })?;
    extract_pages_from_bytes(&file, &extension_of(path), &bytes)
}

/// Extract pages from in-memory content with a known extension.
pub fn extract_pages_from_bytes(
    file: &str,
    extension: &str,
    bytes: &[u8],
) -> Result<Vec<PageText>, ScanError> {
    let fail = |reason: String| ScanError::Extraction {
        file: file.to_string(),
        reason,
    };

    match extension.to_lowercase().as_str() {
        "txt" | "md" => Ok(vec![PageText::new(
            1,
            String::from_utf8_lossy(bytes).trim().to_string(),
        )]),
        "pdf" => {
            let text = pdf_extract::extract_text_from_mem(bytes)
                .map_err(|e| fail(format!("PDF extraction failed: {}", e)))?;
            Ok(split_form_feeds(&text))
        }
        "docx" => {
            let paragraphs = docx_paragraphs(bytes).map_err(fail)?;
            Ok(paginate_paragraphs(&paragraphs, DOCX_CHARS_PER_PAGE))
        }
        other => Err(ScanError::UnsupportedFormat {
            file: file.to_string(),
            extension: other.to_string(),
        }),
    }
}

/// One page per form-feed separated section, numbered from 1.
fn split_form_feeds(text: &str) -> Vec<PageText> {
    let mut pages: Vec<&str> = text.split('\u{000C}').collect();
    // pdf-extract ends the last page with a form feed too
    if pages.len() > 1 && pages.last().is_some_and(|p| p.trim().is_empty()) {
        pages.pop();
    }
    pages
        .into_iter()
        .enumerate()
        .map(|(i, p)| PageText::new(i as u32 + 1, p))
        .collect()
}

/// Group non-empty paragraphs into pages; a page is closed as soon as its
/// paragraphs total at least `chars_per_page` characters.
pub fn paginate_paragraphs(paragraphs: &[String], chars_per_page: usize) -> Vec<PageText> {
    let mut pages = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut current_len = 0;

    for para in paragraphs {
        let text = para.trim();
        if text.is_empty() {
            continue;
        }
        current.push(text);
        current_len += text.chars().count();
        if current_len >= chars_per_page {
            pages.push(PageText::new(pages.len() as u32 + 1, current.join("\n")));
            current.clear();
            current_len = 0;
        }
    }
    if !current.is_empty() {
        pages.push(PageText::new(pages.len() as u32 + 1, current.join("\n")));
    }
    pages
}

fn docx_paragraphs(bytes: &[u8]) -> Result<Vec<String>, String> {
    let mut archive =
        zip::ZipArchive::new(std::io::Cursor::new(bytes)).map_err(|e| e.to_string())?;
    let entry = archive
        .by_name("word/document.xml")
        .map_err(|_| "word/document.xml not found".to_string())?;

    let mut xml = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut xml)
        .map_err(|e| e.to_string())?;
    if xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err("word/document.xml exceeds size limit".to_string());
    }
    paragraphs_from_xml(&xml)
}

/// Collect the text of each `<w:p>` from `<w:t>` runs; `<w:tab/>` and
/// `<w:br/>` become spaces.
fn paragraphs_from_xml(xml: &[u8]) -> Result<Vec<String>, String> {
    use quick_xml::events::Event;

    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut paragraphs = Vec::new();
    let mut current = String::new();
    let mut in_text = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_text = true,
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => paragraphs.push(std::mem::take(&mut current)),
                _ => {}
            },
            Ok(Event::Empty(e)) if matches!(e.local_name().as_ref(), b"tab" | b"br") => {
                current.push(' ')
            }
            Ok(Event::Text(te)) if in_text => {
                let text = te.unescape().map_err(|e| e.to_string())?;
                current.push_str(&text);
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(e.to_string()),
            _ => {}
        }
        buf.clear();
    }
    if !current.trim().is_empty() {
        paragraphs.push(current);
    }
    Ok(paragraphs)
}
