//! PDF metadata extraction with quota-gated OCR fallback.

use crate::config::Limits;
use crate::error::IngestError;
use crate::ocr::OcrProvider;
use crate::quota::{PeriodKeyProvider, QuotaLedger};
use crate::schema::ObjectRef;
use lopdf::{Document, Object};
use regex::Regex;
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, warn};

/// Longest preview kept, in characters.
pub const PREVIEW_CHARS: usize = 200;

/// What the parser can tell about a document on its own.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedDocument {
    pub title: String,
    pub author: String,
    pub pages: u32,
    /// Raw text of the first page; empty when there is none.
    pub first_page_text: String,
}

/// Extraction result before it is stamped with key, hash and timestamps.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedDocument {
    pub title: String,
    pub author: String,
    pub pages: u32,
    pub preview: String,
    pub ocr_applied: bool,
}

/// Metadata extractor.
pub struct Extractor {
    ocr: Option<Arc<dyn OcrProvider>>,
    quota: Arc<dyn QuotaLedger>,
    periods: Arc<dyn PeriodKeyProvider>,
    ocr_max_bytes: u64,
    monthly_page_limit: u64,
}

impl Extractor {
    pub fn new(
        ocr: Option<Arc<dyn OcrProvider>>,
        quota: Arc<dyn QuotaLedger>,
        periods: Arc<dyn PeriodKeyProvider>,
        limits: &Limits,
    ) -> Self {
        Self {
            ocr,
            quota,
            periods,
            ocr_max_bytes: limits.ocr_max_bytes,
            monthly_page_limit: limits.monthly_page_limit,
        }
    }

    /// Extract title, author, page count and a preview from `bytes`.
    ///
    /// An empty preview is not an error: it is what callers get when the
    /// first page has no text and OCR is unavailable, too expensive for the
    /// object's size, or over quota.
    pub async fn extract(
        &self,
        object: &ObjectRef,
        bytes: &[u8],
        object_size: u64,
    ) -> Result<ExtractedDocument, IngestError> {
        let parsed = parse_pdf(bytes)?;
        debug!(
            "Parsed {}: {} pages, title={:?}, author={:?}",
            object, parsed.pages, parsed.title, parsed.author
        );

        let mut extracted = ExtractedDocument {
            title: parsed.title,
            author: parsed.author,
            pages: parsed.pages,
            preview: normalize_preview(&parsed.first_page_text),
            ocr_applied: false,
        };

        if !extracted.preview.is_empty() {
            return Ok(extracted);
        }

        if let Some(text) = self.ocr_fallback(object, object_size, extracted.pages).await? {
            extracted.preview = normalize_preview(&text);
            extracted.ocr_applied = true;
        }

        Ok(extracted)
    }

    /// Run OCR when size, page count and quota allow it.
    async fn ocr_fallback(
        &self,
        object: &ObjectRef,
        object_size: u64,
        pages: u32,
    ) -> Result<Option<String>, IngestError> {
        let Some(ocr) = &self.ocr else {
            debug!("No OCR provider configured; leaving preview of {} empty", object);
            return Ok(None);
        };

        if object_size > self.ocr_max_bytes {
            info!(
                "Skipping OCR for {}: {} bytes exceeds OCR ceiling of {} bytes",
                object, object_size, self.ocr_max_bytes
            );
            return Ok(None);
        }

        if pages == 0 {
            debug!("Skipping OCR for {}: document has no pages", object);
            return Ok(None);
        }

        let period = self.periods.current_period();
        let reserved = self
            .quota
            .try_reserve(&period, u64::from(pages), self.monthly_page_limit)
            .await
            .map_err(IngestError::Quota)?;

        if !reserved {
            info!(
                "OCR quota for {} cannot cover {} pages of {}; preview left empty",
                period, pages, object
            );
            return Ok(None);
        }

        info!(
            "Running OCR ({}) on {} ({} pages reserved for {})",
            ocr.name(),
            object,
            pages,
            period
        );
        let text = ocr
            .recognize_text(object)
            .await
            .map_err(IngestError::Ocr)?;

        Ok(Some(text))
    }
}

/// Load a PDF and read its info dictionary, page count and first-page text.
pub fn parse_pdf(bytes: &[u8]) -> Result<ParsedDocument, lopdf::Error> {
    let doc = Document::load_mem(bytes)?;
    let pages = doc.get_pages();

    let (title, author) = info_strings(&doc);

    let first_page_text = match pages.keys().next() {
        Some(&first) => doc.extract_text(&[first]).unwrap_or_else(|e| {
            warn!("Text extraction failed on page {}: {}", first, e);
            String::new()
        }),
        None => String::new(),
    };

    Ok(ParsedDocument {
        title,
        author,
        pages: pages.len() as u32,
        first_page_text,
    })
}

/// `/Title` and `/Author` from the trailer's `/Info` dictionary.
fn info_strings(doc: &Document) -> (String, String) {
    let info = match doc.trailer.get(b"Info") {
        Ok(Object::Reference(id)) => doc.get_object(*id).and_then(Object::as_dict).ok(),
        Ok(Object::Dictionary(dict)) => Some(dict),
        _ => None,
    };

    let Some(info) = info else {
        return (String::new(), String::new());
    };

    let field = |name: &[u8]| match info.get(name) {
        Ok(Object::String(bytes, _)) => decode_text_string(bytes),
        Ok(Object::Reference(id)) => match doc.get_object(*id) {
            Ok(Object::String(bytes, _)) => decode_text_string(bytes),
            _ => String::new(),
        },
        _ => String::new(),
    };

    (field(b"Title".as_slice()), field(b"Author".as_slice()))
}

/// Decode a PDF text string: UTF-16BE or UTF-8 when it carries a byte-order
/// mark, PDFDocEncoding otherwise.
fn decode_text_string(bytes: &[u8]) -> String {
    let text = if let Some(utf16) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = utf16
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        String::from_utf16_lossy(&units)
    } else if let Some(utf8) = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]) {
        String::from_utf8_lossy(utf8).into_owned()
    } else {
        bytes.iter().map(|&b| pdf_doc_char(b)).collect()
    };
    text.trim_matches(char::from(0)).trim().to_string()
}

/// PDFDocEncoding agrees with Latin-1 except for these ranges.
fn pdf_doc_char(byte: u8) -> char {
    const LOW: [char; 8] = [
        '\u{02D8}', '\u{02C7}', '\u{02C6}', '\u{02D9}', '\u{02DD}', '\u{02DB}', '\u{02DA}',
        '\u{02DC}',
    ];
    const HIGH: [char; 33] = [
        '\u{2022}', '\u{2020}', '\u{2021}', '\u{2026}', '\u{2014}', '\u{2013}', '\u{0192}',
        '\u{2044}', '\u{2039}', '\u{203A}', '\u{2212}', '\u{2030}', '\u{201E}', '\u{201C}',
        '\u{201D}', '\u{2018}', '\u{2019}', '\u{201A}', '\u{2122}', '\u{FB01}', '\u{FB02}',
        '\u{0141}', '\u{0152}', '\u{0160}', '\u{0178}', '\u{017D}', '\u{0131}', '\u{0142}',
        '\u{0153}', '\u{0161}', '\u{017E}', '\u{FFFD}', '\u{20AC}',
    ];
    match byte {
        0x18..=0x1F => LOW[usize::from(byte - 0x18)],
        0x80..=0xA0 => HIGH[usize::from(byte - 0x80)],
        0xAD => '\u{FFFD}',
        _ => char::from(byte),
    }
}

/// Collapse line breaks to spaces, trim, and cap at [`PREVIEW_CHARS`].
pub fn normalize_preview(text: &str) -> String {
    static LINE_BREAKS: OnceLock<Regex> = OnceLock::new();
    let line_breaks = LINE_BREAKS.get_or_init(|| Regex::new(r"\r\n|[\r\n]").unwrap());

    line_breaks
        .replace_all(text, " ")
        .trim()
        .chars()
        .take(PREVIEW_CHARS)
        .collect()
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! PDF documents built with lopdf for tests.

    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Document, Object, Stream};

    pub struct PdfSpec<'a> {
        pub title: Option<&'a str>,
        pub author: Option<&'a str>,
        /// One entry per page; `None` means an image-only (textless) page.
        pub pages: Vec<Option<&'a str>>,
    }

    pub fn build_pdf(spec: &PdfSpec<'_>) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
            "Encoding" => "WinAnsiEncoding",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let mut kids = Vec::new();
        for text in &spec.pages {
            let operations = match text {
                Some(text) => {
                    let mut ops = vec![
                        Operation::new("BT", vec![]),
                        Operation::new("Tf", vec!["F1".into(), 12.into()]),
                        Operation::new("Td", vec![72.into(), 720.into()]),
                    ];
                    for (i, line) in text.lines().enumerate() {
                        if i > 0 {
                            ops.push(Operation::new("ET", vec![]));
                            ops.push(Operation::new("BT", vec![]));
                            ops.push(Operation::new("Tf", vec!["F1".into(), 12.into()]));
                            ops.push(Operation::new(
                                "Td",
                                vec![72.into(), (720 - 14 * i as i64).into()],
                            ));
                        }
                        ops.push(Operation::new("Tj", vec![Object::string_literal(line)]));
                    }
                    ops.push(Operation::new("ET", vec![]));
                    ops
                }
                None => vec![],
            };
            let content = Content { operations };
            let content_id =
                doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
                "Resources" => resources_id,
            });
            kids.push(Object::from(page_id));
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut info = lopdf::Dictionary::new();
        if let Some(title) = spec.title {
            info.set("Title", Object::string_literal(title));
        }
        if let Some(author) = spec.author {
            info.set("Author", Object::string_literal(author));
        }
        if spec.title.is_some() || spec.author.is_some() {
            let info_id = doc.add_object(info);
            doc.trailer.set("Info", info_id);
        }

        let mut out = Vec::new();
        doc.save_to(&mut out).unwrap();
        out
    }
}
