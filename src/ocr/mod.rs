//! Text recognition fallback.
//!
//! Defines the [`OcrProvider`] trait so the recognition backend can be chosen
//! by configuration. Providers work on the stored object directly; the
//! pipeline never ships document bytes to them.

pub mod textract;

use crate::schema::ObjectRef;

/// Async trait implemented by each OCR backend.
#[async_trait::async_trait]
pub trait OcrProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Recognise the text of the referenced document, returning its lines in
    /// document order joined by single spaces.
    async fn recognize_text(&self, object: &ObjectRef) -> anyhow::Result<String>;
}

/// Known provider identifiers used for configuration lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OcrProviderKind {
    Textract,
    /// No OCR fallback; previews stay empty for image-only documents.
    Disabled,
}

impl OcrProviderKind {
    /// Parse a configuration string into a provider kind.
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "textract" => Some(Self::Textract),
            "none" | "disabled" => Some(Self::Disabled),
            _ => None,
        }
    }
}

/// Join recognised lines the way every provider reports them.
pub fn join_lines<'a>(lines: impl IntoIterator<Item = &'a str>) -> String {
    lines
        .into_iter()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
