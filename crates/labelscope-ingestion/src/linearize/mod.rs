//! Document linearization: fetched payload → ordered lines of text.
//!
//! Each `DocumentKind` has its own reader:
//! - `pdf`: positional text from PDF content streams, with margin cropping
//!   and ruled-table exclusion
//! - `markup`: paragraph nodes of an HTML tree, in document order
//! - `spl`: structured product labeling XML, section titles marked as
//!   headings, plus header fields

pub mod markup;
pub mod pdf;
pub mod spl;

use regex::Regex;
use tracing::debug;

use crate::error::IngestError;
use crate::models::{DocumentKind, HeaderFields};
use crate::transport::Payload;

pub use markup::MarkupOptions;
pub use pdf::PageOptions;

/// Ordered lines plus indices of lines the document itself marks as headings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Linearized {
    pub lines: Vec<String>,
    pub marked_headings: Vec<usize>,
    /// Header fields the document carries about itself, if any.
    pub header: HeaderFields,
}

impl Linearized {
    pub fn from_lines(lines: Vec<String>) -> Self {
        Self { lines, ..Default::default() }
    }

    pub fn push_line(&mut self, line: String) {
        self.lines.push(line);
    }

    pub fn push_heading(&mut self, line: String) {
        self.marked_headings.push(self.lines.len());
        self.lines.push(line);
    }

    /// Full text, lines joined by newlines.
    pub fn text(&self) -> String {
        self.lines.join("\n")
    }

    /// Keep lines for which `keep` holds, remapping heading marks.
    pub fn retain_lines(&mut self, mut keep: impl FnMut(&str) -> bool) {
        let mut remap = Vec::with_capacity(self.lines.len());
        let mut kept = Vec::with_capacity(self.lines.len());
        for line in self.lines.drain(..) {
            if keep(&line) {
                remap.push(Some(kept.len()));
                kept.push(line);
            } else {
                remap.push(None);
            }
        }
        self.lines = kept;
        self.marked_headings = self
            .marked_headings
            .iter()
            .filter_map(|&i| remap.get(i).copied().flatten())
            .collect();
    }

    /// Keep only `lines[start..end]`.
    pub fn truncate_to(&mut self, start: usize, end: usize) {
        self.lines = self.lines[start..end].to_vec();
        self.marked_headings = self
            .marked_headings
            .iter()
            .filter(|&&i| i >= start && i < end)
            .map(|&i| i - start)
            .collect();
    }
}

/// Pair of marker lines delimiting the part of a document to keep.
#[derive(Debug, Clone)]
pub struct AnnexMarkers {
    pub start: Regex,
    pub end: Regex,
}

impl AnnexMarkers {
    /// Index of the first `start` line and the first `end` line after it.
    pub fn span(&self, lines: &[String]) -> Option<(usize, usize)> {
        let start = lines.iter().position(|l| self.start.is_match(l))?;
        let end = lines[start + 1..]
            .iter()
            .position(|l| self.end.is_match(l))
            .map(|offset| start + 1 + offset)?;
        Some((start, end))
    }
}

/// Per-agency reading options.
#[derive(Debug, Clone, Default)]
pub struct LinearizeOptions {
    pub page: PageOptions,
    pub markup: MarkupOptions,
    /// Truncate to the span between two marker lines.
    pub annex: Option<AnnexMarkers>,
    pub drop_blank_lines: bool,
}

/// Turn a payload into lines. Deterministic for a given payload and options.
pub fn linearize(
    payload: &Payload,
    kind: DocumentKind,
    options: &LinearizeOptions,
) -> Result<Linearized, IngestError> {
    let mut doc = match (kind, payload) {
        (DocumentKind::PagedBinary, Payload::Bytes(bytes)) => {
            Linearized::from_lines(pdf::extract_lines(bytes, &options.page)?)
        }
        (DocumentKind::Markup, Payload::Markup(text)) => markup::extract(text, &options.markup)?,
        (DocumentKind::Markup, Payload::Bytes(bytes)) => {
            markup::extract(&String::from_utf8_lossy(bytes), &options.markup)?
        }
        (DocumentKind::StructuredXml, Payload::Markup(text)) => spl::parse(text)?,
        (DocumentKind::StructuredXml, Payload::Bytes(bytes)) => spl::parse(&String::from_utf8_lossy(bytes))?,
        (DocumentKind::PagedBinary, Payload::Markup(_)) => {
            return Err(IngestError::Linearize("expected a binary payload for a paged document".to_string()));
        }
    };

    if options.drop_blank_lines {
        doc.retain_lines(|l| !l.trim().is_empty());
    }

    if let Some(markers) = &options.annex {
        let (start, end) = markers.span(&doc.lines).ok_or_else(|| {
            IngestError::Segmentation("annex markers not found".to_string())
        })?;
        debug!(start, end, total = doc.lines.len(), "Truncating to annex span");
        doc.truncate_to(start, end);
    }

    Ok(doc)
}
