//! HTML reader: paragraph-equivalent nodes in document order.

use scraper::{ElementRef, Html, Selector};

use super::Linearized;
use crate::error::IngestError;

#[derive(Debug, Clone)]
pub struct MarkupOptions {
    /// Nodes whose text becomes one body line each.
    pub paragraph_selector: String,
    /// Nodes whose text becomes a marked heading line.
    pub heading_selector: Option<String>,
}

impl Default for MarkupOptions {
    fn default() -> Self {
        Self {
            paragraph_selector: "p, li".to_string(),
            heading_selector: None,
        }
    }
}

fn parse_selector(css: &str) -> Result<Selector, IngestError> {
    Selector::parse(css).map_err(|e| IngestError::Linearize(format!("invalid selector '{}': {:?}", css, e)))
}

fn node_text(el: &ElementRef<'_>) -> String {
    el.text().collect::<String>().split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn extract(markup: &str, options: &MarkupOptions) -> Result<Linearized, IngestError> {
    let combined_css = match &options.heading_selector {
        Some(h) => format!("{}, {}", h, options.paragraph_selector),
        None => options.paragraph_selector.clone(),
    };
    let combined = parse_selector(&combined_css)?;
    let heading = options.heading_selector.as_deref().map(parse_selector).transpose()?;

    let html = Html::parse_document(markup);
    let mut doc = Linearized::default();
    for el in html.select(&combined) {
        // nested matches (a <p> inside an <li>) were already emitted by the outer node
        let nested = el
            .ancestors()
            .filter_map(ElementRef::wrap)
            .any(|a| combined.matches(&a));
        if nested {
            continue;
        }
        let text = node_text(&el);
        if text.is_empty() {
            continue;
        }
        match &heading {
            Some(h) if h.matches(&el) => doc.push_heading(text),
            _ => doc.push_line(text),
        }
    }
    Ok(doc)
}
