//! Structured product labeling (SPL) XML reader.
//!
//! Top-level section titles become marked headings; paragraphs and
//! subsection titles become body lines. Header fields are read from the
//! document preamble and the product data elements:
//!
//! | field                   | element                                          |
//! |-------------------------|--------------------------------------------------|
//! | `product_name`          | first `manufacturedProduct/name`                 |
//! | `generic_name`          | first `genericMedicine/name`                     |
//! | `version_date`          | document `effectiveTime@value` (`YYYYMMDD`)      |
//! | `source_product_number` | first `code@code` in the NDC code system         |
//! | `marketer`              | first `name` under `author`                      |
//! | `link`                  | DailyMed page for the document `setId@root`      |

use chrono::NaiveDate;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use url::Url;

use super::Linearized;
use crate::error::IngestError;
use crate::models::HeaderFields;

const NDC_CODE_SYSTEM: &str = "2.16.840.1.113883.6.69";
const DAILYMED_DRUG_INFO: &str = "https://dailymed.nlm.nih.gov/dailymed/drugInfo.cfm";

#[derive(Debug, Clone, Copy, PartialEq)]
enum Capture {
    Heading,
    Line,
    ProductName,
    GenericName,
    Marketer,
}

struct OpenCapture {
    kind: Capture,
    depth: usize,
    text: String,
}

fn local_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}

fn attribute(e: &BytesStart<'_>, key: &str) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.local_name().as_ref() == key.as_bytes())
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

fn section_depth(stack: &[String]) -> usize {
    stack.iter().filter(|n| n.as_str() == "section").count()
}

/// What to capture for an element about to be opened under `stack`.
fn capture_for(name: &str, stack: &[String], header: &HeaderFields) -> Option<Capture> {
    let parent = stack.last().map(String::as_str);
    match name {
        "title" if parent == Some("section") => {
            if section_depth(stack) == 1 {
                Some(Capture::Heading)
            } else {
                Some(Capture::Line)
            }
        }
        "paragraph" if section_depth(stack) > 0 => Some(Capture::Line),
        "name" if parent == Some("manufacturedProduct") && header.product_name.is_none() => {
            Some(Capture::ProductName)
        }
        "name" if parent == Some("genericMedicine") && header.generic_name.is_none() => {
            Some(Capture::GenericName)
        }
        "name" if header.marketer.is_none() && stack.iter().any(|n| n == "author") => Some(Capture::Marketer),
        _ => None,
    }
}

/// Header fields carried as attributes.
fn read_attributes(e: &BytesStart<'_>, name: &str, stack: &[String], header: &mut HeaderFields) {
    match name {
        "effectiveTime" if stack.len() == 1 && header.version_date.is_none() => {
            header.version_date = attribute(e, "value").and_then(|v| parse_spl_date(&v));
        }
        "setId" if stack.len() == 1 && header.link.is_none() => {
            header.link = attribute(e, "root")
                .and_then(|root| Url::parse_with_params(DAILYMED_DRUG_INFO, &[("setid", root)]).ok())
                .map(String::from);
        }
        "code" if header.source_product_number.is_none() => {
            if attribute(e, "codeSystem").as_deref() == Some(NDC_CODE_SYSTEM) {
                header.source_product_number = attribute(e, "code");
            }
        }
        _ => {}
    }
}

/// `YYYYMMDD`, optionally followed by a time part.
pub fn parse_spl_date(value: &str) -> Option<NaiveDate> {
    let day = value.get(..8)?;
    NaiveDate::parse_from_str(day, "%Y%m%d").ok()
}

fn finish(capture: OpenCapture, doc: &mut Linearized) {
    let text = capture.text.split_whitespace().collect::<Vec<_>>().join(" ");
    if text.is_empty() {
        return;
    }
    match capture.kind {
        Capture::Heading => doc.push_heading(text),
        Capture::Line => doc.push_line(text),
        Capture::ProductName => doc.header.product_name = Some(text),
        Capture::GenericName => doc.header.generic_name = Some(text),
        Capture::Marketer => doc.header.marketer = Some(text),
    }
}

pub fn parse(xml: &str) -> Result<Linearized, IngestError> {
    let mut reader = Reader::from_str(xml);
    let mut doc = Linearized::default();
    let mut stack: Vec<String> = Vec::new();
    let mut open: Option<OpenCapture> = None;
    let mut seen_root = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                seen_root = true;
                let name = local_name(&e);
                if open.is_none() {
                    open = capture_for(&name, &stack, &doc.header).map(|kind| OpenCapture {
                        kind,
                        depth: stack.len(),
                        text: String::new(),
                    });
                }
                read_attributes(&e, &name, &stack, &mut doc.header);
                stack.push(name);
            }
            Ok(Event::Empty(e)) => {
                seen_root = true;
                let name = local_name(&e);
                read_attributes(&e, &name, &stack, &mut doc.header);
                // <br/> and friends inside captured text
                if let Some(capture) = open.as_mut() {
                    capture.text.push(' ');
                }
            }
            Ok(Event::Text(e)) => {
                if let Some(capture) = open.as_mut() {
                    match e.unescape() {
                        Ok(text) => capture.text.push_str(&text),
                        Err(_) => capture.text.push_str(&String::from_utf8_lossy(&e)),
                    }
                }
            }
            Ok(Event::CData(e)) => {
                if let Some(capture) = open.as_mut() {
                    capture.text.push_str(&String::from_utf8_lossy(&e));
                }
            }
            Ok(Event::End(_)) => {
                stack.pop();
                if open.as_ref().is_some_and(|c| c.depth == stack.len()) {
                    if let Some(capture) = open.take() {
                        finish(capture, &mut doc);
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(IngestError::Linearize(format!(
                    "malformed label XML at byte {}: {}",
                    reader.buffer_position(),
                    e
                )));
            }
            _ => {}
        }
        buf.clear();
    }

    if !seen_root {
        return Err(IngestError::Linearize("empty label XML".to_string()));
    }
    Ok(doc)
}
