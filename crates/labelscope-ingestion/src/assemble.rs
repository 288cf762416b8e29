//! Record assembly: classified sections → persisted label.

use labelscope_common::UnclassifiedPolicy;
use labelscope_db::{LabelStore, NewLabel, NewSection, SECTION_OTHER};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::IngestError;
use crate::models::CanonicalSection;
use crate::normalise::HeaderNormalizer;
use crate::segment::RawSection;

/// A segmented section with its normalisation result.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedSection {
    pub section: Option<CanonicalSection>,
    pub heading: String,
    pub body: String,
}

pub fn classify_sections(raw: &[RawSection], normalizer: &HeaderNormalizer) -> Vec<ClassifiedSection> {
    raw.iter()
        .map(|s| ClassifiedSection {
            section: normalizer.normalize(&s.heading),
            heading: s.heading.clone(),
            body: s.body_text(),
        })
        .collect()
}

/// Merge sections sharing a canonical name, in order of first appearance.
///
/// Bodies are joined with newlines. Unclassified bodies are dropped or,
/// with `UnclassifiedPolicy::Bucket`, gathered under `OTHER` with their raw
/// heading prepended. Sections whose merged body is blank are omitted.
pub fn merge_sections(sections: &[ClassifiedSection], policy: UnclassifiedPolicy) -> Vec<NewSection> {
    let mut merged: Vec<(String, Vec<String>, Vec<String>)> = Vec::new();

    for s in sections {
        let (name, body) = match (s.section, policy) {
            (Some(section), _) => (section.as_str().to_string(), s.body.trim().to_string()),
            (None, UnclassifiedPolicy::Drop) => continue,
            (None, UnclassifiedPolicy::Bucket) => {
                let body = s.body.trim();
                let text = if body.is_empty() {
                    s.heading.clone()
                } else {
                    format!("{}\n{}", s.heading, body)
                };
                (SECTION_OTHER.to_string(), text)
            }
        };

        let slot = match merged.iter().position(|(n, _, _)| *n == name) {
            Some(i) => i,
            None => {
                merged.push((name, Vec::new(), Vec::new()));
                merged.len() - 1
            }
        };
        let (_, headings, bodies) = &mut merged[slot];
        if !headings.contains(&s.heading) {
            headings.push(s.heading.clone());
        }
        if !body.is_empty() {
            bodies.push(body);
        }
    }

    merged
        .into_iter()
        .filter(|(_, _, bodies)| !bodies.is_empty())
        .map(|(name, headings, bodies)| NewSection {
            canonical_name: name,
            original_heading: Some(headings.join("; ")),
            body_text: bodies.join("\n"),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub enum AssemblyOutcome {
    Inserted { label_id: Uuid, sections: usize },
    /// The natural key was already present; nothing was written.
    AlreadyIngested,
}

/// Persist a label, one product, its sections and the raw text as a unit.
/// A failed write leaves nothing behind, so the next run can retry.
pub async fn persist_label(
    store: &dyn LabelStore,
    label: &NewLabel,
    sections: &[NewSection],
    raw_text: &str,
) -> Result<AssemblyOutcome, IngestError> {
    let label_id = match store.insert_label_graph(label, sections, raw_text).await {
        Ok(id) => id,
        Err(e) if e.is_duplicate() => {
            debug!(key = %label.key, "Label already ingested");
            return Ok(AssemblyOutcome::AlreadyIngested);
        }
        Err(e) => return Err(e.into()),
    };

    info!(key = %label.key, sections = sections.len(), "Label stored");
    Ok(AssemblyOutcome::Inserted { label_id, sections: sections.len() })
}
