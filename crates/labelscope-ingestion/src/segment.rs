//! Section segmentation.
//!
//! Splits linearized lines into (heading, body) pairs using one of three
//! heading strategies:
//! - `Numbered`: lines shaped like "4.1 THERAPEUTIC INDICATIONS", filtered by
//!   `is_valid_numbered_heading`
//! - `Titled`: an ordered list of upper-case heading patterns; each must
//!   appear after the previous one
//! - `Marked`: headings flagged by the document itself (markup titles)
//!
//! A plan runs its primary strategies first. If none of them reaches
//! `min_headings`, the fallback strategies run and their result is used when
//! it found anything.

use regex::Regex;
use serde::Serialize;
use tracing::debug;

use crate::error::IngestError;
use crate::linearize::Linearized;

/// A heading line and the body lines up to the next heading.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawSection {
    pub heading: String,
    /// Index of the heading in the linearized lines.
    pub line: usize,
    pub body: Vec<String>,
}

impl RawSection {
    pub fn body_text(&self) -> String {
        self.body.join("\n")
    }
}

#[derive(Debug, Clone)]
pub struct NumberedRules {
    /// Heading shapes, tried in order.
    pub patterns: Vec<Regex>,
    /// Lower-case substrings that disqualify a candidate heading.
    pub disqualifiers: Vec<String>,
}

#[derive(Debug, Clone)]
pub enum Strategy {
    Numbered(NumberedRules),
    Titled(Vec<Regex>),
    Marked,
}

impl Strategy {
    pub fn name(&self) -> &'static str {
        match self {
            Strategy::Numbered(_) => "numbered",
            Strategy::Titled(_) => "titled",
            Strategy::Marked => "marked",
        }
    }

    /// Indices of heading lines, ascending.
    pub fn boundaries(&self, doc: &Linearized) -> Vec<usize> {
        match self {
            Strategy::Numbered(rules) => numbered_boundaries(&doc.lines, rules),
            Strategy::Titled(entries) => titled_boundaries(&doc.lines, entries),
            Strategy::Marked => {
                let mut marks: Vec<usize> = doc
                    .marked_headings
                    .iter()
                    .copied()
                    .filter(|&i| i < doc.lines.len())
                    .collect();
                marks.sort_unstable();
                marks.dedup();
                marks
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct SegmentationPlan {
    pub primary: Vec<Strategy>,
    pub fallback: Vec<Strategy>,
    pub min_headings: usize,
}

/// Structural checks on a numbered heading candidate:
/// - it ends in a letter or a parenthesis
/// - every dot sits in its leading number ("4.1 Dose", not "4.1 e.g. dose")
/// - it names no cross-reference ("see 4.4") or dose table ("safe dose")
/// - it contains no `/`
pub fn is_valid_numbered_heading(heading: &str, disqualifiers: &[String]) -> bool {
    let heading = heading.trim();
    let Some(last) = heading.chars().last() else {
        return false;
    };
    if !(last.is_alphabetic() || last == '(' || last == ')') {
        return false;
    }
    let first_token = heading.split_whitespace().next().unwrap_or_default();
    if first_token.matches('.').count() != heading.matches('.').count() {
        return false;
    }
    let lowered = heading.to_lowercase();
    if disqualifiers.iter().any(|d| lowered.contains(d.as_str())) {
        return false;
    }
    !heading.contains('/')
}

fn numbered_boundaries(lines: &[String], rules: &NumberedRules) -> Vec<usize> {
    lines
        .iter()
        .enumerate()
        .filter(|(_, line)| {
            let line = line.trim();
            rules.patterns.iter().any(|p| p.is_match(line))
                && is_valid_numbered_heading(line, &rules.disqualifiers)
        })
        .map(|(i, _)| i)
        .collect()
}

/// Entry k is found at the first matching line after entry k-1's line.
/// Lines are upper-cased before matching. Entries that never match are skipped.
fn titled_boundaries(lines: &[String], entries: &[Regex]) -> Vec<usize> {
    let upper: Vec<String> = lines.iter().map(|l| l.trim().to_uppercase()).collect();
    let mut boundaries = Vec::new();
    let mut from = 0;
    for entry in entries {
        if let Some(offset) = upper[from..].iter().position(|l| entry.is_match(l)) {
            boundaries.push(from + offset);
            from += offset + 1;
        }
    }
    boundaries
}

fn sections_at(lines: &[String], boundaries: &[usize]) -> Vec<RawSection> {
    boundaries
        .iter()
        .enumerate()
        .map(|(k, &start)| {
            let end = boundaries.get(k + 1).copied().unwrap_or(lines.len());
            RawSection {
                heading: lines[start].trim().to_string(),
                line: start,
                body: lines[start + 1..end].to_vec(),
            }
        })
        .collect()
}

/// First strategy reaching `min`, else the one with the most headings
/// (earliest on ties).
fn best_of(strategies: &[Strategy], doc: &Linearized, min: usize) -> Option<(&'static str, Vec<usize>)> {
    let mut best: Option<(&'static str, Vec<usize>)> = None;
    for strategy in strategies {
        let found = strategy.boundaries(doc);
        debug!(strategy = strategy.name(), headings = found.len(), "Segmentation strategy ran");
        if found.len() >= min {
            return Some((strategy.name(), found));
        }
        if best.as_ref().map_or(true, |(_, b)| found.len() > b.len()) {
            best = Some((strategy.name(), found));
        }
    }
    best
}

/// Segment `doc` according to `plan`. Fails when no strategy finds a heading.
pub fn segment(doc: &Linearized, plan: &SegmentationPlan) -> Result<Vec<RawSection>, IngestError> {
    let primary = best_of(&plan.primary, doc, plan.min_headings).unwrap_or(("none", Vec::new()));
    if primary.1.len() >= plan.min_headings && !primary.1.is_empty() {
        return Ok(sections_at(&doc.lines, &primary.1));
    }

    let chosen = match best_of(&plan.fallback, doc, plan.min_headings) {
        Some((name, found)) if !found.is_empty() => {
            debug!(strategy = name, primary = primary.1.len(), "Using fallback segmentation");
            found
        }
        _ => primary.1,
    };

    if chosen.is_empty() {
        return Err(IngestError::Segmentation(format!(
            "no section headings found in {} lines",
            doc.lines.len()
        )));
    }
    Ok(sections_at(&doc.lines, &chosen))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(lines: &[&str]) -> Linearized {
        Linearized::from_lines(lines.iter().map(|s| s.to_string()).collect())
    }

    fn numbered() -> Strategy {
        Strategy::Numbered(NumberedRules {
            patterns: vec![Regex::new(r"^\d{1,2}(?:\.\d{1,2})*\.?\s+[A-Z][A-Z ,()&'-]{3,}$").unwrap()],
            disqualifiers: vec!["see".to_string(), "safe dose".to_string()],
        })
    }

    fn titled() -> Strategy {
        Strategy::Titled(vec![
            Regex::new(r"^INDICATIONS$").unwrap(),
            Regex::new(r"^CONTRAINDICATIONS$").unwrap(),
            Regex::new(r"^OVERDOSAGE$").unwrap(),
        ])
    }

    #[test]
    fn test_heading_validity() {
        let none: Vec<String> = vec![];
        let standard = vec!["see".to_string(), "safe dose".to_string()];
        assert!(is_valid_numbered_heading("4.1 THERAPEUTIC INDICATIONS", &standard));
        assert!(is_valid_numbered_heading("4.6 FERTILITY, PREGNANCY AND LACTATION (", &none));
        assert!(!is_valid_numbered_heading("4.2 DOSE 50", &none));
        assert!(!is_valid_numbered_heading("4.4 WARNINGS, SEE SECTION", &standard));
        assert!(!is_valid_numbered_heading("4.2 MAXIMUM SAFE DOSE", &standard));
        assert!(!is_valid_numbered_heading("4.8 USE IN E.G. CHILDREN", &none));
        assert!(!is_valid_numbered_heading("4.5 INTERACTIONS/INCOMPATIBILITIES", &none));
        assert!(!is_valid_numbered_heading("", &none));
    }

    #[test]
    fn test_numbered_segmentation() {
        let d = doc(&[
            "1 NAME OF THE MEDICINE",
            "Diffusia",
            "4.1  THERAPEUTIC INDICATIONS",
            "Treats condition Z.",
            "4.2  DOSE AND METHOD OF ADMINISTRATION",
            "Take one tablet.",
            "See 4.4 for details.",
        ]);
        let plan = SegmentationPlan { primary: vec![numbered()], fallback: vec![titled()], min_headings: 3 };
        let sections = segment(&d, &plan).unwrap();
        assert_eq!(sections.len(), 3);
        assert_eq!(sections[1].heading, "4.1  THERAPEUTIC INDICATIONS");
        assert_eq!(sections[1].body, vec!["Treats condition Z."]);
        assert_eq!(sections[2].body_text(), "Take one tablet.\nSee 4.4 for details.");
    }

    #[test]
    fn test_sections_reconstruct_input_from_first_heading() {
        let lines = [
            "preamble",
            "4.1 THERAPEUTIC INDICATIONS",
            "a",
            "",
            "b",
            "4.3 CONTRAINDICATIONS",
            "4.9 OVERDOSE",
            "c",
        ];
        let d = doc(&lines);
        let plan = SegmentationPlan { primary: vec![numbered()], fallback: vec![], min_headings: 1 };
        let sections = segment(&d, &plan).unwrap();

        let first = sections[0].line;
        let mut rebuilt = Vec::new();
        for s in &sections {
            rebuilt.push(s.heading.clone());
            rebuilt.extend(s.body.iter().cloned());
        }
        let expected: Vec<String> = lines[first..].iter().map(|s| s.to_string()).collect();
        assert_eq!(rebuilt, expected);
        // headings are strictly increasing
        assert!(sections.windows(2).all(|w| w[0].line < w[1].line));
    }

    #[test]
    fn test_fallback_replaces_sparse_primary() {
        let d = doc(&[
            "1 PRODUCT NAME",
            "INDICATIONS",
            "For Z.",
            "CONTRAINDICATIONS",
            "None known.",
            "OVERDOSAGE",
            "Call a doctor.",
        ]);
        let plan = SegmentationPlan { primary: vec![numbered()], fallback: vec![titled()], min_headings: 3 };
        let sections = segment(&d, &plan).unwrap();
        let headings: Vec<&str> = sections.iter().map(|s| s.heading.as_str()).collect();
        assert_eq!(headings, vec!["INDICATIONS", "CONTRAINDICATIONS", "OVERDOSAGE"]);
    }

    #[test]
    fn test_titled_entries_must_be_in_order() {
        let d = doc(&["OVERDOSAGE", "x", "INDICATIONS", "y", "INDICATIONS", "z", "OVERDOSAGE", "w"]);
        let found = titled().boundaries(&d);
        // first OVERDOSAGE precedes INDICATIONS, duplicate INDICATIONS ignored
        assert_eq!(found, vec![2, 6]);
    }

    #[test]
    fn test_titled_headings_match_any_case() {
        let d = doc(&["Diffusia", "Indications", "For Z.", "Contraindications", "None.", "Overdosage", "Call."]);
        assert_eq!(titled().boundaries(&d), vec![1, 3, 5]);

        let plan = SegmentationPlan { primary: vec![numbered()], fallback: vec![titled()], min_headings: 3 };
        let sections = segment(&d, &plan).unwrap();
        // headings keep their original case
        assert_eq!(sections[0].heading, "Indications");
        assert_eq!(sections[2].body, vec!["Call."]);
    }

    #[test]
    fn test_sparse_primary_kept_when_fallback_finds_nothing() {
        let d = doc(&["4.1 THERAPEUTIC INDICATIONS", "Treats condition Z."]);
        let plan = SegmentationPlan { primary: vec![numbered()], fallback: vec![titled()], min_headings: 3 };
        let sections = segment(&d, &plan).unwrap();
        assert_eq!(sections.len(), 1);
    }

    #[test]
    fn test_no_headings_is_error() {
        let d = doc(&["just", "prose"]);
        let plan = SegmentationPlan { primary: vec![numbered()], fallback: vec![titled()], min_headings: 3 };
        assert!(matches!(segment(&d, &plan), Err(IngestError::Segmentation(_))));
        assert!(matches!(segment(&doc(&[]), &plan), Err(IngestError::Segmentation(_))));
    }

    #[test]
    fn test_marked_strategy() {
        let mut d = Linearized::default();
        d.push_heading("INDICATIONS & USAGE".to_string());
        d.push_line("For Z.".to_string());
        d.push_heading("OVERDOSAGE".to_string());
        let plan = SegmentationPlan { primary: vec![Strategy::Marked], fallback: vec![], min_headings: 1 };
        let sections = segment(&d, &plan).unwrap();
        assert_eq!(sections.len(), 2);
        assert!(sections[1].body.is_empty());
    }
}
