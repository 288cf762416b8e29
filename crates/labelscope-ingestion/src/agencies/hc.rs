//! Health Canada product monograph PDFs.

use lazy_static::lazy_static;
use regex::Regex;

use crate::linearize::{LinearizeOptions, PageOptions};
use crate::linearize::pdf::DEFAULT_MARGIN_PT;
use crate::models::{CanonicalSection, DocumentKind};
use crate::normalise::Vocabulary;
use crate::segment::{SegmentationPlan, Strategy};

use super::{anchored, numbered_rules, titled, AgencyProfile, POSOLOGY_CENTERS};

/// Pre-2020 monograph layout, in document order.
const TITLED_HEADINGS: &[&str] = &[
    "INDICATIONS(?: AND CLINICAL USE)?",
    "CONTRAINDICATIONS",
    "(?:SERIOUS )?WARNINGS AND PRECAUTIONS",
    "ADVERSE REACTIONS",
    "DRUG INTERACTIONS",
    "DOSAGE AND ADMINISTRATION",
    "OVERDOSAGE",
    "ACTION AND CLINICAL PHARMACOLOGY",
];

lazy_static! {
    static ref TITLED: Vec<Regex> = TITLED_HEADINGS
        .iter()
        .map(|e| Regex::new(&anchored(e)).unwrap())
        .collect();
}

const MONOGRAPH_CENTERS: &[(&str, CanonicalSection)] = &[
    ("Indications and Clinical Use", CanonicalSection::Indications),
    ("Serious Warnings and Precautions", CanonicalSection::Warnings),
];

pub fn profile() -> AgencyProfile {
    AgencyProfile::new("HC", DocumentKind::PagedBinary)
        .with_linearize(LinearizeOptions {
            page: PageOptions {
                margin: Some(DEFAULT_MARGIN_PT),
                exclude_tables: true,
            },
            drop_blank_lines: true,
            ..Default::default()
        })
        .with_plan(SegmentationPlan {
            primary: vec![Strategy::Numbered(numbered_rules())],
            fallback: vec![titled(&TITLED)],
            min_headings: 3,
        })
        .with_vocabulary(
            Vocabulary::standard()
                .extended(POSOLOGY_CENTERS)
                .extended(MONOGRAPH_CENTERS),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monograph_headings() {
        let norm = profile().normalizer();
        assert_eq!(norm.normalize("INDICATIONS AND CLINICAL USE"), Some(CanonicalSection::Indications));
        assert_eq!(norm.normalize("SERIOUS WARNINGS AND PRECAUTIONS"), Some(CanonicalSection::Warnings));
        assert_eq!(norm.normalize("ACTION AND CLINICAL PHARMACOLOGY"), None);
    }

    #[test]
    fn test_every_titled_heading_compiles() {
        assert_eq!(TITLED.len(), TITLED_HEADINGS.len());
        assert!(TITLED[2].is_match("SERIOUS WARNINGS AND PRECAUTIONS"));
        assert!(!TITLED[2].is_match("SERIOUS WARNINGS AND PRECAUTIONS BOX"));
    }
}
