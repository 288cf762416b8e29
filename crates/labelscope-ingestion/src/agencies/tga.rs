//! Therapeutic Goods Administration (Australia) product information PDFs.
//!
//! Current documents use the numbered SmPC layout ("4.1 THERAPEUTIC
//! INDICATIONS"); older ones carry bare upper-case titles, read in order by
//! the titled fallback.

use lazy_static::lazy_static;
use regex::Regex;

use crate::linearize::{LinearizeOptions, PageOptions};
use crate::linearize::pdf::DEFAULT_MARGIN_PT;
use crate::models::DocumentKind;
use crate::normalise::Vocabulary;
use crate::segment::{SegmentationPlan, Strategy};

use super::{anchored, numbered_rules, titled, AgencyProfile, POSOLOGY_CENTERS};

/// Older, unnumbered layout. PRESENTATION closes the overdosage section.
pub(crate) const TITLED_HEADINGS: &[&str] = &[
    "INDICATIONS",
    "CONTRAINDICATIONS",
    "PRECAUTIONS",
    "ADVERSE (?:REACTIONS|EFFECTS)",
    "DOSAGE AND ADMINISTRATION",
    "OVERDOSAGE",
    "PRESENTATION(?: AND STORAGE CONDITIONS)?",
];

lazy_static! {
    static ref TITLED: Vec<Regex> = TITLED_HEADINGS
        .iter()
        .map(|e| Regex::new(&anchored(e)).unwrap())
        .collect();
}

pub fn profile() -> AgencyProfile {
    AgencyProfile::new("TGA", DocumentKind::PagedBinary)
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
        .with_vocabulary(Vocabulary::standard().extended(POSOLOGY_CENTERS))
}
