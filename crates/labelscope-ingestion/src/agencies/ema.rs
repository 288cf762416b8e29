//! European Medicines Agency product information PDFs.
//!
//! The published PDF bundles several annexes; only Annex I (the summary of
//! product characteristics) is segmented.

use regex::Regex;

use crate::linearize::{AnnexMarkers, LinearizeOptions, PageOptions};
use crate::linearize::pdf::DEFAULT_MARGIN_PT;
use crate::models::DocumentKind;
use crate::normalise::Vocabulary;
use crate::segment::{SegmentationPlan, Strategy};

use super::{numbered_rules, AgencyProfile, POSOLOGY_CENTERS};

lazy_static::lazy_static! {
    static ref ANNEX_I: Regex = Regex::new(r"\bANNEX\s+I\b").unwrap();
    static ref ANNEX_II: Regex = Regex::new(r"\bANNEX\s+II\b").unwrap();
}

pub fn profile() -> AgencyProfile {
    AgencyProfile::new("EMA", DocumentKind::PagedBinary)
        .with_linearize(LinearizeOptions {
            page: PageOptions {
                margin: Some(DEFAULT_MARGIN_PT),
                exclude_tables: true,
            },
            annex: Some(AnnexMarkers {
                start: ANNEX_I.clone(),
                end: ANNEX_II.clone(),
            }),
            drop_blank_lines: true,
            ..Default::default()
        })
        .with_plan(SegmentationPlan {
            primary: vec![Strategy::Numbered(numbered_rules())],
            fallback: Vec::new(),
            min_headings: 3,
        })
        .with_vocabulary(Vocabulary::standard().extended(POSOLOGY_CENTERS))
}
