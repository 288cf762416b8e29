//! Per-agency document profiles.
//!
//! A profile fixes how one agency's labels are read: document kind,
//! linearization options, segmentation plan and heading vocabulary.
//!
//! | code  | agency                         | document            | primary headings |
//! |-------|--------------------------------|---------------------|------------------|
//! | `TGA` | Therapeutic Goods Admin. (AU)  | PDF product info    | numbered         |
//! | `HC`  | Health Canada                  | PDF monograph       | numbered         |
//! | `EMA` | European Medicines Agency      | PDF, Annex I only   | numbered         |
//! | `FDA` | US Food and Drug Admin.        | SPL XML             | marked titles    |

pub mod ema;
pub mod fda;
pub mod hc;
pub mod tga;

use lazy_static::lazy_static;
use regex::Regex;

use crate::linearize::LinearizeOptions;
use crate::models::{CanonicalSection, DocumentKind};
use crate::normalise::{HeaderNormalizer, Vocabulary};
use crate::segment::{NumberedRules, SegmentationPlan, Strategy};

pub const AGENCY_CODES: &[&str] = &["TGA", "HC", "EMA", "FDA"];

lazy_static! {
    /// "4.1 THERAPEUTIC INDICATIONS", "4. CLINICAL PARTICULARS"
    static ref NUMBERED_UPPER: Regex =
        Regex::new(r"^\d{1,2}(?:\.\d{1,2})*\.?\s+[A-Z][A-Z0-9 ,()&'-]{3,}$").unwrap();
    /// "4.1 Therapeutic indications"
    static ref NUMBERED_SENTENCE: Regex =
        Regex::new(r"^\d{1,2}\.\d{1,2}\.?\s+[A-Z][a-z]+(?:[ ,-]+[A-Za-z()]+)*$").unwrap();
}

/// Posology is headed differently by every agency.
pub(crate) const POSOLOGY_CENTERS: &[(&str, CanonicalSection)] = &[
    ("Dose and Method of Administration", CanonicalSection::Posology),
    ("Posology and Method of Administration", CanonicalSection::Posology),
    ("Dosage and Administration", CanonicalSection::Posology),
    ("Dosage & Administration", CanonicalSection::Posology),
];

/// Numbered SmPC-style headings, rejecting cross-references and dose tables.
pub fn numbered_rules() -> NumberedRules {
    NumberedRules {
        patterns: vec![NUMBERED_UPPER.clone(), NUMBERED_SENTENCE.clone()],
        disqualifiers: vec!["see".to_string(), "safe dose".to_string()],
    }
}

/// Full-line form of a titled entry, matched against the upper-cased line.
pub(crate) fn anchored(entry: &str) -> String {
    format!(r"^(?:{})$", entry)
}

pub(crate) fn titled(patterns: &[Regex]) -> Strategy {
    Strategy::Titled(patterns.to_vec())
}

#[derive(Debug, Clone)]
pub struct AgencyProfile {
    pub code: String,
    pub kind: DocumentKind,
    pub linearize: LinearizeOptions,
    pub plan: SegmentationPlan,
    pub vocabulary: Vocabulary,
}

impl AgencyProfile {
    /// Numbered headings with no fallback, standard vocabulary.
    pub fn new(code: &str, kind: DocumentKind) -> Self {
        Self {
            code: code.to_string(),
            kind,
            linearize: LinearizeOptions::default(),
            plan: SegmentationPlan {
                primary: vec![Strategy::Numbered(numbered_rules())],
                fallback: Vec::new(),
                min_headings: 3,
            },
            vocabulary: Vocabulary::standard(),
        }
    }

    pub fn with_plan(mut self, plan: SegmentationPlan) -> Self {
        self.plan = plan;
        self
    }

    pub fn with_linearize(mut self, options: LinearizeOptions) -> Self {
        self.linearize = options;
        self
    }

    pub fn with_vocabulary(mut self, vocabulary: Vocabulary) -> Self {
        self.vocabulary = vocabulary;
        self
    }

    pub fn with_min_headings(mut self, min: usize) -> Self {
        self.plan.min_headings = min;
        self
    }

    pub fn normalizer(&self) -> HeaderNormalizer {
        HeaderNormalizer::new(self.vocabulary.clone())
    }
}

/// Built-in profile for an agency code (case-insensitive).
pub fn profile_for(code: &str) -> Option<AgencyProfile> {
    match code.to_ascii_uppercase().as_str() {
        "TGA" => Some(tga::profile()),
        "HC" => Some(hc::profile()),
        "EMA" => Some(ema::profile()),
        "FDA" => Some(fda::profile()),
        _ => None,
    }
}
