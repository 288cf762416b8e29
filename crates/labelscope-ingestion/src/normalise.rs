//! Heading normalisation.
//!
//! Maps a free-text heading ("4.1 THERAPEUTIC INDICATIONS", "Adverse
//! Reactions") onto a `CanonicalSection` by nearest edit distance against a
//! vocabulary of known headings ("centers"). A heading whose closest center
//! is further than `REJECT_RATIO * len(heading)` is left unclassified.
//!
//! # Example
//! ```
//! use labelscope_ingestion::models::CanonicalSection;
//! use labelscope_ingestion::normalise::HeaderNormalizer;
//!
//! let norm = HeaderNormalizer::standard();
//! assert_eq!(norm.normalize("Therapeutic Indications"), Some(CanonicalSection::Indications));
//! assert_eq!(norm.normalize("asdkjh1234"), None);
//! ```

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use strsim::levenshtein;

use crate::models::CanonicalSection;

/// Fraction of the heading length beyond which a match is rejected.
pub const REJECT_RATIO: f64 = 0.6;

lazy_static! {
    static ref SECTION_NUMBER: Regex = Regex::new(r"^\s*\d{1,2}(?:\.\d{1,2})*\.?\s+").unwrap();
}

/// Strip a leading section number and collapse whitespace.
pub fn clean_heading(raw: &str) -> String {
    let stripped = SECTION_NUMBER.replace(raw, "");
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// A known heading and the section it stands for. `None` marks a known
/// non-clinical heading: matching it leaves the heading unclassified.
#[derive(Debug, Clone, Serialize)]
pub struct Center {
    pub text: String,
    pub section: Option<CanonicalSection>,
    #[serde(skip)]
    folded: String,
}

impl Center {
    pub fn new(text: &str, section: Option<CanonicalSection>) -> Self {
        Self {
            text: text.to_string(),
            section,
            folded: text.to_lowercase(),
        }
    }
}

/// Ordered centers. Order decides ties.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Vocabulary {
    centers: Vec<Center>,
}

const STANDARD_CENTERS: &[(&str, CanonicalSection)] = &[
    ("Indications", CanonicalSection::Indications),
    ("Therapeutic Indications", CanonicalSection::Indications),
    ("Indications and Usage", CanonicalSection::Indications),
    ("Contraindications", CanonicalSection::Contraindications),
    ("Warnings", CanonicalSection::Warnings),
    ("Warnings and Precautions", CanonicalSection::Warnings),
    ("Precautions", CanonicalSection::Warnings),
    ("Special Warnings and Precautions for Use", CanonicalSection::Warnings),
    ("Boxed Warning", CanonicalSection::Warnings),
    ("Pregnancy", CanonicalSection::Pregnancy),
    ("Use in Pregnancy", CanonicalSection::Pregnancy),
    ("Fertility", CanonicalSection::Pregnancy),
    ("Pregnancy and Lactation", CanonicalSection::Pregnancy),
    ("Use in Specific Populations", CanonicalSection::Pregnancy),
    ("Posology", CanonicalSection::Posology),
    ("Interactions", CanonicalSection::Interactions),
    ("Drug Interactions", CanonicalSection::Interactions),
    ("Interactions with Other Medicines", CanonicalSection::Interactions),
    ("Interaction with Other Medicinal Products", CanonicalSection::Interactions),
    ("Effects on Driving", CanonicalSection::EffectsOnDriving),
    ("Effects on Ability to Drive and Use Machines", CanonicalSection::EffectsOnDriving),
    ("Side Effects", CanonicalSection::SideEffects),
    ("Adverse Reactions", CanonicalSection::SideEffects),
    ("Adverse Effects", CanonicalSection::SideEffects),
    ("Undesirable Effects", CanonicalSection::SideEffects),
    ("Overdose", CanonicalSection::Overdose),
    ("Overdosage", CanonicalSection::Overdose),
];

/// Frequent headings of label parts that carry no clinical section. Without
/// them, long headings such as "Presentation and Storage Conditions" fall
/// within the reject distance of an unrelated clinical center.
const NON_CLINICAL_CENTERS: &[&str] = &[
    "Name of the Medicine",
    "Clinical Particulars",
    "Pharmacological Properties",
    "Pharmaceutical Particulars",
    "Presentation and Storage Conditions",
    "Action and Clinical Pharmacology",
    "Clinical Pharmacology",
    "Patient Counseling Information",
    "Storage and Handling",
    "How Supplied",
    "Description",
];

impl Vocabulary {
    pub fn new(centers: &[(&str, CanonicalSection)]) -> Self {
        Self::default().extended(centers)
    }

    /// Agency-neutral centers shared by every profile.
    pub fn standard() -> Self {
        Self::new(STANDARD_CENTERS).with_non_clinical(NON_CLINICAL_CENTERS)
    }

    /// Append centers after the existing ones.
    pub fn extended(mut self, extra: &[(&str, CanonicalSection)]) -> Self {
        self.centers.extend(extra.iter().map(|(t, s)| Center::new(t, Some(*s))));
        self
    }

    /// Append headings that must stay unclassified.
    pub fn with_non_clinical(mut self, headings: &[&str]) -> Self {
        self.centers.extend(headings.iter().map(|t| Center::new(t, None)));
        self
    }

    pub fn centers(&self) -> &[Center] {
        &self.centers
    }

    pub fn len(&self) -> usize {
        self.centers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.centers.is_empty()
    }
}

/// Outcome of classifying one heading.
#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    Canonical {
        section: CanonicalSection,
        center: String,
        distance: usize,
    },
    Unclassified,
}

impl Classification {
    pub fn section(&self) -> Option<CanonicalSection> {
        match self {
            Classification::Canonical { section, .. } => Some(*section),
            Classification::Unclassified => None,
        }
    }
}

/// Nearest-center heading classifier.
#[derive(Debug, Clone)]
pub struct HeaderNormalizer {
    vocabulary: Vocabulary,
    reject_ratio: f64,
}

impl HeaderNormalizer {
    pub fn new(vocabulary: Vocabulary) -> Self {
        Self { vocabulary, reject_ratio: REJECT_RATIO }
    }

    pub fn standard() -> Self {
        Self::new(Vocabulary::standard())
    }

    pub fn with_reject_ratio(mut self, ratio: f64) -> Self {
        self.reject_ratio = ratio;
        self
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    /// Classify a raw heading. Total: never fails, empty input is unclassified.
    pub fn classify(&self, heading: &str) -> Classification {
        let cleaned = clean_heading(heading).to_lowercase();
        let threshold = self.reject_ratio * cleaned.chars().count() as f64;

        let mut best: Option<(&Center, usize)> = None;
        for center in self.vocabulary.centers() {
            let distance = levenshtein(&cleaned, &center.folded);
            // strictly smaller keeps the earliest center on ties
            if best.map_or(true, |(_, d)| distance < d) {
                best = Some((center, distance));
            }
        }

        match best {
            Some((center, distance)) if distance as f64 <= threshold => match center.section {
                Some(section) => Classification::Canonical {
                    section,
                    center: center.text.clone(),
                    distance,
                },
                None => Classification::Unclassified,
            },
            _ => Classification::Unclassified,
        }
    }

    pub fn normalize(&self, heading: &str) -> Option<CanonicalSection> {
        self.classify(heading).section()
    }
}
