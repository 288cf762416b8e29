//! FDA structured product labels (SPL XML, as distributed by DailyMed).
//!
//! Section titles are marked by the document, so no heading pattern is
//! needed; header fields come from the XML itself (see `linearize::spl`).

use crate::linearize::LinearizeOptions;
use crate::models::DocumentKind;
use crate::normalise::Vocabulary;
use crate::segment::{SegmentationPlan, Strategy};

use super::{numbered_rules, AgencyProfile, POSOLOGY_CENTERS};

pub fn profile() -> AgencyProfile {
    AgencyProfile::new("FDA", DocumentKind::StructuredXml)
        .with_linearize(LinearizeOptions::default())
        .with_plan(SegmentationPlan {
            primary: vec![Strategy::Marked],
            fallback: vec![Strategy::Numbered(numbered_rules())],
            min_headings: 1,
        })
        .with_vocabulary(Vocabulary::standard().extended(POSOLOGY_CENTERS))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CanonicalSection;

    #[test]
    fn test_plr_headings() {
        let norm = profile().normalizer();
        assert_eq!(norm.normalize("1 INDICATIONS & USAGE"), Some(CanonicalSection::Indications));
        assert_eq!(norm.normalize("BOXED WARNING"), Some(CanonicalSection::Warnings));
        assert_eq!(norm.normalize("7 DRUG INTERACTIONS"), Some(CanonicalSection::Interactions));
        assert_eq!(norm.normalize("17 PATIENT COUNSELING INFORMATION"), None);
    }
}
