//! Data models for the ingestion pipeline.

use chrono::NaiveDate;
use labelscope_db::{NaturalKey, NewLabel};
use serde::{Deserialize, Serialize};

use crate::error::IngestError;

/// The closed set of clinical sections a label is reduced to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CanonicalSection {
    Indications,
    Contraindications,
    Warnings,
    Pregnancy,
    Posology,
    Interactions,
    EffectsOnDriving,
    SideEffects,
    Overdose,
}

impl CanonicalSection {
    pub const ALL: [CanonicalSection; 9] = [
        CanonicalSection::Indications,
        CanonicalSection::Contraindications,
        CanonicalSection::Warnings,
        CanonicalSection::Pregnancy,
        CanonicalSection::Posology,
        CanonicalSection::Interactions,
        CanonicalSection::EffectsOnDriving,
        CanonicalSection::SideEffects,
        CanonicalSection::Overdose,
    ];

    /// Display name, stored as the section's canonical name.
    pub fn as_str(&self) -> &'static str {
        match self {
            CanonicalSection::Indications       => "Indications",
            CanonicalSection::Contraindications => "Contraindications",
            CanonicalSection::Warnings          => "Warnings",
            CanonicalSection::Pregnancy         => "Pregnancy",
            CanonicalSection::Posology          => "Posology",
            CanonicalSection::Interactions      => "Interactions",
            CanonicalSection::EffectsOnDriving  => "Effects on driving",
            CanonicalSection::SideEffects       => "Side effects",
            CanonicalSection::Overdose          => "Overdose",
        }
    }

    /// Short storage code.
    pub fn code(&self) -> &'static str {
        match self {
            CanonicalSection::Indications       => "INDICATIONS",
            CanonicalSection::Contraindications => "CONTRA",
            CanonicalSection::Warnings          => "WARN",
            CanonicalSection::Pregnancy         => "PREG",
            CanonicalSection::Posology          => "POSE",
            CanonicalSection::Interactions      => "INTERACT",
            CanonicalSection::EffectsOnDriving  => "DRIVE",
            CanonicalSection::SideEffects       => "SIDE",
            CanonicalSection::Overdose          => "OVER",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.code() == code)
    }
}

impl std::fmt::Display for CanonicalSection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Physical form of a fetched label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    /// Paged binary (PDF).
    PagedBinary,
    /// HTML-like markup tree.
    Markup,
    /// Structured product labeling XML.
    StructuredXml,
}

/// Header fields known about a label. Each may come from the enumeration
/// manifest or from the document itself.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HeaderFields {
    pub product_name: Option<String>,
    pub generic_name: Option<String>,
    pub version_date: Option<NaiveDate>,
    pub source_product_number: Option<String>,
    pub marketer: Option<String>,
    pub link: Option<String>,
}

impl HeaderFields {
    /// Fill every empty field from `other`; fields already set win.
    pub fn fill_from(&mut self, other: HeaderFields) {
        fn fill<T>(slot: &mut Option<T>, value: Option<T>) {
            if slot.is_none() {
                *slot = value;
            }
        }
        fill(&mut self.product_name, other.product_name);
        fill(&mut self.generic_name, other.generic_name);
        fill(&mut self.version_date, other.version_date);
        fill(&mut self.source_product_number, other.source_product_number);
        fill(&mut self.marketer, other.marketer);
        fill(&mut self.link, other.link);
    }

    /// Build the insert payload. The identifier stands in for a missing
    /// product number or link.
    pub fn complete(self, source: &str, identifier: &str) -> Result<NewLabel, IngestError> {
        let product_name = non_blank(self.product_name).ok_or(IngestError::MissingField("product_name"))?;
        let generic_name = non_blank(self.generic_name).ok_or(IngestError::MissingField("generic_name"))?;
        let version_date = self.version_date.ok_or(IngestError::MissingField("version_date"))?;
        let source_product_number = non_blank(self.source_product_number).unwrap_or_else(|| identifier.to_string());
        Ok(NewLabel {
            key: NaturalKey {
                source: source.to_string(),
                source_product_number,
                version_date,
            },
            product_name,
            generic_name,
            marketer: non_blank(self.marketer),
            link: non_blank(self.link).unwrap_or_else(|| identifier.to_string()),
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// One enumerated document to acquire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRef {
    /// URL or agency-local product number; the key for gating and known errors.
    pub identifier: String,
    /// Where to fetch from, when it differs from `identifier`.
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub header: HeaderFields,
}

impl DocumentRef {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            link: None,
            header: HeaderFields::default(),
        }
    }

    pub fn with_header(mut self, header: HeaderFields) -> Self {
        self.header = header;
        self
    }

    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.link = Some(link.into());
        self
    }

    /// Location handed to the transport.
    pub fn location(&self) -> &str {
        self.link.as_deref().unwrap_or(&self.identifier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_code_roundtrip() {
        for section in CanonicalSection::ALL {
            assert_eq!(CanonicalSection::from_code(section.code()), Some(section));
        }
        assert_eq!(CanonicalSection::from_code("OTHER"), None);
        assert_eq!(CanonicalSection::EffectsOnDriving.to_string(), "Effects on driving");
    }

    #[test]
    fn test_fill_keeps_existing_values() {
        let mut header = HeaderFields {
            product_name: Some("Diffusia".to_string()),
            ..Default::default()
        };
        header.fill_from(HeaderFields {
            product_name: Some("Other".to_string()),
            generic_name: Some("lorem ipsem".to_string()),
            ..Default::default()
        });
        assert_eq!(header.product_name.as_deref(), Some("Diffusia"));
        assert_eq!(header.generic_name.as_deref(), Some("lorem ipsem"));
    }

    #[test]
    fn test_complete_defaults_from_identifier() {
        let header = HeaderFields {
            product_name: Some("Diffusia".to_string()),
            generic_name: Some("lorem ipsem".to_string()),
            version_date: Some(date(2022, 3, 15)),
            ..Default::default()
        };
        let label = header.complete("TGA", "https://www.ebs.tga.gov.au/pi/1").unwrap();
        assert_eq!(label.key.source_product_number, "https://www.ebs.tga.gov.au/pi/1");
        assert_eq!(label.link, "https://www.ebs.tga.gov.au/pi/1");
        assert_eq!(label.marketer, None);
    }

    #[test]
    fn test_complete_requires_generic_name() {
        let header = HeaderFields {
            product_name: Some("Diffusia".to_string()),
            generic_name: Some("   ".to_string()),
            version_date: Some(date(2022, 3, 15)),
            ..Default::default()
        };
        let err = header.complete("TGA", "x").unwrap_err();
        assert!(matches!(err, IngestError::MissingField("generic_name")));
    }
}
