//! Row types for the label store.
//!
//! A `Label` is one versioned document from one agency; it owns exactly one
//! or more `Product`s, each of which owns its classified `Section`s.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Canonical name used for bodies whose heading matched no known section.
pub const SECTION_OTHER: &str = "OTHER";

// =============================================================================
// Label Schema
// =============================================================================

/// (source, source_product_number, version_date): identifies one version of
/// one product from one agency.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NaturalKey {
    pub source: String,
    pub source_product_number: String,
    pub version_date: NaiveDate,
}

impl std::fmt::Display for NaturalKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}@{}", self.source, self.source_product_number, self.version_date)
    }
}

/// Insert payload for a label.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewLabel {
    pub key: NaturalKey,
    pub product_name: String,
    pub generic_name: String,
    pub marketer: Option<String>,
    pub link: String,
}

/// Label record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Label {
    pub id: Uuid,
    pub source: String,
    pub product_name: String,
    pub generic_name: String,
    pub version_date: NaiveDate,
    pub source_product_number: String,
    pub marketer: Option<String>,
    pub link: String,
    pub raw_text: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Label {
    pub fn from_new(new: &NewLabel, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            source: new.key.source.clone(),
            product_name: new.product_name.clone(),
            generic_name: new.generic_name.clone(),
            version_date: new.key.version_date,
            source_product_number: new.key.source_product_number.clone(),
            marketer: new.marketer.clone(),
            link: new.link.clone(),
            raw_text: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn natural_key(&self) -> NaturalKey {
        NaturalKey {
            source: self.source.clone(),
            source_product_number: self.source_product_number.clone(),
            version_date: self.version_date,
        }
    }

    /// Whether `identifier` names this label: its origin URL or its
    /// agency-local product number.
    pub fn matches_identifier(&self, identifier: &str) -> bool {
        self.link == identifier || self.source_product_number == identifier
    }
}

// =============================================================================
// Product / Section Schema
// =============================================================================

/// A formulation or route sharing one label.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub label_id: Uuid,
}

/// Insert payload for a section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewSection {
    pub canonical_name: String,
    pub original_heading: Option<String>,
    pub body_text: String,
}

/// Classified clinical section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Section {
    pub id: Uuid,
    pub product_id: Uuid,
    pub canonical_name: String,
    pub original_heading: Option<String>,
    pub body_text: String,
}

// =============================================================================
// Known Error Schema
// =============================================================================

/// Failure classes recorded against an identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    FetchFailed,
    ParsingError,
    MissingField,
    StorageError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::FetchFailed  => "fetch_failed",
            ErrorKind::ParsingError => "parsing_error",
            ErrorKind::MissingField => "missing_field",
            ErrorKind::StorageError => "storage_error",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A permanent failure recorded for (source, identifier).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnownError {
    pub source: String,
    pub identifier: String,
    pub kind: ErrorKind,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
