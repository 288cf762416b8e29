//! In-process `LabelStore` with JSON snapshot persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{DbError, Result};
use crate::schema::{ErrorKind, KnownError, Label, NaturalKey, NewLabel, NewSection, Product, Section};
use crate::store::LabelStore;

#[derive(Debug, Default, Serialize, Deserialize)]
struct Tables {
    labels: Vec<Label>,
    products: Vec<Product>,
    sections: Vec<Section>,
    known_errors: Vec<KnownError>,
    #[serde(skip)]
    by_key: HashMap<NaturalKey, usize>,
}

impl Tables {
    fn reindex(&mut self) {
        self.by_key = self
            .labels
            .iter()
            .enumerate()
            .map(|(i, l)| (l.natural_key(), i))
            .collect();
    }

    fn label_mut(&mut self, label_id: Uuid) -> Result<&mut Label> {
        self.labels
            .iter_mut()
            .find(|l| l.id == label_id)
            .ok_or_else(|| DbError::NotFound(format!("label {}", label_id)))
    }
}

/// Store backed by in-memory tables behind one lock.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a snapshot written by `save_snapshot`. A missing file yields an
    /// empty store.
    pub async fn load_snapshot(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No snapshot found, starting empty");
            return Ok(Self::new());
        }
        let bytes = tokio::fs::read(path).await?;
        let mut tables: Tables = serde_json::from_slice(&bytes)?;
        tables.reindex();
        tracing::info!(
            path = %path.display(),
            labels = tables.labels.len(),
            known_errors = tables.known_errors.len(),
            "Loaded label store snapshot"
        );
        Ok(Self { tables: RwLock::new(tables) })
    }

    pub async fn save_snapshot(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let tables = self.tables.read().await;
        let bytes = serde_json::to_vec_pretty(&*tables)?;
        tokio::fs::write(path, bytes).await?;
        Ok(())
    }

    /// All known errors, for reporting.
    pub async fn known_errors(&self) -> Vec<KnownError> {
        self.tables.read().await.known_errors.clone()
    }
}

#[async_trait]
impl LabelStore for MemoryStore {
    async fn upsert_label(&self, label: &NewLabel) -> Result<Uuid> {
        let mut tables = self.tables.write().await;
        if tables.by_key.contains_key(&label.key) {
            return Err(DbError::Duplicate(label.key.to_string()));
        }
        let row = Label::from_new(label, Utc::now());
        let id = row.id;
        let idx = tables.labels.len();
        tables.labels.push(row);
        tables.by_key.insert(label.key.clone(), idx);
        Ok(id)
    }

    async fn add_product(&self, label_id: Uuid) -> Result<Uuid> {
        let mut tables = self.tables.write().await;
        if !tables.labels.iter().any(|l| l.id == label_id) {
            return Err(DbError::NotFound(format!("label {}", label_id)));
        }
        let product = Product { id: Uuid::new_v4(), label_id };
        let id = product.id;
        tables.products.push(product);
        Ok(id)
    }

    async fn add_section(&self, product_id: Uuid, section: &NewSection) -> Result<Uuid> {
        let mut tables = self.tables.write().await;
        let label_id = tables
            .products
            .iter()
            .find(|p| p.id == product_id)
            .map(|p| p.label_id)
            .ok_or_else(|| DbError::NotFound(format!("product {}", product_id)))?;
        let row = Section {
            id: Uuid::new_v4(),
            product_id,
            canonical_name: section.canonical_name.clone(),
            original_heading: section.original_heading.clone(),
            body_text: section.body_text.clone(),
        };
        let id = row.id;
        tables.sections.push(row);
        tables.label_mut(label_id)?.updated_at = Utc::now();
        Ok(id)
    }

    async fn attach_raw_text(&self, label_id: Uuid, raw_text: &str) -> Result<()> {
        let mut tables = self.tables.write().await;
        let label = tables.label_mut(label_id)?;
        label.raw_text = Some(raw_text.to_string());
        label.updated_at = Utc::now();
        Ok(())
    }

    async fn delete_label(&self, label_id: Uuid) -> Result<bool> {
        let mut tables = self.tables.write().await;
        let before = tables.labels.len();
        tables.labels.retain(|l| l.id != label_id);
        if tables.labels.len() == before {
            return Ok(false);
        }
        let products: Vec<Uuid> = tables
            .products
            .iter()
            .filter(|p| p.label_id == label_id)
            .map(|p| p.id)
            .collect();
        tables.products.retain(|p| p.label_id != label_id);
        tables.sections.retain(|s| !products.contains(&s.product_id));
        tables.reindex();
        Ok(true)
    }

    /// All rows are built before the write lock is taken, so the graph lands
    /// whole or not at all.
    async fn insert_label_graph(&self, label: &NewLabel, sections: &[NewSection], raw_text: &str) -> Result<Uuid> {
        let mut row = Label::from_new(label, Utc::now());
        row.raw_text = Some(raw_text.to_string());
        let label_id = row.id;
        let product = Product { id: Uuid::new_v4(), label_id };
        let section_rows: Vec<Section> = sections
            .iter()
            .map(|s| Section {
                id: Uuid::new_v4(),
                product_id: product.id,
                canonical_name: s.canonical_name.clone(),
                original_heading: s.original_heading.clone(),
                body_text: s.body_text.clone(),
            })
            .collect();

        let mut tables = self.tables.write().await;
        if tables.by_key.contains_key(&label.key) {
            return Err(DbError::Duplicate(label.key.to_string()));
        }
        let idx = tables.labels.len();
        tables.labels.push(row);
        tables.by_key.insert(label.key.clone(), idx);
        tables.products.push(product);
        tables.sections.extend(section_rows);
        Ok(label_id)
    }

    async fn get_label(&self, label_id: Uuid) -> Result<Option<Label>> {
        let tables = self.tables.read().await;
        Ok(tables.labels.iter().find(|l| l.id == label_id).cloned())
    }

    async fn sections_for_label(&self, label_id: Uuid) -> Result<Vec<Section>> {
        let tables = self.tables.read().await;
        let products: Vec<Uuid> = tables
            .products
            .iter()
            .filter(|p| p.label_id == label_id)
            .map(|p| p.id)
            .collect();
        Ok(tables
            .sections
            .iter()
            .filter(|s| products.contains(&s.product_id))
            .cloned()
            .collect())
    }

    async fn label_count(&self) -> Result<usize> {
        Ok(self.tables.read().await.labels.len())
    }

    async fn latest_labels(&self, source: &str) -> Result<Vec<Label>> {
        let tables = self.tables.read().await;
        let mut latest: HashMap<&str, &Label> = HashMap::new();
        for label in tables.labels.iter().filter(|l| l.source == source) {
            latest
                .entry(label.source_product_number.as_str())
                .and_modify(|cur| {
                    if label.version_date > cur.version_date {
                        *cur = label;
                    }
                })
                .or_insert(label);
        }
        let mut out: Vec<Label> = latest.into_values().cloned().collect();
        out.sort_by(|a, b| a.source_product_number.cmp(&b.source_product_number));
        Ok(out)
    }

    async fn most_recent_update(&self, source: &str, identifier: &str) -> Result<Option<DateTime<Utc>>> {
        let tables = self.tables.read().await;
        Ok(tables
            .labels
            .iter()
            .filter(|l| l.source == source && l.matches_identifier(identifier))
            .map(|l| l.updated_at)
            .max())
    }

    async fn known_error(&self, source: &str, identifier: &str) -> Result<Option<KnownError>> {
        let tables = self.tables.read().await;
        Ok(tables
            .known_errors
            .iter()
            .find(|e| e.source == source && e.identifier == identifier)
            .cloned())
    }

    async fn upsert_known_error(
        &self,
        source: &str,
        identifier: &str,
        kind: ErrorKind,
        message: &str,
    ) -> Result<()> {
        let mut tables = self.tables.write().await;
        let now = Utc::now();
        match tables
            .known_errors
            .iter_mut()
            .find(|e| e.source == source && e.identifier == identifier)
        {
            Some(existing) => {
                existing.kind = kind;
                existing.message = message.to_string();
                existing.updated_at = now;
            }
            None => tables.known_errors.push(KnownError {
                source: source.to_string(),
                identifier: identifier.to_string(),
                kind,
                message: message.to_string(),
                created_at: now,
                updated_at: now,
            }),
        }
        Ok(())
    }

    async fn clear_known_error(&self, source: &str, identifier: &str) -> Result<bool> {
        let mut tables = self.tables.write().await;
        let before = tables.known_errors.len();
        tables
            .known_errors
            .retain(|e| !(e.source == source && e.identifier == identifier));
        Ok(tables.known_errors.len() != before)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn new_label(number: &str, date: (i32, u32, u32)) -> NewLabel {
        NewLabel {
            key: NaturalKey {
                source: "EMA".to_string(),
                source_product_number: number.to_string(),
                version_date: NaiveDate::from_ymd_opt(date.0, date.1, date.2).unwrap(),
            },
            product_name: "Diffusia".to_string(),
            generic_name: "lorem ipsem".to_string(),
            marketer: None,
            link: format!("https://www.ema.europa.eu/{}", number),
        }
    }

    #[tokio::test]
    async fn test_duplicate_natural_key_rejected() {
        let store = MemoryStore::new();
        store.upsert_label(&new_label("ABC-123", (2022, 3, 15))).await.unwrap();
        let err = store.upsert_label(&new_label("ABC-123", (2022, 3, 15))).await.unwrap_err();
        assert!(err.is_duplicate());
        // A new version of the same product is a different key
        store.upsert_label(&new_label("ABC-123", (2023, 1, 1))).await.unwrap();
        assert_eq!(store.label_count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_sections_follow_products() {
        let store = MemoryStore::new();
        let label_id = store.upsert_label(&new_label("ABC-123", (2022, 3, 15))).await.unwrap();
        let product_id = store.add_product(label_id).await.unwrap();
        for name in ["Indications", "Warnings", "Pregnancy"] {
            store
                .add_section(product_id, &NewSection {
                    canonical_name: name.to_string(),
                    original_heading: None,
                    body_text: "text".to_string(),
                })
                .await
                .unwrap();
        }
        let sections = store.sections_for_label(label_id).await.unwrap();
        let names: Vec<&str> = sections.iter().map(|s| s.canonical_name.as_str()).collect();
        assert_eq!(names, vec!["Indications", "Warnings", "Pregnancy"]);
    }

    #[tokio::test]
    async fn test_add_section_to_unknown_product_fails() {
        let store = MemoryStore::new();
        let err = store
            .add_section(Uuid::new_v4(), &NewSection {
                canonical_name: "Indications".to_string(),
                original_heading: None,
                body_text: String::new(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_most_recent_update_by_link_or_number() {
        let store = MemoryStore::new();
        let id = store.upsert_label(&new_label("ABC-123", (2022, 3, 15))).await.unwrap();
        store.attach_raw_text(id, "raw").await.unwrap();
        assert!(store.most_recent_update("EMA", "ABC-123").await.unwrap().is_some());
        assert!(store
            .most_recent_update("EMA", "https://www.ema.europa.eu/ABC-123")
            .await
            .unwrap()
            .is_some());
        assert!(store.most_recent_update("TGA", "ABC-123").await.unwrap().is_none());
        let label = store.get_label(id).await.unwrap().unwrap();
        assert_eq!(label.raw_text.as_deref(), Some("raw"));
    }

    #[tokio::test]
    async fn test_known_error_upsert_is_idempotent_per_key() {
        let store = MemoryStore::new();
        store.upsert_known_error("TGA", "u1", ErrorKind::FetchFailed, "timeout").await.unwrap();
        store.upsert_known_error("TGA", "u1", ErrorKind::ParsingError, "no headings").await.unwrap();
        let errors = store.known_errors().await;
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, ErrorKind::ParsingError);
        assert!(store.clear_known_error("TGA", "u1").await.unwrap());
        assert!(!store.clear_known_error("TGA", "u1").await.unwrap());
        assert!(store.known_error("TGA", "u1").await.unwrap().is_none());
    }

    fn section(name: &str) -> NewSection {
        NewSection {
            canonical_name: name.to_string(),
            original_heading: None,
            body_text: "text".to_string(),
        }
    }

    #[tokio::test]
    async fn test_label_graph_inserted_whole() {
        let store = MemoryStore::new();
        let label = new_label("ABC-123", (2022, 3, 15));
        let id = store
            .insert_label_graph(&label, &[section("Indications"), section("Overdose")], "raw")
            .await
            .unwrap();
        assert_eq!(store.sections_for_label(id).await.unwrap().len(), 2);
        assert_eq!(store.get_label(id).await.unwrap().unwrap().raw_text.as_deref(), Some("raw"));

        let err = store.insert_label_graph(&label, &[section("Warnings")], "raw").await.unwrap_err();
        assert!(err.is_duplicate());
        assert_eq!(store.label_count().await.unwrap(), 1);
        assert_eq!(store.sections_for_label(id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_delete_label_frees_natural_key() {
        let store = MemoryStore::new();
        let label = new_label("ABC-123", (2022, 3, 15));
        let keep = store.insert_label_graph(&new_label("B", (2021, 1, 1)), &[section("Warnings")], "").await.unwrap();
        let id = store.insert_label_graph(&label, &[section("Indications")], "").await.unwrap();

        assert!(store.delete_label(id).await.unwrap());
        assert!(!store.delete_label(id).await.unwrap());
        assert!(store.sections_for_label(id).await.unwrap().is_empty());
        assert_eq!(store.sections_for_label(keep).await.unwrap().len(), 1);
        store.upsert_label(&label).await.unwrap();
        // remaining labels are still found by key after the reindex
        assert!(store.upsert_label(&new_label("B", (2021, 1, 1))).await.unwrap_err().is_duplicate());
    }

    #[tokio::test]
    async fn test_latest_labels_picks_newest_version() {
        let store = MemoryStore::new();
        store.upsert_label(&new_label("A", (2021, 1, 1))).await.unwrap();
        store.upsert_label(&new_label("A", (2023, 6, 1))).await.unwrap();
        store.upsert_label(&new_label("B", (2020, 2, 2))).await.unwrap();
        let latest = store.latest_labels("EMA").await.unwrap();
        assert_eq!(latest.len(), 2);
        assert_eq!(latest[0].source_product_number, "A");
        assert_eq!(latest[0].version_date, NaiveDate::from_ymd_opt(2023, 6, 1).unwrap());
    }
}
