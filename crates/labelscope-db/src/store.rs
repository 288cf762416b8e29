//! Storage contract consumed by the ingestion core.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::schema::{ErrorKind, KnownError, Label, NewLabel, NewSection, Section};

/// Label/section persistence plus the freshness and known-error registries.
///
/// Implementations must be safe to share between independent workers:
/// `upsert_label` has to detect natural-key collisions atomically and
/// `upsert_known_error` is last-writer-wins per key.
#[async_trait]
pub trait LabelStore: Send + Sync {
    // ── Labels ───────────────────────────────────────────────────────────────

    /// Insert a label. Returns `DbError::Duplicate` if its natural key exists.
    async fn upsert_label(&self, label: &NewLabel) -> Result<Uuid>;

    async fn add_product(&self, label_id: Uuid) -> Result<Uuid>;

    async fn add_section(&self, product_id: Uuid, section: &NewSection) -> Result<Uuid>;

    /// Attach the full linearized text to an existing label.
    async fn attach_raw_text(&self, label_id: Uuid, raw_text: &str) -> Result<()>;

    /// Remove a label with its products and sections. Returns whether it existed.
    async fn delete_label(&self, label_id: Uuid) -> Result<bool>;

    /// Insert a label, one product, its sections and raw text as one unit.
    ///
    /// Returns `DbError::Duplicate` without writing if the natural key exists.
    /// The default writes step by step and deletes the label again if a later
    /// step fails; stores with transactions should override it.
    async fn insert_label_graph(&self, label: &NewLabel, sections: &[NewSection], raw_text: &str) -> Result<Uuid> {
        let label_id = self.upsert_label(label).await?;
        let written = async {
            let product_id = self.add_product(label_id).await?;
            for section in sections {
                self.add_section(product_id, section).await?;
            }
            self.attach_raw_text(label_id, raw_text).await
        }
        .await;

        if let Err(e) = written {
            tracing::warn!(key = %label.key, error = %e, "Label write failed, rolling back");
            if let Err(cleanup) = self.delete_label(label_id).await {
                tracing::error!(key = %label.key, error = %cleanup, "Rollback failed, partial label left");
            }
            return Err(e);
        }
        Ok(label_id)
    }

    async fn get_label(&self, label_id: Uuid) -> Result<Option<Label>>;

    /// Sections of every product of a label, in insertion order.
    async fn sections_for_label(&self, label_id: Uuid) -> Result<Vec<Section>>;

    async fn label_count(&self) -> Result<usize>;

    /// Newest version per `source_product_number` for one source.
    async fn latest_labels(&self, source: &str) -> Result<Vec<Label>>;

    // ── Freshness ────────────────────────────────────────────────────────────

    /// Most recent `updated_at` among labels whose link or product number
    /// equals `identifier`.
    async fn most_recent_update(&self, source: &str, identifier: &str) -> Result<Option<DateTime<Utc>>>;

    // ── Known errors ─────────────────────────────────────────────────────────

    async fn known_error(&self, source: &str, identifier: &str) -> Result<Option<KnownError>>;

    async fn upsert_known_error(
        &self,
        source: &str,
        identifier: &str,
        kind: ErrorKind,
        message: &str,
    ) -> Result<()>;

    /// Administrative reset. Returns whether a record was removed.
    async fn clear_known_error(&self, source: &str, identifier: &str) -> Result<bool>;
}
