//! Freshness and known-error gating.
//!
//! Decides, before any fetch, whether an identifier needs work: identifiers
//! with a recorded permanent failure are skipped (when configured), as are
//! identifiers whose label was updated inside the freshness window.

use chrono::{DateTime, Utc};
use labelscope_common::GateConfig;
use labelscope_db::{ErrorKind, LabelStore};
use std::sync::Arc;
use tracing::debug;

use crate::error::IngestError;

#[derive(Debug, Clone, PartialEq)]
pub enum GateDecision {
    Proceed,
    SkipFresh { updated_at: DateTime<Utc> },
    SkipKnownError { kind: ErrorKind },
}

pub struct FreshnessGate {
    store: Arc<dyn LabelStore>,
    window: chrono::Duration,
    skip_known_errors: bool,
}

impl FreshnessGate {
    pub fn new(store: Arc<dyn LabelStore>, config: &GateConfig) -> Self {
        Self {
            store,
            window: config.freshness_window(),
            skip_known_errors: config.skip_known_errors,
        }
    }

    pub async fn check(&self, source: &str, identifier: &str) -> Result<GateDecision, IngestError> {
        self.check_at(source, identifier, Utc::now()).await
    }

    pub async fn check_at(
        &self,
        source: &str,
        identifier: &str,
        now: DateTime<Utc>,
    ) -> Result<GateDecision, IngestError> {
        if self.skip_known_errors {
            if let Some(known) = self.store.known_error(source, identifier).await? {
                debug!(source, identifier, kind = %known.kind, "Known error, skipping");
                return Ok(GateDecision::SkipKnownError { kind: known.kind });
            }
        }

        if let Some(updated_at) = self.store.most_recent_update(source, identifier).await? {
            if now - updated_at < self.window {
                debug!(source, identifier, %updated_at, "Fresh, skipping");
                return Ok(GateDecision::SkipFresh { updated_at });
            }
        }

        Ok(GateDecision::Proceed)
    }

    /// Persist a permanent failure. Duplicates carry no kind and are ignored.
    pub async fn record_failure(
        &self,
        source: &str,
        identifier: &str,
        error: &IngestError,
    ) -> Result<(), IngestError> {
        if let Some(kind) = error.kind() {
            self.store
                .upsert_known_error(source, identifier, kind, &error.to_string())
                .await?;
        }
        Ok(())
    }
}
