//! Ingestion orchestrator.
//!
//! Drives one run over a list of enumerated documents for a single agency:
//!   1. Gate check (known error, freshness)
//!   2. Fetch with retry, refreshing the transport session every N identifiers
//!   3. Linearize per the agency profile
//!   4. Complete the header from the listing and the document
//!   5. Segment, normalise headings, merge sections
//!   6. Persist the label, then record any terminal failure
//!
//! Identifiers are processed one after another. A failure is caught at the
//! identifier boundary, classified and counted; the run always continues.

use futures::future::join_all;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use labelscope_common::IngestConfig;
use labelscope_db::{ErrorKind, LabelStore};

use crate::agencies::AgencyProfile;
use crate::assemble::{classify_sections, merge_sections, persist_label, AssemblyOutcome};
use crate::error::IngestError;
use crate::gate::{FreshnessGate, GateDecision};
use crate::linearize::linearize;
use crate::models::DocumentRef;
use crate::retry::{fetch_with_retry, RetryPolicy};
use crate::segment::{segment, SegmentationPlan, Strategy};
use crate::transport::Transport;

// ── Cancellation ──────────────────────────────────────────────────────────────

/// Cooperative stop signal, checked between identifiers.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ── Progress events ───────────────────────────────────────────────────────────

/// Outcome of one identifier.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum DocumentStatus {
    Stored { sections: usize },
    AlreadyIngested,
    SkippedFresh,
    SkippedKnownError { kind: ErrorKind },
    Failed { kind: ErrorKind, message: String },
}

/// Emitted once per identifier (cloneable for broadcast).
#[derive(Debug, Clone, Serialize)]
pub struct IngestProgress {
    pub run_id: Uuid,
    pub source: String,
    pub identifier: String,
    pub position: usize,
    pub total: usize,
    pub status: DocumentStatus,
}

// ── Result summary ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FailureRecord {
    pub identifier: String,
    pub kind: ErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub source: String,
    /// Identifiers that went past the gate.
    pub processed: usize,
    pub succeeded: usize,
    pub skipped_fresh: usize,
    pub skipped_known_error: usize,
    pub already_ingested: usize,
    pub failed_by_kind: BTreeMap<String, usize>,
    pub failures: Vec<FailureRecord>,
    /// Set when the run stopped before the last identifier.
    pub cancelled: bool,
    pub duration_ms: u64,
}

impl RunSummary {
    fn new(run_id: Uuid, source: &str) -> Self {
        Self {
            run_id,
            source: source.to_string(),
            processed: 0,
            succeeded: 0,
            skipped_fresh: 0,
            skipped_known_error: 0,
            already_ingested: 0,
            failed_by_kind: BTreeMap::new(),
            failures: Vec::new(),
            cancelled: false,
            duration_ms: 0,
        }
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    fn tally(&mut self, identifier: &str, status: &DocumentStatus) {
        match status {
            DocumentStatus::Stored { .. } => {
                self.processed += 1;
                self.succeeded += 1;
            }
            DocumentStatus::AlreadyIngested => {
                self.processed += 1;
                self.already_ingested += 1;
            }
            DocumentStatus::SkippedFresh => self.skipped_fresh += 1,
            DocumentStatus::SkippedKnownError { .. } => self.skipped_known_error += 1,
            DocumentStatus::Failed { kind, message } => {
                self.processed += 1;
                *self.failed_by_kind.entry(kind.to_string()).or_insert(0) += 1;
                self.failures.push(FailureRecord {
                    identifier: identifier.to_string(),
                    kind: *kind,
                    message: message.clone(),
                });
            }
        }
    }
}

// ── Orchestrator ──────────────────────────────────────────────────────────────

pub struct Orchestrator {
    store: Arc<dyn LabelStore>,
    transport: Arc<dyn Transport>,
    profile: AgencyProfile,
    config: IngestConfig,
    retry: RetryPolicy,
    gate: FreshnessGate,
    progress_tx: Option<broadcast::Sender<IngestProgress>>,
    cancel: Option<CancellationFlag>,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn LabelStore>,
        transport: Arc<dyn Transport>,
        profile: AgencyProfile,
        config: IngestConfig,
    ) -> Self {
        let gate = FreshnessGate::new(store.clone(), &config.gate);
        let retry = RetryPolicy::from_config(&config.retry);
        Self {
            store,
            transport,
            profile,
            config,
            retry,
            gate,
            progress_tx: None,
            cancel: None,
        }
    }

    /// Replace the backoff schedule derived from the configuration.
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    pub fn with_progress(mut self, tx: broadcast::Sender<IngestProgress>) -> Self {
        self.progress_tx = Some(tx);
        self
    }

    pub fn with_cancellation(mut self, flag: CancellationFlag) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn profile(&self) -> &AgencyProfile {
        &self.profile
    }

    /// The profile's plan, with the configured minimum applied when the
    /// primary strategy counts numbered headings.
    fn plan(&self) -> SegmentationPlan {
        let mut plan = self.profile.plan.clone();
        if matches!(plan.primary.first(), Some(Strategy::Numbered(_))) {
            plan.min_headings = self.config.pipeline.min_numbered_headings;
        }
        plan
    }

    #[instrument(skip(self, docs), fields(source = %self.profile.code, total = docs.len()))]
    pub async fn run(&self, docs: &[DocumentRef]) -> RunSummary {
        let run_id = Uuid::new_v4();
        let t0 = std::time::Instant::now();
        let source = self.profile.code.as_str();
        let plan = self.plan();
        let refresh_every = self.config.pipeline.session_refresh_every;
        let mut summary = RunSummary::new(run_id, source);

        info!(run_id = %run_id, source, total = docs.len(), "Starting ingestion run");

        for (position, doc) in docs.iter().enumerate() {
            if self.cancel.as_ref().is_some_and(|c| c.is_cancelled()) {
                warn!(run_id = %run_id, position, "Run cancelled");
                summary.cancelled = true;
                break;
            }

            if refresh_every > 0 && position > 0 && position % refresh_every == 0 {
                match self.transport.refresh_session().await {
                    Ok(()) => debug!(position, "Transport session refreshed"),
                    Err(e) => warn!(position, error = %e, "Session refresh failed"),
                }
            }

            let status = self.process(doc, &plan).await;
            match &status {
                DocumentStatus::Failed { kind, message } => {
                    warn!(source, identifier = %doc.identifier, kind = %kind, error = %message, "Document failed");
                }
                other => {
                    debug!(source, identifier = %doc.identifier, status = ?other, "Document done");
                }
            }

            summary.tally(&doc.identifier, &status);
            if let Some(tx) = &self.progress_tx {
                let _ = tx.send(IngestProgress {
                    run_id,
                    source: source.to_string(),
                    identifier: doc.identifier.clone(),
                    position,
                    total: docs.len(),
                    status,
                });
            }
        }

        summary.duration_ms = t0.elapsed().as_millis() as u64;
        info!(
            run_id = %run_id,
            source,
            processed = summary.processed,
            succeeded = summary.succeeded,
            skipped_fresh = summary.skipped_fresh,
            skipped_known_error = summary.skipped_known_error,
            already_ingested = summary.already_ingested,
            failed = summary.failed(),
            duration_ms = summary.duration_ms,
            "Ingestion run complete"
        );
        summary
    }

    /// One identifier, gate to gate. Never returns an error: every failure
    /// is folded into the status.
    async fn process(&self, doc: &DocumentRef, plan: &SegmentationPlan) -> DocumentStatus {
        let source = self.profile.code.as_str();

        match self.gate.check(source, &doc.identifier).await {
            Ok(GateDecision::Proceed) => {}
            Ok(GateDecision::SkipFresh { .. }) => return DocumentStatus::SkippedFresh,
            Ok(GateDecision::SkipKnownError { kind }) => return DocumentStatus::SkippedKnownError { kind },
            Err(e) => return self.fail(doc, e, false).await,
        }

        match self.ingest(doc, plan).await {
            Ok(AssemblyOutcome::Inserted { sections, .. }) => {
                info!(source, identifier = %doc.identifier, sections, "Label ingested");
                DocumentStatus::Stored { sections }
            }
            Ok(AssemblyOutcome::AlreadyIngested) => DocumentStatus::AlreadyIngested,
            Err(IngestError::Duplicate(_)) => DocumentStatus::AlreadyIngested,
            Err(e) => {
                let record = match &e {
                    IngestError::MissingField(_) => self.config.pipeline.record_missing_fields,
                    // nothing was written, the next run retries
                    IngestError::Storage(_) => false,
                    _ => true,
                };
                self.fail(doc, e, record).await
            }
        }
    }

    async fn ingest(&self, doc: &DocumentRef, plan: &SegmentationPlan) -> Result<AssemblyOutcome, IngestError> {
        let source = self.profile.code.as_str();

        let fetched = fetch_with_retry(self.transport.as_ref(), doc, &self.retry).await?;
        debug!(identifier = %doc.identifier, bytes = fetched.payload.len(), "Fetched");

        let lines = linearize(&fetched.payload, self.profile.kind, &self.profile.linearize)?;

        // listing fields win over what the document says about itself
        let mut header = doc.header.clone();
        header.fill_from(lines.header.clone());
        let label = header.complete(source, &doc.identifier)?;

        let raw = segment(&lines, plan)?;
        let classified = classify_sections(&raw, &self.profile.normalizer());
        let sections = merge_sections(&classified, self.config.pipeline.unclassified);
        debug!(
            identifier = %doc.identifier,
            segments = raw.len(),
            sections = sections.len(),
            "Segmented"
        );

        persist_label(self.store.as_ref(), &label, &sections, &lines.text()).await
    }

    async fn fail(&self, doc: &DocumentRef, error: IngestError, record: bool) -> DocumentStatus {
        let kind = error.kind().unwrap_or(ErrorKind::StorageError);
        if record {
            if let Err(e) = self.gate.record_failure(&self.profile.code, &doc.identifier, &error).await {
                warn!(identifier = %doc.identifier, error = %e, "Could not record known error");
            }
        }
        DocumentStatus::Failed { kind, message: error.to_string() }
    }
}

// ── Shards ────────────────────────────────────────────────────────────────────

/// Drive independent orchestrators concurrently, e.g. one per agency.
///
/// Each shard keeps its own transport and session; shards sharing a store
/// rely on its natural-key check to turn duplicate work into
/// `already_ingested`. Summaries come back in shard order.
pub async fn run_shards(shards: &[(Orchestrator, Vec<DocumentRef>)]) -> Vec<RunSummary> {
    info!(shards = shards.len(), "Running ingestion shards");
    join_all(shards.iter().map(|(orch, docs)| orch.run(docs))).await
}
