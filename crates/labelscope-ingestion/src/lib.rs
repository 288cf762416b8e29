//! labelscope-ingestion: Drug label ingestion pipeline.
//! Turns regulator-published labels into canonical clinical sections:
//! - Transport capability (HTTP with session cookies, local mirror)
//! - Fetch retry with exponential backoff and jitter
//! - Linearization of PDF, markup and SPL XML documents
//! - Numbered / titled / marked heading segmentation
//! - Edit-distance heading normalisation
//! - Section merging and persistence
//! - Freshness and known-error gating
//! - Per-agency profiles (TGA, HC, EMA, FDA)

pub mod agencies;
pub mod assemble;
pub mod error;
pub mod gate;
pub mod linearize;
pub mod models;
pub mod normalise;
pub mod pipeline;
pub mod retry;
pub mod segment;
pub mod transport;

pub use agencies::{profile_for, AgencyProfile};
pub use error::IngestError;
pub use models::{CanonicalSection, DocumentKind, DocumentRef, HeaderFields};
pub use pipeline::{CancellationFlag, Orchestrator, RunSummary};
pub use transport::{FileTransport, HttpTransport, Transport, TransportError};
