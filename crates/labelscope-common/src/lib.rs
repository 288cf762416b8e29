//! labelscope-common: Shared errors, run configuration, logging setup and
//! the allowlisted HTTP client used by every Labelscope crate.

pub mod error;
pub mod config;
pub mod sandbox;
pub mod telemetry;

// Re-export commonly used types
pub use config::{GateConfig, IngestConfig, LoggingConfig, PipelineConfig, RetryConfig, UnclassifiedPolicy};
pub use error::{LabelscopeError, Result};
