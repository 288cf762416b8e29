//! Labelscope storage layer.
//!
//! Defines the narrow storage contract the ingestion core writes through
//! (`LabelStore`), the persisted row types, and `MemoryStore`, an
//! in-process implementation that can snapshot itself to JSON.
//!
//! # Example
//!
//! ```rust,no_run
//! use labelscope_db::{LabelStore, MemoryStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = MemoryStore::load_snapshot("./data/labels.json").await?;
//!     println!("{} labels", store.label_count().await?);
//!     store.save_snapshot("./data/labels.json").await?;
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod schema;
pub mod store;
pub mod memory;

pub use error::{DbError, Result};
pub use schema::{
    ErrorKind, KnownError, Label, NaturalKey, NewLabel, NewSection, Product, Section,
    SECTION_OTHER,
};
pub use store::LabelStore;
pub use memory::MemoryStore;
