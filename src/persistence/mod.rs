//! # Persistence Module
//!
//! Saving and loading the binding table between runs.
//!
//! Bindings are stored by device name only. Runtime ids are dropped on save
//! and re-derived on load by [`crate::controller::registry::reconcile`], so a
//! stored table survives devices being re-plugged in a different order.
//!
//! A missing store is not an error: it loads as an empty table. A store that
//! exists but cannot be parsed is reported, never silently replaced.

pub mod binding_store;

pub use binding_store::{MemoryBindingStore, TomlBindingStore};

use crate::mapping::binding::BindingTable;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Failed to serialize bindings: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Where the binding table lives between runs
pub trait BindingStore: Send {
    fn load(&self) -> Result<BindingTable, StoreError>;

    /// Replaces the stored table with `table`.
    fn save(&mut self, table: &BindingTable) -> Result<(), StoreError>;

    /// Removes the stored table entirely.
    fn clear(&mut self) -> Result<(), StoreError>;
}
