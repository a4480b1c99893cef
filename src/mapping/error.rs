//! Errors of the binding engine

use crate::persistence::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MappingError {
    /// The name matches none of the trim functions
    #[error("Unknown trim function: {0:?}")]
    UnknownFunction(String),

    /// Loading or saving the binding table failed
    #[error("Binding store error: {0}")]
    Store(#[from] StoreError),

    /// No binding capture is in progress
    #[error("Not in bind mode")]
    NotBinding,
}
