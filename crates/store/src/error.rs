//! Typed error type for the store crate.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// A mutation referenced a record that does not exist.
    #[error("{kind} '{id}' not found")]
    NotFound { kind: &'static str, id: String },

    #[error("cannot read job definitions: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid job definitions: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl StoreError {
    pub(crate) fn not_found(kind: &'static str, id: &str) -> Self {
        Self::NotFound {
            kind,
            id: id.to_owned(),
        }
    }
}
