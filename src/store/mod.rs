//! Persistence of route-set documents
//!
//! A document is one owner's defaults plus override log. Both stores treat
//! load and save as whole-document operations: a save either replaces the
//! log completely or leaves the previous one in place.

mod fs;
mod memory;

pub use fs::{FsStore, StoredDocument, DOCUMENT_SCHEMA_VERSION};
pub use memory::MemoryStore;

use studio_overrides::{ObjectWithOverrides, OverrideOp};
use thiserror::Error;

/// Errors from store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no route-set document for owner '{owner_id}'")]
    NotFound { owner_id: String },

    #[error("invalid owner id '{owner_id}': {reason}")]
    InvalidOwner { owner_id: String, reason: &'static str },

    #[error("unsupported document schema version {found} (expected {expected})")]
    SchemaVersion { found: u32, expected: u32 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Load/replace access to one document per owner.
pub trait RouteSetStore {
    fn load(&self, owner_id: &str) -> Result<ObjectWithOverrides, StoreError>;

    /// Replace the owner's override log. Defaults are left untouched.
    fn save(&self, owner_id: &str, overrides: Vec<OverrideOp>) -> Result<(), StoreError>;
}

impl<S: RouteSetStore + ?Sized> RouteSetStore for &S {
    fn load(&self, owner_id: &str) -> Result<ObjectWithOverrides, StoreError> {
        (**self).load(owner_id)
    }

    fn save(&self, owner_id: &str, overrides: Vec<OverrideOp>) -> Result<(), StoreError> {
        (**self).save(owner_id, overrides)
    }
}

impl<S: RouteSetStore + ?Sized> RouteSetStore for std::sync::Arc<S> {
    fn load(&self, owner_id: &str) -> Result<ObjectWithOverrides, StoreError> {
        (**self).load(owner_id)
    }

    fn save(&self, owner_id: &str, overrides: Vec<OverrideOp>) -> Result<(), StoreError> {
        (**self).save(owner_id, overrides)
    }
}

/// Owner ids become file names, so keep them to a safe alphabet.
pub fn validate_owner_id(owner_id: &str) -> Result<(), StoreError> {
    let invalid = |reason| {
        Err(StoreError::InvalidOwner {
            owner_id: owner_id.to_string(),
            reason,
        })
    };
    if owner_id.is_empty() {
        return invalid("must not be empty");
    }
    if owner_id.len() > 128 {
        return invalid("longer than 128 characters");
    }
    if owner_id.starts_with('.') {
        return invalid("must not start with '.'");
    }
    if !owner_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return invalid("only ASCII letters, digits, '-', '_' and '.' are allowed");
    }
    Ok(())
}
