//! In-memory document store.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use studio_overrides::{ObjectWithOverrides, OverrideOp};

use super::{RouteSetStore, StoreError};

/// Documents keyed by owner id, replaced whole on save.
#[derive(Debug, Default)]
pub struct MemoryStore {
    documents: RwLock<HashMap<String, ObjectWithOverrides>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed (or replace) an owner's document.
    pub fn insert(&self, owner_id: impl Into<String>, document: ObjectWithOverrides) {
        self.documents
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(owner_id.into(), document);
    }

    pub fn with_document(self, owner_id: impl Into<String>, document: ObjectWithOverrides) -> Self {
        self.insert(owner_id, document);
        self
    }
}

impl RouteSetStore for MemoryStore {
    fn load(&self, owner_id: &str) -> Result<ObjectWithOverrides, StoreError> {
        self.documents
            .read()
            .map_err(|_| StoreError::Unavailable("document map poisoned".to_string()))?
            .get(owner_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                owner_id: owner_id.to_string(),
            })
    }

    fn save(&self, owner_id: &str, overrides: Vec<OverrideOp>) -> Result<(), StoreError> {
        let mut documents = self
            .documents
            .write()
            .map_err(|_| StoreError::Unavailable("document map poisoned".to_string()))?;
        let document = documents.get_mut(owner_id).ok_or_else(|| StoreError::NotFound {
            owner_id: owner_id.to_string(),
        })?;
        document.overrides = overrides;
        Ok(())
    }
}
