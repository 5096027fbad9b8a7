//! File-backed document store: one JSON document per owner.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use studio_overrides::{ObjectWithOverrides, OverrideOp};

use super::{validate_owner_id, RouteSetStore, StoreError};

/// Schema version of the on-disk document
pub const DOCUMENT_SCHEMA_VERSION: u32 = 1;

/// On-disk form of an owner's route-set document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredDocument {
    pub schema_version: u32,

    /// Time of the last write
    pub updated_at: DateTime<Utc>,

    pub defaults: Value,

    #[serde(default)]
    pub overrides: Vec<OverrideOp>,
}

impl StoredDocument {
    fn into_document(self) -> ObjectWithOverrides {
        ObjectWithOverrides::new(self.defaults, self.overrides)
    }
}

/// Stores `<dir>/<owner>.json`, replacing files with write-then-rename.
#[derive(Debug, Clone)]
pub struct FsStore {
    dir: PathBuf,
}

impl FsStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of an owner's document
    pub fn document_path(&self, owner_id: &str) -> Result<PathBuf, StoreError> {
        validate_owner_id(owner_id)?;
        Ok(self.dir.join(format!("{}.json", owner_id)))
    }

    /// Seed an owner's document from a defaults tree with an empty log.
    ///
    /// An existing document is replaced, log included.
    pub fn init(&self, owner_id: &str, defaults: Value) -> Result<StoredDocument, StoreError> {
        let path = self.document_path(owner_id)?;
        fs::create_dir_all(&self.dir)?;

        let stored = StoredDocument {
            schema_version: DOCUMENT_SCHEMA_VERSION,
            updated_at: Utc::now(),
            defaults,
            overrides: Vec::new(),
        };
        self.write_document(&path, &stored)?;

        tracing::info!(
            target: "studio_routing::store",
            owner_id,
            path = %path.display(),
            "initialized route-set document"
        );
        Ok(stored)
    }

    /// Read the full on-disk document, metadata included.
    pub fn load_document(&self, owner_id: &str) -> Result<StoredDocument, StoreError> {
        let path = self.document_path(owner_id)?;
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound {
                    owner_id: owner_id.to_string(),
                })
            }
            Err(err) => return Err(err.into()),
        };

        let stored: StoredDocument = serde_json::from_slice(&bytes)?;
        if stored.schema_version != DOCUMENT_SCHEMA_VERSION {
            return Err(StoreError::SchemaVersion {
                found: stored.schema_version,
                expected: DOCUMENT_SCHEMA_VERSION,
            });
        }
        Ok(stored)
    }

    fn write_document(&self, path: &Path, stored: &StoredDocument) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(stored)?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let temp_path = self.dir.join(format!(".{}.tmp", file_name));

        fs::write(&temp_path, json)?;
        if let Err(err) = fs::rename(&temp_path, path) {
            let _ = fs::remove_file(&temp_path);
            return Err(err.into());
        }
        Ok(())
    }
}

impl RouteSetStore for FsStore {
    fn load(&self, owner_id: &str) -> Result<ObjectWithOverrides, StoreError> {
        Ok(self.load_document(owner_id)?.into_document())
    }

    fn save(&self, owner_id: &str, overrides: Vec<OverrideOp>) -> Result<(), StoreError> {
        let mut stored = self.load_document(owner_id)?;
        stored.overrides = overrides;
        stored.updated_at = Utc::now();

        let path = self.document_path(owner_id)?;
        self.write_document(&path, &stored)?;

        tracing::debug!(
            target: "studio_routing::store",
            owner_id,
            ops = stored.overrides.len(),
            "saved override log"
        );
        Ok(())
    }
}
