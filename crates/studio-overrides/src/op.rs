//! Override operations and the persisted defaults-plus-log document.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::path::OverridePath;
use crate::resolve::resolve;

/// Generate a new operation id (lowercase ULID).
pub fn generate_op_id() -> String {
    ulid::Ulid::new().to_string().to_lowercase()
}

/// A single persisted edit.
///
/// Operations are applied in log order; a later operation on an equal or
/// ancestor path supersedes earlier ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum OverrideOp {
    /// Install `value` at `path`, creating intermediate containers.
    Set {
        #[serde(rename = "opId")]
        op_id: String,
        path: OverridePath,
        value: Value,
    },
    /// Remove whatever is at `path`.
    Delete {
        #[serde(rename = "opId")]
        op_id: String,
        path: OverridePath,
    },
}

impl OverrideOp {
    /// New `Set` with a fresh id.
    pub fn set(path: OverridePath, value: Value) -> Self {
        OverrideOp::Set {
            op_id: generate_op_id(),
            path,
            value,
        }
    }

    /// New `Delete` with a fresh id.
    pub fn delete(path: OverridePath) -> Self {
        OverrideOp::Delete {
            op_id: generate_op_id(),
            path,
        }
    }

    pub fn op_id(&self) -> &str {
        match self {
            OverrideOp::Set { op_id, .. } | OverrideOp::Delete { op_id, .. } => op_id,
        }
    }

    pub fn path(&self) -> &OverridePath {
        match self {
            OverrideOp::Set { path, .. } | OverrideOp::Delete { path, .. } => path,
        }
    }

    pub fn is_delete(&self) -> bool {
        matches!(self, OverrideOp::Delete { .. })
    }

    /// Whether applying this op can change the value at `path`.
    ///
    /// True when the op targets `path`, one of its ancestors or one of its
    /// descendants.
    pub fn affects(&self, path: &OverridePath) -> bool {
        self.path().starts_with(path) || path.starts_with(self.path())
    }

    /// Same op moved to a different path, keeping its id.
    pub fn with_path(&self, path: OverridePath) -> Self {
        match self {
            OverrideOp::Set { op_id, value, .. } => OverrideOp::Set {
                op_id: op_id.clone(),
                path,
                value: value.clone(),
            },
            OverrideOp::Delete { op_id, .. } => OverrideOp::Delete {
                op_id: op_id.clone(),
                path,
            },
        }
    }
}

/// Immutable defaults plus the ordered log of edits against them.
///
/// This is the only persisted form; the merged value is always recomputed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectWithOverrides<T = Value> {
    pub defaults: T,
    #[serde(default)]
    pub overrides: Vec<OverrideOp>,
}

impl<T> ObjectWithOverrides<T> {
    pub fn new(defaults: T, overrides: Vec<OverrideOp>) -> Self {
        Self {
            defaults,
            overrides,
        }
    }

    /// Wrap a legacy flat record: its values become the defaults and the
    /// log starts empty.
    pub fn from_legacy(value: T) -> Self {
        Self {
            defaults: value,
            overrides: Vec::new(),
        }
    }

    /// Same defaults, replaced log.
    pub fn with_overrides(self, overrides: Vec<OverrideOp>) -> Self {
        Self {
            defaults: self.defaults,
            overrides,
        }
    }
}

impl<T> ObjectWithOverrides<T>
where
    T: Serialize + DeserializeOwned,
{
    /// Apply the log to the defaults and read the result back as `T`.
    pub fn resolved(&self) -> Result<T, serde_json::Error> {
        let defaults = serde_json::to_value(&self.defaults)?;
        serde_json::from_value(resolve(&defaults, &self.overrides))
    }

    /// Untyped view of the same document.
    pub fn to_untyped(&self) -> Result<ObjectWithOverrides<Value>, serde_json::Error> {
        Ok(ObjectWithOverrides {
            defaults: serde_json::to_value(&self.defaults)?,
            overrides: self.overrides.clone(),
        })
    }
}
