//! Route-set activation
//!
//! The only writer of route-set `active` flags. Each request runs its whole
//! read-modify-write under the owner's lock and commits the target flag and
//! any exclusivity cascade as one replacement log.

mod controller;

pub use controller::{ActivationOutcome, ResetOutcome, RouteSetController, ACTIVATE_ONLY_RULE};

use thiserror::Error;

use crate::lock::LockError;
use crate::store::StoreError;

/// Errors from activation requests
#[derive(Debug, Error)]
pub enum ActivationError {
    #[error("route set '{route_set_id}' not found")]
    NotFound { route_set_id: String },

    #[error("route set '{route_set_id}' rejected: {rule}")]
    PolicyViolation {
        route_set_id: String,
        rule: &'static str,
    },

    #[error("persistence failure: {0}")]
    Persistence(#[from] StoreError),

    #[error("lock failure: {0}")]
    Lock(#[from] LockError),
}

impl ActivationError {
    /// Whether retrying with fresh state may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Persistence(_) | Self::Lock(_))
    }
}
