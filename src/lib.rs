//! Studio routing - route-set activation and layer routing
//!
//! Route sets are stored per owner (studio) as defaults plus an override
//! log. This crate resolves them into the effective layer mapping table and
//! device-pool membership, and serializes activation changes per owner so
//! exclusivity groups never end up with two active members.

pub mod activation;
pub mod config;
pub mod lock;
pub mod routing;
pub mod store;

pub use activation::{ActivationError, ActivationOutcome, ResetOutcome, RouteSetController};
pub use config::{ConfigError, EffectiveSettings, Settings};
pub use lock::{LockError, OwnerLock, OwnerLocks};
pub use routing::{
    apply_routes, check_exclusivity, compute_active_routes, filter_disabled_players,
    find_disabled_members, route_sets_from_document, ActiveRoutes, MappingsTable, RouteSet,
};
pub use store::{FsStore, MemoryStore, RouteSetStore, StoreError};
