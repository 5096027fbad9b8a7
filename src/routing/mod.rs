//! Routing resolution
//!
//! Derives the effective layer mapping table and device-pool membership from
//! resolved route sets. Everything here is read-only and side-effect free.

mod engine;
mod pool;
mod types;

pub use engine::{
    apply_routes, check_exclusivity, compute_active_routes, group_members, route_sets_from_document,
    route_sets_from_items, ActiveRoutes, ExclusivityConflict, MappingsTable,
};
pub use pool::{filter_disabled_players, find_disabled_members, PoolMemberStatus};
pub use types::{
    LookaheadMode, Mapping, PlayerId, PoolMembership, Remapping, RouteMapping,
    RouteSet, RouteSetBehavior, RouteType,
};
