//! Device-pool membership derived from route-set state.

use std::borrow::Borrow;

use serde::Serialize;
use studio_overrides::WrappedItem;

use super::types::{PlayerId, RouteSet};

/// Membership of one pool player, as dictated by one route set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolMemberStatus {
    pub pool_name: String,
    pub player_id: PlayerId,
    pub disabled: bool,
}

/// Flatten every route set's pool players; a player is disabled while its
/// route set is inactive.
pub fn find_disabled_members(route_sets: &[WrappedItem<RouteSet>]) -> Vec<PoolMemberStatus> {
    route_sets
        .iter()
        .filter_map(|item| item.computed.as_ref())
        .flat_map(|route_set| {
            route_set.ab_players.iter().map(move |member| PoolMemberStatus {
                pool_name: member.pool_name.clone(),
                player_id: member.player_id.clone(),
                disabled: !route_set.active,
            })
        })
        .collect()
}

/// Drop the players of `pool_name` that some route set disables.
///
/// No membership data means no restriction.
pub fn filter_disabled_players<P>(
    pool_name: &str,
    players: Vec<P>,
    members: &[PoolMemberStatus],
) -> Vec<P>
where
    P: Borrow<PlayerId>,
{
    if members.is_empty() {
        return players;
    }
    players
        .into_iter()
        .filter(|player| {
            let id: &PlayerId = player.borrow();
            !members
                .iter()
                .any(|member| {
                    member.disabled && member.pool_name == pool_name && &member.player_id == id
                })
        })
        .collect()
}
