//! Active route computation and layer mapping rewrite.
//!
//! Route sets are visited in declaration order. Within an exclusivity group
//! only the first active member contributes routes; later active members
//! are ignored, which keeps the output sane even if stored state violates
//! exclusivity.

use std::collections::{BTreeMap, HashSet};

use serde::Serialize;
use serde_json::Value;
use studio_overrides::{resolve_all_items, ObjectWithOverrides, WrappedItem};

use super::types::{LookaheadMode, Mapping, Remapping, RouteMapping, RouteSet, RouteType};

/// Layer name to mapping.
pub type MappingsTable = BTreeMap<String, Mapping>;

/// Routes contributed by the active route sets.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ActiveRoutes {
    /// Routes on existing input layers, keyed by input layer, in
    /// contribution order
    pub existing: BTreeMap<String, Vec<RouteMapping>>,
    /// Routes that create new layers
    pub inserted: Vec<RouteMapping>,
}

/// A group with more than one active member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExclusivityConflict {
    pub group: String,
    pub active: Vec<String>,
}

/// Lift resolved items into typed route sets, skipping malformed entries.
pub fn route_sets_from_items(items: Vec<WrappedItem<Value>>) -> Vec<WrappedItem<RouteSet>> {
    items
        .into_iter()
        .filter_map(|item| {
            let id = item.id.clone();
            match item.parse::<RouteSet>() {
                Ok(parsed) => Some(parsed),
                Err(err) => {
                    tracing::warn!(
                        target: "studio_routing::routing",
                        route_set = %id,
                        error = %err,
                        "ignoring malformed route set"
                    );
                    None
                }
            }
        })
        .collect()
}

/// Resolve a route-set document into typed wrapped items.
pub fn route_sets_from_document(doc: &ObjectWithOverrides) -> Vec<WrappedItem<RouteSet>> {
    route_sets_from_items(resolve_all_items(&doc.defaults, &doc.overrides))
}

/// Collect the routes of every active route set.
pub fn compute_active_routes(route_sets: &[WrappedItem<RouteSet>]) -> ActiveRoutes {
    let mut active = ActiveRoutes::default();
    let mut claimed_groups: HashSet<&str> = HashSet::new();

    for item in route_sets {
        let Some(route_set) = item.computed.as_ref() else {
            continue;
        };
        if !route_set.active {
            continue;
        }
        if let Some(group) = route_set.group() {
            if !claimed_groups.insert(group) {
                tracing::warn!(
                    target: "studio_routing::routing",
                    route_set = %item.id,
                    group,
                    "group already has an active route set; ignoring this one"
                );
                continue;
            }
        }

        for route in &route_set.routes {
            if route.output_layer().is_none() {
                tracing::warn!(
                    target: "studio_routing::routing",
                    route_set = %item.id,
                    mapped_layer = ?route.mapped_layer,
                    "route has no output layer; skipped"
                );
                continue;
            }
            match route.input_layer() {
                Some(layer) => active
                    .existing
                    .entry(layer.to_string())
                    .or_default()
                    .push(route.clone()),
                None => active.inserted.push(route.clone()),
            }
        }
    }

    active
}

/// Rewrite the input mappings through the active routes.
///
/// Unrouted layers pass through under their own name. Inserted routes are
/// applied last, so they win over an existing output of the same name.
pub fn apply_routes(input: &MappingsTable, routes: &ActiveRoutes) -> MappingsTable {
    let mut output = MappingsTable::new();

    for (layer, mapping) in input {
        let layer_routes = routes.existing.get(layer).map(Vec::as_slice).unwrap_or(&[]);
        if layer_routes.is_empty() {
            output.insert(layer.clone(), mapping.clone());
            continue;
        }
        for route in layer_routes {
            let Some(target) = route.output_layer() else {
                continue;
            };
            let routed = match (route.route_type, route.full_remap()) {
                (RouteType::Remap, Some((device_type, remapping, device_id))) => {
                    remapped(device_type, remapping, device_id)
                }
                _ => merged(mapping, route.remapping.as_ref()),
            };
            output.insert(target.to_string(), routed);
        }
    }

    for route in &routes.inserted {
        let Some(target) = route.output_layer() else {
            continue;
        };
        match route.full_remap() {
            Some((device_type, remapping, device_id)) => {
                output.insert(target.to_string(), remapped(device_type, remapping, device_id));
            }
            None => tracing::warn!(
                target: "studio_routing::routing",
                output_layer = target,
                "new layer route lacks device type or device id; skipped"
            ),
        }
    }

    output
}

/// Members of an exclusivity group, in declaration order.
///
/// Deleted route sets and route sets outside the group are skipped; the scan
/// always covers the whole collection.
pub fn group_members<'a>(
    route_sets: &'a [WrappedItem<RouteSet>],
    group: &'a str,
) -> impl Iterator<Item = (&'a str, &'a RouteSet)> + 'a {
    route_sets.iter().filter_map(move |item| {
        let route_set = item.computed.as_ref()?;
        (route_set.group() == Some(group)).then_some((item.id.as_str(), route_set))
    })
}

/// Groups whose stored state has more than one active member.
pub fn check_exclusivity(route_sets: &[WrappedItem<RouteSet>]) -> Vec<ExclusivityConflict> {
    let mut by_group: BTreeMap<&str, Vec<String>> = BTreeMap::new();
    for item in route_sets {
        let Some(route_set) = item.computed.as_ref() else {
            continue;
        };
        if let (true, Some(group)) = (route_set.active, route_set.group()) {
            by_group.entry(group).or_default().push(item.id.clone());
        }
    }
    by_group
        .into_iter()
        .filter(|(_, active)| active.len() > 1)
        .map(|(group, active)| ExclusivityConflict {
            group: group.to_string(),
            active,
        })
        .collect()
}

fn remapped(device_type: &str, remapping: &Remapping, device_id: &str) -> Mapping {
    Mapping {
        device: Some(device_type.to_string()),
        device_id: Some(device_id.to_string()),
        lookahead: Some(remapping.lookahead.unwrap_or(LookaheadMode::None)),
        options: Some(remapping.options.clone().unwrap_or_default()),
        layer_name: remapping.layer_name.clone(),
        extra: remapping.extra.clone(),
    }
}

fn merged(base: &Mapping, remapping: Option<&Remapping>) -> Mapping {
    let mut mapping = base.clone();
    let Some(remapping) = remapping else {
        return mapping;
    };
    if let Some(device_id) = &remapping.device_id {
        mapping.device_id = Some(device_id.clone());
    }
    if let Some(lookahead) = remapping.lookahead {
        mapping.lookahead = Some(lookahead);
    }
    if let Some(options) = &remapping.options {
        mapping.options = Some(options.clone());
    }
    if let Some(layer_name) = &remapping.layer_name {
        mapping.layer_name = Some(layer_name.clone());
    }
    for (key, value) in &remapping.extra {
        mapping.extra.insert(key.clone(), value.clone());
    }
    mapping
}
