//! Activation state machine and exclusivity cascade.

use std::collections::HashSet;

use serde::Serialize;
use serde_json::Value;
use studio_overrides::{OverrideOp, OverrideOpHelper, OverridePath, WrappedItem};

use super::ActivationError;
use crate::lock::OwnerLock;
use crate::routing::{group_members, route_sets_from_document, RouteSet, RouteSetBehavior};
use crate::store::{RouteSetStore, StoreError};

/// Rule named when an ACTIVATE_ONLY route set is asked to deactivate
pub const ACTIVATE_ONLY_RULE: &str =
    "ACTIVATE_ONLY route sets are deactivated only by activating another member of their group";

const ACTIVE_FIELD: &str = "active";

/// Result of a successful activation request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivationOutcome {
    pub route_set_id: String,
    pub active: bool,
    pub previously_active: bool,
    /// Group siblings that were active and got deactivated
    pub deactivated: Vec<String>,
    /// False when the request changed nothing and no save happened
    pub committed: bool,
    pub log_len: usize,
}

/// Result of restoring default activation states
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetOutcome {
    pub activated: Vec<String>,
    pub deactivated: Vec<String>,
    pub committed: bool,
    pub log_len: usize,
}

/// Route-set activation over a store, serialized per owner.
#[derive(Debug)]
pub struct RouteSetController<S, L> {
    store: S,
    locks: L,
}

impl<S, L> RouteSetController<S, L>
where
    S: RouteSetStore,
    L: OwnerLock,
{
    pub fn new(store: S, locks: L) -> Self {
        Self { store, locks }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Current route sets of an owner, read without the lock.
    pub fn route_sets(
        &self,
        owner_id: &str,
    ) -> Result<Vec<WrappedItem<RouteSet>>, ActivationError> {
        Ok(route_sets_from_document(&self.store.load(owner_id)?))
    }

    /// Activate or deactivate a route set.
    ///
    /// Activating deactivates every other member of the target's exclusivity
    /// group in the same commit.
    pub fn set_route_set_active(
        &self,
        owner_id: &str,
        route_set_id: &str,
        active: bool,
    ) -> Result<ActivationOutcome, ActivationError> {
        self.locks
            .with_owner_lock(owner_id, || self.apply_activation(owner_id, route_set_id, active))?
    }

    /// Restore every route set with a `defaultActive` to that state, then
    /// re-enforce exclusivity (first member in order wins).
    pub fn reset_route_sets(&self, owner_id: &str) -> Result<ResetOutcome, ActivationError> {
        self.locks
            .with_owner_lock(owner_id, || self.apply_reset(owner_id))?
    }

    fn apply_activation(
        &self,
        owner_id: &str,
        route_set_id: &str,
        active: bool,
    ) -> Result<ActivationOutcome, ActivationError> {
        let document = self.store.load(owner_id)?;
        let route_sets = route_sets_from_document(&document);

        let target = route_sets
            .iter()
            .find(|item| item.id == route_set_id)
            .and_then(|item| item.computed.as_ref())
            .ok_or_else(|| ActivationError::NotFound {
                route_set_id: route_set_id.to_string(),
            })?;

        if !active && target.behavior == RouteSetBehavior::ActivateOnly {
            tracing::info!(
                target: "studio_routing::activation",
                owner_id,
                route_set_id,
                "rejected deactivation of ACTIVATE_ONLY route set"
            );
            return Err(ActivationError::PolicyViolation {
                route_set_id: route_set_id.to_string(),
                rule: ACTIVATE_ONLY_RULE,
            });
        }

        let active_field = OverridePath::parse(ACTIVE_FIELD);
        let mut deactivated = Vec::new();
        let mut helper =
            OverrideOpHelper::new(&document, |ops: Vec<OverrideOp>| self.save(owner_id, ops));
        let mut batch = helper.batch();

        batch.set_item_value(route_set_id, &active_field, Value::Bool(active));
        if let (true, Some(group)) = (active, target.group()) {
            for (sibling_id, sibling) in group_members(&route_sets, group) {
                if sibling_id == route_set_id {
                    continue;
                }
                if sibling.active {
                    deactivated.push(sibling_id.to_string());
                }
                batch.set_item_value(sibling_id, &active_field, Value::Bool(false));
            }
        }

        let unchanged = batch.ops() == document.overrides.as_slice();
        let log_len = if unchanged {
            tracing::debug!(
                target: "studio_routing::activation",
                owner_id,
                route_set_id,
                active,
                "route set already in requested state"
            );
            document.overrides.len()
        } else {
            batch.commit()?
        };

        tracing::info!(
            target: "studio_routing::activation",
            owner_id,
            route_set_id,
            active,
            deactivated = deactivated.len(),
            committed = !unchanged,
            "route set activation applied"
        );

        Ok(ActivationOutcome {
            route_set_id: route_set_id.to_string(),
            active,
            previously_active: target.active,
            deactivated,
            committed: !unchanged,
            log_len,
        })
    }

    fn apply_reset(&self, owner_id: &str) -> Result<ResetOutcome, ActivationError> {
        let document = self.store.load(owner_id)?;
        let route_sets = route_sets_from_document(&document);

        let mut plan: Vec<ResetStep<'_>> = route_sets
            .iter()
            .filter_map(|item| {
                let route_set = item.computed.as_ref()?;
                Some(ResetStep {
                    id: &item.id,
                    route_set,
                    active: route_set.default_active.unwrap_or(route_set.active),
                })
            })
            .collect();

        let mut claimed: HashSet<&str> = HashSet::new();
        for step in plan.iter_mut().filter(|step| step.active) {
            let route_set: &RouteSet = step.route_set;
            if let Some(group) = route_set.group() {
                if !claimed.insert(group) {
                    step.active = false;
                }
            }
        }

        // An ACTIVATE_ONLY set may only end inactive if its group has another
        // active member.
        for step in plan.iter_mut() {
            let route_set: &RouteSet = step.route_set;
            let activate_only = route_set.behavior == RouteSetBehavior::ActivateOnly;
            let being_deactivated = route_set.active && !step.active;
            if !(activate_only && being_deactivated) {
                continue;
            }
            match route_set.group() {
                Some(group) if claimed.contains(group) => {}
                group => {
                    step.active = true;
                    if let Some(group) = group {
                        claimed.insert(group);
                    }
                }
            }
        }

        let active_field = OverridePath::parse(ACTIVE_FIELD);
        let mut outcome = ResetOutcome::default();
        let mut helper =
            OverrideOpHelper::new(&document, |ops: Vec<OverrideOp>| self.save(owner_id, ops));
        let mut batch = helper.batch();

        for step in plan.iter().filter(|step| step.active != step.route_set.active) {
            batch.set_item_value(step.id, &active_field, Value::Bool(step.active));
            if step.active {
                outcome.activated.push(step.id.to_string());
            } else {
                outcome.deactivated.push(step.id.to_string());
            }
        }

        if batch.ops() == document.overrides.as_slice() {
            outcome.log_len = document.overrides.len();
        } else {
            outcome.log_len = batch.commit()?;
            outcome.committed = true;
        }

        tracing::info!(
            target: "studio_routing::activation",
            owner_id,
            activated = outcome.activated.len(),
            deactivated = outcome.deactivated.len(),
            committed = outcome.committed,
            "route sets reset to defaults"
        );
        Ok(outcome)
    }

    fn save(&self, owner_id: &str, ops: Vec<OverrideOp>) -> Result<usize, StoreError> {
        let log_len = ops.len();
        self.store.save(owner_id, ops).map_err(|err| {
            tracing::warn!(
                target: "studio_routing::activation",
                owner_id,
                error = %err,
                "failed to persist override log"
            );
            err
        })?;
        Ok(log_len)
    }
}

struct ResetStep<'a> {
    id: &'a str,
    route_set: &'a RouteSet,
    active: bool,
}
