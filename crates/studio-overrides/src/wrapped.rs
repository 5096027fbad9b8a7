//! Per-item view of a keyed collection stored as defaults plus overrides.
//!
//! Each item is reported with its resolved value and where that value came
//! from, so callers can tell defaulted entries from edited or inserted ones.

use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::op::OverrideOp;
use crate::path::{OverridePath, PathSegment};
use crate::resolve::{apply_op, lookup, resolve};

/// Field used to order items of an ordered collection.
pub const RANK_FIELD: &str = "_rank";

/// Where an item's resolved value comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// Present in the defaults, untouched by the log
    Default,
    /// Present in the defaults, edited by the log
    Overridden,
    /// Present only because the log inserted it
    OverrideOnly,
    /// Present in the defaults, removed by the log
    Deleted,
}

/// A collection entry annotated with its override provenance.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WrappedItem<T> {
    pub id: String,
    /// Resolved value; `None` when the log deleted a defaulted item.
    pub computed: Option<T>,
    /// Value in the defaults, if the item has one.
    pub defaults: Option<T>,
    pub is_overridden: bool,
    /// Ops in the log that touch this item, in log order.
    pub override_ops: Vec<OverrideOp>,
}

impl<T> WrappedItem<T> {
    pub fn provenance(&self) -> Provenance {
        match (&self.computed, &self.defaults) {
            (None, _) => Provenance::Deleted,
            (Some(_), None) => Provenance::OverrideOnly,
            (Some(_), Some(_)) if self.is_overridden => Provenance::Overridden,
            (Some(_), Some(_)) => Provenance::Default,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.computed.is_none()
    }

    /// Convert both values, keeping provenance.
    pub fn try_map<U, E>(self, mut f: impl FnMut(T) -> Result<U, E>) -> Result<WrappedItem<U>, E> {
        Ok(WrappedItem {
            id: self.id,
            computed: self.computed.map(&mut f).transpose()?,
            defaults: self.defaults.map(&mut f).transpose()?,
            is_overridden: self.is_overridden,
            override_ops: self.override_ops,
        })
    }
}

impl WrappedItem<Value> {
    /// Read the item values as `U`.
    pub fn parse<U: DeserializeOwned>(self) -> Result<WrappedItem<U>, serde_json::Error> {
        self.try_map(serde_json::from_value)
    }
}

/// Ops of a log grouped by the item they touch.
///
/// Built once per log so single-item questions do not need to resolve the
/// whole collection. Answers are identical to [`resolve_all_items`].
#[derive(Debug)]
pub struct OverrideIndex<'a> {
    ops: &'a [OverrideOp],
    by_item: HashMap<String, Vec<usize>>,
    /// Ops on the collection root; they touch every item.
    root: Vec<usize>,
    /// Item ids in order of first appearance in the log.
    order: Vec<String>,
}

impl<'a> OverrideIndex<'a> {
    pub fn new(ops: &'a [OverrideOp]) -> Self {
        let mut by_item: HashMap<String, Vec<usize>> = HashMap::new();
        let mut root = Vec::new();
        let mut order = Vec::new();
        for (i, op) in ops.iter().enumerate() {
            match op.path().first_key() {
                None => root.push(i),
                Some(id) => {
                    let positions = by_item.entry(id.clone()).or_default();
                    if positions.is_empty() {
                        order.push(id);
                    }
                    positions.push(i);
                }
            }
        }
        Self {
            ops,
            by_item,
            root,
            order,
        }
    }

    /// Item ids mentioned by the log, in order of first appearance.
    pub fn item_ids(&self) -> &[String] {
        &self.order
    }

    /// Ops touching `id`, in log order.
    pub fn ops_for(&self, id: &str) -> Vec<&'a OverrideOp> {
        let item = self.by_item.get(id).map(Vec::as_slice).unwrap_or(&[]);
        let mut positions: Vec<usize> = item.iter().chain(&self.root).copied().collect();
        positions.sort_unstable();
        positions.into_iter().map(|i| &self.ops[i]).collect()
    }

    /// Whether any op touches `id`.
    pub fn is_overridden(&self, id: &str) -> bool {
        !self.root.is_empty() || self.by_item.contains_key(id)
    }

    /// Resolve a single item without resolving the collection.
    ///
    /// Returns `None` for ids that neither the defaults nor the log produce.
    /// Root-level ops (or defaults that are not a keyed object) can reshape
    /// the whole collection; the answer then comes from full resolution.
    pub fn resolve_item(&self, defaults: &Value, id: &str) -> Option<WrappedItem<Value>> {
        if !self.root.is_empty() || !defaults.is_object() {
            return resolve_all_items(defaults, self.ops)
                .into_iter()
                .find(|item| item.id == id);
        }
        let item_path = OverridePath::item(id);
        let default_value = lookup(defaults, &item_path).cloned();
        let ops = self.ops_for(id);

        let mut computed = default_value.clone();
        for op in &ops {
            computed = apply_to_item(computed, op);
        }

        if computed.is_none() && default_value.is_none() {
            return None;
        }
        Some(WrappedItem {
            id: id.to_string(),
            computed,
            defaults: default_value,
            is_overridden: !ops.is_empty(),
            override_ops: ops.into_iter().cloned().collect(),
        })
    }
}

/// Apply one op scoped under an item to that item's current value.
fn apply_to_item(item: Option<Value>, op: &OverrideOp) -> Option<Value> {
    let rest = op.path().segments().get(1..).unwrap_or_default();
    let relative = op.with_path(OverridePath::new(rest.to_vec()));
    if relative.path().is_root() {
        return match relative {
            OverrideOp::Set { value, .. } => Some(value),
            OverrideOp::Delete { .. } => None,
        };
    }
    match (item, relative.is_delete()) {
        (Some(mut value), _) => {
            apply_op(&mut value, &relative);
            Some(value)
        }
        (None, true) => None,
        (None, false) => {
            let mut value = Value::Null;
            apply_op(&mut value, &relative);
            Some(value)
        }
    }
}

/// Resolve every item of a keyed collection.
///
/// Covers every id in the defaults (deleted ones with `computed = None`) and
/// every id the log inserts. Ids that the log inserts and then deletes are
/// not reported. Items are ordered by [`RANK_FIELD`] where present, falling
/// back to declaration order.
pub fn resolve_all_items(defaults: &Value, ops: &[OverrideOp]) -> Vec<WrappedItem<Value>> {
    let index = OverrideIndex::new(ops);
    let resolved = resolve(defaults, ops);

    let mut ids: Vec<String> = Vec::new();
    if let Value::Object(map) = defaults {
        ids.extend(map.keys().cloned());
    }
    if let Value::Object(map) = &resolved {
        for id in map.keys() {
            if !ids.contains(id) {
                ids.push(id.clone());
            }
        }
    }

    let mut items: Vec<(f64, WrappedItem<Value>)> = Vec::with_capacity(ids.len());
    for (position, id) in ids.into_iter().enumerate() {
        let segment = PathSegment::Key(id.clone());
        let item_path = OverridePath::new(vec![segment]);
        let default_value = lookup(defaults, &item_path).cloned();
        let computed = lookup(&resolved, &item_path).cloned();
        if computed.is_none() && default_value.is_none() {
            continue;
        }
        let ops_for: Vec<OverrideOp> = index.ops_for(&id).into_iter().cloned().collect();
        let rank = computed
            .as_ref()
            .or(default_value.as_ref())
            .and_then(item_rank)
            .unwrap_or(position as f64);
        items.push((
            rank,
            WrappedItem {
                id,
                computed,
                defaults: default_value,
                is_overridden: !ops_for.is_empty(),
                override_ops: ops_for,
            },
        ));
    }

    items.sort_by(|a, b| a.0.total_cmp(&b.0));
    items.into_iter().map(|(_, item)| item).collect()
}

/// Resolve a single item; same answer as the matching entry of
/// [`resolve_all_items`].
pub fn resolve_item(defaults: &Value, ops: &[OverrideOp], id: &str) -> Option<WrappedItem<Value>> {
    OverrideIndex::new(ops).resolve_item(defaults, id)
}

/// Explicit rank of an item, if it carries one.
pub fn item_rank(item: &Value) -> Option<f64> {
    item.get(RANK_FIELD).and_then(Value::as_f64)
}
