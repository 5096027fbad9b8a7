//! Merging a defaults tree with an override log.
//!
//! Resolution is pure and total: every log yields some tree. `Set` creates
//! whatever containers it needs; `Delete` of a missing path does nothing.

use serde_json::{Map, Value};

use crate::op::OverrideOp;
use crate::path::{OverridePath, PathSegment};

/// Resolved tree plus the ids of operations that had no effect.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedOverrides {
    pub value: Value,
    /// Ops that were no-ops when applied (deletes of missing paths).
    pub unused_op_ids: Vec<String>,
}

/// Apply `ops` to a copy of `defaults`, strictly in log order.
pub fn resolve(defaults: &Value, ops: &[OverrideOp]) -> Value {
    let mut value = defaults.clone();
    for op in ops {
        apply_op(&mut value, op);
    }
    value
}

/// Like [`resolve`], also reporting which ops were no-ops.
pub fn resolve_with_report(defaults: &Value, ops: &[OverrideOp]) -> ResolvedOverrides {
    let mut value = defaults.clone();
    let mut unused_op_ids = Vec::new();
    for op in ops {
        if !apply_op(&mut value, op) {
            unused_op_ids.push(op.op_id().to_string());
        }
    }
    if !unused_op_ids.is_empty() {
        tracing::debug!(
            target: "studio_overrides::resolve",
            unused = unused_op_ids.len(),
            "override log contains no-op entries"
        );
    }
    ResolvedOverrides {
        value,
        unused_op_ids,
    }
}

/// Apply one op in place. Returns false when the op changed nothing
/// structurally (a delete of a missing path).
pub fn apply_op(target: &mut Value, op: &OverrideOp) -> bool {
    match op {
        OverrideOp::Set { path, value, .. } => {
            set_at(target, path.segments(), value.clone());
            true
        }
        OverrideOp::Delete { path, .. } => delete_at(target, path.segments()),
    }
}

/// Read the value at `path`, if present.
pub fn lookup<'v>(value: &'v Value, path: &OverridePath) -> Option<&'v Value> {
    path.segments()
        .iter()
        .try_fold(value, |current, segment| child(current, segment))
}

/// Write `value` at `path` inside `target`, creating containers as needed.
pub fn set_value_at(target: &mut Value, path: &OverridePath, value: Value) {
    set_at(target, path.segments(), value);
}

fn child<'v>(value: &'v Value, segment: &PathSegment) -> Option<&'v Value> {
    match value {
        Value::Object(map) => map.get(&segment.as_key()),
        Value::Array(items) => items.get(segment.as_index()?),
        _ => None,
    }
}

fn child_mut<'v>(value: &'v mut Value, segment: &PathSegment) -> Option<&'v mut Value> {
    match value {
        Value::Object(map) => map.get_mut(&segment.as_key()),
        Value::Array(items) => items.get_mut(segment.as_index()?),
        _ => None,
    }
}

fn set_at(target: &mut Value, path: &[PathSegment], value: Value) {
    match path.split_first() {
        None => *target = value,
        Some((head, rest)) => set_at(slot_mut(target, head), rest, value),
    }
}

/// Mutable slot for `segment`, turning `target` into a suitable container
/// first if it is not one.
fn slot_mut<'v>(target: &'v mut Value, segment: &PathSegment) -> &'v mut Value {
    let fits = match target {
        Value::Object(_) => true,
        Value::Array(_) => segment.as_index().is_some(),
        _ => false,
    };
    if !fits {
        *target = match segment {
            PathSegment::Index(_) => Value::Array(Vec::new()),
            PathSegment::Key(_) => Value::Object(Map::new()),
        };
    }
    match target {
        Value::Array(items) => {
            let index = segment.as_index().unwrap_or(items.len());
            if items.len() <= index {
                items.resize(index + 1, Value::Null);
            }
            &mut items[index]
        }
        Value::Object(map) => map.entry(segment.as_key()).or_insert(Value::Null),
        other => other,
    }
}

fn delete_at(target: &mut Value, path: &[PathSegment]) -> bool {
    let Some((last, parents)) = path.split_last() else {
        *target = Value::Null;
        return true;
    };
    let parent = parents
        .iter()
        .try_fold(target, |current, segment| child_mut(current, segment));
    match parent {
        Some(Value::Object(map)) => map.shift_remove(&last.as_key()).is_some(),
        Some(Value::Array(items)) => match last.as_index() {
            Some(index) if index < items.len() => {
                items.remove(index);
                true
            }
            _ => false,
        },
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn set(path: &str, value: Value) -> OverrideOp {
        OverrideOp::set(OverridePath::parse(path), value)
    }

    fn delete(path: &str) -> OverrideOp {
        OverrideOp::delete(OverridePath::parse(path))
    }

    #[test]
    fn test_set_overwrites_existing_field() {
        let defaults = json!({"main": {"active": false, "name": "Main"}});
        let resolved = resolve(&defaults, &[set("main.active", json!(true))]);
        assert_eq!(resolved, json!({"main": {"active": true, "name": "Main"}}));
    }

    #[test]
    fn test_defaults_untouched() {
        let defaults = json!({"a": {"b": 1}});
        let before = defaults.clone();
        let _ = resolve(&defaults, &[set("a.b", json!(2)), delete("a")]);
        assert_eq!(defaults, before);
    }

    #[test]
    fn test_set_creates_intermediate_containers() {
        let resolved = resolve(&json!({}), &[set("new.routes.1.layer", json!("pgm"))]);
        assert_eq!(
            resolved,
            json!({"new": {"routes": [null, {"layer": "pgm"}]}})
        );
    }

    #[test]
    fn test_set_replaces_scalar_in_the_way() {
        let resolved = resolve(&json!({"a": 5}), &[set("a.b", json!(1))]);
        assert_eq!(resolved, json!({"a": {"b": 1}}));
    }

    #[test]
    fn test_set_root_replaces_everything() {
        let resolved = resolve(&json!({"a": 1}), &[set("", json!({"b": 2}))]);
        assert_eq!(resolved, json!({"b": 2}));
    }

    #[test]
    fn test_delete_missing_path_is_noop() {
        let defaults = json!({"a": 1});
        let report = resolve_with_report(&defaults, &[delete("x.y.z")]);
        assert_eq!(report.value, defaults);
        assert_eq!(report.unused_op_ids.len(), 1);
    }

    #[test]
    fn test_delete_list_element_shifts() {
        let resolved = resolve(&json!({"l": [1, 2, 3]}), &[delete("l.0")]);
        assert_eq!(resolved, json!({"l": [2, 3]}));
    }

    #[test]
    fn test_index_segment_on_map_uses_string_key() {
        let defaults = json!({"0": "zero"});
        let op = OverrideOp::set(OverridePath::new(vec![PathSegment::Index(0)]), json!("x"));
        assert_eq!(resolve(&defaults, &[op]), json!({"0": "x"}));
    }

    #[test]
    fn test_later_op_wins() {
        let defaults = json!({"a": {"b": 1}});
        assert_eq!(
            resolve(&defaults, &[delete("a.b"), set("a.b", json!(3))]),
            json!({"a": {"b": 3}})
        );
        assert_eq!(
            resolve(&defaults, &[set("a.b", json!(3)), delete("a")]),
            json!({})
        );
    }

    #[test]
    fn test_delete_keeps_declaration_order_of_siblings() {
        let defaults = json!({"c": 1, "a": 2, "b": 3});
        let resolved = resolve(&defaults, &[delete("c")]);
        let keys: Vec<_> = resolved.as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["a", "b"]);
    }

    #[test]
    fn test_lookup() {
        let value = json!({"a": [{"b": true}]});
        assert_eq!(lookup(&value, &OverridePath::parse("a.0.b")), Some(&json!(true)));
        assert_eq!(lookup(&value, &OverridePath::parse("a.1.b")), None);
        assert_eq!(lookup(&value, &OverridePath::root()), Some(&value));
    }
}
