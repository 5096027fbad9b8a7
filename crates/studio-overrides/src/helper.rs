//! Editing facade over a keyed collection stored as defaults plus overrides.
//!
//! Every edit produces the complete replacement log and hands it to the save
//! callback exactly once. Several edits can be grouped in a batch so that
//! they reach the callback together.
//!
//! Elision policy: setting a field of a defaulted, non-deleted item to its
//! default value leaves no op behind, so `is_overridden` always means the
//! item differs from its defaults.

use serde_json::Value;

use crate::op::{ObjectWithOverrides, OverrideOp};
use crate::path::OverridePath;
use crate::resolve::{lookup, resolve_with_report, set_value_at};
use crate::wrapped::{item_rank, resolve_all_items, resolve_item, RANK_FIELD};

/// Stateless editor bound to the latest known document.
pub struct OverrideOpHelper<'a, F> {
    current: &'a ObjectWithOverrides,
    save: F,
}

impl<'a, F, R> OverrideOpHelper<'a, F>
where
    F: FnMut(Vec<OverrideOp>) -> R,
{
    pub fn new(current: &'a ObjectWithOverrides, save: F) -> Self {
        Self { current, save }
    }

    /// Point the helper at a newer snapshot.
    pub fn refresh(&mut self, current: &'a ObjectWithOverrides) {
        self.current = current;
    }

    pub fn current(&self) -> &'a ObjectWithOverrides {
        self.current
    }

    /// Start a group of edits committed with one callback invocation.
    pub fn batch(&mut self) -> OverrideOpBatch<'_, 'a, F> {
        let ops = self.current.overrides.clone();
        OverrideOpBatch { helper: self, ops }
    }

    pub fn set_item_value(&mut self, item_id: &str, field: &OverridePath, value: Value) -> R {
        let mut batch = self.batch();
        batch.set_item_value(item_id, field, value);
        batch.commit()
    }

    pub fn clear_item_overrides(&mut self, item_id: &str, field: &OverridePath) -> R {
        let mut batch = self.batch();
        batch.clear_item_overrides(item_id, field);
        batch.commit()
    }

    pub fn reset_item(&mut self, item_id: &str) -> R {
        let mut batch = self.batch();
        batch.reset_item(item_id);
        batch.commit()
    }

    pub fn insert_item(&mut self, item_id: &str, value: Value) -> R {
        let mut batch = self.batch();
        batch.insert_item(item_id, value);
        batch.commit()
    }

    pub fn remove_item(&mut self, item_id: &str) -> R {
        let mut batch = self.batch();
        batch.remove_item(item_id);
        batch.commit()
    }

    pub fn move_item(&mut self, item_id: &str, new_index: usize) -> R {
        let mut batch = self.batch();
        batch.move_item(item_id, new_index);
        batch.commit()
    }

    pub fn change_item_id(&mut self, old_id: &str, new_id: &str) -> R {
        let mut batch = self.batch();
        batch.change_item_id(old_id, new_id);
        batch.commit()
    }

    pub fn prune_unused(&mut self) -> R {
        let mut batch = self.batch();
        batch.prune_unused();
        batch.commit()
    }
}

/// Pending edits against a working copy of the log.
pub struct OverrideOpBatch<'h, 'a, F> {
    helper: &'h mut OverrideOpHelper<'a, F>,
    ops: Vec<OverrideOp>,
}

impl<'h, 'a, F, R> OverrideOpBatch<'h, 'a, F>
where
    F: FnMut(Vec<OverrideOp>) -> R,
{
    fn defaults(&self) -> &'a Value {
        &self.helper.current.defaults
    }

    /// Working log as it would be committed now.
    pub fn ops(&self) -> &[OverrideOp] {
        &self.ops
    }

    /// Set a field of an item. An empty `field` sets the whole item.
    pub fn set_item_value(
        &mut self,
        item_id: &str,
        field: &OverridePath,
        value: Value,
    ) -> &mut Self {
        let path = OverridePath::item(item_id).join(field);
        if self.already_records(&path, &value) {
            return self;
        }
        self.ops.retain(|op| !op.path().starts_with(&path));

        // An earlier op on an ancestor decides how the edit is recorded.
        if let Some(pos) = self.ops.iter().rposition(|op| path.starts_with(op.path())) {
            if let OverrideOp::Set {
                path: ancestor,
                value: container,
                ..
            } = &mut self.ops[pos]
            {
                if let Some(relative) = path.strip_prefix(ancestor) {
                    set_value_at(container, &relative, value);
                    return self;
                }
            }
            self.ops.push(OverrideOp::set(path, value));
            return self;
        }

        if lookup(self.defaults(), &path) == Some(&value) {
            tracing::debug!(
                target: "studio_overrides::helper",
                item_id,
                path = %path,
                "value equals default; no override recorded"
            );
            return self;
        }
        self.ops.push(OverrideOp::set(path, value));
        self
    }

    /// Whether the last op touching `path` is a `Set` of exactly `value`
    /// there, with nothing else recorded below it. Such an op keeps its id.
    fn already_records(&self, path: &OverridePath, value: &Value) -> bool {
        let mut below = 0;
        let mut last = None;
        for op in &self.ops {
            if op.path().starts_with(path) {
                below += 1;
                last = Some(op);
            } else if path.starts_with(op.path()) {
                last = Some(op);
            }
        }
        let same = matches!(
            last,
            Some(OverrideOp::Set { path: recorded, value: recorded_value, .. })
                if recorded == path && recorded_value == value
        );
        same && below == 1
    }

    /// Drop the ops on a field (and below it), restoring the default.
    pub fn clear_item_overrides(&mut self, item_id: &str, field: &OverridePath) -> &mut Self {
        let path = OverridePath::item(item_id).join(field);
        self.ops.retain(|op| !op.path().starts_with(&path));
        self
    }

    /// Drop every op scoped under the item.
    pub fn reset_item(&mut self, item_id: &str) -> &mut Self {
        self.clear_item_overrides(item_id, &OverridePath::root())
    }

    /// Insert (or wholly replace) an item.
    pub fn insert_item(&mut self, item_id: &str, value: Value) -> &mut Self {
        self.reset_item(item_id);
        let item_path = OverridePath::item(item_id);
        if lookup(self.defaults(), &item_path) != Some(&value) {
            self.ops.push(OverrideOp::set(item_path, value));
        }
        self
    }

    /// Remove an item. Defaulted items get a recorded delete so resolution
    /// hides them; inserted items just lose their ops.
    pub fn remove_item(&mut self, item_id: &str) -> &mut Self {
        self.reset_item(item_id);
        let item_path = OverridePath::item(item_id);
        if lookup(self.defaults(), &item_path).is_some() {
            self.ops.push(OverrideOp::delete(item_path));
        }
        self
    }

    /// Move an item to `new_index` by rewriting the rank field of every
    /// item whose position changes.
    pub fn move_item(&mut self, item_id: &str, new_index: usize) -> &mut Self {
        let mut order: Vec<(String, Option<f64>)> = resolve_all_items(self.defaults(), &self.ops)
            .into_iter()
            .filter_map(|item| {
                let rank = item.computed.as_ref().and_then(item_rank);
                item.computed.as_ref().map(|_| (item.id.clone(), rank))
            })
            .collect();

        let Some(from) = order.iter().position(|(id, _)| id == item_id) else {
            tracing::warn!(
                target: "studio_overrides::helper",
                item_id,
                "cannot move an item that does not exist"
            );
            return self;
        };
        let moved = order.remove(from);
        let to = new_index.min(order.len());
        order.insert(to, moved);

        let rank_field = OverridePath::parse(RANK_FIELD);
        for (position, (id, rank)) in order.into_iter().enumerate() {
            if rank != Some(position as f64) {
                self.set_item_value(&id, &rank_field, Value::from(position));
            }
        }
        self
    }

    /// Rename an item.
    ///
    /// Inserted items keep their ops (and op ids) under the new id; defaulted
    /// items are deleted and re-inserted with their current value.
    pub fn change_item_id(&mut self, old_id: &str, new_id: &str) -> &mut Self {
        if old_id == new_id {
            return self;
        }
        let Some(item) = resolve_item(self.defaults(), &self.ops, old_id) else {
            tracing::warn!(
                target: "studio_overrides::helper",
                old_id,
                new_id,
                "cannot rename an item that does not exist"
            );
            return self;
        };
        let Some(current) = item.computed else {
            tracing::warn!(
                target: "studio_overrides::helper",
                old_id,
                new_id,
                "cannot rename a deleted item"
            );
            return self;
        };

        self.reset_item(new_id);
        if item.defaults.is_none() {
            for op in &mut self.ops {
                if op.path().first_key().as_deref() == Some(old_id) {
                    *op = op.with_path(op.path().with_first(new_id));
                }
            }
        } else {
            self.remove_item(old_id);
            self.insert_item(new_id, current);
        }
        self
    }

    /// Drop ops that no longer have any effect.
    pub fn prune_unused(&mut self) -> &mut Self {
        let report = resolve_with_report(self.defaults(), &self.ops);
        self.ops
            .retain(|op| !report.unused_op_ids.iter().any(|id| id == op.op_id()));
        self
    }

    /// Hand the complete new log to the save callback.
    pub fn commit(self) -> R {
        tracing::debug!(
            target: "studio_overrides::helper",
            ops = self.ops.len(),
            "committing override log"
        );
        (self.helper.save)(self.ops)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolve::resolve;
    use crate::wrapped::Provenance;
    use serde_json::json;

    fn doc(overrides: Vec<OverrideOp>) -> ObjectWithOverrides {
        ObjectWithOverrides::new(
            json!({
                "a": {"name": "A", "active": false},
                "b": {"name": "B", "active": false},
                "c": {"name": "C", "active": true}
            }),
            overrides,
        )
    }

    /// Run one edit and return the log the callback received.
    fn edit(
        current: &ObjectWithOverrides,
        f: impl FnOnce(&mut OverrideOpHelper<'_, &mut dyn FnMut(Vec<OverrideOp>)>),
    ) -> Vec<OverrideOp> {
        let mut saved = Vec::new();
        let mut calls = 0;
        {
            let mut save = |ops: Vec<OverrideOp>| {
                calls += 1;
                saved = ops;
            };
            let mut helper =
                OverrideOpHelper::new(current, &mut save as &mut dyn FnMut(Vec<OverrideOp>));
            f(&mut helper);
        }
        assert_eq!(calls, 1, "save callback must run exactly once");
        saved
    }

    #[test]
    fn test_set_item_value_appends_set() {
        let current = doc(vec![]);
        let ops = edit(&current, |h| {
            h.set_item_value("a", &OverridePath::parse("active"), json!(true))
        });
        assert_eq!(ops.len(), 1);
        assert_eq!(resolve(&current.defaults, &ops)["a"]["active"], json!(true));
    }

    #[test]
    fn test_set_replaces_previous_op_on_same_path() {
        let current = doc(vec![OverrideOp::set(OverridePath::parse("a.name"), json!("X"))]);
        let ops = edit(&current, |h| {
            h.set_item_value("a", &OverridePath::parse("name"), json!("Y"))
        });
        assert_eq!(ops.len(), 1);
        assert_eq!(resolve(&current.defaults, &ops)["a"]["name"], json!("Y"));
    }

    #[test]
    fn test_setting_the_recorded_value_keeps_op_id() {
        let current = doc(vec![
            OverrideOp::set(OverridePath::parse("a.active"), json!(true)),
            OverrideOp::set(OverridePath::parse("b.name"), json!("Bee")),
        ]);
        let ops = edit(&current, |h| {
            h.set_item_value("a", &OverridePath::parse("active"), json!(true))
        });
        assert_eq!(ops, current.overrides);
    }

    #[test]
    fn test_set_below_recorded_value_is_not_a_repeat() {
        let current = doc(vec![
            OverrideOp::set(OverridePath::parse("a.name"), json!("X")),
            OverrideOp::delete(OverridePath::parse("a")),
        ]);
        let ops = edit(&current, |h| {
            h.set_item_value("a", &OverridePath::parse("name"), json!("X"))
        });
        assert_ne!(ops, current.overrides);
        assert_eq!(resolve(&current.defaults, &ops)["a"], json!({"name": "X"}));
    }

    #[test]
    fn test_set_to_default_elides_and_clears() {
        let current = doc(vec![OverrideOp::set(OverridePath::parse("a.active"), json!(true))]);
        let ops = edit(&current, |h| {
            h.set_item_value("a", &OverridePath::parse("active"), json!(false))
        });
        assert!(ops.is_empty());
        let item = resolve_item(&current.defaults, &ops, "a").unwrap();
        assert_eq!(item.provenance(), Provenance::Default);
    }

    #[test]
    fn test_set_on_inserted_item_edits_insert_in_place() {
        let current = doc(vec![OverrideOp::set(
            OverridePath::item("new"),
            json!({"name": "New", "active": false}),
        )]);
        let ops = edit(&current, |h| {
            h.set_item_value("new", &OverridePath::parse("active"), json!(true))
        });
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].op_id(), current.overrides[0].op_id());
        assert_eq!(resolve(&current.defaults, &ops)["new"]["active"], json!(true));
    }

    #[test]
    fn test_set_after_delete_recreates_field() {
        let current = doc(vec![OverrideOp::delete(OverridePath::item("a"))]);
        let ops = edit(&current, |h| {
            h.set_item_value("a", &OverridePath::parse("name"), json!("Back"))
        });
        assert_eq!(ops.len(), 2);
        assert_eq!(resolve(&current.defaults, &ops)["a"], json!({"name": "Back"}));
    }

    #[test]
    fn test_remove_default_item_records_delete() {
        let current = doc(vec![OverrideOp::set(OverridePath::parse("b.name"), json!("Z"))]);
        let ops = edit(&current, |h| h.remove_item("b"));
        assert_eq!(ops.len(), 1);
        assert!(ops[0].is_delete());
        let item = resolve_item(&current.defaults, &ops, "b").unwrap();
        assert_eq!(item.provenance(), Provenance::Deleted);
    }

    #[test]
    fn test_remove_inserted_item_drops_its_ops() {
        let current = doc(vec![OverrideOp::set(OverridePath::item("x"), json!({"name": "X"}))]);
        let ops = edit(&current, |h| h.remove_item("x"));
        assert!(ops.is_empty());
    }

    #[test]
    fn test_insert_and_reset() {
        let current = doc(vec![]);
        let ops = edit(&current, |h| h.insert_item("d", json!({"name": "D"})));
        let inserted = doc(ops);
        let item = resolve_item(&inserted.defaults, &inserted.overrides, "d").unwrap();
        assert_eq!(item.provenance(), Provenance::OverrideOnly);

        let ops = edit(&inserted, |h| h.reset_item("d"));
        assert!(ops.is_empty());
    }

    #[test]
    fn test_move_item_writes_ranks() {
        let current = doc(vec![]);
        let ops = edit(&current, |h| h.move_item("c", 0));
        let order: Vec<_> = resolve_all_items(&current.defaults, &ops)
            .into_iter()
            .map(|i| i.id)
            .collect();
        assert_eq!(order, vec!["c", "a", "b"]);
        assert!(ops.iter().all(|op| op.path().segments().len() == 2));
    }

    #[test]
    fn test_change_id_of_inserted_item_keeps_op_ids() {
        let current = doc(vec![OverrideOp::set(OverridePath::item("x"), json!({"name": "X"}))]);
        let ops = edit(&current, |h| h.change_item_id("x", "y"));
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].op_id(), current.overrides[0].op_id());
        assert_eq!(ops[0].path(), &OverridePath::item("y"));
    }

    #[test]
    fn test_change_id_of_default_item() {
        let current = doc(vec![]);
        let ops = edit(&current, |h| h.change_item_id("a", "z"));
        let resolved = resolve(&current.defaults, &ops);
        assert!(resolved.get("a").is_none());
        assert_eq!(resolved["z"]["name"], json!("A"));
    }

    #[test]
    fn test_batch_commits_once() {
        let current = doc(vec![]);
        let ops = edit(&current, |h| {
            let mut batch = h.batch();
            batch
                .set_item_value("a", &OverridePath::parse("active"), json!(true))
                .set_item_value("c", &OverridePath::parse("active"), json!(false));
            batch.commit();
        });
        let resolved = resolve(&current.defaults, &ops);
        assert_eq!(resolved["a"]["active"], json!(true));
        assert_eq!(resolved["c"]["active"], json!(false));
    }

    #[test]
    fn test_prune_unused() {
        let current = doc(vec![
            OverrideOp::delete(OverridePath::parse("missing.field")),
            OverrideOp::set(OverridePath::parse("a.name"), json!("kept")),
        ]);
        let ops = edit(&current, |h| h.prune_unused());
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].op_id(), current.overrides[1].op_id());
    }
}
