//! Concurrent activations within one exclusivity group
//!
//! The store here behaves like a row-oriented backend: a save applies the
//! rows the writer added, changed or removed relative to the log it loaded,
//! instead of swapping the whole document. Unserialized writers therefore
//! merge their edits, which is exactly how two racing activations can both
//! stick. The owner lock is what rules that out.

use std::cell::RefCell;
use std::sync::{Arc, Barrier, Mutex};
use std::thread;

use proptest::prelude::*;
use serde_json::{json, Map, Value};
use studio_overrides::{ObjectWithOverrides, OverrideOp};
use studio_routing::routing::{check_exclusivity, route_sets_from_document};
use studio_routing::{
    LockError, OwnerLock, OwnerLocks, RouteSetController, RouteSetStore, StoreError,
};

const OWNER: &str = "studio0";

thread_local! {
    static LOADED: RefCell<Vec<OverrideOp>> = RefCell::new(Vec::new());
}

struct RowMergingStore {
    document: Mutex<ObjectWithOverrides>,
    load_barrier: Option<Barrier>,
}

impl RowMergingStore {
    fn new(defaults: Value, load_barrier: Option<Barrier>) -> Self {
        Self {
            document: Mutex::new(ObjectWithOverrides::from_legacy(defaults)),
            load_barrier,
        }
    }

    fn snapshot(&self) -> ObjectWithOverrides {
        self.document.lock().unwrap().clone()
    }
}

impl RouteSetStore for RowMergingStore {
    fn load(&self, _owner_id: &str) -> Result<ObjectWithOverrides, StoreError> {
        let document = self.snapshot();
        LOADED.with(|loaded| *loaded.borrow_mut() = document.overrides.clone());
        if let Some(barrier) = &self.load_barrier {
            barrier.wait();
        }
        Ok(document)
    }

    fn save(&self, _owner_id: &str, overrides: Vec<OverrideOp>) -> Result<(), StoreError> {
        let base = LOADED.with(|loaded| loaded.borrow().clone());
        let mut document = self.document.lock().unwrap();
        let rows = &mut document.overrides;

        let removed = |op: &OverrideOp| {
            base.iter().any(|b| b.op_id() == op.op_id())
                && !overrides.iter().any(|n| n.op_id() == op.op_id())
        };
        rows.retain(|op| !removed(op));
        for op in overrides.iter().cloned() {
            match rows.iter_mut().find(|row| row.op_id() == op.op_id()) {
                Some(row) => *row = op,
                None => rows.push(op),
            }
        }
        Ok(())
    }
}

/// Runs the closure without any serialization.
struct NoLock;

impl OwnerLock for NoLock {
    fn with_owner_lock<R>(&self, _owner_id: &str, f: impl FnOnce() -> R) -> Result<R, LockError> {
        Ok(f())
    }
}

fn group_defaults(members: usize, active: Option<usize>) -> Value {
    let mut defaults = Map::new();
    for i in 0..members {
        defaults.insert(
            format!("p{}", i),
            json!({"name": format!("P{}", i), "exclusivityGroup": "g", "active": active == Some(i)}),
        );
    }
    defaults.insert("free".into(), json!({"name": "Free", "active": true}));
    Value::Object(defaults)
}

/// Fire every request from its own thread at once.
fn run_concurrently<L>(
    controller: Arc<RouteSetController<Arc<RowMergingStore>, L>>,
    requests: Vec<(String, bool)>,
)
where
    L: OwnerLock + Send + Sync + 'static,
{
    let handles: Vec<_> = requests
        .into_iter()
        .map(|(id, active)| {
            let controller = Arc::clone(&controller);
            thread::spawn(move || controller.set_route_set_active(OWNER, &id, active).map(|_| ()))
        })
        .collect();
    for handle in handles {
        handle.join().expect("activation thread panicked").expect("activation failed");
    }
}

fn conflicts(store: &RowMergingStore) -> usize {
    check_exclusivity(&route_sets_from_document(&store.snapshot())).len()
}

#[test]
fn test_unserialized_activations_break_exclusivity() {
    let store = Arc::new(RowMergingStore::new(group_defaults(2, None), Some(Barrier::new(2))));
    let controller = Arc::new(RouteSetController::new(Arc::clone(&store), NoLock));

    run_concurrently(controller, vec![("p0".into(), true), ("p1".into(), true)]);

    let document = store.snapshot();
    let violations = check_exclusivity(&route_sets_from_document(&document));
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].group, "g");
    assert_eq!(violations[0].active, vec!["p0", "p1"]);
}

#[test]
fn test_serialized_activations_keep_exclusivity() {
    let store = Arc::new(RowMergingStore::new(group_defaults(2, None), None));
    let controller = Arc::new(RouteSetController::new(Arc::clone(&store), OwnerLocks::default()));

    run_concurrently(controller, vec![("p0".into(), true), ("p1".into(), true)]);

    assert_eq!(conflicts(&store), 0);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_racing_pair_without_lock_violates(
        members in 2usize..6,
        first in 0usize..6,
        offset in 0usize..6,
    ) {
        let first = first % members;
        let second = (first + 1 + offset % (members - 1)) % members;

        let store = Arc::new(RowMergingStore::new(
            group_defaults(members, None),
            Some(Barrier::new(2)),
        ));
        let controller = Arc::new(RouteSetController::new(Arc::clone(&store), NoLock));
        run_concurrently(
            controller,
            vec![(format!("p{}", first), true), (format!("p{}", second), true)],
        );

        prop_assert_eq!(conflicts(&store), 1);
    }

    #[test]
    fn prop_exclusivity_holds_with_lock(
        members in 2usize..6,
        initially_active in proptest::option::of(0usize..6),
        requests in prop::collection::vec((0usize..6, any::<bool>()), 1..8),
    ) {
        let initially_active = initially_active.filter(|i| *i < members);
        let store = Arc::new(RowMergingStore::new(group_defaults(members, initially_active), None));
        let controller =
            Arc::new(RouteSetController::new(Arc::clone(&store), OwnerLocks::default()));

        let requests = requests
            .into_iter()
            .map(|(i, active)| (format!("p{}", i % members), active))
            .collect();
        run_concurrently(controller, requests);

        prop_assert_eq!(conflicts(&store), 0);
    }
}
