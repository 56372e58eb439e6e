//! Reconciliation of a record sequence against the nodes of a container.
//!
//! [`Digest`] remembers which node was built for which record key. Each run
//! updates nodes whose key is still present, creates nodes for new keys and
//! removes the nodes of keys that disappeared.

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use crate::scene::{NodeId, Scene};

/// Shared record handle compared by address.
///
/// A bound key owns a clone of the handle, so the record cannot be freed
/// and its address handed to another record while the binding lives.
#[derive(Clone)]
pub struct Handle(Rc<dyn Any>);

impl Handle {
    pub fn of<T: 'static>(handle: &Rc<T>) -> Self {
        let shared: Rc<dyn Any> = handle.clone();
        Handle(shared)
    }

    fn addr(&self) -> *const () {
        Rc::as_ptr(&self.0) as *const ()
    }
}

impl PartialEq for Handle {
    fn eq(&self, other: &Self) -> bool {
        self.addr() == other.addr()
    }
}

impl Eq for Handle {}

impl Hash for Handle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr().hash(state);
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({:p})", self.addr())
    }
}

/// Identity of a record across update passes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BindKey {
    /// Caller-provided id
    Id(String),
    /// A shared record handle
    Ref(Handle),
    /// One numbered part of a shared record
    Part(Handle, usize),
}

impl BindKey {
    /// Reference identity of a shared handle.
    pub fn of<T: 'static>(handle: &Rc<T>) -> Self {
        BindKey::Ref(Handle::of(handle))
    }

    pub fn part<T: 'static>(handle: &Rc<T>, index: usize) -> Self {
        BindKey::Part(Handle::of(handle), index)
    }
}

/// Counts of what a run did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DigestReport {
    pub created: usize,
    pub updated: usize,
    pub removed: usize,
    /// Duplicate keys, and records `create` declined
    pub skipped: usize,
}

impl std::ops::AddAssign for DigestReport {
    fn add_assign(&mut self, other: Self) {
        self.created += other.created;
        self.updated += other.updated;
        self.removed += other.removed;
        self.skipped += other.skipped;
    }
}

#[derive(Debug, Default)]
pub struct Digest {
    bindings: HashMap<BindKey, NodeId>,
}

impl Digest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn get(&self, key: &BindKey) -> Option<NodeId> {
        self.bindings.get(key).copied()
    }

    pub fn keys(&self) -> impl Iterator<Item = &BindKey> {
        self.bindings.keys()
    }

    /// Forget every binding without touching the scene.
    pub fn reset(&mut self) {
        self.bindings.clear();
    }

    /// Reconcile `items` with the children of `container`.
    ///
    /// New items go through `create`, get attached to `container` and are
    /// then passed to `update` like every surviving item. Nodes bound to keys
    /// absent from `items` are removed before anything is created. When a
    /// key repeats, the first occurrence wins.
    pub fn run<T>(
        &mut self,
        scene: &mut Scene,
        container: NodeId,
        items: &[T],
        key_of: impl Fn(&T) -> BindKey,
        mut create: impl FnMut(&mut Scene, &T) -> Option<NodeId>,
        mut update: impl FnMut(&mut Scene, NodeId, &T),
    ) -> DigestReport {
        let mut report = DigestReport::default();

        // bindings detached or removed behind our back are stale
        self.bindings
            .retain(|_, node| scene.parent(*node) == Some(container));

        let mut seen = HashSet::with_capacity(items.len());
        let keyed: Vec<Option<BindKey>> = items
            .iter()
            .map(|item| {
                let key = key_of(item);
                if seen.insert(key.clone()) {
                    Some(key)
                } else {
                    report.skipped += 1;
                    None
                }
            })
            .collect();

        let exits: Vec<BindKey> = self
            .bindings
            .keys()
            .filter(|k| !seen.contains(*k))
            .cloned()
            .collect();
        for key in exits {
            if let Some(node) = self.bindings.remove(&key) {
                scene.remove(node);
                report.removed += 1;
            }
        }

        for (item, key) in items.iter().zip(keyed) {
            let Some(key) = key else {
                continue;
            };

            match self.bindings.get(&key) {
                Some(&node) => {
                    update(scene, node, item);
                    report.updated += 1;
                }
                None => {
                    let Some(node) = create(scene, item) else {
                        report.skipped += 1;
                        continue;
                    };
                    scene.add(container, node);
                    self.bindings.insert(key, node);
                    update(scene, node, item);
                    report.created += 1;
                }
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accessor::{record, Record};
    use crate::scene::Node;
    use serde_json::json;

    fn setup() -> (Scene, NodeId) {
        let mut scene = Scene::new();
        let container = scene.spawn(Node::group());
        scene.add(scene.root(), container);
        (scene, container)
    }

    fn by_id(r: &Record) -> BindKey {
        BindKey::Id(r["id"].as_str().unwrap_or_default().to_string())
    }

    fn run(
        digest: &mut Digest,
        scene: &mut Scene,
        container: NodeId,
        records: &[Record],
    ) -> DigestReport {
        digest.run(
            scene,
            container,
            records,
            by_id,
            |scene, _| Some(scene.spawn(Node::group())),
            |_, _, _| {},
        )
    }

    fn ids(names: &[&str]) -> Vec<Record> {
        names.iter().map(|n| record(json!({ "id": n }))).collect()
    }

    #[test]
    fn test_unchanged_records_keep_nodes() {
        let (mut scene, container) = setup();
        let mut digest = Digest::new();
        let records = ids(&["a", "b", "c"]);

        let first = run(&mut digest, &mut scene, container, &records);
        assert_eq!(first.created, 3);
        let before = scene.children(container).to_vec();

        let second = run(&mut digest, &mut scene, container, &records);
        assert_eq!(second, DigestReport { created: 0, updated: 3, removed: 0, skipped: 0 });
        assert_eq!(scene.children(container), before.as_slice());
    }

    #[test]
    fn test_enter_update_exit() {
        let (mut scene, container) = setup();
        let mut digest = Digest::new();
        run(&mut digest, &mut scene, container, &ids(&["a", "b", "c"]));
        let a = digest.get(&BindKey::Id("a".into())).unwrap();
        let b = digest.get(&BindKey::Id("b".into())).unwrap();

        let report = run(&mut digest, &mut scene, container, &ids(&["b", "c", "d"]));
        assert_eq!(report.created, 1);
        assert_eq!(report.updated, 2);
        assert_eq!(report.removed, 1);
        assert!(!scene.contains(a));
        assert_eq!(digest.get(&BindKey::Id("b".into())), Some(b));
        assert_eq!(scene.children(container).len(), 3);
    }

    #[test]
    fn test_duplicate_keys_first_wins() {
        let (mut scene, container) = setup();
        let mut digest = Digest::new();
        let records = vec![
            record(json!({ "id": "a", "v": 1 })),
            record(json!({ "id": "a", "v": 2 })),
        ];
        let mut values = Vec::new();
        let report = digest.run(
            &mut scene,
            container,
            &records,
            by_id,
            |scene, _| Some(scene.spawn(Node::group())),
            |_, _, r| values.push(r["v"].as_i64()),
        );
        assert_eq!(report.created, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(values, vec![Some(1)]);
    }

    #[test]
    fn test_pointer_identity() {
        let (mut scene, container) = setup();
        let mut digest = Digest::new();
        let shared = record(json!({ "lat": 1 }));
        let twin = record(json!({ "lat": 1 }));

        let report = digest.run(
            &mut scene,
            container,
            &[shared.clone(), twin.clone()],
            BindKey::of,
            |scene, _| Some(scene.spawn(Node::group())),
            |_, _, _| {},
        );
        // equal content, different handles
        assert_eq!(report.created, 2);

        let report = digest.run(
            &mut scene,
            container,
            &[shared],
            BindKey::of,
            |scene, _| Some(scene.spawn(Node::group())),
            |_, _, _| {},
        );
        assert_eq!(report.updated, 1);
        assert_eq!(report.removed, 1);
    }

    #[test]
    fn test_bound_handle_outlives_replaced_data() {
        let (mut scene, container) = setup();
        let mut digest = Digest::new();
        let spawn = |scene: &mut Scene, _: &Record| Some(scene.spawn(Node::group()));

        let first = vec![record(json!({ "lng": 0 }))];
        let weak = Rc::downgrade(&first[0]);
        digest.run(&mut scene, container, &first, BindKey::of, spawn, |_, _, _| {});
        drop(first);
        assert!(weak.upgrade().is_some());

        // allocated while the old record is still bound, so never at its address
        let second = vec![record(json!({ "lng": 100 }))];
        let report = digest.run(&mut scene, container, &second, BindKey::of, spawn, |_, _, _| {});
        assert_eq!(report, DigestReport { created: 1, updated: 0, removed: 1, skipped: 0 });
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn test_parts_of_one_handle_are_distinct() {
        let shared = record(json!({}));
        assert_ne!(BindKey::part(&shared, 0), BindKey::part(&shared, 1));
        assert_eq!(BindKey::part(&shared, 1), BindKey::part(&shared.clone(), 1));
        assert_ne!(BindKey::of(&shared), BindKey::part(&shared, 0));
    }

    #[test]
    fn test_declined_create_is_skipped() {
        let (mut scene, container) = setup();
        let mut digest = Digest::new();
        let report = digest.run(
            &mut scene,
            container,
            &ids(&["a", "b"]),
            by_id,
            |scene, r| (r["id"] == "a").then(|| scene.spawn(Node::group())),
            |_, _, _| {},
        );
        assert_eq!(report.created, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(digest.len(), 1);
    }

    #[test]
    fn test_externally_removed_node_is_recreated() {
        let (mut scene, container) = setup();
        let mut digest = Digest::new();
        let records = ids(&["a"]);
        run(&mut digest, &mut scene, container, &records);
        scene.clear(container);

        let report = run(&mut digest, &mut scene, container, &records);
        assert_eq!(report.created, 1);
        assert_eq!(scene.children(container).len(), 1);
    }

    #[test]
    fn test_empty_input_removes_all() {
        let (mut scene, container) = setup();
        let mut digest = Digest::new();
        run(&mut digest, &mut scene, container, &ids(&["a", "b"]));
        let report = run(&mut digest, &mut scene, container, &[]);
        assert_eq!(report.removed, 2);
        assert!(digest.is_empty());
        assert_eq!(scene.len(), 2);
    }
}
