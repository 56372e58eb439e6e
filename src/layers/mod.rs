//! Layer controllers.
//!
//! Each layer owns one container group in the scene and keeps its children
//! in sync with a record list. Options are plain fields with a generated
//! getter and setter; setters of options that change what is drawn mark the
//! layer dirty, and the next frame runs an update pass.

mod custom;
mod globe;
mod labels;
mod points;
mod polygons;
mod tiles;

pub use custom::{CustomLayer, ObjectFactory, ObjectUpdate};
pub use globe::GlobeLayer;
pub use labels::{DotOrientation, LabelsLayer};
pub use points::PointsLayer;
pub use polygons::PolygonsLayer;
pub use tiles::TilesLayer;

use crate::animation::{Applier, Easing, Snapshot, TransitionKey, Transitions};
use crate::digest::DigestReport;
use crate::scene::{NodeId, Scene};

/// Default duration of attribute transitions, in milliseconds.
pub const DEFAULT_TRANSITION_MS: f64 = 1000.0;

pub trait Layer {
    /// Take over `container`, removing whatever it held.
    fn init(&mut self, scene: &mut Scene, container: NodeId);

    /// Whether an option changed since the last pass.
    fn needs_update(&self) -> bool;

    /// Reconcile the container with the current records and options.
    fn update(&mut self, scene: &mut Scene, transitions: &mut Transitions) -> DigestReport;
}

/// Generates a getter and a chaining setter per option.
///
/// `update` options mark the layer dirty when set, `deferred` options are
/// read by the next pass without triggering one.
macro_rules! layer_options {
    ($layer:ty {
        $( $(#[$meta:meta])* $name:ident, $setter:ident: $ty:ty => $policy:ident; )*
    }) => {
        impl $layer {
            $(
                $(#[$meta])*
                pub fn $name(&self) -> &$ty {
                    &self.$name
                }

                pub fn $setter(&mut self, value: impl Into<$ty>) -> &mut Self {
                    self.$name = value.into();
                    self.dirty |= $crate::layers::layer_options!(@dirty $policy);
                    self
                }
            )*
        }
    };
    (@dirty update) => { true };
    (@dirty deferred) => { false };
}

pub(crate) use layer_options;

/// Wrap `apply` so every applied snapshot is recorded on the node.
pub(crate) fn recording(apply: impl Fn(&mut Scene, NodeId, &Snapshot) + 'static) -> Applier {
    Box::new(move |scene: &mut Scene, node: NodeId, snapshot: &Snapshot| {
        apply(scene, node, snapshot);
        if let Some(n) = scene.node_mut(node) {
            n.snapshot = Some(snapshot.clone());
        }
    })
}

/// Move `node` toward `target`.
///
/// Starts from the snapshot the node displays, or from `initial` for a node
/// that was never drawn. Nothing happens when already on target; `immediate`
/// skips the transition.
#[allow(clippy::too_many_arguments)]
pub(crate) fn retarget(
    scene: &mut Scene,
    transitions: &mut Transitions,
    node: NodeId,
    target: Snapshot,
    initial: Snapshot,
    duration_ms: f64,
    immediate: bool,
    apply: impl Fn(&mut Scene, NodeId, &Snapshot) + 'static,
) {
    let current = scene
        .node(node)
        .and_then(|n| n.snapshot.clone())
        .unwrap_or(initial);
    if !current.differs_from(&target) {
        return;
    }

    let duration = if immediate { 0.0 } else { duration_ms };
    transitions.animate(
        scene,
        TransitionKey::attributes(node),
        current,
        target,
        duration,
        Easing::QuadraticInOut,
        recording(apply),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::Node;

    fn set_x(scene: &mut Scene, node: NodeId, s: &Snapshot) {
        if let Some(n) = scene.node_mut(node) {
            n.transform.position.x = s.value("x");
        }
    }

    #[test]
    fn test_retarget_starts_from_initial_then_snapshot() {
        let mut scene = Scene::new();
        let mut transitions = Transitions::new();
        let node = scene.spawn(Node::group());

        let target = Snapshot::new().with("x", 10.0);
        let initial = Snapshot::new().with("x", 0.0);
        retarget(&mut scene, &mut transitions, node, target.clone(), initial, 100.0, false, set_x);
        assert_eq!(transitions.active_count(), 1);

        transitions.tick(&mut scene, 50.0);
        let shown = scene.node(node).and_then(|n| n.snapshot.clone()).unwrap();
        assert!(shown.value("x") > 0.0 && shown.value("x") < 10.0);

        transitions.tick(&mut scene, 100.0);
        // on target: no new task
        retarget(&mut scene, &mut transitions, node, target, Snapshot::new(), 100.0, false, set_x);
        assert_eq!(transitions.active_count(), 0);
    }

    #[test]
    fn test_retarget_immediate() {
        let mut scene = Scene::new();
        let mut transitions = Transitions::new();
        let node = scene.spawn(Node::group());
        let target = Snapshot::new().with("x", 4.0);
        let initial = Snapshot::new().with("x", 0.0);
        retarget(&mut scene, &mut transitions, node, target, initial, 1000.0, true, set_x);
        assert_eq!(transitions.active_count(), 0);
        assert_eq!(scene.node(node).map(|n| n.transform.position.x), Some(4.0));
    }
}
