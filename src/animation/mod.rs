//! Attribute transitions.
//!
//! Layers describe each object's desired state as a [`Snapshot`] of named
//! numbers. [`Transitions`] blends from the state currently shown toward that
//! target across frames, one task per (node, channel). Setting a new target
//! on a channel that is still moving replaces the task and starts from the
//! values on screen, so an object is redirected rather than restarted.

mod easing;

pub use easing::Easing;

use std::collections::HashMap;

use crate::scene::{NodeId, Scene};

/// Flat set of named numeric attributes.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Snapshot {
    fields: Vec<(&'static str, f64)>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &'static str, value: f64) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: &'static str, value: f64) {
        match self.fields.iter_mut().find(|(k, _)| *k == key) {
            Some(field) => field.1 = value,
            None => self.fields.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.fields.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
    }

    /// Value of `key`, or 0 when absent.
    pub fn value(&self, key: &str) -> f64 {
        self.get(key).unwrap_or(0.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, f64)> + '_ {
        self.fields.iter().copied()
    }

    /// True when any field of `target` is missing here or holds another value.
    pub fn differs_from(&self, target: &Snapshot) -> bool {
        target.fields.iter().any(|(k, v)| self.get(k) != Some(*v))
    }

    /// Blend toward `target` by `t`. Fields only present in `target` jump.
    pub fn lerp(&self, target: &Snapshot, t: f64) -> Snapshot {
        let fields = target
            .fields
            .iter()
            .map(|&(k, to)| match self.get(k) {
                Some(from) if from != to => (k, from + (to - from) * t),
                _ => (k, to),
            })
            .collect();
        Snapshot { fields }
    }
}

/// Independent animation slot on a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Layer-driven data attributes
    Attributes,
    RevealScale,
    RevealSpin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransitionKey {
    pub node: NodeId,
    pub channel: Channel,
}

impl TransitionKey {
    pub fn attributes(node: NodeId) -> Self {
        Self { node, channel: Channel::Attributes }
    }
}

/// Writes an interpolated snapshot onto the scene.
pub type Applier = Box<dyn FnMut(&mut Scene, NodeId, &Snapshot)>;

struct Task {
    from: Snapshot,
    to: Snapshot,
    started_ms: f64,
    duration_ms: f64,
    easing: Easing,
    apply: Applier,
}

/// Active interpolation tasks advanced by a global frame clock.
#[derive(Default)]
pub struct Transitions {
    now_ms: f64,
    active: HashMap<TransitionKey, Task>,
}

impl Transitions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> f64 {
        self.now_ms
    }

    /// Move the clock without advancing tasks, so tasks started in this frame
    /// begin at `now_ms`.
    pub fn set_clock(&mut self, now_ms: f64) {
        self.now_ms = now_ms;
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn is_animating(&self, key: TransitionKey) -> bool {
        self.active.contains_key(&key)
    }

    /// Move `key` from `from` to `to`.
    ///
    /// Non-positive durations and unchanged snapshots apply `to` right away
    /// and drop any task still running on the key. Returns whether a task
    /// was scheduled.
    pub fn animate(
        &mut self,
        scene: &mut Scene,
        key: TransitionKey,
        from: Snapshot,
        to: Snapshot,
        duration_ms: f64,
        easing: Easing,
        mut apply: Applier,
    ) -> bool {
        if !(duration_ms > 0.0) || !from.differs_from(&to) {
            self.active.remove(&key);
            apply(scene, key.node, &to);
            return false;
        }

        self.active.insert(
            key,
            Task {
                from,
                to,
                started_ms: self.now_ms,
                duration_ms,
                easing,
                apply,
            },
        );
        true
    }

    /// Freeze progress over `from_ms..until_ms`. Tasks started inside the
    /// span resume from their beginning at `until_ms`.
    pub fn hold(&mut self, from_ms: f64, until_ms: f64) {
        for task in self.active.values_mut() {
            let held = until_ms - task.started_ms.max(from_ms);
            if held > 0.0 {
                task.started_ms += held;
            }
        }
    }

    /// Advance every task to `now_ms`. Returns the number still running.
    pub fn tick(&mut self, scene: &mut Scene, now_ms: f64) -> usize {
        self.now_ms = now_ms;
        if self.active.is_empty() {
            return 0;
        }

        let mut finished = Vec::new();
        for (key, task) in self.active.iter_mut() {
            if !scene.contains(key.node) {
                finished.push(*key);
                continue;
            }

            let progress = ((now_ms - task.started_ms) / task.duration_ms).clamp(0.0, 1.0);
            if progress >= 1.0 {
                (task.apply)(scene, key.node, &task.to);
                finished.push(*key);
            } else {
                let blended = task.from.lerp(&task.to, task.easing.apply(progress));
                (task.apply)(scene, key.node, &blended);
            }
        }

        for key in finished {
            self.active.remove(&key);
        }
        self.active.len()
    }
}

/// Frame loop owned by the globe: gates the per-frame transition tick.
///
/// Time spent stopped does not count toward task progress: on restart every
/// task is pushed back by the span between the clock readings at stop and
/// at start.
#[derive(Default)]
pub struct Scheduler {
    running: bool,
    paused_at: Option<f64>,
    frames: u64,
    pub transitions: Transitions,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&mut self) {
        if let Some(paused_at) = self.paused_at.take() {
            let now = self.transitions.now();
            self.transitions.hold(paused_at, now);
        }
        self.running = true;
    }

    pub fn stop(&mut self) {
        if self.running {
            self.paused_at = Some(self.transitions.now());
        }
        self.running = false;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Advance transitions when running. Returns whether a frame was run.
    pub fn frame(&mut self, scene: &mut Scene, now_ms: f64) -> bool {
        if !self.running {
            return false;
        }
        self.transitions.tick(scene, now_ms);
        self.frames += 1;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::Node;
    use approx::assert_abs_diff_eq;

    fn record_x() -> Applier {
        Box::new(|scene: &mut Scene, node: NodeId, s: &Snapshot| {
            if let Some(n) = scene.node_mut(node) {
                n.transform.position.x = s.value("x");
                n.snapshot = Some(s.clone());
            }
        })
    }

    fn x(value: f64) -> Snapshot {
        Snapshot::new().with("x", value)
    }

    fn x_of(scene: &Scene, node: NodeId) -> f64 {
        scene.node(node).map(|n| n.transform.position.x).unwrap_or(f64::NAN)
    }

    fn setup() -> (Scene, NodeId, Transitions) {
        let mut scene = Scene::new();
        let node = scene.spawn(Node::group());
        scene.add(scene.root(), node);
        (scene, node, Transitions::new())
    }

    #[test]
    fn test_zero_and_negative_duration_apply_immediately() {
        let (mut scene, node, mut tr) = setup();
        let key = TransitionKey::attributes(node);

        let scheduled =
            tr.animate(&mut scene, key, x(0.0), x(5.0), 0.0, Easing::Linear, record_x());
        assert!(!scheduled);
        assert_eq!(x_of(&scene, node), 5.0);

        tr.animate(&mut scene, key, x(0.0), x(7.0), -10.0, Easing::Linear, record_x());
        assert_eq!(x_of(&scene, node), 7.0);
        assert_eq!(tr.active_count(), 0);
    }

    #[test]
    fn test_interpolates_and_completes() {
        let (mut scene, node, mut tr) = setup();
        let key = TransitionKey::attributes(node);
        tr.set_clock(1000.0);
        tr.animate(&mut scene, key, x(0.0), x(10.0), 100.0, Easing::Linear, record_x());

        tr.tick(&mut scene, 1050.0);
        assert_abs_diff_eq!(x_of(&scene, node), 5.0, epsilon = 1e-9);

        assert_eq!(tr.tick(&mut scene, 1100.0), 0);
        assert_eq!(x_of(&scene, node), 10.0);
        assert!(!tr.is_animating(key));
    }

    #[test]
    fn test_redirection_starts_from_current_values() {
        let (mut scene, node, mut tr) = setup();
        let key = TransitionKey::attributes(node);
        tr.animate(&mut scene, key, x(0.0), x(100.0), 100.0, Easing::Linear, record_x());
        tr.tick(&mut scene, 50.0);
        let mid = scene.node(node).and_then(|n| n.snapshot.clone()).unwrap();
        assert_abs_diff_eq!(mid.value("x"), 50.0, epsilon = 1e-9);

        // retarget mid-flight, from what is on screen
        tr.animate(&mut scene, key, mid, x(-100.0), 100.0, Easing::Linear, record_x());
        let mut last = x_of(&scene, node);
        for t in [60.0, 80.0, 100.0, 120.0, 140.0, 150.0] {
            tr.tick(&mut scene, t);
            let now = x_of(&scene, node);
            // heading monotonically toward the new target, never back to 0 or 100
            assert!(now <= last + 1e-9);
            assert!(now <= 50.0 + 1e-9);
            last = now;
        }
        assert_eq!(x_of(&scene, node), -100.0);
        assert_eq!(tr.active_count(), 0);
    }

    #[test]
    fn test_fast_path_cancels_running_task() {
        let (mut scene, node, mut tr) = setup();
        let key = TransitionKey::attributes(node);
        tr.animate(&mut scene, key, x(0.0), x(100.0), 100.0, Easing::Linear, record_x());
        tr.animate(&mut scene, key, x(0.0), x(3.0), 0.0, Easing::Linear, record_x());
        tr.tick(&mut scene, 500.0);
        assert_eq!(x_of(&scene, node), 3.0);
    }

    #[test]
    fn test_tick_is_idempotent_and_safe_when_idle() {
        let (mut scene, node, mut tr) = setup();
        assert_eq!(tr.tick(&mut scene, 0.0), 0);

        let key = TransitionKey::attributes(node);
        tr.animate(&mut scene, key, x(0.0), x(10.0), 100.0, Easing::QuadraticInOut, record_x());
        tr.tick(&mut scene, 30.0);
        let once = x_of(&scene, node);
        tr.tick(&mut scene, 30.0);
        assert_eq!(x_of(&scene, node), once);
    }

    #[test]
    fn test_removed_nodes_drop_their_tasks() {
        let (mut scene, node, mut tr) = setup();
        let key = TransitionKey::attributes(node);
        tr.animate(&mut scene, key, x(0.0), x(10.0), 100.0, Easing::Linear, record_x());
        scene.remove(node);
        assert_eq!(tr.tick(&mut scene, 10.0), 0);
    }

    #[test]
    fn test_channels_are_independent() {
        let (mut scene, node, mut tr) = setup();
        let noop: Applier = Box::new(|_: &mut Scene, _: NodeId, _: &Snapshot| {});
        let reveal = TransitionKey { node, channel: Channel::RevealScale };
        let from = Snapshot::new().with("k", 0.0);
        let to = Snapshot::new().with("k", 1.0);
        tr.animate(&mut scene, reveal, from, to, 600.0, Easing::QuadraticOut, noop);
        let key = TransitionKey::attributes(node);
        tr.animate(&mut scene, key, x(0.0), x(1.0), 100.0, Easing::Linear, record_x());
        assert_eq!(tr.active_count(), 2);
        assert_eq!(tr.tick(&mut scene, 100.0), 1);
    }

    #[test]
    fn test_snapshot_lerp_and_diff() {
        let a = Snapshot::new().with("lat", 0.0).with("alt", 1.0);
        let b = Snapshot::new().with("lat", 10.0).with("alt", 1.0).with("scale", 2.0);
        assert!(a.differs_from(&b));
        assert!(!b.differs_from(&b.clone()));

        let mid = a.lerp(&b, 0.5);
        assert_eq!(mid.get("lat"), Some(5.0));
        assert_eq!(mid.get("alt"), Some(1.0));
        assert_eq!(mid.get("scale"), Some(2.0));
    }

    #[test]
    fn test_scheduler_gates_frames() {
        let (mut scene, node, _) = setup();
        let mut scheduler = Scheduler::new();
        let key = TransitionKey::attributes(node);
        scheduler
            .transitions
            .animate(&mut scene, key, x(0.0), x(10.0), 100.0, Easing::Linear, record_x());

        assert!(!scheduler.frame(&mut scene, 200.0));
        assert_eq!(scheduler.transitions.active_count(), 1);

        scheduler.start();
        assert!(scheduler.frame(&mut scene, 200.0));
        assert_eq!(x_of(&scene, node), 10.0);
        assert_eq!(scheduler.frames(), 1);
    }

    #[test]
    fn test_stopped_time_does_not_count() {
        let (mut scene, node, _) = setup();
        let mut scheduler = Scheduler::new();
        scheduler.start();
        let key = TransitionKey::attributes(node);
        scheduler
            .transitions
            .animate(&mut scene, key, x(0.0), x(10.0), 100.0, Easing::Linear, record_x());
        scheduler.frame(&mut scene, 40.0);
        assert_abs_diff_eq!(x_of(&scene, node), 4.0, epsilon = 1e-9);

        scheduler.stop();
        scheduler.transitions.set_clock(1000.0);
        assert!(!scheduler.frame(&mut scene, 1000.0));
        scheduler.start();

        scheduler.frame(&mut scene, 1010.0);
        assert_abs_diff_eq!(x_of(&scene, node), 5.0, epsilon = 1e-9);
        scheduler.frame(&mut scene, 1060.0);
        assert_eq!(x_of(&scene, node), 10.0);
    }

    #[test]
    fn test_hold_restarts_tasks_begun_inside_the_span() {
        let (mut scene, node, mut tr) = setup();
        tr.set_clock(300.0);
        let key = TransitionKey::attributes(node);
        tr.animate(&mut scene, key, x(0.0), x(10.0), 100.0, Easing::Linear, record_x());

        tr.hold(100.0, 500.0);
        tr.tick(&mut scene, 550.0);
        assert_abs_diff_eq!(x_of(&scene, node), 5.0, epsilon = 1e-9);
    }
}
