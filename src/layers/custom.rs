use std::fmt;
use std::rc::Rc;

use super::{layer_options, Layer};
use crate::accessor::{Datum, Record};
use crate::animation::Transitions;
use crate::digest::{BindKey, Digest, DigestReport};
use crate::geo::GLOBE_RADIUS;
use crate::scene::{Node, NodeId, ObjectType, Scene};

/// Builds the object of a custom record.
#[derive(Clone)]
pub enum ObjectFactory {
    /// Copied for every record, sharing geometry and materials
    Template(Node),
    /// Called with the record and the globe radius; returns a detached node,
    /// or `None` to skip the record
    Func(Rc<dyn Fn(&mut Scene, &Datum, f64) -> Option<NodeId>>),
}

impl ObjectFactory {
    pub fn func(f: impl Fn(&mut Scene, &Datum, f64) -> Option<NodeId> + 'static) -> Self {
        ObjectFactory::Func(Rc::new(f))
    }
}

impl fmt::Debug for ObjectFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectFactory::Template(node) => f.debug_tuple("Template").field(&node.kind).finish(),
            ObjectFactory::Func(_) => f.write_str("Func(..)"),
        }
    }
}

impl From<Node> for ObjectFactory {
    fn from(node: Node) -> Self {
        ObjectFactory::Template(node)
    }
}

/// Called with the object, its record and the globe radius on every pass.
pub type ObjectUpdate = Rc<dyn Fn(&mut Scene, NodeId, &Datum, f64)>;

/// Caller-built objects, one per record.
#[derive(Default)]
pub struct CustomLayer {
    custom_layer_data: Vec<Record>,
    custom_object: Option<ObjectFactory>,
    custom_object_update: Option<ObjectUpdate>,

    container: Option<NodeId>,
    digest: Digest,
    dirty: bool,
}

layer_options!(CustomLayer {
    custom_layer_data, set_custom_layer_data: Vec<Record> => update;
    custom_object, set_custom_object: Option<ObjectFactory> => update;
    /// Without an update function every pass rebuilds all objects
    custom_object_update, set_custom_object_update: Option<ObjectUpdate> => deferred;
});

impl CustomLayer {
    pub fn new() -> Self {
        Self {
            dirty: true,
            ..Self::default()
        }
    }
}

impl Layer for CustomLayer {
    fn init(&mut self, scene: &mut Scene, container: NodeId) {
        scene.clear(container);
        self.digest.reset();
        self.container = Some(container);
        self.dirty = true;
    }

    fn needs_update(&self) -> bool {
        self.dirty
    }

    fn update(&mut self, scene: &mut Scene, _transitions: &mut Transitions) -> DigestReport {
        self.dirty = false;
        let Some(container) = self.container else {
            return DigestReport::default();
        };

        let update = self.custom_object_update.clone();
        let mut cleared = 0;
        if update.is_none() {
            cleared = scene.clear(container);
            self.digest.reset();
        }

        let factory = self.custom_object.as_ref();
        let mut report = self.digest.run(
            scene,
            container,
            &self.custom_layer_data,
            BindKey::of,
            |scene, d| {
                let node = match factory? {
                    ObjectFactory::Template(template) => scene.spawn(template.clone()),
                    ObjectFactory::Func(build) => build(scene, d, GLOBE_RADIUS)?,
                };
                if let Some(n) = scene.node_mut(node) {
                    n.object_type = Some(ObjectType::Custom);
                }
                Some(node)
            },
            |scene, node, d| {
                if let Some(update) = &update {
                    update(scene, node, d, GLOBE_RADIUS);
                }
            },
        );
        report.removed += cleared;
        report
    }
}
