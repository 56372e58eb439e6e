use std::collections::HashMap;
use std::f64::consts::PI;
use std::rc::Rc;

use glam::DVec3;
use serde_json::Value;

use super::{layer_options, retarget, Layer, DEFAULT_TRANSITION_MS};
use crate::accessor::{Accessor, FromField, Record};
use crate::animation::{Snapshot, Transitions};
use crate::color::color_and_alpha;
use crate::digest::{BindKey, Digest, DigestReport};
use crate::geo::{to_cartesian, units_per_degree};
use crate::mesh::{circle, BlockFont, FontShaper};
use crate::scene::{look_rotation, Geometry, Material, Node, NodeId, ObjectType, Scene};

/// Side of the anchor dot the text is placed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DotOrientation {
    Right,
    Top,
    #[default]
    Bottom,
}

impl DotOrientation {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "right" => Some(DotOrientation::Right),
            "top" => Some(DotOrientation::Top),
            "bottom" => Some(DotOrientation::Bottom),
            _ => None,
        }
    }
}

impl FromField for DotOrientation {
    fn from_field(value: Option<&Value>) -> Self {
        let s = String::from_field(value);
        DotOrientation::parse(&s).unwrap_or_else(|| {
            log::debug!("unknown dot orientation {s:?}, using bottom");
            DotOrientation::Bottom
        })
    }
}

impl From<DotOrientation> for Accessor<DotOrientation> {
    fn from(o: DotOrientation) -> Self {
        Accessor::Constant(o)
    }
}

/// Inputs the text geometry of a label was shaped from.
///
/// Holding the font keeps its address from being reused by a replacement.
#[derive(Clone)]
struct ShapeKey {
    text: String,
    height: f64,
    resolution: u32,
    centered: bool,
    font: Rc<dyn FontShaper>,
}

impl PartialEq for ShapeKey {
    fn eq(&self, other: &Self) -> bool {
        self.text == other.text
            && self.height == other.height
            && self.resolution == other.resolution
            && self.centered == other.centered
            && Rc::ptr_eq(&self.font, &other.font)
    }
}

/// Text labels with an optional anchor dot, facing away from the globe.
pub struct LabelsLayer {
    labels_data: Vec<Record>,
    label_lat: Accessor<f64>,
    label_lng: Accessor<f64>,
    label_altitude: Accessor<f64>,
    label_text: Accessor<String>,
    label_size: Accessor<f64>,
    label_type_face: Rc<dyn FontShaper>,
    label_color: Accessor<String>,
    label_rotation: Accessor<f64>,
    label_resolution: u32,
    label_include_dot: Accessor<bool>,
    label_dot_radius: Accessor<f64>,
    label_dot_orientation: Accessor<DotOrientation>,
    labels_transition_duration: f64,

    container: Option<NodeId>,
    digest: Digest,
    shaped: HashMap<NodeId, ShapeKey>,
    dirty: bool,
}

impl Default for LabelsLayer {
    fn default() -> Self {
        Self {
            labels_data: Vec::new(),
            label_lat: Accessor::field("lat"),
            label_lng: Accessor::field("lng"),
            label_altitude: Accessor::constant(0.0),
            label_text: Accessor::field("text"),
            label_size: Accessor::constant(0.5),
            label_type_face: Rc::new(BlockFont),
            label_color: Accessor::constant("lightgrey".to_string()),
            label_rotation: Accessor::constant(0.0),
            label_resolution: 3,
            label_include_dot: Accessor::constant(true),
            label_dot_radius: Accessor::constant(0.1),
            label_dot_orientation: Accessor::constant(DotOrientation::Bottom),
            labels_transition_duration: DEFAULT_TRANSITION_MS,
            container: None,
            digest: Digest::new(),
            shaped: HashMap::new(),
            dirty: true,
        }
    }
}

layer_options!(LabelsLayer {
    labels_data, set_labels_data: Vec<Record> => update;
    label_lat, set_label_lat: Accessor<f64> => update;
    label_lng, set_label_lng: Accessor<f64> => update;
    label_altitude, set_label_altitude: Accessor<f64> => update;
    label_text, set_label_text: Accessor<String> => update;
    /// Text height in degrees of arc
    label_size, set_label_size: Accessor<f64> => update;
    /// Glyph source; [`OutlineFont`](crate::mesh::OutlineFont) reads real font data
    label_type_face, set_label_type_face: Rc<dyn FontShaper> => update;
    label_color, set_label_color: Accessor<String> => update;
    /// Clockwise degrees from the parallel through the label
    label_rotation, set_label_rotation: Accessor<f64> => update;
    /// Segments per glyph curve
    label_resolution, set_label_resolution: u32 => update;
    label_include_dot, set_label_include_dot: Accessor<bool> => update;
    /// Dot radius in degrees of arc
    label_dot_radius, set_label_dot_radius: Accessor<f64> => update;
    label_dot_orientation, set_label_dot_orientation: Accessor<DotOrientation> => update;
    labels_transition_duration, set_labels_transition_duration: f64 => deferred;
});

impl LabelsLayer {
    pub fn new() -> Self {
        Self::default()
    }
}

fn place_label(scene: &mut Scene, node: NodeId, s: &Snapshot) {
    let Some(n) = scene.node_mut(node) else {
        return;
    };
    let t = &mut n.transform;
    t.position = to_cartesian(s.value("lat"), s.value("lng"), s.value("alt"));
    // face the center, then turn around to face outwards
    t.rotation = look_rotation(-t.position, DVec3::Y);
    t.rotate_local(DVec3::Y, PI);
    t.rotate_local(DVec3::Z, -s.value("rot").to_radians());
    t.set_uniform_scale(s.value("scale").max(1e-12));
}

impl Layer for LabelsLayer {
    fn init(&mut self, scene: &mut Scene, container: NodeId) {
        scene.clear(container);
        self.digest.reset();
        self.shaped.clear();
        self.container = Some(container);
        self.dirty = true;
    }

    fn needs_update(&self) -> bool {
        self.dirty
    }

    fn update(&mut self, scene: &mut Scene, transitions: &mut Transitions) -> DigestReport {
        self.dirty = false;
        let Some(container) = self.container else {
            return DigestReport::default();
        };

        let lat = self.label_lat.resolve();
        let lng = self.label_lng.resolve();
        let altitude = self.label_altitude.resolve();
        let text = self.label_text.resolve();
        let size = self.label_size.resolve();
        let color = self.label_color.resolve();
        let rotation = self.label_rotation.resolve();
        let include_dot = self.label_include_dot.resolve();
        let dot_radius = self.label_dot_radius.resolve();
        let orientation = self.label_dot_orientation.resolve();
        let font = &self.label_type_face;
        let resolution = self.label_resolution;
        let duration = self.labels_transition_duration;
        let shaped = &mut self.shaped;

        let dot_geometry = Rc::new(circle(1.0, 16));

        let report = self.digest.run(
            scene,
            container,
            &self.labels_data,
            BindKey::of,
            |scene, _| {
                let material = Material::lambert().into_shared();
                let group = scene.spawn(Node::group().tagged(ObjectType::Label));
                let dot = scene.spawn(Node::mesh(
                    Some(Rc::clone(&dot_geometry)),
                    vec![Rc::clone(&material)],
                ));
                let label = scene.spawn(Node::mesh(None, vec![material]));
                scene.add(group, dot);
                scene.add(group, label);
                Some(group)
            },
            |scene, node, d| {
                let (dot, label) = match scene.children(node) {
                    [dot, label, ..] => (*dot, *label),
                    _ => return,
                };

                if let Some(material) = scene.node(label).and_then(|n| n.material(0)) {
                    let (c, alpha) = color_and_alpha(&color(d));
                    material.borrow_mut().set_color(c, alpha);
                }

                let include_dot = include_dot(d);
                let orientation = orientation(d);
                let dot_r = if include_dot { dot_radius(d) * units_per_degree() } else { 1e-12 };
                if let Some(n) = scene.node_mut(dot) {
                    n.transform.scale.x = dot_r;
                    n.transform.scale.y = dot_r;
                }

                let height = size(d) * units_per_degree();
                let key = ShapeKey {
                    text: text(d),
                    height,
                    resolution,
                    centered: orientation != DotOrientation::Right,
                    font: Rc::clone(font),
                };
                if shaped.get(&label) != Some(&key) {
                    let mut geometry: Geometry = font.shape(&key.text, height, resolution);
                    // anchor on the center instead of the bottom-left corner
                    if key.centered {
                        geometry.center();
                    }
                    if let Some(n) = scene.node_mut(label) {
                        n.geometry = Some(Rc::new(geometry));
                    }
                    shaped.insert(label, key);
                }

                if let Some(n) = scene.node_mut(label) {
                    let padding = dot_r + height / 2.0;
                    n.transform.position = match (include_dot, orientation) {
                        (false, _) => DVec3::ZERO,
                        (true, DotOrientation::Right) => DVec3::new(padding, -height / 2.0, 0.0),
                        (true, DotOrientation::Top) => DVec3::new(0.0, padding + height / 2.0, 0.0),
                        (true, DotOrientation::Bottom) => {
                            DVec3::new(0.0, -padding - height / 2.0, 0.0)
                        }
                    };
                }

                let target = Snapshot::new()
                    .with("lat", lat(d))
                    .with("lng", lng(d))
                    .with("alt", altitude(d))
                    .with("rot", rotation(d))
                    .with("scale", 1.0);
                let initial = target.clone().with("scale", 1e-12);
                retarget(scene, transitions, node, target, initial, duration, false, place_label);
            },
        );

        self.shaped.retain(|id, _| scene.contains(*id));
        report
    }
}
