use std::rc::Rc;

use geojson::Geometry as GeoJsonGeometry;

use super::{layer_options, retarget, Layer, DEFAULT_TRANSITION_MS};
use crate::accessor::{Accessor, Record};
use crate::animation::{Snapshot, Transitions};
use crate::color::color_and_alpha;
use crate::digest::{BindKey, Digest, DigestReport};
use crate::error::GlobeError;
use crate::geo::GLOBE_RADIUS;
use crate::mesh::{conic_polygon, polygon_outline, Ring};
use crate::scene::{Material, Node, NodeId, ObjectType, Scene};

/// Extruded GeoJSON polygons with an optional outline.
pub struct PolygonsLayer {
    polygons_data: Vec<Record>,
    polygon_geojson_geometry: Accessor<Option<GeoJsonGeometry>>,
    polygon_id: Accessor<Option<String>>,
    polygon_cap_color: Accessor<String>,
    polygon_side_color: Accessor<String>,
    polygon_stroke_color: Accessor<Option<String>>,
    polygon_altitude: Accessor<f64>,
    polygon_cap_curvature_resolution: Accessor<f64>,
    polygons_transition_duration: f64,

    container: Option<NodeId>,
    digest: Digest,
    dirty: bool,
}

impl Default for PolygonsLayer {
    fn default() -> Self {
        Self {
            polygons_data: Vec::new(),
            polygon_geojson_geometry: Accessor::field("geometry"),
            polygon_id: Accessor::constant(None),
            polygon_cap_color: Accessor::constant("#ffffaa".to_string()),
            polygon_side_color: Accessor::constant("#ffffaa".to_string()),
            polygon_stroke_color: Accessor::constant(None),
            polygon_altitude: Accessor::constant(0.01),
            polygon_cap_curvature_resolution: Accessor::constant(5.0),
            polygons_transition_duration: DEFAULT_TRANSITION_MS,
            container: None,
            digest: Digest::new(),
            dirty: true,
        }
    }
}

layer_options!(PolygonsLayer {
    polygons_data, set_polygons_data: Vec<Record> => update;
    /// GeoJSON `Polygon` or `MultiPolygon` of each record
    polygon_geojson_geometry, set_polygon_geojson_geometry:
        Accessor<Option<GeoJsonGeometry>> => update;
    /// Stable id of a record; records without one are tracked by handle
    polygon_id, set_polygon_id: Accessor<Option<String>> => update;
    polygon_cap_color, set_polygon_cap_color: Accessor<String> => update;
    polygon_side_color, set_polygon_side_color: Accessor<String> => update;
    /// Outline color; no color hides the outline
    polygon_stroke_color, set_polygon_stroke_color: Accessor<Option<String>> => update;
    polygon_altitude, set_polygon_altitude: Accessor<f64> => update;
    /// Max angular span, in degrees, of cap and outline segments
    polygon_cap_curvature_resolution, set_polygon_cap_curvature_resolution: Accessor<f64> => update;
    polygons_transition_duration, set_polygons_transition_duration: f64 => deferred;
});

impl PolygonsLayer {
    pub fn new() -> Self {
        Self::default()
    }
}

/// One simple polygon of a record.
struct Part {
    key: BindKey,
    rings: Rc<Vec<Ring>>,
    cap_color: String,
    side_color: String,
    stroke_color: Option<String>,
    altitude: f64,
    resolution: f64,
}

fn geometry_type(value: &geojson::Value) -> &'static str {
    match value {
        geojson::Value::Point(_) => "Point",
        geojson::Value::MultiPoint(_) => "MultiPoint",
        geojson::Value::LineString(_) => "LineString",
        geojson::Value::MultiLineString(_) => "MultiLineString",
        geojson::Value::Polygon(_) => "Polygon",
        geojson::Value::MultiPolygon(_) => "MultiPolygon",
        geojson::Value::GeometryCollection(_) => "GeometryCollection",
    }
}

fn to_rings(polygon: &[Vec<Vec<f64>>]) -> Vec<Ring> {
    polygon
        .iter()
        .map(|ring| {
            ring.iter()
                .filter(|p| p.len() >= 2)
                .map(|p| [p[0], p[1]])
                .collect()
        })
        .collect()
}

/// Split a record's geometry into simple polygons.
fn explode(geometry: Option<GeoJsonGeometry>) -> Result<Vec<Vec<Ring>>, GlobeError> {
    match geometry.map(|g| g.value) {
        Some(geojson::Value::Polygon(polygon)) => Ok(vec![to_rings(&polygon)]),
        Some(geojson::Value::MultiPolygon(polygons)) => {
            Ok(polygons.iter().map(|p| to_rings(p)).collect())
        }
        Some(other) => Err(GlobeError::UnsupportedGeometry(geometry_type(&other).to_string())),
        None => Err(GlobeError::MissingGeometry),
    }
}

fn child(scene: &Scene, node: NodeId, index: usize) -> Option<NodeId> {
    scene.children(node).get(index).copied()
}

fn build_polygon(scene: &mut Scene) -> NodeId {
    let group = scene.spawn(Node::group().tagged(ObjectType::Polygon));
    let side = Material::basic().double_sided().into_shared();
    let cap = Material::basic().double_sided().into_shared();
    let mesh = scene.spawn(Node::mesh(None, vec![side, cap]));
    let stroke = scene.spawn(Node::line(None, Material::line().into_shared()));
    scene.add(group, mesh);
    scene.add(group, stroke);
    group
}

/// Rebuild the extruded mesh, and the outline when shown, at `s.alt`.
fn shape_polygon(scene: &mut Scene, node: NodeId, rings: &[Ring], stroke: bool, s: &Snapshot) {
    let (alt, resolution) = (s.value("alt"), s.value("res").max(0.1));

    if let Some(mesh) = child(scene, node, 0) {
        let geometry = conic_polygon(rings, GLOBE_RADIUS, GLOBE_RADIUS * (1.0 + alt), resolution);
        if let Some(n) = scene.node_mut(mesh) {
            n.geometry = Some(Rc::new(geometry));
        }
    }
    if stroke {
        if let Some(line) = child(scene, node, 1) {
            // slightly above the cap
            let geometry = polygon_outline(rings, GLOBE_RADIUS * (1.0 + alt + 1e-4), resolution);
            if let Some(n) = scene.node_mut(line) {
                n.geometry = Some(Rc::new(geometry));
            }
        }
    }
}

fn paint(scene: &mut Scene, node: NodeId, part: &Part) {
    if let Some(mesh) = child(scene, node, 0).and_then(|m| scene.node(m)) {
        for (index, color) in [&part.side_color, &part.cap_color].into_iter().enumerate() {
            if let Some(material) = mesh.material(index) {
                let (c, alpha) = color_and_alpha(color);
                material.borrow_mut().set_color(c, alpha);
            }
        }
    }

    let Some(line) = child(scene, node, 1) else {
        return;
    };
    if let Some(n) = scene.node_mut(line) {
        n.visible = part.stroke_color.is_some();
        if let (Some(color), Some(material)) = (&part.stroke_color, n.material(0)) {
            let (c, alpha) = color_and_alpha(color);
            material.borrow_mut().set_color(c, alpha);
        }
    }
}

impl Layer for PolygonsLayer {
    fn init(&mut self, scene: &mut Scene, container: NodeId) {
        scene.clear(container);
        self.digest.reset();
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

        let geometry = self.polygon_geojson_geometry.resolve();
        let id = self.polygon_id.resolve();
        let cap_color = self.polygon_cap_color.resolve();
        let side_color = self.polygon_side_color.resolve();
        let stroke_color = self.polygon_stroke_color.resolve();
        let altitude = self.polygon_altitude.resolve();
        let resolution = self.polygon_cap_curvature_resolution.resolve();

        let mut parts = Vec::new();
        for d in &self.polygons_data {
            let polygons = match explode(geometry(d)) {
                Ok(polygons) => polygons,
                Err(e) => {
                    log::warn!("{e}, skipping polygon");
                    continue;
                }
            };
            let source = id(d);
            for (index, rings) in polygons.into_iter().enumerate() {
                let key = match &source {
                    Some(source) => BindKey::Id(format!("{source}_{index}")),
                    None => BindKey::part(d, index),
                };
                parts.push(Part {
                    key,
                    rings: Rc::new(rings),
                    cap_color: cap_color(d),
                    side_color: side_color(d),
                    stroke_color: stroke_color(d),
                    altitude: altitude(d),
                    resolution: resolution(d),
                });
            }
        }

        let duration = self.polygons_transition_duration;
        self.digest.run(
            scene,
            container,
            &parts,
            |part| part.key.clone(),
            |scene, _| Some(build_polygon(scene)),
            |scene, node, part| {
                paint(scene, node, part);

                let stroke = part.stroke_color.is_some();
                let target =
                    Snapshot::new().with("alt", part.altitude).with("res", part.resolution);
                let current = scene
                    .node(node)
                    .and_then(|n| n.snapshot.clone())
                    .unwrap_or_else(|| target.clone().with("alt", -1e-3));

                if !current.differs_from(&target) {
                    // outline switched on without a shape change
                    let unshaped = child(scene, node, 1)
                        .and_then(|l| scene.node(l))
                        .is_some_and(|l| l.geometry.is_none());
                    if stroke && unshaped {
                        shape_polygon(scene, node, &part.rings, true, &current);
                    }
                    return;
                }

                // a curvature change alone is not worth animating
                let immediate = current.value("alt") == part.altitude;
                let rings = Rc::clone(&part.rings);
                let apply = move |scene: &mut Scene, node: NodeId, s: &Snapshot| {
                    shape_polygon(scene, node, &rings, stroke, s)
                };
                retarget(scene, transitions, node, target, current, duration, immediate, apply);
            },
        )
    }
}
