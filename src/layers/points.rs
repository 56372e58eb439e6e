use std::collections::HashMap;
use std::f32::consts::FRAC_PI_2;
use std::rc::Rc;

use glam::{DVec3, Mat4, Vec3};
use rayon::prelude::*;

use super::{layer_options, retarget, Layer, DEFAULT_TRANSITION_MS};
use crate::accessor::{Accessor, Datum, Record};
use crate::animation::{Snapshot, Transitions};
use crate::color::{color_and_alpha, Color};
use crate::digest::{BindKey, Digest, DigestReport};
use crate::geo::{to_cartesian, units_per_degree, GLOBE_RADIUS};
use crate::mesh::cylinder;
use crate::scene::{
    Geometry, Material, Node, NodeId, ObjectType, Scene, SharedMaterial, Topology, Transform,
};

/// Column markers standing on the globe surface.
pub struct PointsLayer {
    points_data: Vec<Record>,
    point_lat: Accessor<f64>,
    point_lng: Accessor<f64>,
    point_color: Accessor<String>,
    point_altitude: Accessor<f64>,
    point_radius: Accessor<f64>,
    point_resolution: u32,
    points_merge: bool,
    points_transition_duration: f64,

    container: Option<NodeId>,
    digest: Digest,
    merged: Option<NodeId>,
    dirty: bool,
}

impl Default for PointsLayer {
    fn default() -> Self {
        Self {
            points_data: Vec::new(),
            point_lat: Accessor::field("lat"),
            point_lng: Accessor::field("lng"),
            point_color: Accessor::constant("#ffffaa".to_string()),
            point_altitude: Accessor::constant(0.1),
            point_radius: Accessor::constant(0.25),
            point_resolution: 12,
            points_merge: false,
            points_transition_duration: DEFAULT_TRANSITION_MS,
            container: None,
            digest: Digest::new(),
            merged: None,
            dirty: true,
        }
    }
}

layer_options!(PointsLayer {
    points_data, set_points_data: Vec<Record> => update;
    point_lat, set_point_lat: Accessor<f64> => update;
    point_lng, set_point_lng: Accessor<f64> => update;
    point_color, set_point_color: Accessor<String> => update;
    /// Column height in globe radii
    point_altitude, set_point_altitude: Accessor<f64> => update;
    /// Column radius in degrees of arc
    point_radius, set_point_radius: Accessor<f64> => update;
    /// Slices around each column, used by markers created afterwards
    point_resolution, set_point_resolution: u32 => deferred;
    /// Bake every marker into one static mesh
    points_merge, set_points_merge: bool => update;
    points_transition_duration, set_points_transition_duration: f64 => deferred;
});

impl PointsLayer {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Unit column pointing along -Z from the origin, so that after `look_at`
/// toward the globe center it rises away from the surface.
fn marker_template(resolution: u32) -> Geometry {
    let mut geometry = cylinder(1.0, 1.0, resolution);
    geometry.apply_matrix(Mat4::from_rotation_x(FRAC_PI_2));
    geometry.translate(Vec3::new(0.0, 0.0, -0.5));
    geometry
}

fn place_marker(transform: &mut Transform, s: &Snapshot) {
    transform.position = to_cartesian(s.value("lat"), s.value("lng"), 0.0);
    transform.look_at(DVec3::ZERO);
    let r = s.value("r").min(30.0) * units_per_degree();
    // a zero depth would make the matrix non-invertible
    let height = (s.value("alt") * GLOBE_RADIUS).max(0.1);
    transform.scale = DVec3::new(r, r, height);
}

fn apply_marker(scene: &mut Scene, node: NodeId, s: &Snapshot) {
    if let Some(n) = scene.node_mut(node) {
        place_marker(&mut n.transform, s);
    }
}

fn resolve_target<'a>(
    lat: &'a Accessor<f64>,
    lng: &'a Accessor<f64>,
    alt: &'a Accessor<f64>,
    r: &'a Accessor<f64>,
) -> impl Fn(&Datum) -> Snapshot + 'a {
    let (lat, lng, alt, r) = (lat.resolve(), lng.resolve(), alt.resolve(), r.resolve());
    move |d| {
        Snapshot::new()
            .with("alt", alt(d))
            .with("r", r(d))
            .with("lat", lat(d))
            .with("lng", lng(d))
    }
}

impl PointsLayer {
    fn update_merged(&mut self, scene: &mut Scene, container: NodeId) -> DigestReport {
        if self.points_transition_duration > 0.0 {
            log::debug!("merged points are not animated");
        }

        let removed = scene.clear(container);
        self.digest.reset();

        let target = resolve_target(
            &self.point_lat,
            &self.point_lng,
            &self.point_altitude,
            &self.point_radius,
        );
        let color = self.point_color.resolve();
        let placements: Vec<(Mat4, Color)> = self
            .points_data
            .iter()
            .map(|d| {
                let mut transform = Transform::IDENTITY;
                place_marker(&mut transform, &target(d));
                (transform.matrix().as_mat4(), color_and_alpha(&color(d)).0)
            })
            .collect();

        let template = marker_template(self.point_resolution);
        let geometry = placements
            .par_iter()
            .map(|(m, c)| {
                let mut piece = Geometry::new(Topology::Triangles);
                piece.merge(&template, *m, *c);
                piece
            })
            .reduce(
                || Geometry::new(Topology::Triangles),
                |mut acc, piece| {
                    acc.append(&piece);
                    acc
                },
            );

        let mut material = Material::basic();
        material.vertex_colors = true;
        let merged = scene.spawn(
            Node::mesh(Some(Rc::new(geometry)), vec![material.into_shared()])
                .tagged(ObjectType::Points),
        );
        scene.add(container, merged);
        self.merged = Some(merged);

        DigestReport {
            created: 1,
            removed,
            ..DigestReport::default()
        }
    }
}

impl Layer for PointsLayer {
    fn init(&mut self, scene: &mut Scene, container: NodeId) {
        scene.clear(container);
        self.digest.reset();
        self.merged = None;
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

        if self.points_merge {
            return self.update_merged(scene, container);
        }
        if let Some(merged) = self.merged.take() {
            scene.remove(merged);
        }

        let template = Rc::new(marker_template(self.point_resolution));
        let target = resolve_target(
            &self.point_lat,
            &self.point_lng,
            &self.point_altitude,
            &self.point_radius,
        );
        let color = self.point_color.resolve();
        let duration = self.points_transition_duration;
        let mut materials: HashMap<String, SharedMaterial> = HashMap::new();

        self.digest.run(
            scene,
            container,
            &self.points_data,
            BindKey::of,
            |scene, _| {
                let marker = Node::mesh(Some(Rc::clone(&template)), Vec::new());
                Some(scene.spawn(marker.tagged(ObjectType::Point)))
            },
            |scene, node, d| {
                let target = target(d);
                let initial = target.clone().with("alt", -1e-3);
                retarget(scene, transitions, node, target, initial, duration, false, apply_marker);

                let color = color(d);
                let material = materials
                    .entry(color)
                    .or_insert_with_key(|color| {
                        let (c, alpha) = color_and_alpha(color);
                        let mut material = Material::lambert();
                        material.set_color(c, alpha);
                        material.into_shared()
                    })
                    .clone();
                if let Some(n) = scene.node_mut(node) {
                    n.materials = vec![material];
                }
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accessor::record;
    use approx::assert_abs_diff_eq;
    use serde_json::json;

    fn setup() -> (Scene, NodeId, Transitions, PointsLayer) {
        let mut scene = Scene::new();
        let container = scene.spawn(Node::group());
        scene.add(scene.root(), container);
        let mut layer = PointsLayer::new();
        layer.init(&mut scene, container);
        (scene, container, Transitions::new(), layer)
    }

    fn cities() -> Vec<Record> {
        vec![
            record(json!({ "lat": 51.5, "lng": -0.1, "color": "red" })),
            record(json!({ "lat": 40.7, "lng": -74.0, "color": "red" })),
            record(json!({ "lat": -33.9, "lng": 151.2, "color": "#00ff00" })),
        ]
    }

    #[test]
    fn test_markers_grow_to_target() {
        let (mut scene, container, mut tr, mut layer) = setup();
        layer.set_points_data(cities()).set_point_altitude(0.5);
        assert!(layer.needs_update());

        let report = layer.update(&mut scene, &mut tr);
        assert_eq!(report.created, 3);
        assert!(!layer.needs_update());

        tr.tick(&mut scene, 10.0);
        let node = scene.children(container)[0];
        let early = scene.node(node).unwrap().transform.scale.z;
        tr.tick(&mut scene, 1000.0);
        let n = scene.node(node).unwrap();
        assert!(early < 50.0);
        assert_abs_diff_eq!(n.transform.scale.z, 50.0, epsilon = 1e-9);
        assert_abs_diff_eq!(n.transform.scale.x, 0.25 * units_per_degree(), epsilon = 1e-9);
        assert_eq!(n.object_type, Some(ObjectType::Point));

        // ground sits on the surface, column points outward
        assert_abs_diff_eq!(n.transform.position.length(), GLOBE_RADIUS, epsilon = 1e-9);
        let tip = scene.local_to_world(node, DVec3::new(0.0, 0.0, -1.0));
        assert_abs_diff_eq!(tip.length(), GLOBE_RADIUS + 50.0, epsilon = 1e-6);
    }

    #[test]
    fn test_radius_capped_and_height_floored() {
        let (mut scene, container, mut tr, mut layer) = setup();
        layer
            .set_points_data(cities())
            .set_point_radius(90.0)
            .set_point_altitude(0.0)
            .set_points_transition_duration(0.0);
        layer.update(&mut scene, &mut tr);
        let n = scene.node(scene.children(container)[0]).unwrap();
        assert_abs_diff_eq!(n.transform.scale.x, 30.0 * units_per_degree(), epsilon = 1e-9);
        assert_eq!(n.transform.scale.z, 0.1);
    }

    #[test]
    fn test_materials_shared_per_color() {
        let (mut scene, container, mut tr, mut layer) = setup();
        layer.set_points_data(cities()).set_point_color("color");
        layer.update(&mut scene, &mut tr);
        let mats: Vec<SharedMaterial> = scene
            .children(container)
            .iter()
            .map(|c| scene.node(*c).unwrap().materials[0].clone())
            .collect();
        assert!(Rc::ptr_eq(&mats[0], &mats[1]));
        assert!(!Rc::ptr_eq(&mats[0], &mats[2]));
        assert_eq!(mats[2].borrow().color.map(|c| c.to_hex()), Some(0x00ff00));
    }

    #[test]
    fn test_deferred_options_do_not_dirty() {
        let (mut scene, _, mut tr, mut layer) = setup();
        layer.update(&mut scene, &mut tr);
        layer.set_point_resolution(4u32).set_points_transition_duration(10.0);
        assert!(!layer.needs_update());
    }

    #[test]
    fn test_merge_bakes_one_mesh() {
        let (mut scene, container, mut tr, mut layer) = setup();
        layer.set_points_data(cities()).set_point_resolution(6u32);
        layer.update(&mut scene, &mut tr);
        assert_eq!(scene.children(container).len(), 3);

        layer.set_points_merge(true);
        layer.update(&mut scene, &mut tr);
        let children = scene.children(container).to_vec();
        assert_eq!(children.len(), 1);
        let merged = scene.node(children[0]).unwrap();
        assert_eq!(merged.object_type, Some(ObjectType::Points));
        let per_marker = marker_template(6).vertex_count();
        let geometry = merged.geometry.as_ref().unwrap();
        assert_eq!(geometry.vertex_count(), 3 * per_marker);
        assert_eq!(geometry.colors.len(), 3 * per_marker);
        assert!(merged.materials[0].borrow().vertex_colors);
        // tasks of the removed markers are dropped
        assert_eq!(tr.tick(&mut scene, 1.0), 0);

        layer.set_points_merge(false);
        layer.update(&mut scene, &mut tr);
        assert_eq!(scene.find_by_type(container, ObjectType::Points).len(), 0);
        assert_eq!(scene.find_by_type(container, ObjectType::Point).len(), 3);
    }

    #[test]
    fn test_replaced_record_gets_new_marker() {
        let (mut scene, container, mut tr, mut layer) = setup();
        layer.set_points_data(vec![record(json!({ "lat": 0.0, "lng": 0.0 }))]);
        layer.update(&mut scene, &mut tr);
        let old = scene.children(container)[0];

        layer.set_points_data(vec![]);
        layer.set_points_data(vec![record(json!({ "lat": 0.0, "lng": 100.0 }))]);
        let report = layer.update(&mut scene, &mut tr);
        assert_eq!(report, DigestReport { created: 1, updated: 0, removed: 1, skipped: 0 });
        assert!(!scene.contains(old));
    }
}
