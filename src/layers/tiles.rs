use std::rc::Rc;

use glam::{DQuat, EulerRot};

use super::{layer_options, retarget, Layer, DEFAULT_TRANSITION_MS};
use crate::accessor::{Accessor, Record};
use crate::animation::{Snapshot, Transitions};
use crate::color::Color;
use crate::digest::{BindKey, Digest, DigestReport};
use crate::geo::GLOBE_RADIUS;
use crate::mesh::sphere_sector;
use crate::scene::{Material, Node, NodeId, ObjectType, Scene, SharedMaterial};

/// Curved rectangles bounded by latitude and longitude.
pub struct TilesLayer {
    tiles_data: Vec<Record>,
    tile_lat: Accessor<f64>,
    tile_lng: Accessor<f64>,
    tile_altitude: Accessor<f64>,
    tile_width: Accessor<f64>,
    tile_height: Accessor<f64>,
    tile_use_globe_projection: Accessor<bool>,
    tile_material: Accessor<SharedMaterial>,
    tile_curvature_resolution: Accessor<f64>,
    tiles_transition_duration: f64,

    container: Option<NodeId>,
    digest: Digest,
    dirty: bool,
}

fn default_tile_material() -> SharedMaterial {
    let mut material = Material::lambert();
    material.set_color(Color::from_hex(0xffbb88), 0.4);
    material.into_shared()
}

impl Default for TilesLayer {
    fn default() -> Self {
        Self {
            tiles_data: Vec::new(),
            tile_lat: Accessor::field("lat"),
            tile_lng: Accessor::field("lng"),
            tile_altitude: Accessor::constant(0.01),
            tile_width: Accessor::constant(1.0),
            tile_height: Accessor::constant(1.0),
            tile_use_globe_projection: Accessor::constant(true),
            tile_material: Accessor::func(|_| default_tile_material()),
            tile_curvature_resolution: Accessor::constant(5.0),
            tiles_transition_duration: DEFAULT_TRANSITION_MS,
            container: None,
            digest: Digest::new(),
            dirty: true,
        }
    }
}

layer_options!(TilesLayer {
    tiles_data, set_tiles_data: Vec<Record> => update;
    /// Latitude of the tile center
    tile_lat, set_tile_lat: Accessor<f64> => update;
    /// Longitude of the tile center
    tile_lng, set_tile_lng: Accessor<f64> => update;
    tile_altitude, set_tile_altitude: Accessor<f64> => update;
    /// Longitudinal extent in degrees
    tile_width, set_tile_width: Accessor<f64> => update;
    /// Latitudinal extent in degrees
    tile_height, set_tile_height: Accessor<f64> => update;
    /// Size tiles in globe coordinates, or build them at the origin and
    /// rotate them into place
    tile_use_globe_projection, set_tile_use_globe_projection: Accessor<bool> => update;
    tile_material, set_tile_material: Accessor<SharedMaterial> => update;
    tile_curvature_resolution, set_tile_curvature_resolution: Accessor<f64> => update;
    tiles_transition_duration, set_tiles_transition_duration: f64 => deferred;
});

impl TilesLayer {
    pub fn new() -> Self {
        Self::default()
    }
}

fn shape_tile(scene: &mut Scene, node: NodeId, projected: bool, resolution: f64, s: &Snapshot) {
    let (lat, lng, alt) = (s.value("lat"), s.value("lng"), s.value("alt"));
    let (width, height) = (s.value("width"), s.value("height"));
    let rot_lng = lng.to_radians();
    let rot_lat = (-lat).to_radians();
    let (phi_offset, theta_offset) = if projected { (rot_lng, rot_lat) } else { (0.0, 0.0) };

    let geometry = sphere_sector(
        GLOBE_RADIUS * (1.0 + alt),
        (width / resolution).ceil() as u32,
        (height / resolution).ceil() as u32,
        (90.0 - width / 2.0).to_radians() + phi_offset,
        width.to_radians(),
        (90.0 - height / 2.0).to_radians() + theta_offset,
        height.to_radians(),
    );

    let Some(n) = scene.node_mut(node) else {
        return;
    };
    n.geometry = Some(Rc::new(geometry));
    // longitude first, then latitude
    n.transform.rotation = if projected {
        DQuat::IDENTITY
    } else {
        DQuat::from_euler(EulerRot::YXZ, rot_lng, rot_lat, 0.0)
    };
}

impl Layer for TilesLayer {
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

        let lat = self.tile_lat.resolve();
        let lng = self.tile_lng.resolve();
        let altitude = self.tile_altitude.resolve();
        let width = self.tile_width.resolve();
        let height = self.tile_height.resolve();
        let projected = self.tile_use_globe_projection.resolve();
        let material = self.tile_material.resolve();
        let resolution = self.tile_curvature_resolution.resolve();
        let duration = self.tiles_transition_duration;

        self.digest.run(
            scene,
            container,
            &self.tiles_data,
            BindKey::of,
            |scene, _| Some(scene.spawn(Node::mesh(None, Vec::new()).tagged(ObjectType::Tile))),
            |scene, node, d| {
                if let Some(n) = scene.node_mut(node) {
                    n.materials = vec![material(d)];
                }

                let target = Snapshot::new()
                    .with("lat", lat(d))
                    .with("lng", lng(d))
                    .with("alt", altitude(d))
                    .with("width", width(d))
                    .with("height", height(d));
                let initial = target.clone().with("width", 0.0).with("height", 0.0);
                let projected = projected(d);
                let resolution = resolution(d).max(0.1);
                let apply = move |scene: &mut Scene, node: NodeId, s: &Snapshot| {
                    shape_tile(scene, node, projected, resolution, s)
                };
                retarget(scene, transitions, node, target, initial, duration, false, apply);
            },
        )
    }
}
