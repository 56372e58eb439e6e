//! The globe: six layers under one root group, a reveal animation and the
//! frame loop driving them.

use std::f64::consts::TAU;
use std::rc::Rc;

use geojson::Geometry as GeoJsonGeometry;
use glam::{DQuat, DVec3};

use crate::accessor::{Accessor, Record};
use crate::animation::{Channel, Easing, Scheduler, Snapshot, TransitionKey};
use crate::digest::DigestReport;
use crate::geo::{to_cartesian, to_geographic, GeoCoords};
use crate::layers::{
    CustomLayer, DotOrientation, GlobeLayer, Layer, LabelsLayer, ObjectFactory, ObjectUpdate,
    PointsLayer, PolygonsLayer, TilesLayer,
};
use crate::mesh::FontShaper;
use crate::scene::{Node, NodeId, Scene, SharedMaterial, TextureLoader};

const REVEAL_SCALE_MS: f64 = 600.0;
const REVEAL_SPIN_MS: f64 = 1200.0;
const HIDDEN_SCALE: f64 = 1e-6;

/// Startup behavior of a [`Globe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlobeOptions {
    /// Grow and spin the globe into view
    pub animate_in: bool,
    /// Keep the globe hidden until its surface texture arrived
    pub wait_for_globe_ready: bool,
}

impl Default for GlobeOptions {
    fn default() -> Self {
        Self {
            animate_in: true,
            wait_for_globe_ready: true,
        }
    }
}

pub struct Globe {
    options: GlobeOptions,
    scheduler: Scheduler,
    root: Option<NodeId>,
    revealed: bool,
    /// Reveal on the next tick without waiting for the globe layer
    reveal_pending: bool,
    on_globe_ready: Option<Box<dyn FnMut()>>,

    globe: GlobeLayer,
    points: PointsLayer,
    polygons: PolygonsLayer,
    tiles: TilesLayer,
    labels: LabelsLayer,
    custom: CustomLayer,
}

impl Globe {
    pub fn new(options: GlobeOptions, loader: Rc<dyn TextureLoader>) -> Self {
        Self {
            options,
            scheduler: Scheduler::new(),
            root: None,
            revealed: false,
            reveal_pending: false,
            on_globe_ready: None,
            globe: GlobeLayer::new(loader),
            points: PointsLayer::new(),
            polygons: PolygonsLayer::new(),
            tiles: TilesLayer::new(),
            labels: LabelsLayer::new(),
            custom: CustomLayer::new(),
        }
    }

    fn layers_mut(&mut self) -> [&mut dyn Layer; 6] {
        [
            &mut self.globe,
            &mut self.points,
            &mut self.polygons,
            &mut self.tiles,
            &mut self.labels,
            &mut self.custom,
        ]
    }

    /// Build the globe inside `container`, replacing its contents, and start
    /// the frame loop. The root stays hidden until a [`tick`](Self::tick)
    /// reveals it.
    pub fn attach(&mut self, scene: &mut Scene, container: NodeId) {
        scene.clear(container);

        let mut root = Node::group();
        root.visible = false;
        let root = scene.spawn(root);
        scene.add(container, root);
        self.root = Some(root);
        self.revealed = false;

        for layer in self.layers_mut() {
            let group = scene.spawn(Node::group());
            scene.add(root, group);
            layer.init(scene, group);
        }

        self.scheduler.start();
        self.reveal_pending = !self.options.wait_for_globe_ready;
    }

    /// Root group holding every layer, once attached.
    pub fn scene_root(&self) -> Option<NodeId> {
        self.root
    }

    /// Run the update pass of every layer with pending changes.
    pub fn flush(&mut self, scene: &mut Scene) -> DigestReport {
        let Self { scheduler, globe, points, polygons, tiles, labels, custom, .. } = self;
        let layers: [&mut dyn Layer; 6] = [globe, points, polygons, tiles, labels, custom];

        let mut report = DigestReport::default();
        for layer in layers {
            if layer.needs_update() {
                report += layer.update(scene, &mut scheduler.transitions);
            }
        }
        report
    }

    /// Advance one frame at `now_ms`.
    ///
    /// Pending option changes are applied first, so transitions they start
    /// begin at `now_ms`.
    pub fn tick(&mut self, scene: &mut Scene, now_ms: f64) -> DigestReport {
        self.scheduler.transitions.set_clock(now_ms);
        let report = self.flush(scene);

        self.globe.poll();
        let ready = self.globe.take_ready();
        if (ready || self.reveal_pending) && !self.revealed {
            self.reveal(scene);
        }

        self.scheduler.frame(scene, now_ms);
        report
    }

    fn reveal(&mut self, scene: &mut Scene) {
        self.revealed = true;
        self.reveal_pending = false;
        let Some(root) = self.root else {
            return;
        };
        if let Some(n) = scene.node_mut(root) {
            n.visible = true;
        }

        if self.options.animate_in {
            if let Some(n) = scene.node_mut(root) {
                n.transform.set_uniform_scale(HIDDEN_SCALE);
                n.transform.rotation = DQuat::from_rotation_y(TAU);
            }
            let transitions = &mut self.scheduler.transitions;
            transitions.animate(
                scene,
                TransitionKey { node: root, channel: Channel::RevealScale },
                Snapshot::new().with("scale", HIDDEN_SCALE),
                Snapshot::new().with("scale", 1.0),
                REVEAL_SCALE_MS,
                Easing::QuadraticOut,
                Box::new(|scene: &mut Scene, node: NodeId, s: &Snapshot| {
                    if let Some(n) = scene.node_mut(node) {
                        n.transform.set_uniform_scale(s.value("scale"));
                    }
                }),
            );
            transitions.animate(
                scene,
                TransitionKey { node: root, channel: Channel::RevealSpin },
                Snapshot::new().with("angle", TAU),
                Snapshot::new().with("angle", 0.0),
                REVEAL_SPIN_MS,
                Easing::QuinticOut,
                Box::new(|scene: &mut Scene, node: NodeId, s: &Snapshot| {
                    if let Some(n) = scene.node_mut(node) {
                        n.transform.rotation = DQuat::from_rotation_y(s.value("angle"));
                    }
                }),
            );
        }

        if let Some(callback) = self.on_globe_ready.as_mut() {
            callback();
        }
    }

    /// Called once, when the globe is revealed.
    pub fn on_globe_ready(&mut self, callback: impl FnMut() + 'static) -> &mut Self {
        self.on_globe_ready = Some(Box::new(callback));
        self
    }

    pub fn is_revealed(&self) -> bool {
        self.revealed
    }

    pub fn pause_animation(&mut self) -> &mut Self {
        self.scheduler.stop();
        self
    }

    pub fn resume_animation(&mut self) -> &mut Self {
        self.scheduler.start();
        self
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn globe_material(&self) -> SharedMaterial {
        self.globe.globe_material()
    }

    /// Position of (lat, lng, altitude) in the globe frame.
    pub fn get_coords(&self, lat: f64, lng: f64, altitude: f64) -> DVec3 {
        to_cartesian(lat, lng, altitude)
    }

    pub fn to_geo_coords(&self, point: DVec3) -> GeoCoords {
        to_geographic(point)
    }
}

/// Root-level getter and setter for each layer option.
macro_rules! forward_options {
    ($( $layer:ident { $( $name:ident, $setter:ident: $ty:ty; )* } )*) => {
        impl Globe {
            $($(
                pub fn $name(&self) -> &$ty {
                    self.$layer.$name()
                }

                pub fn $setter(&mut self, value: impl Into<$ty>) -> &mut Self {
                    self.$layer.$setter(value);
                    self
                }
            )*)*
        }
    };
}

forward_options! {
    globe {
        globe_image_url, set_globe_image_url: Option<String>;
        bump_image_url, set_bump_image_url: Option<String>;
        show_globe, set_show_globe: bool;
        show_atmosphere, set_show_atmosphere: bool;
        show_graticules, set_show_graticules: bool;
        atmosphere_color, set_atmosphere_color: String;
        atmosphere_altitude, set_atmosphere_altitude: f64;
    }
    points {
        points_data, set_points_data: Vec<Record>;
        point_lat, set_point_lat: Accessor<f64>;
        point_lng, set_point_lng: Accessor<f64>;
        point_color, set_point_color: Accessor<String>;
        point_altitude, set_point_altitude: Accessor<f64>;
        point_radius, set_point_radius: Accessor<f64>;
        point_resolution, set_point_resolution: u32;
        points_merge, set_points_merge: bool;
        points_transition_duration, set_points_transition_duration: f64;
    }
    polygons {
        polygons_data, set_polygons_data: Vec<Record>;
        polygon_geojson_geometry, set_polygon_geojson_geometry: Accessor<Option<GeoJsonGeometry>>;
        polygon_id, set_polygon_id: Accessor<Option<String>>;
        polygon_cap_color, set_polygon_cap_color: Accessor<String>;
        polygon_side_color, set_polygon_side_color: Accessor<String>;
        polygon_stroke_color, set_polygon_stroke_color: Accessor<Option<String>>;
        polygon_altitude, set_polygon_altitude: Accessor<f64>;
        polygon_cap_curvature_resolution, set_polygon_cap_curvature_resolution: Accessor<f64>;
        polygons_transition_duration, set_polygons_transition_duration: f64;
    }
    tiles {
        tiles_data, set_tiles_data: Vec<Record>;
        tile_lat, set_tile_lat: Accessor<f64>;
        tile_lng, set_tile_lng: Accessor<f64>;
        tile_altitude, set_tile_altitude: Accessor<f64>;
        tile_width, set_tile_width: Accessor<f64>;
        tile_height, set_tile_height: Accessor<f64>;
        tile_use_globe_projection, set_tile_use_globe_projection: Accessor<bool>;
        tile_material, set_tile_material: Accessor<SharedMaterial>;
        tile_curvature_resolution, set_tile_curvature_resolution: Accessor<f64>;
        tiles_transition_duration, set_tiles_transition_duration: f64;
    }
    labels {
        labels_data, set_labels_data: Vec<Record>;
        label_lat, set_label_lat: Accessor<f64>;
        label_lng, set_label_lng: Accessor<f64>;
        label_altitude, set_label_altitude: Accessor<f64>;
        label_text, set_label_text: Accessor<String>;
        label_size, set_label_size: Accessor<f64>;
        label_type_face, set_label_type_face: Rc<dyn FontShaper>;
        label_color, set_label_color: Accessor<String>;
        label_rotation, set_label_rotation: Accessor<f64>;
        label_resolution, set_label_resolution: u32;
        label_include_dot, set_label_include_dot: Accessor<bool>;
        label_dot_radius, set_label_dot_radius: Accessor<f64>;
        label_dot_orientation, set_label_dot_orientation: Accessor<DotOrientation>;
        labels_transition_duration, set_labels_transition_duration: f64;
    }
    custom {
        custom_layer_data, set_custom_layer_data: Vec<Record>;
        custom_object, set_custom_object: Option<ObjectFactory>;
        custom_object_update, set_custom_object_update: Option<ObjectUpdate>;
    }
}
