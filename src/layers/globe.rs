use std::cell::RefCell;
use std::f64::consts::FRAC_PI_2;
use std::rc::{Rc, Weak};

use glam::DQuat;

use super::{layer_options, Layer};
use crate::animation::Transitions;
use crate::color::{color_and_alpha, Color};
use crate::digest::DigestReport;
use crate::error::GlobeError;
use crate::geo::GLOBE_RADIUS;
use crate::mesh::{graticule, sphere};
use crate::scene::{
    Material, Node, NodeId, ObjectType, Scene, SharedMaterial, Texture, TextureLoader,
};

const SPHERE_SEGMENTS: u32 = 75;
const GRATICULE_RESOLUTION: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Surface,
    Bump,
}

struct Delivery {
    slot: Slot,
    generation: u64,
    result: Result<Texture, GlobeError>,
}

type Inbox = Rc<RefCell<Vec<Delivery>>>;

/// The globe sphere with its atmosphere and graticules.
pub struct GlobeLayer {
    globe_image_url: Option<String>,
    bump_image_url: Option<String>,
    show_globe: bool,
    show_atmosphere: bool,
    show_graticules: bool,
    atmosphere_color: String,
    atmosphere_altitude: f64,

    loader: Rc<dyn TextureLoader>,
    inbox: Inbox,
    /// Url each slot was last requested for, and the request generation
    requested: [(Option<String>, u64); 2],
    material: SharedMaterial,
    globe: Option<NodeId>,
    atmosphere: Option<NodeId>,
    graticules: Option<NodeId>,
    ready: bool,
    ready_pending: bool,
    dirty: bool,
}

layer_options!(GlobeLayer {
    /// Surface imagery; the globe is black without one
    globe_image_url, set_globe_image_url: Option<String> => update;
    bump_image_url, set_bump_image_url: Option<String> => update;
    show_globe, set_show_globe: bool => update;
    show_atmosphere, set_show_atmosphere: bool => update;
    show_graticules, set_show_graticules: bool => update;
    atmosphere_color, set_atmosphere_color: String => update;
    /// Atmosphere thickness in globe radii
    atmosphere_altitude, set_atmosphere_altitude: f64 => update;
});

impl GlobeLayer {
    pub fn new(loader: Rc<dyn TextureLoader>) -> Self {
        let mut material = Material::phong();
        material.color = Some(Color::BLACK);
        material.transparent = true;

        Self {
            globe_image_url: None,
            bump_image_url: None,
            show_globe: true,
            show_atmosphere: true,
            show_graticules: false,
            atmosphere_color: "lightskyblue".to_string(),
            atmosphere_altitude: 0.15,
            loader,
            inbox: Rc::new(RefCell::new(Vec::new())),
            requested: [(None, 0), (None, 0)],
            material: material.into_shared(),
            globe: None,
            atmosphere: None,
            graticules: None,
            ready: false,
            ready_pending: false,
            dirty: true,
        }
    }

    /// Material of the globe sphere, shared with the scene.
    pub fn globe_material(&self) -> SharedMaterial {
        Rc::clone(&self.material)
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// True once, on the first call after the globe became ready.
    pub fn take_ready(&mut self) -> bool {
        std::mem::take(&mut self.ready_pending)
    }

    fn mark_ready(&mut self) {
        if !self.ready {
            log::info!("globe ready");
            self.ready = true;
            self.ready_pending = true;
        }
    }

    /// Request `url` for `slot` unless it is already the requested one.
    fn request(&mut self, slot: Slot, url: Option<String>) {
        let entry = &mut self.requested[slot as usize];
        if entry.0 == url {
            return;
        }
        entry.0 = url.clone();
        entry.1 += 1;
        let generation = entry.1;

        let Some(url) = url else {
            let mut material = self.material.borrow_mut();
            match slot {
                Slot::Surface => {
                    material.map = None;
                    material.color = Some(Color::BLACK);
                }
                Slot::Bump => material.bump_map = None,
            }
            material.version += 1;
            return;
        };

        let inbox: Weak<RefCell<Vec<Delivery>>> = Rc::downgrade(&self.inbox);
        self.loader.load(
            &url,
            Box::new(move |result| match inbox.upgrade() {
                Some(inbox) => inbox.borrow_mut().push(Delivery { slot, generation, result }),
                None => log::debug!("texture arrived after its globe was dropped"),
            }),
        );
    }

    /// Apply textures delivered since the last call.
    pub fn poll(&mut self) {
        let deliveries = std::mem::take(&mut *self.inbox.borrow_mut());
        for delivery in deliveries {
            let (url, generation) = &self.requested[delivery.slot as usize];
            if delivery.generation != *generation {
                log::debug!("discarding stale {:?} texture", delivery.slot);
                continue;
            }

            let texture = match delivery.result {
                Ok(texture) => Rc::new(texture),
                Err(e) => {
                    log::warn!("{e}");
                    continue;
                }
            };
            let url = url.as_deref().unwrap_or_default();
            log::debug!("{:?} texture {} loaded", delivery.slot, url);

            {
                let mut material = self.material.borrow_mut();
                match delivery.slot {
                    Slot::Surface => {
                        material.map = Some(texture);
                        material.color = None;
                    }
                    Slot::Bump => material.bump_map = Some(texture),
                }
                material.version += 1;
            }
            if delivery.slot == Slot::Surface {
                self.mark_ready();
            }
        }
    }

    fn sync_decorations(&mut self, scene: &mut Scene) {
        if let Some(n) = self.globe.and_then(|id| scene.node_mut(id)) {
            n.visible = self.show_globe;
        }
        if let Some(n) = self.graticules.and_then(|id| scene.node_mut(id)) {
            n.visible = self.show_graticules;
        }

        let Some(n) = self.atmosphere.and_then(|id| scene.node_mut(id)) else {
            return;
        };
        n.visible = self.show_atmosphere;
        let radius = GLOBE_RADIUS * (1.0 + self.atmosphere_altitude);
        let current = n
            .geometry
            .as_ref()
            .and_then(|g| g.positions.first())
            .map(|p| p.length() as f64);
        if current.map_or(true, |r| (r - radius).abs() > 1e-3) {
            n.geometry = Some(Rc::new(sphere(radius, SPHERE_SEGMENTS, SPHERE_SEGMENTS)));
        }
        if let Some(material) = n.material(0) {
            let (color, alpha) = color_and_alpha(&self.atmosphere_color);
            let mut material = material.borrow_mut();
            if material.color != Some(color) || material.opacity != alpha {
                material.set_color(color, alpha);
                material.transparent = true;
            }
        }
    }
}

impl Layer for GlobeLayer {
    fn init(&mut self, scene: &mut Scene, container: NodeId) {
        scene.clear(container);

        let mut globe = Node::mesh(
            Some(Rc::new(sphere(GLOBE_RADIUS, SPHERE_SEGMENTS, SPHERE_SEGMENTS))),
            vec![Rc::clone(&self.material)],
        )
        .tagged(ObjectType::Globe);
        // prime meridian along +Z
        globe.transform.rotation = DQuat::from_rotation_y(-FRAC_PI_2);

        let atmosphere =
            Node::mesh(None, vec![Material::glow().into_shared()]).tagged(ObjectType::Atmosphere);

        let mut lines = Material::line();
        let (grey, _) = color_and_alpha("lightgrey");
        lines.set_color(grey, 0.1);
        let graticules = Node::line(
            Some(Rc::new(graticule(GLOBE_RADIUS, GRATICULE_RESOLUTION))),
            lines.into_shared(),
        )
        .tagged(ObjectType::Graticules);

        for (slot, node) in [
            (&mut self.globe, globe),
            (&mut self.atmosphere, atmosphere),
            (&mut self.graticules, graticules),
        ] {
            let id = scene.spawn(node);
            scene.add(container, id);
            *slot = Some(id);
        }

        self.requested = [(None, self.requested[0].1), (None, self.requested[1].1)];
        self.ready = false;
        self.ready_pending = false;
        self.dirty = true;
    }

    fn needs_update(&self) -> bool {
        self.dirty
    }

    fn update(&mut self, scene: &mut Scene, _transitions: &mut Transitions) -> DigestReport {
        self.dirty = false;
        self.sync_decorations(scene);

        self.request(Slot::Surface, self.globe_image_url.clone());
        self.request(Slot::Bump, self.bump_image_url.clone());
        self.poll();

        if self.globe_image_url.is_none() {
            self.mark_ready();
        }
        DigestReport::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::TextureCallback;

    /// Loader holding requests until the test completes them.
    #[derive(Default)]
    struct ManualLoader {
        pending: RefCell<Vec<(String, TextureCallback)>>,
    }

    impl ManualLoader {
        fn complete(&self, url: &str, ok: bool) {
            let mut pending = self.pending.borrow_mut();
            let Some(i) = pending.iter().position(|(u, _)| u == url) else {
                return;
            };
            let (url, callback) = pending.remove(i);
            drop(pending);
            callback(if ok {
                Ok(Texture { source: url, byte_len: 4 })
            } else {
                Err(GlobeError::TextureLoad { url, reason: "404".into() })
            });
        }
    }

    impl TextureLoader for ManualLoader {
        fn load(&self, url: &str, on_load: TextureCallback) {
            self.pending.borrow_mut().push((url.to_string(), on_load));
        }
    }

    fn setup() -> (Scene, NodeId, Transitions, Rc<ManualLoader>, GlobeLayer) {
        let mut scene = Scene::new();
        let container = scene.spawn(Node::group());
        scene.add(scene.root(), container);
        let loader = Rc::new(ManualLoader::default());
        let mut layer = GlobeLayer::new(loader.clone());
        layer.init(&mut scene, container);
        (scene, container, Transitions::new(), loader, layer)
    }

    #[test]
    fn test_builds_sphere_atmosphere_graticules() {
        let (mut scene, container, mut tr, _, mut layer) = setup();
        layer.update(&mut scene, &mut tr);

        let globe = scene.find_by_type(container, ObjectType::Globe);
        let atmosphere = scene.find_by_type(container, ObjectType::Atmosphere);
        let graticules = scene.find_by_type(container, ObjectType::Graticules);
        assert_eq!((globe.len(), atmosphere.len(), graticules.len()), (1, 1, 1));

        assert!(scene.node(atmosphere[0]).unwrap().visible);
        assert!(!scene.node(graticules[0]).unwrap().visible);
        let shell = scene.node(atmosphere[0]).unwrap().geometry.clone().unwrap();
        assert!((shell.positions[0].length() - 115.0).abs() < 1e-3);
        let m = layer.globe_material();
        assert_eq!(m.borrow().color, Some(Color::BLACK));
    }

    #[test]
    fn test_ready_without_image() {
        let (mut scene, _, mut tr, _, mut layer) = setup();
        assert!(!layer.is_ready());
        layer.update(&mut scene, &mut tr);
        assert!(layer.take_ready());
        assert!(!layer.take_ready());
    }

    #[test]
    fn test_ready_after_surface_texture() {
        let (mut scene, _, mut tr, loader, mut layer) = setup();
        layer.set_globe_image_url(Some("earth.jpg".to_string()));
        layer.update(&mut scene, &mut tr);
        assert!(!layer.is_ready());

        loader.complete("earth.jpg", true);
        layer.poll();
        assert!(layer.take_ready());
        let m = layer.globe_material();
        let m = m.borrow();
        assert_eq!(m.map.as_ref().map(|t| t.source.as_str()), Some("earth.jpg"));
        assert_eq!(m.color, None);
    }

    #[test]
    fn test_failed_load_is_not_ready() {
        let (mut scene, _, mut tr, loader, mut layer) = setup();
        layer.set_globe_image_url(Some("missing.jpg".to_string()));
        layer.update(&mut scene, &mut tr);
        loader.complete("missing.jpg", false);
        layer.poll();
        assert!(!layer.is_ready());
        assert!(layer.globe_material().borrow().map.is_none());
    }

    #[test]
    fn test_stale_texture_ignored() {
        let (mut scene, _, mut tr, loader, mut layer) = setup();
        layer.set_globe_image_url(Some("old.jpg".to_string()));
        layer.update(&mut scene, &mut tr);
        layer.set_globe_image_url(Some("new.jpg".to_string()));
        layer.update(&mut scene, &mut tr);

        loader.complete("old.jpg", true);
        layer.poll();
        assert!(!layer.is_ready());
        assert!(layer.globe_material().borrow().map.is_none());

        loader.complete("new.jpg", true);
        layer.poll();
        let source = layer.globe_material().borrow().map.as_ref().map(|t| t.source.clone());
        assert_eq!(source.as_deref(), Some("new.jpg"));
    }

    #[test]
    fn test_delivery_after_drop_is_ignored() {
        let (mut scene, _, mut tr, loader, mut layer) = setup();
        layer.set_bump_image_url(Some("bump.png".to_string()));
        layer.update(&mut scene, &mut tr);
        drop(layer);
        loader.complete("bump.png", true);
        assert!(loader.pending.borrow().is_empty());
    }

    #[test]
    fn test_bump_map_and_toggles() {
        let (mut scene, container, mut tr, loader, mut layer) = setup();
        layer
            .set_bump_image_url(Some("bump.png".to_string()))
            .set_show_graticules(true)
            .set_show_atmosphere(false)
            .set_atmosphere_altitude(0.25);
        layer.update(&mut scene, &mut tr);
        loader.complete("bump.png", true);
        layer.poll();
        assert!(layer.globe_material().borrow().bump_map.is_some());

        let graticules = scene.find_by_type(container, ObjectType::Graticules)[0];
        let atmosphere = scene.find_by_type(container, ObjectType::Atmosphere)[0];
        assert!(scene.node(graticules).unwrap().visible);
        let shell = scene.node(atmosphere).unwrap();
        assert!(!shell.visible);
        let radius = shell.geometry.as_ref().unwrap().positions[0].length();
        assert!((radius - 125.0).abs() < 1e-3);

        layer.set_bump_image_url(None);
        layer.update(&mut scene, &mut tr);
        assert!(layer.globe_material().borrow().bump_map.is_none());
    }

    #[test]
    fn test_atmosphere_alpha_change_applies() {
        let (mut scene, container, mut tr, _, mut layer) = setup();
        layer.update(&mut scene, &mut tr);
        let atmosphere = scene.find_by_type(container, ObjectType::Atmosphere)[0];
        let material = scene.node(atmosphere).unwrap().material(0).unwrap().clone();
        assert_eq!(material.borrow().opacity, 1.0);

        layer.set_atmosphere_color("rgba(135, 206, 250, 0.3)");
        layer.update(&mut scene, &mut tr);
        let m = material.borrow();
        assert!((m.opacity - 0.3).abs() < 1e-6);
        assert_eq!(m.color.map(|c| c.to_hex()), Some(0x87cefa));
        assert!(m.transparent);
    }
}
