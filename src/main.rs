mod data;

use anyhow::Result;
use data::{FileTextureLoader, WorldData};
use globe_scene::accessor::{Accessor, Datum};
use globe_scene::scene::{ObjectType, Scene};
use globe_scene::{DigestReport, Globe, GlobeOptions};
use std::path::PathBuf;
use std::rc::Rc;
use std::thread;
use std::time::{Duration, Instant};

const FRAME: Duration = Duration::from_millis(16);
const RUN_FOR: Duration = Duration::from_secs(4);
/// Time at which the demo swaps in new targets, in milliseconds
const RETARGET_AT_MS: f64 = 1500.0;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let data_dir = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("data"));
    let world = data::load_all(&data_dir);

    let mut scene = Scene::new();
    let loader = Rc::new(FileTextureLoader::new(&data_dir));
    let mut globe = Globe::new(GlobeOptions::default(), loader);
    let container = scene.root();
    globe.attach(&mut scene, container);
    globe.on_globe_ready(|| log::info!("globe revealed"));

    if data_dir.join("earth.jpg").exists() {
        globe.set_globe_image_url(Some("earth.jpg".to_string()));
    }
    let font_path = data_dir.join(data::FONT_FILE);
    if font_path.exists() {
        match data::load_font(&font_path) {
            Ok(font) => {
                globe.set_label_type_face(font);
            }
            Err(e) => log::warn!("failed to load {}: {:#}, using block glyphs", data::FONT_FILE, e),
        }
    }
    configure(&mut globe, &world);

    run(&mut scene, &mut globe, &world);
    log_stats(&scene, &globe);
    Ok(())
}

fn configure(globe: &mut Globe, world: &WorldData) {
    globe
        .set_show_graticules(true)
        .set_polygons_data(world.polygons.clone())
        .set_polygon_cap_color(Accessor::constant("rgba(200, 120, 60, 0.7)".to_string()))
        .set_polygon_side_color(Accessor::constant("rgba(0, 100, 0, 0.15)".to_string()))
        .set_polygon_stroke_color(Accessor::constant(Some("#111".to_string())))
        .set_points_data(world.places.clone())
        .set_point_altitude(Accessor::func(|d: &Datum| population(d) / 4e8))
        .set_point_color(Accessor::func(|d: &Datum| {
            if d["capital"].as_bool().unwrap_or(false) { "orange" } else { "white" }.to_string()
        }))
        .set_labels_data(world.places.clone())
        .set_label_text("name")
        .set_label_size(Accessor::constant(1.5))
        .set_label_dot_radius(Accessor::constant(0.4));
}

/// Swap in new targets mid-run: raise the polygons, grow the markers and
/// drop the labels of non-capitals.
fn retarget(globe: &mut Globe, world: &WorldData) {
    let capitals = world
        .places
        .iter()
        .filter(|p| p["capital"].as_bool().unwrap_or(false))
        .cloned()
        .collect::<Vec<_>>();

    globe
        .set_polygon_altitude(Accessor::constant(0.06))
        .set_point_altitude(Accessor::func(|d: &Datum| population(d) / 1e8))
        .set_labels_data(capitals);
}

fn population(d: &Datum) -> f64 {
    d["population"].as_f64().unwrap_or(0.0)
}

fn run(scene: &mut Scene, globe: &mut Globe, world: &WorldData) {
    let start = Instant::now();
    let mut retargeted = false;

    while start.elapsed() < RUN_FOR {
        let now = start.elapsed().as_secs_f64() * 1000.0;
        if !retargeted && now >= RETARGET_AT_MS {
            retarget(globe, world);
            retargeted = true;
        }

        let report = globe.tick(scene, now);
        if report != DigestReport::default() {
            log::info!(
                "update pass: {} created, {} updated, {} removed, {} skipped",
                report.created,
                report.updated,
                report.removed,
                report.skipped
            );
        }

        thread::sleep(FRAME);
    }
}

fn log_stats(scene: &Scene, globe: &Globe) {
    let Some(root) = globe.scene_root() else {
        return;
    };

    let kinds = [
        ObjectType::Globe,
        ObjectType::Atmosphere,
        ObjectType::Graticules,
        ObjectType::Point,
        ObjectType::Points,
        ObjectType::Polygon,
        ObjectType::Tile,
        ObjectType::Label,
        ObjectType::Custom,
    ];
    for kind in kinds {
        let count = scene.find_by_type(root, kind).len();
        if count > 0 {
            log::info!("{:?}: {}", kind, count);
        }
    }
    log::info!(
        "{} nodes, {} frames, {} transitions still running",
        scene.len(),
        globe.scheduler().frames(),
        globe.scheduler().transitions.active_count()
    );
}
