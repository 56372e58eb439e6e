use anyhow::{Context, Result};
use geojson::{Feature, GeoJson, Value};
use globe_scene::accessor::{record, Record};
use globe_scene::error::GlobeError;
use globe_scene::mesh::OutlineFont;
use globe_scene::scene::{Texture, TextureCallback, TextureLoader};
use serde_json::{json, Map};
use std::fs;
use std::path::{Path, PathBuf};

/// Records for the demo layers.
#[derive(Default)]
pub struct WorldData {
    /// Country or land features, one record per feature
    pub polygons: Vec<Record>,
    /// Populated places with `name`, `lat`, `lng`, `population`, `capital`
    pub places: Vec<Record>,
}

impl WorldData {
    pub fn is_empty(&self) -> bool {
        self.polygons.is_empty() && self.places.is_empty()
    }
}

/// Load every known Natural Earth file present in `data_dir`, falling back
/// to a coarse built-in world when nothing could be read.
pub fn load_all(data_dir: &Path) -> WorldData {
    let mut world = WorldData::default();

    let polygon_files = ["ne_110m_admin_0_countries.json", "ne_110m_land.json"];
    for filename in polygon_files {
        let path = data_dir.join(filename);
        if !path.exists() {
            continue;
        }
        match load_polygons(&path) {
            Ok(polygons) => {
                log::info!("loaded {} polygons from {}", polygons.len(), filename);
                world.polygons = polygons;
                break;
            }
            Err(e) => log::warn!("failed to load {}: {:#}", filename, e),
        }
    }

    let places_path = data_dir.join("ne_10m_cities.json");
    if places_path.exists() {
        match load_places(&places_path) {
            Ok(places) => world.places = places,
            Err(e) => log::warn!("failed to load cities: {:#}", e),
        }
    }

    if world.is_empty() {
        log::info!("no data in {}, using the built-in world", data_dir.display());
        return simple_world();
    }
    world
}

fn read_geojson(path: &Path) -> Result<GeoJson> {
    let content = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    Ok(content.parse()?)
}

pub fn load_polygons(path: &Path) -> Result<Vec<Record>> {
    Ok(polygon_records(&read_geojson(path)?))
}

pub fn load_places(path: &Path) -> Result<Vec<Record>> {
    Ok(place_records(&read_geojson(path)?))
}

fn features(geojson: &GeoJson) -> Vec<&Feature> {
    match geojson {
        GeoJson::FeatureCollection(fc) => fc.features.iter().collect(),
        GeoJson::Feature(f) => vec![f],
        GeoJson::Geometry(_) => Vec::new(),
    }
}

/// Polygon and MultiPolygon features as records carrying `geometry` and the
/// feature's properties.
fn polygon_records(geojson: &GeoJson) -> Vec<Record> {
    features(geojson)
        .into_iter()
        .filter(|f| {
            matches!(
                f.geometry.as_ref().map(|g| &g.value),
                Some(Value::Polygon(_)) | Some(Value::MultiPolygon(_))
            )
        })
        .filter_map(|f| {
            let mut fields = f.properties.clone().unwrap_or_default();
            fields.insert("geometry".to_string(), serde_json::to_value(f.geometry.as_ref()?).ok()?);
            Some(record(serde_json::Value::Object(fields)))
        })
        .collect()
}

fn place_records(geojson: &GeoJson) -> Vec<Record> {
    features(geojson)
        .into_iter()
        .filter_map(|f| {
            let Some(Value::Point(coords)) = f.geometry.as_ref().map(|g| &g.value) else {
                return None;
            };
            if coords.len() < 2 {
                return None;
            }
            let props = f.properties.as_ref();
            let number = |keys: &[&str]| {
                props
                    .and_then(|p| keys.iter().find_map(|k| p.get(*k)))
                    .and_then(|v| v.as_f64())
            };

            let name = props
                .and_then(|p| p.get("name"))
                .and_then(|v| v.as_str())
                .unwrap_or("Unknown");
            let population = number(&["pop_max", "pop_min", "population"]).unwrap_or(0.0);
            let capital = number(&["adm0cap"]).is_some_and(|v| v >= 1.0);
            Some(place(name, coords[0], coords[1], population, capital))
        })
        .collect()
}

fn place(name: &str, lng: f64, lat: f64, population: f64, capital: bool) -> Record {
    record(json!({
        "name": name,
        "lat": lat,
        "lng": lng,
        "population": population,
        "capital": capital,
    }))
}

fn outline(name: &str, ring: &[(f64, f64)]) -> Record {
    let coords: Vec<[f64; 2]> = ring.iter().map(|&(lng, lat)| [lng, lat]).collect();
    let mut fields = Map::new();
    fields.insert("name".to_string(), json!(name));
    fields.insert(
        "geometry".to_string(),
        json!({ "type": "Polygon", "coordinates": [coords] }),
    );
    record(serde_json::Value::Object(fields))
}

/// Coarse continent outlines and major cities.
pub fn simple_world() -> WorldData {
    let polygons = vec![
        outline(
            "North America",
            &[
                (-168.0, 65.0), (-166.0, 60.0), (-141.0, 60.0), (-130.0, 55.0),
                (-125.0, 48.0), (-124.0, 40.0), (-117.0, 32.0), (-110.0, 25.0),
                (-97.0, 25.0), (-97.0, 28.0), (-82.0, 24.0), (-80.0, 25.0),
                (-81.0, 31.0), (-75.0, 35.0), (-70.0, 41.0), (-67.0, 45.0),
                (-65.0, 47.0), (-55.0, 47.0), (-52.0, 47.0), (-55.0, 52.0),
                (-58.0, 55.0), (-64.0, 60.0), (-73.0, 62.0), (-80.0, 63.0),
                (-95.0, 62.0), (-110.0, 68.0), (-130.0, 70.0), (-145.0, 70.0),
                (-168.0, 65.0),
            ],
        ),
        outline(
            "South America",
            &[
                (-80.0, 10.0), (-75.0, 5.0), (-70.0, 5.0), (-60.0, 5.0),
                (-50.0, 0.0), (-35.0, -5.0), (-35.0, -10.0), (-38.0, -15.0),
                (-40.0, -22.0), (-48.0, -25.0), (-55.0, -34.0), (-58.0, -38.0),
                (-65.0, -42.0), (-68.0, -50.0), (-75.0, -52.0), (-75.0, -45.0),
                (-72.0, -40.0), (-72.0, -30.0), (-70.0, -20.0), (-70.0, -15.0),
                (-80.0, -5.0), (-80.0, 0.0), (-80.0, 10.0),
            ],
        ),
        outline(
            "Europe",
            &[
                (-10.0, 36.0), (-5.0, 36.0), (0.0, 38.0), (5.0, 43.0),
                (10.0, 44.0), (15.0, 45.0), (20.0, 40.0), (25.0, 37.0),
                (30.0, 40.0), (35.0, 42.0), (40.0, 43.0), (40.0, 55.0),
                (30.0, 60.0), (25.0, 65.0), (20.0, 70.0), (10.0, 71.0),
                (5.0, 62.0), (5.0, 58.0), (-5.0, 58.0), (-10.0, 52.0),
                (-5.0, 48.0), (-5.0, 43.0), (-10.0, 36.0),
            ],
        ),
        outline(
            "Africa",
            &[
                (-17.0, 15.0), (-17.0, 20.0), (-15.0, 28.0), (-5.0, 35.0),
                (10.0, 37.0), (20.0, 33.0), (25.0, 32.0), (35.0, 30.0),
                (35.0, 20.0), (42.0, 12.0), (50.0, 12.0), (45.0, 5.0),
                (35.0, -5.0), (35.0, -20.0), (35.0, -25.0), (30.0, -30.0),
                (20.0, -35.0), (18.0, -35.0), (15.0, -30.0), (10.0, -15.0),
                (10.0, 0.0), (5.0, 5.0), (-5.0, 5.0), (-10.0, 10.0),
                (-17.0, 15.0),
            ],
        ),
        outline(
            "Asia",
            &[
                (40.0, 43.0), (50.0, 40.0), (55.0, 37.0),
                (60.0, 25.0), (65.0, 25.0), (70.0, 20.0), (75.0, 15.0),
                (80.0, 8.0), (80.0, 15.0), (88.0, 22.0), (92.0, 22.0),
                (95.0, 16.0), (100.0, 14.0), (105.0, 10.0), (110.0, 20.0),
                (115.0, 22.0), (120.0, 22.0), (122.0, 25.0), (125.0, 30.0),
                (130.0, 35.0), (135.0, 35.0), (140.0, 40.0), (145.0, 45.0),
                (145.0, 50.0), (140.0, 55.0), (135.0, 55.0), (130.0, 52.0),
                (130.0, 43.0), (120.0, 40.0), (110.0, 45.0), (90.0, 50.0),
                (70.0, 55.0), (60.0, 55.0), (50.0, 50.0), (40.0, 43.0),
            ],
        ),
        outline(
            "Australia",
            &[
                (115.0, -20.0), (120.0, -18.0), (130.0, -12.0), (140.0, -12.0),
                (145.0, -15.0), (150.0, -25.0), (153.0, -30.0), (150.0, -35.0),
                (145.0, -38.0), (140.0, -38.0), (135.0, -35.0), (130.0, -32.0),
                (125.0, -32.0), (115.0, -35.0), (115.0, -25.0), (115.0, -20.0),
            ],
        ),
    ];

    let places = vec![
        place("New York", -74.0, 40.7, 18_800_000.0, false),
        place("London", -0.1, 51.5, 9_000_000.0, true),
        place("Paris", 2.3, 48.9, 11_000_000.0, true),
        place("Tokyo", 139.7, 35.7, 37_400_000.0, true),
        place("Sydney", 151.2, -33.9, 5_300_000.0, false),
        place("Rio", -43.2, -22.9, 13_500_000.0, false),
        place("Moscow", 37.6, 55.8, 12_500_000.0, true),
        place("Beijing", 116.4, 39.9, 21_500_000.0, true),
        place("Delhi", 77.2, 28.6, 32_900_000.0, true),
        place("Los Angeles", -118.2, 34.0, 12_400_000.0, false),
        place("Mexico City", -99.1, 19.4, 21_800_000.0, true),
        place("Buenos Aires", -58.4, -34.6, 15_000_000.0, true),
    ];

    WorldData { polygons, places }
}

/// Font file the demo labels are shaped with, when present in the data dir
pub const FONT_FILE: &str = "font.ttf";

pub fn load_font(path: &Path) -> Result<OutlineFont> {
    let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    Ok(OutlineFont::from_bytes(bytes)?)
}

/// Texture loader reading image files relative to a directory.
///
/// Loads complete synchronously; only the file size is kept.
pub struct FileTextureLoader {
    root: PathBuf,
}

impl FileTextureLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl TextureLoader for FileTextureLoader {
    fn load(&self, url: &str, on_load: TextureCallback) {
        let path = self.root.join(url);
        on_load(
            fs::read(&path)
                .map(|bytes| Texture { source: url.to_string(), byte_len: bytes.len() })
                .map_err(|e| GlobeError::TextureLoad {
                    url: url.to_string(),
                    reason: e.to_string(),
                }),
        );
    }
}
