use glam::{DVec3, Vec3};

use super::{drop_closing_duplicate, Ring};
use crate::geo::{to_cartesian, to_geographic};
use crate::scene::{Geometry, Topology};

/// Walk the great circle from `(lng0, lat0)` to `(lng1, lat1)` in steps of at
/// most `max_step` degrees, calling `visitor(lng, lat)` for each point after
/// the start. The end point is always visited last.
pub fn walk_great_circle(
    lng0: f64, lat0: f64,
    lng1: f64, lat1: f64,
    max_step: f64,
    mut visitor: impl FnMut(f64, f64),
) {
    let a = to_cartesian(lat0, lng0, 0.0).normalize();
    let b = to_cartesian(lat1, lng1, 0.0).normalize();

    let angle = a.dot(b).clamp(-1.0, 1.0).acos();
    let steps = ((angle.to_degrees() / max_step.max(0.1)).ceil() as usize).max(1);

    let sin_angle = angle.sin();
    if steps == 1 || sin_angle.abs() < 1e-10 {
        // short, identical or antipodal
        visitor(lng1, lat1);
        return;
    }

    for i in 1..steps {
        let t = i as f64 / steps as f64;
        let p: DVec3 =
            a * (((1.0 - t) * angle).sin() / sin_angle) + b * ((t * angle).sin() / sin_angle);
        let geo = to_geographic(p);
        visitor(geo.lng, geo.lat);
    }
    visitor(lng1, lat1);
}

/// Closed ring densified so no edge spans more than `max_step` degrees.
pub(crate) fn densify_ring(ring: &[[f64; 2]], max_step: f64) -> Ring {
    let mut ring = ring.to_vec();
    drop_closing_duplicate(&mut ring);

    let mut out = Vec::with_capacity(ring.len());
    for (i, &[lng0, lat0]) in ring.iter().enumerate() {
        out.push([lng0, lat0]);
        let [lng1, lat1] = ring[(i + 1) % ring.len()];
        walk_great_circle(lng0, lat0, lng1, lat1, max_step, |lng, lat| out.push([lng, lat]));
        // the walk ends on the next vertex, which the next iteration pushes
        out.pop();
    }
    out
}

fn project(lng: f64, lat: f64, radius: f64) -> Vec3 {
    to_cartesian(lat, lng, radius / crate::geo::GLOBE_RADIUS - 1.0).as_vec3()
}

/// Outline of a polygon's rings at `radius`, as independent segments.
pub fn polygon_outline(rings: &[Ring], radius: f64, resolution: f64) -> Geometry {
    let mut geometry = Geometry::new(Topology::Lines);
    for ring in rings {
        let dense = densify_ring(ring, resolution);
        if dense.len() < 2 {
            continue;
        }
        for (i, &[lng, lat]) in dense.iter().enumerate() {
            let [next_lng, next_lat] = dense[(i + 1) % dense.len()];
            geometry.push_segment(project(lng, lat, radius), project(next_lng, next_lat, radius));
        }
    }
    geometry
}

/// Meridians and parallels every 10 degrees, sampled every `resolution`
/// degrees.
///
/// Minor meridians stop at ±80° latitude; the four major ones (multiples of
/// 90°) reach the poles.
pub fn graticule(radius: f64, resolution: f64) -> Geometry {
    let step = resolution.max(0.1);
    let mut geometry = Geometry::new(Topology::Lines);

    let mut polyline = |points: Vec<[f64; 2]>| {
        for pair in points.windows(2) {
            geometry.push_segment(
                project(pair[0][0], pair[0][1], radius),
                project(pair[1][0], pair[1][1], radius),
            );
        }
    };

    let samples = |from: f64, to: f64| -> Vec<f64> {
        let n = ((to - from) / step).ceil().max(1.0) as usize;
        (0..=n).map(|i| from + (to - from) * i as f64 / n as f64).collect()
    };

    for lng in (-180..180).step_by(10) {
        let extent = if lng % 90 == 0 { 90.0 } else { 80.0 };
        polyline(samples(-extent, extent).into_iter().map(|lat| [lng as f64, lat]).collect());
    }
    for lat in (-80..=80).step_by(10) {
        polyline(samples(-180.0, 180.0).into_iter().map(|lng| [lng, lat as f64]).collect());
    }

    geometry
}
