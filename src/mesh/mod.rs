//! Geometry builders for the layer objects.

mod conic;
mod lines;
mod text;

pub use conic::{conic_polygon, CAP_GROUP, SIDE_GROUP};
pub use lines::{graticule, polygon_outline, walk_great_circle};
pub use text::{BlockFont, FontShaper, OutlineFont};

use std::f64::consts::{PI, TAU};

use glam::Vec3;

use crate::scene::{Geometry, Topology};

/// Polygon ring as `[lng, lat]` pairs.
pub type Ring = Vec<[f64; 2]>;

/// Full sphere centered at the origin.
pub fn sphere(radius: f64, width_segments: u32, height_segments: u32) -> Geometry {
    sphere_sector(radius, width_segments, height_segments, 0.0, TAU, 0.0, PI)
}

/// Patch of a sphere between two azimuths (`phi`, measured from -X toward
/// +Z) and two polar angles (`theta`, measured from +Y).
///
/// At least 3 width and 2 height segments are used.
pub fn sphere_sector(
    radius: f64,
    width_segments: u32,
    height_segments: u32,
    phi_start: f64,
    phi_length: f64,
    theta_start: f64,
    theta_length: f64,
) -> Geometry {
    let ws = width_segments.max(3);
    let hs = height_segments.max(2);
    let theta_end = (theta_start + theta_length).min(PI);

    let mut geometry = Geometry::new(Topology::Triangles);
    let mut grid = Vec::with_capacity(hs as usize + 1);

    for iy in 0..=hs {
        let v = iy as f64 / hs as f64;
        let theta = theta_start + v * theta_length;
        let row: Vec<u32> = (0..=ws)
            .map(|ix| {
                let phi = phi_start + (ix as f64 / ws as f64) * phi_length;
                geometry.push_vertex(Vec3::new(
                    (-radius * phi.cos() * theta.sin()) as f32,
                    (radius * theta.cos()) as f32,
                    (radius * phi.sin() * theta.sin()) as f32,
                ))
            })
            .collect();
        grid.push(row);
    }

    for iy in 0..hs as usize {
        for ix in 0..ws as usize {
            let a = grid[iy][ix + 1];
            let b = grid[iy][ix];
            let c = grid[iy + 1][ix];
            let d = grid[iy + 1][ix + 1];
            // skip the degenerate triangle at each pole
            if iy != 0 || theta_start > 0.0 {
                geometry.push_triangle(a, b, d);
            }
            if iy != hs as usize - 1 || theta_end < PI {
                geometry.push_triangle(b, c, d);
            }
        }
    }

    geometry
}

/// Closed cylinder of the given radius along Y, from -height/2 to height/2.
pub fn cylinder(radius: f64, height: f64, radial_segments: u32) -> Geometry {
    let segments = radial_segments.max(3);
    let half = (height / 2.0) as f32;
    let r = radius as f32;

    let mut geometry = Geometry::new(Topology::Triangles);
    let ring = |y: f32, g: &mut Geometry| -> Vec<u32> {
        (0..segments)
            .map(|i| {
                let a = TAU * i as f64 / segments as f64;
                g.push_vertex(Vec3::new(r * a.sin() as f32, y, r * a.cos() as f32))
            })
            .collect()
    };

    let top = ring(half, &mut geometry);
    let bottom = ring(-half, &mut geometry);
    let n = segments as usize;
    for i in 0..n {
        let j = (i + 1) % n;
        geometry.push_triangle(top[i], bottom[i], top[j]);
        geometry.push_triangle(bottom[i], bottom[j], top[j]);
    }

    let top_center = geometry.push_vertex(Vec3::new(0.0, half, 0.0));
    let bottom_center = geometry.push_vertex(Vec3::new(0.0, -half, 0.0));
    for i in 0..n {
        let j = (i + 1) % n;
        geometry.push_triangle(top_center, top[i], top[j]);
        geometry.push_triangle(bottom_center, bottom[j], bottom[i]);
    }

    geometry
}

/// Flat disc in the XY plane facing +Z.
pub fn circle(radius: f64, segments: u32) -> Geometry {
    let segments = segments.max(3);
    let mut geometry = Geometry::new(Topology::Triangles);
    let center = geometry.push_vertex(Vec3::ZERO);
    let rim: Vec<u32> = (0..segments)
        .map(|i| {
            let a = TAU * i as f64 / segments as f64;
            let (x, y) = (radius * a.cos(), radius * a.sin());
            geometry.push_vertex(Vec3::new(x as f32, y as f32, 0.0))
        })
        .collect();
    for i in 0..rim.len() {
        geometry.push_triangle(center, rim[i], rim[(i + 1) % rim.len()]);
    }
    geometry
}

/// Drop a trailing point equal to the first one.
pub(crate) fn drop_closing_duplicate(ring: &mut Ring) {
    if ring.len() >= 2 {
        let first = ring[0];
        let last = ring[ring.len() - 1];
        if (first[0] - last[0]).abs() < 1e-9 && (first[1] - last[1]).abs() < 1e-9 {
            ring.pop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sphere_vertices_on_radius() {
        let g = sphere(100.0, 16, 8);
        assert_eq!(g.vertex_count(), 17 * 9);
        for p in &g.positions {
            assert!((p.length() - 100.0).abs() < 1e-3);
        }
        // two pole rows lose one triangle per quad
        assert_eq!(g.primitive_count(), 16 * 8 * 2 - 2 * 16);
    }

    #[test]
    fn test_sector_clamps_segments() {
        let g = sphere_sector(1.0, 0, 0, 0.0, 0.1, 1.0, 0.1);
        assert_eq!(g.vertex_count(), 4 * 3);
        // away from the poles every quad has two triangles
        assert_eq!(g.primitive_count(), 3 * 2 * 2);
    }

    #[test]
    fn test_cylinder_extent() {
        let g = cylinder(1.0, 1.0, 12);
        let (lo, hi) = g.bounding_box().unwrap();
        assert!((lo.y + 0.5).abs() < 1e-6 && (hi.y - 0.5).abs() < 1e-6);
        assert!((hi.x - 1.0).abs() < 1e-3);
        assert_eq!(g.primitive_count(), 12 * 4);
    }

    #[test]
    fn test_circle_is_flat() {
        let g = circle(0.5, 32);
        assert_eq!(g.vertex_count(), 33);
        assert!(g.positions.iter().all(|p| p.z == 0.0));
    }

    #[test]
    fn test_drop_closing_duplicate() {
        let mut ring = vec![[0.0, 0.0], [1.0, 0.0], [0.0, 1.0], [0.0, 0.0]];
        drop_closing_duplicate(&mut ring);
        assert_eq!(ring.len(), 3);
        drop_closing_duplicate(&mut ring);
        assert_eq!(ring.len(), 3);
    }
}
