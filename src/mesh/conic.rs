use std::collections::HashMap;

use earcutr::earcut;
use glam::Vec3;

use super::lines::densify_ring;
use super::Ring;
use crate::error::GlobeError;
use crate::geo::{to_cartesian, GLOBE_RADIUS};
use crate::scene::{Geometry, Topology};

/// Max subdivision rounds applied to a cap triangle.
const MAX_SUBDIVISION_DEPTH: u32 = 5;

/// Material group of the side walls.
pub const SIDE_GROUP: usize = 0;
/// Material group of the top cap.
pub const CAP_GROUP: usize = 1;

fn project(lng: f64, lat: f64, radius: f64) -> Vec3 {
    to_cartesian(lat, lng, radius / GLOBE_RADIUS - 1.0).as_vec3()
}

/// Extrude a polygon (outer ring first, then holes) between two radii.
///
/// Side walls form material group 0 and the curved top cap group 1. Edges
/// are densified along great circles and cap triangles subdivided until no
/// edge exceeds `resolution` degrees. A cap that cannot be triangulated is
/// left empty, and so is a polygon whose outer ring has fewer than three
/// distinct points.
pub fn conic_polygon(
    rings: &[Ring],
    bottom_radius: f64,
    top_radius: f64,
    resolution: f64,
) -> Geometry {
    let resolution = resolution.max(0.1);
    let mut geometry = Geometry::new(Topology::Triangles);
    let mut densified = rings.iter().map(|r| densify_ring(r, resolution));
    // a collapsed outer ring takes its holes with it
    let Some(outer) = densified.next().filter(|r| r.len() >= 3) else {
        return geometry;
    };
    let rings: Vec<Ring> = std::iter::once(outer)
        .chain(densified.filter(|r| r.len() >= 3))
        .collect();

    for ring in &rings {
        let base = geometry.vertex_count() as u32;
        for &[lng, lat] in ring {
            geometry.push_vertex(project(lng, lat, top_radius));
            geometry.push_vertex(project(lng, lat, bottom_radius));
        }
        let n = ring.len() as u32;
        for i in 0..n {
            let j = (i + 1) % n;
            let (top_i, bottom_i) = (base + 2 * i, base + 2 * i + 1);
            let (top_j, bottom_j) = (base + 2 * j, base + 2 * j + 1);
            geometry.push_triangle(top_i, bottom_i, top_j);
            geometry.push_triangle(bottom_i, bottom_j, top_j);
        }
    }
    geometry.add_group(0, SIDE_GROUP);

    let cap_start = geometry.indices.len();
    match triangulate_cap(&rings, resolution) {
        Ok((points, triangles)) => {
            let base = geometry.vertex_count() as u32;
            for [lng, lat] in points {
                geometry.push_vertex(project(lng, lat, top_radius));
            }
            for [a, b, c] in triangles {
                geometry.push_triangle(base + a, base + b, base + c);
            }
        }
        Err(e) => log::warn!("{e}"),
    }
    geometry.add_group(cap_start, CAP_GROUP);

    geometry
}

type CapMesh = (Vec<[f64; 2]>, Vec<[u32; 3]>);

/// Triangulate the rings in lng/lat space and subdivide coarse triangles.
fn triangulate_cap(rings: &[Ring], resolution: f64) -> Result<CapMesh, GlobeError> {
    let mut coords = Vec::new();
    let mut holes = Vec::new();
    for (i, ring) in rings.iter().enumerate() {
        if i > 0 {
            holes.push(coords.len() / 2);
        }
        for &[lng, lat] in ring {
            coords.push(lng);
            coords.push(lat);
        }
    }

    let indices =
        earcut(&coords, &holes, 2).map_err(|e| GlobeError::Triangulation(format!("{e:?}")))?;

    let mut points: Vec<[f64; 2]> = coords.chunks_exact(2).map(|c| [c[0], c[1]]).collect();
    let mut midpoints = HashMap::new();
    let mut triangles = Vec::with_capacity(indices.len() / 3);
    for tri in indices.chunks_exact(3) {
        subdivide(
            [tri[0] as u32, tri[1] as u32, tri[2] as u32],
            resolution,
            MAX_SUBDIVISION_DEPTH,
            &mut points,
            &mut midpoints,
            &mut triangles,
        );
    }
    Ok((points, triangles))
}

fn edge_len(a: [f64; 2], b: [f64; 2]) -> f64 {
    (a[0] - b[0]).hypot(a[1] - b[1])
}

fn midpoint(
    a: u32,
    b: u32,
    points: &mut Vec<[f64; 2]>,
    midpoints: &mut HashMap<(u32, u32), u32>,
) -> u32 {
    let key = (a.min(b), a.max(b));
    *midpoints.entry(key).or_insert_with(|| {
        let (pa, pb) = (points[a as usize], points[b as usize]);
        points.push([(pa[0] + pb[0]) / 2.0, (pa[1] + pb[1]) / 2.0]);
        (points.len() - 1) as u32
    })
}

fn subdivide(
    tri: [u32; 3],
    resolution: f64,
    depth: u32,
    points: &mut Vec<[f64; 2]>,
    midpoints: &mut HashMap<(u32, u32), u32>,
    out: &mut Vec<[u32; 3]>,
) {
    let [a, b, c] = tri;
    let (pa, pb, pc) = (points[a as usize], points[b as usize], points[c as usize]);
    let longest = edge_len(pa, pb).max(edge_len(pb, pc)).max(edge_len(pc, pa));
    if depth == 0 || longest <= resolution {
        out.push(tri);
        return;
    }

    let ab = midpoint(a, b, points, midpoints);
    let bc = midpoint(b, c, points, midpoints);
    let ca = midpoint(c, a, points, midpoints);
    for child in [[a, ab, ca], [ab, b, bc], [ca, bc, c], [ab, bc, ca]] {
        subdivide(child, resolution, depth - 1, points, midpoints, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(size: f64) -> Ring {
        vec![[0.0, 0.0], [size, 0.0], [size, size], [0.0, size], [0.0, 0.0]]
    }

    fn group(g: &Geometry, material_index: usize) -> usize {
        g.groups
            .iter()
            .filter(|gr| gr.material_index == material_index)
            .map(|gr| gr.count as usize)
            .sum()
    }

    #[test]
    fn test_groups_side_then_cap() {
        let g = conic_polygon(&[square(2.0)], 100.0, 110.0, 5.0);
        assert_eq!(g.groups.len(), 2);
        assert_eq!(g.groups[0].material_index, SIDE_GROUP);
        assert_eq!(g.groups[1].material_index, CAP_GROUP);
        // 4 walls of 2 triangles, cap of 2 triangles
        assert_eq!(group(&g, SIDE_GROUP), 8 * 3);
        assert_eq!(group(&g, CAP_GROUP), 2 * 3);
    }

    #[test]
    fn test_cap_on_top_radius() {
        let g = conic_polygon(&[square(10.0)], 100.0, 120.0, 2.0);
        let cap = g.groups[1];
        for &i in &g.indices[cap.start as usize..(cap.start + cap.count) as usize] {
            let r = g.positions[i as usize].length();
            assert!((r - 120.0).abs() < 1e-2);
        }
    }

    #[test]
    fn test_finer_resolution_adds_triangles() {
        let coarse = conic_polygon(&[square(10.0)], 100.0, 101.0, 20.0);
        let fine = conic_polygon(&[square(10.0)], 100.0, 101.0, 2.0);
        assert!(fine.primitive_count() > coarse.primitive_count());
    }

    #[test]
    fn test_hole_reduces_cap() {
        let hole = vec![[4.0, 4.0], [4.0, 6.0], [6.0, 6.0], [6.0, 4.0]];
        let solid = conic_polygon(&[square(10.0)], 100.0, 101.0, 50.0);
        let holed = conic_polygon(&[square(10.0), hole], 100.0, 101.0, 50.0);
        assert!(group(&holed, CAP_GROUP) > group(&solid, CAP_GROUP));
        assert!(group(&holed, SIDE_GROUP) > group(&solid, SIDE_GROUP));
    }

    #[test]
    fn test_degenerate_rings_are_empty() {
        let g = conic_polygon(&[vec![[0.0, 0.0], [1.0, 1.0]]], 100.0, 101.0, 5.0);
        assert!(g.is_empty());
        assert!(conic_polygon(&[], 100.0, 101.0, 5.0).is_empty());
    }

    #[test]
    fn test_degenerate_outer_drops_holes() {
        let outer = vec![[0.0, 0.0], [10.0, 10.0], [0.0, 0.0]];
        let hole = vec![[4.0, 4.0], [4.0, 6.0], [6.0, 6.0], [6.0, 4.0]];
        assert!(conic_polygon(&[outer, hole.clone()], 100.0, 101.0, 50.0).is_empty());

        // a degenerate hole alone is dropped and the outer ring kept
        let sliver = vec![[5.0, 5.0], [5.0, 5.0]];
        let g = conic_polygon(&[square(10.0), sliver], 100.0, 101.0, 50.0);
        let plain = conic_polygon(&[square(10.0)], 100.0, 101.0, 50.0);
        assert_eq!(group(&g, CAP_GROUP), group(&plain, CAP_GROUP));
    }
}
