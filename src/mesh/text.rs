use std::fmt;
use std::iter;
use std::rc::Rc;

use ab_glyph::{Font, FontArc, GlyphId, OutlineCurve, Point};
use earcutr::earcut;
use glam::Vec3;

use crate::error::GlobeError;
use crate::scene::{Geometry, Topology};

/// Turns a string into flat text geometry.
///
/// Implementations lay glyphs out in the XY plane facing +Z, starting at
/// the origin with the baseline on y = 0, with capitals `size` units tall.
pub trait FontShaper {
    fn shape(&self, text: &str, size: f64, curve_segments: u32) -> Geometry;
}

impl From<OutlineFont> for Rc<dyn FontShaper> {
    fn from(font: OutlineFont) -> Self {
        Rc::new(font)
    }
}

impl From<BlockFont> for Rc<dyn FontShaper> {
    fn from(font: BlockFont) -> Self {
        Rc::new(font)
    }
}

/// Typeface read from TrueType or OpenType font data.
///
/// Glyph outlines are flattened with `curve_segments` steps per quadratic or
/// cubic curve, then the filled contours are triangulated. Glyphs advance
/// by their horizontal metrics plus pair kerning.
#[derive(Clone)]
pub struct OutlineFont {
    font: FontArc,
    /// Height of a capital in font units
    cap_height: f32,
}

impl fmt::Debug for OutlineFont {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutlineFont").field("cap_height", &self.cap_height).finish()
    }
}

impl OutlineFont {
    pub fn from_bytes(data: Vec<u8>) -> Result<Self, GlobeError> {
        let font = FontArc::try_from_vec(data).map_err(|e| GlobeError::Font(e.to_string()))?;
        let cap_height = font
            .outline(font.glyph_id('H'))
            .map(|o| o.bounds.max.y)
            .filter(|h| *h > 0.0)
            .unwrap_or_else(|| font.ascent_unscaled());
        if !(cap_height > 0.0) {
            return Err(GlobeError::Font("no usable capital height".to_string()));
        }
        Ok(Self { font, cap_height })
    }
}

impl FontShaper for OutlineFont {
    fn shape(&self, text: &str, size: f64, curve_segments: u32) -> Geometry {
        let mut geometry = Geometry::new(Topology::Triangles);
        let scale = size / self.cap_height as f64;
        let mut pen = 0.0;
        let mut previous: Option<GlyphId> = None;

        for c in text.chars() {
            let id = self.font.glyph_id(c);
            if let Some(previous) = previous {
                pen += self.font.kern_unscaled(previous, id) as f64;
            }
            if let Some(outline) = self.font.outline(id) {
                let contours = flatten(&outline.curves, curve_segments);
                if let Err(e) = fill_contours(&mut geometry, &contours, pen, scale) {
                    log::warn!("glyph {c:?}: {e}");
                }
            }
            pen += self.font.h_advance_unscaled(id) as f64;
            previous = Some(id);
        }

        geometry
    }
}

type Contour = Vec<[f64; 2]>;

/// Point at `t` on the Bezier curve through `control`.
fn bezier(control: &[Point], t: f32) -> [f64; 2] {
    let mut points: Vec<(f32, f32)> = control.iter().map(|p| (p.x, p.y)).collect();
    while points.len() > 1 {
        points = points
            .windows(2)
            .map(|w| (w[0].0 + (w[1].0 - w[0].0) * t, w[0].1 + (w[1].1 - w[0].1) * t))
            .collect();
    }
    points.first().map_or([0.0; 2], |&(x, y)| [x as f64, y as f64])
}

/// Join outline curves into closed contours, `segments` steps per curve.
fn flatten(curves: &[OutlineCurve], segments: u32) -> Vec<Contour> {
    let steps = segments.max(1);
    let mut contours: Vec<Contour> = Vec::new();

    for curve in curves {
        let control: Vec<Point> = match *curve {
            OutlineCurve::Line(a, b) => vec![a, b],
            OutlineCurve::Quad(a, b, c) => vec![a, b, c],
            OutlineCurve::Cubic(a, b, c, d) => vec![a, b, c, d],
        };
        let start = bezier(&control, 0.0);
        // a curve not starting where the last one ended opens a new contour
        if contours.last().and_then(|c| c.last()) != Some(&start) {
            contours.push(vec![start]);
        }
        let Some(contour) = contours.last_mut() else {
            continue;
        };
        if control.len() == 2 {
            contour.push(bezier(&control, 1.0));
        } else {
            contour.extend((1..=steps).map(|i| bezier(&control, i as f32 / steps as f32)));
        }
    }

    for contour in &mut contours {
        if contour.len() > 1 && contour.first() == contour.last() {
            contour.pop();
        }
    }
    contours.retain(|c| c.len() >= 3);
    contours
}

fn area(ring: &[[f64; 2]]) -> f64 {
    let n = ring.len();
    let twice: f64 = (0..n)
        .map(|i| {
            let ([x0, y0], [x1, y1]) = (ring[i], ring[(i + 1) % n]);
            x0 * y1 - x1 * y0
        })
        .sum();
    (twice / 2.0).abs()
}

/// Even-odd point in polygon test.
fn contains(ring: &[[f64; 2]], [x, y]: [f64; 2]) -> bool {
    let mut inside = false;
    let mut j = ring.len() - 1;
    for i in 0..ring.len() {
        let ([xi, yi], [xj, yj]) = (ring[i], ring[j]);
        if (yi > y) != (yj > y) && x < (xj - xi) * (y - yi) / (yj - yi) + xi {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Triangulate glyph contours into `geometry`.
///
/// Contours nested an odd number of times are holes of the smallest contour
/// around them; the rest are filled. Outlines are placed at `x_offset` and
/// scaled by `scale`, both in font units.
fn fill_contours(
    geometry: &mut Geometry,
    contours: &[Contour],
    x_offset: f64,
    scale: f64,
) -> Result<(), GlobeError> {
    let depth: Vec<usize> = contours
        .iter()
        .enumerate()
        .map(|(i, c)| {
            contours
                .iter()
                .enumerate()
                .filter(|&(j, other)| j != i && contains(other, c[0]))
                .count()
        })
        .collect();

    for (outer_index, outer) in contours.iter().enumerate() {
        if depth[outer_index] % 2 == 1 {
            continue;
        }
        let holes = contours.iter().enumerate().filter(|&(i, hole)| {
            depth[i] == depth[outer_index] + 1
                && contains(outer, hole[0])
                // the innermost filled contour around the hole owns it
                && !contours.iter().enumerate().any(|(k, other)| {
                    k != outer_index
                        && depth[k] == depth[outer_index]
                        && contains(other, hole[0])
                        && area(other) < area(outer)
                })
        });

        let mut coords = Vec::new();
        let mut hole_starts = Vec::new();
        for (i, ring) in iter::once(outer).chain(holes.map(|(_, h)| h)).enumerate() {
            if i > 0 {
                hole_starts.push(coords.len() / 2);
            }
            for &[x, y] in ring {
                coords.push(x);
                coords.push(y);
            }
        }

        let indices = earcut(&coords, &hole_starts, 2)
            .map_err(|e| GlobeError::Triangulation(format!("{e:?}")))?;

        let points: Vec<[f64; 2]> = coords.chunks_exact(2).map(|c| [c[0], c[1]]).collect();
        let base = geometry.vertex_count() as u32;
        for &[x, y] in &points {
            let (x, y) = ((x_offset + x) * scale, y * scale);
            geometry.push_vertex(Vec3::new(x as f32, y as f32, 0.0));
        }
        for tri in indices.chunks_exact(3) {
            let [a, b, c] = [tri[0], tri[1], tri[2]];
            let ([ax, ay], [bx, by], [cx, cy]) = (points[a], points[b], points[c]);
            // counter-clockwise, facing +Z
            let clockwise = (bx - ax) * (cy - ay) - (cx - ax) * (by - ay) < 0.0;
            let (b, c) = if clockwise { (c, b) } else { (b, c) };
            geometry.push_triangle(base + a as u32, base + b as u32, base + c as u32);
        }
    }

    Ok(())
}

// 3x5 glyph bitmaps, top row first, high bit on the left
const GLYPHS: &[(char, [u8; 5])] = &[
    ('A', [0b010, 0b101, 0b111, 0b101, 0b101]),
    ('B', [0b110, 0b101, 0b110, 0b101, 0b110]),
    ('C', [0b011, 0b100, 0b100, 0b100, 0b011]),
    ('D', [0b110, 0b101, 0b101, 0b101, 0b110]),
    ('E', [0b111, 0b100, 0b110, 0b100, 0b111]),
    ('F', [0b111, 0b100, 0b110, 0b100, 0b100]),
    ('G', [0b011, 0b100, 0b101, 0b101, 0b011]),
    ('H', [0b101, 0b101, 0b111, 0b101, 0b101]),
    ('I', [0b111, 0b010, 0b010, 0b010, 0b111]),
    ('J', [0b001, 0b001, 0b001, 0b101, 0b010]),
    ('K', [0b101, 0b101, 0b110, 0b101, 0b101]),
    ('L', [0b100, 0b100, 0b100, 0b100, 0b111]),
    ('M', [0b101, 0b111, 0b111, 0b101, 0b101]),
    ('N', [0b110, 0b101, 0b101, 0b101, 0b101]),
    ('O', [0b010, 0b101, 0b101, 0b101, 0b010]),
    ('P', [0b110, 0b101, 0b110, 0b100, 0b100]),
    ('Q', [0b010, 0b101, 0b101, 0b110, 0b011]),
    ('R', [0b110, 0b101, 0b110, 0b101, 0b101]),
    ('S', [0b011, 0b100, 0b010, 0b001, 0b110]),
    ('T', [0b111, 0b010, 0b010, 0b010, 0b010]),
    ('U', [0b101, 0b101, 0b101, 0b101, 0b111]),
    ('V', [0b101, 0b101, 0b101, 0b101, 0b010]),
    ('W', [0b101, 0b101, 0b111, 0b111, 0b101]),
    ('X', [0b101, 0b101, 0b010, 0b101, 0b101]),
    ('Y', [0b101, 0b101, 0b010, 0b010, 0b010]),
    ('Z', [0b111, 0b001, 0b010, 0b100, 0b111]),
    ('0', [0b111, 0b101, 0b101, 0b101, 0b111]),
    ('1', [0b010, 0b110, 0b010, 0b010, 0b111]),
    ('2', [0b110, 0b001, 0b010, 0b100, 0b111]),
    ('3', [0b110, 0b001, 0b010, 0b001, 0b110]),
    ('4', [0b101, 0b101, 0b111, 0b001, 0b001]),
    ('5', [0b111, 0b100, 0b110, 0b001, 0b110]),
    ('6', [0b011, 0b100, 0b111, 0b101, 0b111]),
    ('7', [0b111, 0b001, 0b010, 0b010, 0b010]),
    ('8', [0b111, 0b101, 0b111, 0b101, 0b111]),
    ('9', [0b111, 0b101, 0b111, 0b001, 0b110]),
    ('.', [0b000, 0b000, 0b000, 0b000, 0b010]),
    (',', [0b000, 0b000, 0b000, 0b010, 0b100]),
    ('-', [0b000, 0b000, 0b111, 0b000, 0b000]),
    (':', [0b000, 0b010, 0b000, 0b010, 0b000]),
    ('\'', [0b010, 0b010, 0b000, 0b000, 0b000]),
    ('!', [0b010, 0b010, 0b010, 0b000, 0b010]),
    ('?', [0b110, 0b001, 0b010, 0b000, 0b010]),
];

const UNKNOWN: [u8; 5] = [0b111; 5];

fn glyph(c: char) -> Option<[u8; 5]> {
    if c.is_whitespace() {
        return None;
    }
    let upper = c.to_ascii_uppercase();
    Some(
        GLYPHS
            .iter()
            .find(|(g, _)| *g == upper)
            .map(|(_, rows)| *rows)
            .unwrap_or(UNKNOWN),
    )
}

/// Built-in typeface of 3x5 pixel glyphs drawn as rounded cells, used when
/// no font data is supplied.
///
/// Letters are case-insensitive; characters outside the table render as a
/// solid block. `curve_segments` sets how many segments round each cell
/// corner, zero giving square cells.
#[derive(Debug, Default, Clone, Copy)]
pub struct BlockFont;

impl BlockFont {
    /// Horizontal advance per character, in cells
    const ADVANCE: f64 = 4.0;

    fn push_cell(g: &mut Geometry, x: f64, y: f64, cell: f64, curve_segments: u32) {
        let (x, y, cell) = (x as f32, y as f32, cell as f32);
        if curve_segments == 0 {
            let a = g.push_vertex(Vec3::new(x, y, 0.0));
            let b = g.push_vertex(Vec3::new(x + cell, y, 0.0));
            let c = g.push_vertex(Vec3::new(x + cell, y + cell, 0.0));
            let d = g.push_vertex(Vec3::new(x, y + cell, 0.0));
            g.push_triangle(a, b, c);
            g.push_triangle(a, c, d);
            return;
        }

        let radius = cell * 0.25;
        let center = g.push_vertex(Vec3::new(x + cell / 2.0, y + cell / 2.0, 0.0));
        let corners = [
            (x + cell - radius, y + radius, -std::f32::consts::FRAC_PI_2),
            (x + cell - radius, y + cell - radius, 0.0),
            (x + radius, y + cell - radius, std::f32::consts::FRAC_PI_2),
            (x + radius, y + radius, std::f32::consts::PI),
        ];
        let mut rim = Vec::with_capacity(4 * (curve_segments as usize + 1));
        for (cx, cy, start) in corners {
            for i in 0..=curve_segments {
                let a = start + std::f32::consts::FRAC_PI_2 * i as f32 / curve_segments as f32;
                let p = Vec3::new(cx + radius * a.cos(), cy + radius * a.sin(), 0.0);
                rim.push(g.push_vertex(p));
            }
        }
        for i in 0..rim.len() {
            g.push_triangle(center, rim[i], rim[(i + 1) % rim.len()]);
        }
    }
}

impl FontShaper for BlockFont {
    fn shape(&self, text: &str, size: f64, curve_segments: u32) -> Geometry {
        let mut geometry = Geometry::new(Topology::Triangles);
        let cell = size / 5.0;

        for (i, c) in text.chars().enumerate() {
            let Some(rows) = glyph(c) else {
                continue;
            };
            let origin = i as f64 * Self::ADVANCE * cell;
            for (row, bits) in rows.iter().enumerate() {
                for col in 0..3 {
                    if bits & (0b100 >> col) != 0 {
                        let x = origin + col as f64 * cell;
                        let y = (4 - row) as f64 * cell;
                        Self::push_cell(&mut geometry, x, y, cell, curve_segments);
                    }
                }
            }
        }

        geometry
    }
}
