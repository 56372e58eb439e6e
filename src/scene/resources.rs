use std::cell::RefCell;
use std::rc::Rc;

use glam::{Mat4, Vec3};

use crate::color::Color;
use crate::error::GlobeError;

/// How the index buffer of a [`Geometry`] is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topology {
    Triangles,
    /// Independent segments, two indices each
    Lines,
}

/// Index range drawn with one material of a multi-material mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeometryGroup {
    pub start: u32,
    pub count: u32,
    pub material_index: usize,
}

/// Vertex and index data of a mesh or line.
#[derive(Debug, Clone, PartialEq)]
pub struct Geometry {
    pub topology: Topology,
    pub positions: Vec<Vec3>,
    pub indices: Vec<u32>,
    /// Per-vertex colors, empty unless the geometry was baked with colors
    pub colors: Vec<[f32; 3]>,
    pub groups: Vec<GeometryGroup>,
}

impl Geometry {
    pub fn new(topology: Topology) -> Self {
        Self {
            topology,
            positions: Vec::new(),
            indices: Vec::new(),
            colors: Vec::new(),
            groups: Vec::new(),
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn primitive_count(&self) -> usize {
        match self.topology {
            Topology::Triangles => self.indices.len() / 3,
            Topology::Lines => self.indices.len() / 2,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Push a vertex and return its index.
    pub fn push_vertex(&mut self, p: Vec3) -> u32 {
        self.positions.push(p);
        (self.positions.len() - 1) as u32
    }

    pub fn push_triangle(&mut self, a: u32, b: u32, c: u32) {
        self.indices.extend_from_slice(&[a, b, c]);
    }

    pub fn push_segment(&mut self, a: Vec3, b: Vec3) {
        let i = self.push_vertex(a);
        let j = self.push_vertex(b);
        self.indices.extend_from_slice(&[i, j]);
    }

    /// Close the index range added since `start` into a material group.
    pub fn add_group(&mut self, start: usize, material_index: usize) {
        let count = self.indices.len().saturating_sub(start);
        self.groups.push(GeometryGroup {
            start: start as u32,
            count: count as u32,
            material_index,
        });
    }

    /// Axis-aligned bounds, `None` for an empty geometry.
    pub fn bounding_box(&self) -> Option<(Vec3, Vec3)> {
        let first = *self.positions.first()?;
        Some(
            self.positions
                .iter()
                .fold((first, first), |(lo, hi), p| (lo.min(*p), hi.max(*p))),
        )
    }

    pub fn translate(&mut self, offset: Vec3) {
        for p in &mut self.positions {
            *p += offset;
        }
    }

    pub fn apply_matrix(&mut self, m: Mat4) {
        for p in &mut self.positions {
            *p = m.transform_point3(*p);
        }
    }

    /// Move the bounding box center to the origin.
    pub fn center(&mut self) {
        if let Some((lo, hi)) = self.bounding_box() {
            self.translate(-(lo + hi) * 0.5);
        }
    }

    /// Append `other` untouched, keeping its vertex colors.
    pub fn append(&mut self, other: &Geometry) {
        let base = self.positions.len() as u32;
        self.positions.extend_from_slice(&other.positions);
        self.colors.extend_from_slice(&other.colors);
        self.indices.extend(other.indices.iter().map(|i| i + base));
    }

    /// Append `other` transformed by `m`, painting its vertices with `color`.
    pub fn merge(&mut self, other: &Geometry, m: Mat4, color: Color) {
        let base = self.positions.len() as u32;
        self.positions
            .extend(other.positions.iter().map(|p| m.transform_point3(*p)));
        self.colors
            .extend(std::iter::repeat(color.to_array()).take(other.positions.len()));
        self.indices.extend(other.indices.iter().map(|i| i + base));
    }
}

/// Lighting model of a material.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shading {
    /// Unlit
    Basic,
    Lambert,
    Phong,
    Line,
    /// Fresnel rim shader used by the atmosphere shell
    Glow,
}

/// Image produced by a [`TextureLoader`].
#[derive(Debug, Clone, PartialEq)]
pub struct Texture {
    pub source: String,
    pub byte_len: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub shading: Shading,
    /// `None` lets the texture map show unmodulated
    pub color: Option<Color>,
    pub opacity: f32,
    pub transparent: bool,
    pub double_sided: bool,
    pub depth_write: bool,
    pub vertex_colors: bool,
    pub map: Option<Rc<Texture>>,
    pub bump_map: Option<Rc<Texture>>,
    /// Bumped whenever the renderer must re-upload the material
    pub version: u32,
}

pub type SharedMaterial = Rc<RefCell<Material>>;

impl Material {
    fn with_shading(shading: Shading) -> Self {
        Self {
            shading,
            color: Some(Color::WHITE),
            opacity: 1.0,
            transparent: false,
            double_sided: false,
            depth_write: true,
            vertex_colors: false,
            map: None,
            bump_map: None,
            version: 0,
        }
    }

    pub fn basic() -> Self {
        Self::with_shading(Shading::Basic)
    }

    pub fn lambert() -> Self {
        Self::with_shading(Shading::Lambert)
    }

    pub fn phong() -> Self {
        Self::with_shading(Shading::Phong)
    }

    pub fn line() -> Self {
        Self::with_shading(Shading::Line)
    }

    pub fn glow() -> Self {
        Self {
            transparent: true,
            double_sided: true,
            depth_write: false,
            ..Self::with_shading(Shading::Glow)
        }
    }

    pub fn double_sided(mut self) -> Self {
        self.double_sided = true;
        self
    }

    /// Set color and opacity; alpha below one turns on transparency.
    pub fn set_color(&mut self, color: Color, alpha: f32) {
        self.color = Some(color);
        self.opacity = alpha;
        self.transparent = alpha < 1.0;
        self.version += 1;
    }

    pub fn into_shared(self) -> SharedMaterial {
        Rc::new(RefCell::new(self))
    }
}

/// Completion callback handed to a [`TextureLoader`].
pub type TextureCallback = Box<dyn FnOnce(Result<Texture, GlobeError>)>;

/// Source of textures for image URLs.
///
/// `load` may invoke the callback synchronously or at any later frame; the
/// globe layer discards results that arrive after their URL was replaced.
pub trait TextureLoader {
    fn load(&self, url: &str, on_load: TextureCallback);
}

/// Loader that never produces textures. Suitable when no imagery is set.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoTextures;

impl TextureLoader for NoTextures {
    fn load(&self, url: &str, on_load: TextureCallback) {
        on_load(Err(GlobeError::TextureLoad {
            url: url.to_string(),
            reason: "no texture loader configured".to_string(),
        }));
    }
}
