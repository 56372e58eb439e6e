//! Retained scene graph the layers draw into.
//!
//! Nodes live in an arena addressed by generational [`NodeId`]s, so a handle
//! kept after its node was removed simply stops resolving. Geometry and
//! material resources are reference counted: removing a node drops its
//! references, which releases every resource no other node still uses.

mod resources;
mod transform;

pub use resources::{
    Geometry, GeometryGroup, Material, NoTextures, Shading, SharedMaterial, Texture,
    TextureCallback, TextureLoader, Topology,
};
pub use transform::{look_rotation, Transform};

use std::rc::Rc;

use glam::{DMat4, DVec3};

use crate::animation::Snapshot;

/// Handle to a node in a [`Scene`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

/// Primitive drawn by a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Group,
    Mesh,
    Line,
}

/// Which layer object a node represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectType {
    Globe,
    Atmosphere,
    Graticules,
    Point,
    /// All points baked into one mesh
    Points,
    Polygon,
    Tile,
    Label,
    Custom,
}

#[derive(Debug, Clone)]
pub struct Node {
    pub kind: NodeKind,
    pub object_type: Option<ObjectType>,
    pub transform: Transform,
    pub visible: bool,
    pub geometry: Option<Rc<Geometry>>,
    pub materials: Vec<SharedMaterial>,
    /// Attribute values this node currently displays
    pub snapshot: Option<Snapshot>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl Node {
    fn with_kind(kind: NodeKind) -> Self {
        Self {
            kind,
            object_type: None,
            transform: Transform::IDENTITY,
            visible: true,
            geometry: None,
            materials: Vec::new(),
            snapshot: None,
            parent: None,
            children: Vec::new(),
        }
    }

    pub fn group() -> Self {
        Self::with_kind(NodeKind::Group)
    }

    pub fn mesh(geometry: Option<Rc<Geometry>>, materials: Vec<SharedMaterial>) -> Self {
        Self {
            geometry,
            materials,
            ..Self::with_kind(NodeKind::Mesh)
        }
    }

    pub fn line(geometry: Option<Rc<Geometry>>, material: SharedMaterial) -> Self {
        Self {
            geometry,
            materials: vec![material],
            ..Self::with_kind(NodeKind::Line)
        }
    }

    pub fn tagged(mut self, object_type: ObjectType) -> Self {
        self.object_type = Some(object_type);
        self
    }

    pub fn material(&self, index: usize) -> Option<&SharedMaterial> {
        self.materials.get(index)
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }
}

struct Slot {
    generation: u32,
    node: Option<Node>,
}

pub struct Scene {
    slots: Vec<Slot>,
    free: Vec<u32>,
    root: NodeId,
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

impl Scene {
    pub fn new() -> Self {
        let mut scene = Self {
            slots: Vec::new(),
            free: Vec::new(),
            root: NodeId { index: 0, generation: 0 },
        };
        scene.root = scene.spawn(Node::group());
        scene
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Number of live nodes, root included.
    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Insert a detached node.
    ///
    /// Links carried by `node` are reset, so a clone of another node spawns
    /// as a childless copy sharing its geometry and materials.
    pub fn spawn(&mut self, mut node: Node) -> NodeId {
        node.parent = None;
        node.children.clear();

        match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.node = Some(node);
                NodeId { index, generation: slot.generation }
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(Slot { generation: 0, node: Some(node) });
                NodeId { index, generation: 0 }
            }
        }
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.node(id).is_some()
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        let slot = self.slots.get(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.node.as_ref()
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.node.as_mut()
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id)?.parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.node(id).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    /// Attach `child` under `parent`, detaching it from any previous parent.
    pub fn add(&mut self, parent: NodeId, child: NodeId) {
        if parent == child || !self.contains(parent) || !self.contains(child) {
            return;
        }
        if self.is_ancestor(child, parent) {
            log::warn!("refusing to attach a node below its own descendant");
            return;
        }
        self.detach(child);
        if let Some(p) = self.node_mut(parent) {
            p.children.push(child);
        }
        if let Some(c) = self.node_mut(child) {
            c.parent = Some(parent);
        }
    }

    /// Unlink a node from its parent, keeping it alive.
    pub fn detach(&mut self, child: NodeId) {
        let Some(parent) = self.parent(child) else {
            return;
        };
        if let Some(p) = self.node_mut(parent) {
            p.children.retain(|c| *c != child);
        }
        if let Some(c) = self.node_mut(child) {
            c.parent = None;
        }
    }

    /// Detach a node and free it with its whole subtree.
    ///
    /// Returns the number of nodes freed. The root cannot be removed.
    pub fn remove(&mut self, id: NodeId) -> usize {
        if id == self.root || !self.contains(id) {
            return 0;
        }
        self.detach(id);
        self.release(id)
    }

    /// Remove every child of `id`.
    pub fn clear(&mut self, id: NodeId) -> usize {
        let children = self.children(id).to_vec();
        children.into_iter().map(|c| self.remove(c)).sum()
    }

    fn release(&mut self, id: NodeId) -> usize {
        let mut freed = 0;
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let slot = &mut self.slots[current.index as usize];
            if slot.generation != current.generation {
                continue;
            }
            // dropping the node drops its geometry/material references
            if let Some(node) = slot.node.take() {
                stack.extend(node.children);
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(current.index);
                freed += 1;
            }
        }
        freed
    }

    fn is_ancestor(&self, ancestor: NodeId, mut id: NodeId) -> bool {
        while let Some(parent) = self.parent(id) {
            if parent == ancestor {
                return true;
            }
            id = parent;
        }
        false
    }

    /// Transform from node space to scene (root) space.
    pub fn world_matrix(&self, id: NodeId) -> DMat4 {
        let mut m = DMat4::IDENTITY;
        let mut current = Some(id);
        while let Some(node_id) = current {
            let Some(node) = self.node(node_id) else {
                break;
            };
            m = node.transform.matrix() * m;
            current = node.parent;
        }
        m
    }

    pub fn local_to_world(&self, id: NodeId, p: DVec3) -> DVec3 {
        self.world_matrix(id).transform_point3(p)
    }

    /// Depth-first list of the subtree below `id`, `id` excluded.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(id).iter().rev().copied().collect();
        while let Some(current) = stack.pop() {
            out.push(current);
            stack.extend(self.children(current).iter().rev());
        }
        out
    }

    /// Nodes of the given type anywhere below `id`.
    pub fn find_by_type(&self, id: NodeId, object_type: ObjectType) -> Vec<NodeId> {
        self.descendants(id)
            .into_iter()
            .filter(|n| {
                self.node(*n)
                    .is_some_and(|node| node.object_type == Some(object_type))
            })
            .collect()
    }

    /// Visible in the scene: the node and all its ancestors are visible.
    pub fn is_visible(&self, id: NodeId) -> bool {
        let mut current = Some(id);
        while let Some(node_id) = current {
            match self.node(node_id) {
                Some(node) if node.visible => current = node.parent,
                _ => return false,
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::DQuat;

    #[test]
    fn test_add_and_detach() {
        let mut scene = Scene::new();
        let a = scene.spawn(Node::group());
        let b = scene.spawn(Node::group());
        scene.add(scene.root(), a);
        scene.add(a, b);
        assert_eq!(scene.children(a), &[b]);
        assert_eq!(scene.parent(b), Some(a));

        // re-parenting moves the node
        scene.add(scene.root(), b);
        assert!(scene.children(a).is_empty());
        assert_eq!(scene.children(scene.root()).len(), 2);
    }

    #[test]
    fn test_remove_releases_subtree_resources() {
        let mut scene = Scene::new();
        let geometry = Rc::new(Geometry::new(Topology::Triangles));
        let material = Material::basic().into_shared();
        let weak_geometry = Rc::downgrade(&geometry);
        let weak_material = Rc::downgrade(&material);

        let group = scene.spawn(Node::group());
        let mesh = scene.spawn(Node::mesh(Some(geometry), vec![material]));
        scene.add(scene.root(), group);
        scene.add(group, mesh);

        assert_eq!(scene.remove(group), 2);
        assert!(!scene.contains(mesh));
        assert!(weak_geometry.upgrade().is_none());
        assert!(weak_material.upgrade().is_none());
        assert_eq!(scene.len(), 1);
    }

    #[test]
    fn test_stale_id_after_slot_reuse() {
        let mut scene = Scene::new();
        let a = scene.spawn(Node::group());
        scene.remove(a);
        let b = scene.spawn(Node::mesh(None, Vec::new()));
        assert!(scene.node(a).is_none());
        assert_eq!(scene.node(b).map(|n| n.kind), Some(NodeKind::Mesh));
    }

    #[test]
    fn test_clear_keeps_parent() {
        let mut scene = Scene::new();
        let group = scene.spawn(Node::group());
        scene.add(scene.root(), group);
        for _ in 0..3 {
            let child = scene.spawn(Node::group());
            scene.add(group, child);
        }
        assert_eq!(scene.clear(group), 3);
        assert!(scene.contains(group));
        assert!(scene.children(group).is_empty());
    }

    #[test]
    fn test_world_matrix_chains_parents() {
        let mut scene = Scene::new();
        let outer = scene.spawn(Node::group());
        let inner = scene.spawn(Node::group());
        scene.add(scene.root(), outer);
        scene.add(outer, inner);

        if let Some(n) = scene.node_mut(outer) {
            n.transform.scale = DVec3::splat(2.0);
            n.transform.rotation = DQuat::from_rotation_y(std::f64::consts::FRAC_PI_2);
        }
        if let Some(n) = scene.node_mut(inner) {
            n.transform.position = DVec3::new(0.0, 0.0, 1.0);
        }

        let p = scene.local_to_world(inner, DVec3::ZERO);
        assert!((p - DVec3::new(2.0, 0.0, 0.0)).length() < 1e-9);
    }

    #[test]
    fn test_refuses_cycles() {
        let mut scene = Scene::new();
        let a = scene.spawn(Node::group());
        let b = scene.spawn(Node::group());
        scene.add(a, b);
        scene.add(b, a);
        assert_eq!(scene.parent(a), None);
    }

    #[test]
    fn test_visibility_inherits() {
        let mut scene = Scene::new();
        let group = scene.spawn(Node::group());
        let child = scene.spawn(Node::group());
        scene.add(scene.root(), group);
        scene.add(group, child);
        assert!(scene.is_visible(child));
        if let Some(n) = scene.node_mut(group) {
            n.visible = false;
        }
        assert!(!scene.is_visible(child));
    }
}
