//! Scene graph and hierarchical scene organization.
//!
//! A [`SceneNode`] owns its children; removing a node from its parent drops it
//! together with its GPU buffers. What a node *is* (group, mesh, light,
//! wireframe) is a [`NodeKind`] variant, so traversals match once instead of
//! probing types at every call site.
//!
//! [`SceneGraph`] holds the fixed slots of the viewer: the primary placeholder
//! cube, the optional loaded model, the lights and a decorative wireframe.

use std::sync::Arc;

use cgmath::{Matrix4, Rad, Rotation3, SquareMatrix, Vector3};
use log::debug;

use crate::{
    data_structures::{
        bounds::Aabb,
        material::{Material, MaterialBinder, MaterialDescriptor},
        mesh::{Geometry, MeshData},
        transform::Transform,
        wireframe::{LineGeometry, WireframeData},
    },
    render::Drawable,
};

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum LightKind {
    Ambient,
    /// Shines from the node's world position towards the origin.
    Directional,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Light {
    pub kind: LightKind,
    pub color: [f32; 3],
    pub intensity: f32,
}

#[derive(Debug)]
pub enum NodeKind {
    Group,
    Mesh(MeshData),
    Light(Light),
    Wireframe(WireframeData),
}

#[derive(Debug)]
pub struct SceneNode {
    pub name: Option<String>,
    pub local: Transform,
    world: Transform,
    pub kind: NodeKind,
    children: Vec<SceneNode>,
}

impl SceneNode {
    pub fn new(name: Option<String>, kind: NodeKind) -> Self {
        Self {
            name,
            local: Transform::new(),
            world: Transform::new(),
            kind,
            children: Vec::new(),
        }
    }

    pub fn group(name: impl Into<String>) -> Self {
        Self::new(Some(name.into()), NodeKind::Group)
    }

    pub fn mesh(name: Option<String>, mesh: MeshData) -> Self {
        Self::new(name, NodeKind::Mesh(mesh))
    }

    pub fn with_transform(mut self, local: Transform) -> Self {
        self.local = local;
        self
    }

    pub fn with_child(mut self, child: SceneNode) -> Self {
        self.children.push(child);
        self
    }

    pub fn add_child(&mut self, child: SceneNode) {
        self.children.push(child);
    }

    /// Detach a child. The caller becomes its only owner.
    pub fn remove_child(&mut self, idx: usize) -> Option<SceneNode> {
        (idx < self.children.len()).then(|| self.children.remove(idx))
    }

    pub fn children(&self) -> &[SceneNode] {
        &self.children
    }

    pub fn children_mut(&mut self) -> &mut Vec<SceneNode> {
        &mut self.children
    }

    pub fn world(&self) -> &Transform {
        &self.world
    }

    /// Depth-first, pre-order visit of every mesh below and including `self`.
    /// The order is the document order of the source asset.
    pub fn for_each_mesh_mut(&mut self, f: &mut dyn FnMut(Option<&str>, &mut MeshData)) {
        if let NodeKind::Mesh(mesh) = &mut self.kind {
            f(self.name.as_deref(), mesh);
        }
        for child in self.children.iter_mut() {
            child.for_each_mesh_mut(f);
        }
    }

    pub fn for_each_mesh(&self, f: &mut dyn FnMut(Option<&str>, &MeshData)) {
        if let NodeKind::Mesh(mesh) = &self.kind {
            f(self.name.as_deref(), mesh);
        }
        for child in self.children.iter() {
            child.for_each_mesh(f);
        }
    }

    pub fn mesh_count(&self) -> usize {
        let mut count = 0;
        self.for_each_mesh(&mut |_, _| count += 1);
        count
    }

    /// Bounding box of all descendant geometry in the frame of this node's
    /// parent, i.e. including this node's own transform.
    pub fn bounds(&self) -> Option<Aabb> {
        self.bounds_under(&Matrix4::identity())
    }

    /// Bounding box of all descendant geometry in this node's own frame.
    pub fn content_bounds(&self) -> Option<Aabb> {
        self.subtree_bounds(&Matrix4::identity())
    }

    fn bounds_under(&self, parent: &Matrix4<f32>) -> Option<Aabb> {
        self.subtree_bounds(&(parent * self.local.to_matrix()))
    }

    fn subtree_bounds(&self, frame: &Matrix4<f32>) -> Option<Aabb> {
        let own = match &self.kind {
            NodeKind::Mesh(mesh) => mesh.geometry().bounds().map(|b| b.transformed(frame)),
            _ => None,
        };
        self.children
            .iter()
            .filter_map(|child| child.bounds_under(frame))
            .fold(own, |acc, b| Some(acc.map_or(b, |a| a.union(b))))
    }

    pub fn update_world_transforms(&mut self, parent: &Transform) {
        self.world = parent * &self.local;
        for child in self.children.iter_mut() {
            child.update_world_transforms(&self.world);
        }
    }

    pub fn write_to_buffers(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        binder: &mut MaterialBinder,
    ) {
        match &mut self.kind {
            NodeKind::Mesh(mesh) => mesh.write_to_buffers(device, queue, binder, &self.world),
            NodeKind::Wireframe(lines) => lines.write_to_buffers(device, queue, &self.world),
            NodeKind::Group | NodeKind::Light(_) => {}
        }
        for child in self.children.iter_mut() {
            child.write_to_buffers(device, queue, binder);
        }
    }

    /// Everything below this node that has been uploaded and can be drawn.
    pub fn collect_drawables<'a>(&'a self, out: &mut Vec<Drawable<'a>>) {
        match &self.kind {
            NodeKind::Mesh(mesh) => {
                if let Some((mesh, material)) = mesh.gpu() {
                    out.push(Drawable::Mesh { mesh, material });
                }
            }
            NodeKind::Wireframe(lines) => {
                if let Some(lines) = lines.gpu() {
                    out.push(Drawable::Lines(lines));
                }
            }
            NodeKind::Group | NodeKind::Light(_) => {}
        }
        for child in &self.children {
            child.collect_drawables(out);
        }
    }

    pub fn collect_lights<'a>(&'a self, out: &mut Vec<(&'a Light, &'a Transform)>) {
        if let NodeKind::Light(light) = &self.kind {
            out.push((light, &self.world));
        }
        for child in &self.children {
            child.collect_lights(out);
        }
    }

    pub fn rotate_y(&mut self, angle: f32) {
        self.local.rotation = cgmath::Quaternion::from_angle_y(Rad(angle)) * self.local.rotation;
    }
}

/// Which of the two object slots is shown.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Visibility {
    Primary,
    #[default]
    Model,
    Both,
}

impl Visibility {
    pub fn shows_primary(self, has_model: bool) -> bool {
        matches!(self, Visibility::Primary | Visibility::Both) || !has_model
    }

    pub fn shows_model(self, has_model: bool) -> bool {
        has_model && matches!(self, Visibility::Model | Visibility::Both)
    }
}

pub struct SceneGraph {
    primary: SceneNode,
    model: Option<SceneNode>,
    lights: SceneNode,
    decoration: SceneNode,
}

impl SceneGraph {
    pub fn new() -> Self {
        let cube_material = Material::new(
            "primary",
            MaterialDescriptor::from_hex(0x00ff00).with_surface(0.5, 0.5),
        );
        let cube = SceneNode::mesh(
            Some("cube".to_string()),
            MeshData::new(Arc::new(Geometry::cube(1.0)), Arc::new(cube_material)),
        );
        let primary = SceneNode::group("primary").with_child(cube);

        let lights = SceneNode::group("lights")
            .with_child(SceneNode::new(
                Some("ambient".to_string()),
                NodeKind::Light(Light {
                    kind: LightKind::Ambient,
                    color: [1.0; 3],
                    intensity: 2.5,
                }),
            ))
            .with_child(
                SceneNode::new(
                    Some("sun".to_string()),
                    NodeKind::Light(Light {
                        kind: LightKind::Directional,
                        color: [1.0; 3],
                        intensity: 1.0,
                    }),
                )
                .with_transform(Transform::from(Vector3::new(5.0, 5.0, 5.0))),
            );

        let decoration = SceneNode::new(
            Some("decoration".to_string()),
            NodeKind::Wireframe(WireframeData::new(LineGeometry::icosahedron(
                2.2,
                [0.35, 0.35, 0.35],
            ))),
        );

        let mut graph = Self {
            primary,
            model: None,
            lights,
            decoration,
        };
        graph.update_world_transforms();
        graph
    }

    pub fn primary(&self) -> &SceneNode {
        &self.primary
    }

    pub fn primary_mut(&mut self) -> &mut SceneNode {
        &mut self.primary
    }

    pub fn model(&self) -> Option<&SceneNode> {
        self.model.as_ref()
    }

    pub fn model_mut(&mut self) -> Option<&mut SceneNode> {
        self.model.as_mut()
    }

    pub fn has_model(&self) -> bool {
        self.model.is_some()
    }

    /// Replace the loaded model in one step and hand back the previous one.
    /// Dropping the returned node releases its GPU resources.
    pub fn swap_model(&mut self, mut model: Option<SceneNode>) -> Option<SceneNode> {
        if let Some(node) = &mut model {
            node.update_world_transforms(&Transform::new());
            debug!("attaching model with {} meshes", node.mesh_count());
        }
        std::mem::replace(&mut self.model, model)
    }

    /// Slots shown under `visibility`, for updates and drawing alike.
    pub fn visible_mut(&mut self, visibility: Visibility) -> Vec<&mut SceneNode> {
        let has_model = self.model.is_some();
        let mut out = Vec::with_capacity(2);
        if visibility.shows_primary(has_model) {
            out.push(&mut self.primary);
        }
        if visibility.shows_model(has_model) {
            if let Some(model) = self.model.as_mut() {
                out.push(model);
            }
        }
        out
    }

    pub fn visible(&self, visibility: Visibility) -> Vec<&SceneNode> {
        let has_model = self.model.is_some();
        let mut out = Vec::with_capacity(2);
        if visibility.shows_primary(has_model) {
            out.push(&self.primary);
        }
        if visibility.shows_model(has_model) {
            out.extend(self.model.as_ref());
        }
        out
    }

    /// Spin the visible slots about Y, the wireframe slowly the other way.
    pub fn advance_rotation(&mut self, visibility: Visibility, angle: f32) {
        for node in self.visible_mut(visibility) {
            node.rotate_y(angle);
        }
        self.decoration.rotate_y(-angle * 0.25);
    }

    pub fn update_world_transforms(&mut self) {
        let root = Transform::new();
        self.primary.update_world_transforms(&root);
        if let Some(model) = &mut self.model {
            model.update_world_transforms(&root);
        }
        self.lights.update_world_transforms(&root);
        self.decoration.update_world_transforms(&root);
    }

    pub fn write_to_buffers(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        binder: &mut MaterialBinder,
        visibility: Visibility,
    ) {
        for node in self.visible_mut(visibility) {
            node.write_to_buffers(device, queue, binder);
        }
        self.decoration.write_to_buffers(device, queue, binder);
    }

    pub fn drawables(&self, visibility: Visibility) -> Vec<Drawable<'_>> {
        let mut out = Vec::new();
        for node in self.visible(visibility) {
            node.collect_drawables(&mut out);
        }
        self.decoration.collect_drawables(&mut out);
        out
    }

    pub fn lights(&self) -> Vec<(&Light, &Transform)> {
        let mut out = Vec::new();
        self.lights.collect_lights(&mut out);
        out
    }
}

impl Default for SceneGraph {
    fn default() -> Self {
        Self::new()
    }
}
