//! Scene data: transforms, geometry, materials, textures and the scene graph.
//!
//! - `transform` holds local/world transforms and their GPU form
//! - `bounds` is the axis-aligned bounding box used for placement
//! - `mesh` contains triangle geometry, vertices and per-mesh GPU buffers
//! - `wireframe` is line geometry for the decorative icosahedron
//! - `material` has descriptors, palettes, themes and material bind groups
//! - `texture` wraps GPU textures and render targets
//! - `scene_graph` enables hierarchical scene organization

pub mod bounds;
pub mod material;
pub mod mesh;
pub mod scene_graph;
pub mod texture;
pub mod transform;
pub mod wireframe;
