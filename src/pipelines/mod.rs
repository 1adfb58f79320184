//! Render pipelines and their WGSL shaders.
//!
//! - `scene`: lit meshes with optional normal and reflection maps
//! - `wireframe`: unlit line lists
//! - `dither`: the full-viewport ordered dither over the scene texture
//! - `light`: light uniform and bind group shared by the scene pipeline

pub mod basic;
pub mod dither;
pub mod light;
pub mod scene;
pub mod wireframe;
