//! dither-ngin
//!
//! A small wgpu viewer that renders a glTF model, or a placeholder cube, into
//! an off-screen target and composites it onto the window through an animated
//! ordered-dithering shader. The dot size, render scale and theme can be
//! changed while running.
//!
//! High-level modules
//! - `assigner`: palette assignment over a model's meshes
//! - `camera`: orbit camera, projection, smoothed pointer look
//! - `context`: window, surface, device and queue
//! - `data_structures`: transforms, geometry, materials, textures, scene graph
//! - `dither`: CPU version of the dither function and its uniforms
//! - `flow`: the winit event loop
//! - `input`: key to command mapping
//! - `pipelines`: wgpu pipelines and their WGSL shaders
//! - `render`: pass list, render target sizing and the renderer
//! - `resources`: glTF and HDR loading, the background load queue
//! - `settings`: runtime settings and the commands that change them
//! - `timing`: frame throttle and resize debounce
//!

pub mod assigner;
pub mod camera;
pub mod context;
pub mod data_structures;
pub mod dither;
pub mod flow;
pub mod input;
pub mod pipelines;
pub mod render;
pub mod resources;
pub mod settings;
pub mod timing;
