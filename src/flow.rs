//! Application event loop.
//!
//! [`run`] opens a window and drives a [`Viewer`] from winit events. Every
//! executed frame follows the same order:
//!
//! 1. apply a debounced resize (surface, projection, render target, uniforms)
//! 2. attach finished background loads (model swap, environment)
//! 3. skip the rest unless the 30 fps throttle lets the frame through
//! 4. update pointer look, camera and auto-rotation, then world transforms
//! 5. upload and record the pass list, present

use std::{iter, path::PathBuf, sync::Arc};

use cgmath::{Deg, Rad};
use instant::{Duration, Instant};
use log::{debug, error, info, warn};
use winit::{
    application::ApplicationHandler,
    event::{ElementState, KeyEvent, MouseScrollDelta, StartCause, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::{Key, NamedKey},
    window::{Window, WindowId},
};

use crate::{
    assigner::{
        AssignMode, AssignReport, KeywordSet, apply_palette, apply_uniform, boost_dark_materials,
    },
    camera::{Camera, PointerLook, Projection},
    context::Context,
    data_structures::{
        material::{ImageMap, MaterialDescriptor, Theme},
        scene_graph::{SceneGraph, SceneNode},
    },
    input::command_for_key,
    render::Renderer,
    resources::{
        AssetLoader, DisplayTransform, center_model,
        environment::synthetic_environment,
        queue::{Finished, LoadQueue, LoadSlot},
        scale_to_fit,
    },
    settings::{Change, Command, DOT_SIZE_STEP, MaterialChoice, RenderSettings},
    timing::{FrameThrottle, ResizeDebounce},
};

/// Start-up configuration. Everything the user may change while running lives
/// in [`RenderSettings`] instead.
#[derive(Clone, Debug)]
pub struct ViewerConfig {
    pub title: String,
    /// Relative locators are resolved against this directory.
    pub asset_root: PathBuf,
    /// Files making up the model, grouped into one node when there are
    /// several.
    pub model: Vec<String>,
    pub environment: Option<String>,
    pub settings: RenderSettings,
    pub clear_colour: wgpu::Color,
    pub target_fps: u32,
    pub resize_debounce: Duration,
    pub camera_distance: f32,
    pub fovy: Deg<f32>,
    /// Radians about Y per executed frame.
    pub auto_rotate_speed: f32,
    pub pointer_smoothing: f32,
    pub pointer_max_angle: Rad<f32>,
    pub display: DisplayTransform,
    /// Largest extent of a loaded model after placement. `None` keeps the
    /// display scale alone.
    pub fit_size: Option<f32>,
    pub keywords: KeywordSet,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        let mut settings = RenderSettings::default();
        settings.set_render_scale(0.75);
        Self {
            title: "dither-view".to_string(),
            asset_root: PathBuf::from("./assets"),
            model: Vec::new(),
            environment: None,
            settings,
            clear_colour: wgpu::Color {
                r: 0.0,
                g: 0.0,
                b: 0.0,
                a: 1.0,
            },
            target_fps: 30,
            resize_debounce: Duration::from_millis(100),
            camera_distance: 3.0,
            fovy: Deg(75.0),
            auto_rotate_speed: 0.008,
            pointer_smoothing: 0.05,
            pointer_max_angle: Rad(0.35),
            display: DisplayTransform::default(),
            fit_size: Some(2.0),
            keywords: KeywordSet::default(),
        }
    }
}

impl ViewerConfig {
    /// `[model[,part...]] [environment]`, both optional. Anything else is
    /// ignored with a warning.
    pub fn from_args<I>(args: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let mut config = Self::default();
        let mut args = args.into_iter();
        config.model = args
            .next()
            .map(|m| {
                m.split(',')
                    .filter(|part| !part.is_empty())
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default();
        config.environment = args.next();
        let rest: Vec<String> = args.collect();
        if !rest.is_empty() {
            warn!("Ignoring extra arguments {:?}", rest);
        }
        config
    }
}

/// Centre and fit a freshly loaded model. Runs on the loader thread.
pub fn place_model(node: &mut SceneNode, display: &DisplayTransform, fit_size: Option<f32>) {
    if let Err(e) = center_model(node, display) {
        warn!("Could not centre {:?}: {}", node.name, e);
    }
    if let Some(size) = fit_size {
        if let Err(e) = scale_to_fit(node, size) {
            warn!("Keeping the display scale for {:?}: {}", node.name, e);
        }
    }
}

/// Colour `node` the way `choice` says, with the theme and environment
/// current at the time of the call.
pub fn dress_model(
    node: &mut SceneNode,
    choice: MaterialChoice,
    theme: Theme,
    environment: Option<Arc<ImageMap>>,
    keywords: &KeywordSet,
) -> AssignReport {
    match choice {
        MaterialChoice::Theme => apply_palette(
            node,
            &theme.palette(environment),
            &AssignMode::NameMatch(keywords.clone()),
        ),
        MaterialChoice::Palette(named) => {
            apply_palette(node, &named.palette(), &AssignMode::Sequential)
        }
        MaterialChoice::Uniform(hex) => AssignReport {
            assigned: apply_uniform(node, &MaterialDescriptor::from_hex(hex)),
            ..Default::default()
        },
    }
}

pub(crate) enum Loaded {
    Model(SceneNode),
    Environment(Arc<ImageMap>),
}

/// Scene-side state a finished load lands in.
pub(crate) struct Attachments<'a> {
    pub scene: &'a mut SceneGraph,
    pub environment: &'a mut Option<Arc<ImageMap>>,
    pub settings: &'a RenderSettings,
    pub keywords: &'a KeywordSet,
}

impl Attachments<'_> {
    /// Recolour the attached model, if any. Returns whether anything changed.
    fn recolour(&mut self) -> bool {
        let environment = self.environment.clone();
        match self.scene.model_mut() {
            Some(model) => {
                let report = dress_model(
                    model,
                    self.settings.materials,
                    self.settings.theme,
                    environment,
                    self.keywords,
                );
                info!("Applied {:?}: {:?}", self.settings.materials, report);
                true
            }
            None => false,
        }
    }

    /// Attach one finished load. Models are coloured here, on the render
    /// thread, so they always pick up the latest theme and environment.
    /// Returns whether materials changed.
    fn attach(&mut self, finished: Finished<Loaded>) -> bool {
        match (finished.slot, finished.result) {
            (_, Ok(Loaded::Model(mut node))) => {
                let report = dress_model(
                    &mut node,
                    self.settings.materials,
                    self.settings.theme,
                    self.environment.clone(),
                    self.keywords,
                );
                info!(
                    "Showing {:?} ({} meshes, {:?})",
                    node.name,
                    node.mesh_count(),
                    report
                );
                // detach and attach happen between two frames
                let previous = self.scene.swap_model(Some(node));
                drop(previous);
                true
            }
            (_, Ok(Loaded::Environment(map))) => {
                *self.environment = Some(map);
                self.recolour()
            }
            (LoadSlot::Model, Err(e)) => {
                error!("Could not load model, keeping the cube: {}", e);
                false
            }
            (LoadSlot::Environment, Err(e)) => {
                warn!("Using synthetic environment: {}", e);
                *self.environment = Some(Arc::new(synthetic_environment()));
                self.recolour()
            }
        }
    }
}

pub struct Viewer {
    ctx: Context,
    renderer: Renderer,
    scene: SceneGraph,
    settings: RenderSettings,
    camera: Camera,
    projection: Projection,
    look: PointerLook,
    throttle: FrameThrottle,
    debounce: ResizeDebounce,
    loader: AssetLoader,
    loads: LoadQueue<Loaded>,
    environment: Option<Arc<ImageMap>>,
    config: ViewerConfig,
    started: Instant,
}

impl Viewer {
    pub async fn new(
        window: Arc<Window>,
        config: &ViewerConfig,
        runtime: &tokio::runtime::Handle,
    ) -> anyhow::Result<Self> {
        let ctx = Context::new(window).await?;
        let [width, height] = ctx.size();
        let camera = Camera::new(config.camera_distance);
        let projection = Projection::new(width, height, config.fovy, 0.1, 1000.0);
        let settings = config.settings.clone();
        let renderer = Renderer::new(
            &ctx.device,
            &ctx.queue,
            ctx.format(),
            ctx.size(),
            &settings,
            &camera,
            &projection,
            config.clear_colour,
        )?;

        let mut viewer = Self {
            ctx,
            renderer,
            scene: SceneGraph::new(),
            settings,
            camera,
            projection,
            look: PointerLook::new(config.pointer_smoothing, config.pointer_max_angle),
            throttle: FrameThrottle::new(config.target_fps),
            debounce: ResizeDebounce::new(config.resize_debounce),
            loader: AssetLoader::new(&config.asset_root),
            loads: LoadQueue::new(),
            environment: None,
            config: config.clone(),
            started: Instant::now(),
        };

        match config.environment.clone() {
            Some(locator) => viewer.request_environment(runtime, locator),
            None => viewer.environment = Some(Arc::new(synthetic_environment())),
        }
        if !config.model.is_empty() {
            viewer.request_model(runtime, config.model.clone());
        } else {
            info!("No model given, showing the cube");
        }
        Ok(viewer)
    }

    pub fn window(&self) -> &Window {
        &self.ctx.window
    }

    fn attachments(&mut self) -> Attachments<'_> {
        Attachments {
            scene: &mut self.scene,
            environment: &mut self.environment,
            settings: &self.settings,
            keywords: &self.config.keywords,
        }
    }

    /// Load `locators` as one model. A newer request replaces this one.
    pub fn request_model(&mut self, runtime: &tokio::runtime::Handle, locators: Vec<String>) {
        let loader = self.loader.clone();
        let display = self.config.display;
        let fit_size = self.config.fit_size;
        let generation = self.loads.request(runtime, LoadSlot::Model, async move {
            let parts: Vec<&str> = locators.iter().map(String::as_str).collect();
            let mut node = loader.load_parts(&parts).await?;
            place_model(&mut node, &display, fit_size);
            Ok(Loaded::Model(node))
        });
        info!("Loading model (request {})", generation);
    }

    pub fn request_environment(&mut self, runtime: &tokio::runtime::Handle, locator: String) {
        let loader = self.loader.clone();
        self.loads.request(runtime, LoadSlot::Environment, async move {
            let map = loader.environment_or_synthetic(Some(locator.as_str())).await;
            Ok(Loaded::Environment(map))
        });
    }

    fn receive_loads(&mut self) {
        for finished in self.loads.drain() {
            if self.attachments().attach(finished) {
                self.renderer.release_unused(&self.scene);
            }
        }
    }

    fn recolour(&mut self) {
        if self.attachments().recolour() {
            self.renderer.release_unused(&self.scene);
        }
    }

    pub fn handle_command(&mut self, command: Command) {
        match self.settings.apply(command, self.scene.has_model()) {
            Change::Materials => self.recolour(),
            Change::Boost => {
                let changed = if self.scene.has_model() {
                    self.scene.model_mut().map_or(0, boost_dark_materials)
                } else {
                    boost_dark_materials(self.scene.primary_mut())
                };
                info!("Brightened {} dark materials", changed);
                self.renderer.release_unused(&self.scene);
            }
            Change::RenderScale => {
                if let Err(e) = self
                    .renderer
                    .set_render_scale(&self.ctx.device, self.settings.render_scale())
                {
                    error!("Could not resize the render target: {}", e);
                }
            }
            Change::Nothing
            | Change::Visibility
            | Change::Passes
            | Change::DotSize
            | Change::Animation => {}
        }
    }

    /// Apply a new window size to every size-dependent resource at once.
    fn apply_resize(&mut self, width: u32, height: u32) {
        if !self.ctx.resize(width, height) {
            debug!("Ignoring resize to {}x{}", width, height);
            return;
        }
        self.projection.resize(width, height);
        if let Err(e) = self.renderer.resize(&self.ctx.device, [width, height]) {
            error!("Could not resize the render target: {}", e);
        }
    }

    fn update(&mut self) {
        self.look.update();
        self.look.apply(&mut self.camera);
        if self.settings.auto_rotate {
            self.scene
                .advance_rotation(self.settings.visibility, self.config.auto_rotate_speed);
        }
        self.scene.update_world_transforms();
    }

    fn render(&mut self) -> Result<(), wgpu::SurfaceError> {
        let output = self.ctx.surface.get_current_texture()?;
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let time = self.started.elapsed().as_secs_f32();
        self.renderer.prepare(
            &self.ctx.device,
            &self.ctx.queue,
            &mut self.scene,
            &self.settings,
            &self.camera,
            &self.projection,
            time,
        );

        let mut encoder = self
            .ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Render Encoder"),
            });
        self.renderer
            .render(&mut encoder, &view, &self.scene, &self.settings);
        self.ctx.queue.submit(iter::once(encoder.finish()));
        self.ctx.window.pre_present_notify();
        output.present();
        Ok(())
    }

    /// One turn of the frame loop. Returns when the next frame is due if the
    /// throttle held this one back.
    fn redraw(&mut self) -> Option<Instant> {
        let now = Instant::now();
        if let Some((width, height)) = self.debounce.take_ready(now) {
            self.apply_resize(width, height);
        }
        self.receive_loads();
        if !self.throttle.ready(now) {
            return self.throttle.next_frame_at();
        }

        self.update();
        match self.render() {
            Ok(()) => {}
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                let size = self.ctx.window.inner_size();
                if size.width == self.ctx.config.width && size.height == self.ctx.config.height {
                    self.ctx.reconfigure();
                } else {
                    self.apply_resize(size.width, size.height);
                }
            }
            Err(e) => error!("Unable to render {}", e),
        }
        None
    }
}

pub struct App {
    async_runtime: tokio::runtime::Runtime,
    config: ViewerConfig,
    viewer: Option<Viewer>,
    error: Option<anyhow::Error>,
}

impl App {
    pub fn new(config: ViewerConfig) -> anyhow::Result<Self> {
        Ok(Self {
            async_runtime: tokio::runtime::Runtime::new()?,
            config,
            viewer: None,
            error: None,
        })
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, e: anyhow::Error) {
        error!("{:#}", e);
        self.error = Some(e);
        event_loop.exit();
    }
}

impl ApplicationHandler for App {
    fn new_events(&mut self, _event_loop: &ActiveEventLoop, cause: StartCause) {
        if let StartCause::ResumeTimeReached { .. } = cause {
            if let Some(viewer) = &self.viewer {
                viewer.window().request_redraw();
            }
        }
    }

    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.viewer.is_some() {
            return;
        }
        let attributes = Window::default_attributes().with_title(self.config.title.clone());
        let window = match event_loop.create_window(attributes) {
            Ok(window) => Arc::new(window),
            Err(e) => return self.fail(event_loop, e.into()),
        };
        let handle = self.async_runtime.handle().clone();
        match self
            .async_runtime
            .block_on(Viewer::new(window, &self.config, &handle))
        {
            Ok(viewer) => {
                viewer.window().request_redraw();
                self.viewer = Some(viewer);
            }
            Err(e) => self.fail(event_loop, e),
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        let Some(viewer) = &mut self.viewer else {
            return;
        };

        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::Resized(size) => {
                viewer
                    .debounce
                    .schedule((size.width, size.height), Instant::now());
            }
            WindowEvent::CursorMoved { position, .. } => {
                let [width, height] = viewer.ctx.size();
                viewer.look.on_pointer_move(position.x, position.y, width, height);
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let steps = match delta {
                    MouseScrollDelta::LineDelta(_, y) => y,
                    MouseScrollDelta::PixelDelta(p) => (p.y / 40.0) as f32,
                };
                if steps != 0.0 {
                    // the wheel drags the dot size like a slider
                    let size = viewer.settings.dot_size() + steps * DOT_SIZE_STEP;
                    viewer.handle_command(Command::SetDotSize(size));
                }
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        logical_key,
                        state: ElementState::Pressed,
                        ..
                    },
                ..
            } => {
                if logical_key == Key::Named(NamedKey::Escape) {
                    event_loop.exit();
                } else if let Some(command) = command_for_key(&logical_key) {
                    viewer.handle_command(command);
                }
            }
            WindowEvent::DroppedFile(path) => {
                let locator = path.to_string_lossy().into_owned();
                viewer.request_model(self.async_runtime.handle(), vec![locator]);
            }
            WindowEvent::RedrawRequested => match viewer.redraw() {
                Some(next) => event_loop.set_control_flow(ControlFlow::WaitUntil(next)),
                None => {
                    event_loop.set_control_flow(ControlFlow::Wait);
                    viewer.window().request_redraw();
                }
            },
            _ => {}
        }
    }
}

pub fn run(config: ViewerConfig) -> anyhow::Result<()> {
    if let Err(e) = env_logger::try_init() {
        println!("Warning: Could not initialize logger: {}", e);
    };

    let event_loop = EventLoop::new()?;
    let mut app = App::new(config)?;
    event_loop.run_app(&mut app)?;

    match app.error.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        data_structures::{
            material::{Material, MaterialDescriptor, Palette},
            mesh::{Geometry, MeshData},
        },
        settings::PaletteChoice,
    };

    #[test]
    fn arguments_fill_model_then_environment() {
        let config = ViewerConfig::from_args(["ship.glb".to_string(), "sky.hdr".to_string()]);
        assert_eq!(config.model, ["ship.glb"]);
        assert_eq!(config.environment.as_deref(), Some("sky.hdr"));

        let parts = ViewerConfig::from_args(["hull.glb,,wings.glb".to_string()]);
        assert_eq!(parts.model, ["hull.glb", "wings.glb"]);
        assert_eq!(parts.environment, None);

        let bare = ViewerConfig::from_args(Vec::<String>::new());
        assert!(bare.model.is_empty());
        assert_eq!(bare.target_fps, 30);
        assert_eq!(bare.resize_debounce, Duration::from_millis(100));
        assert_eq!(bare.settings.render_scale(), 0.75);
    }

    fn ship() -> SceneNode {
        let material = Arc::new(Material::new("m", MaterialDescriptor::from_hex(0x111111)));
        let mut cube = Geometry::cube(4.0);
        for v in &mut cube.vertices {
            v.position[2] += 7.0;
        }
        let mesh = |name: &str| {
            SceneNode::mesh(
                Some(name.to_string()),
                MeshData::new(Arc::new(cube.clone()), material.clone()),
            )
        };
        SceneNode::group("model")
            .with_child(mesh("hull"))
            .with_child(mesh("cockpit_glass"))
    }

    fn descriptors(node: &SceneNode) -> Vec<(Option<String>, MaterialDescriptor)> {
        let mut seen = Vec::new();
        node.for_each_mesh(&mut |name, mesh| {
            seen.push((name.map(str::to_string), mesh.material().descriptor.clone()))
        });
        seen
    }

    fn finished_model(node: SceneNode) -> Finished<Loaded> {
        Finished {
            slot: LoadSlot::Model,
            generation: 1,
            result: Ok(Loaded::Model(node)),
        }
    }

    #[test]
    fn placed_models_are_centred_and_fitted() {
        let mut node = ship();
        place_model(&mut node, &DisplayTransform::default(), Some(2.0));

        let bounds = node.bounds().unwrap();
        assert!((bounds.max_extent() - 2.0).abs() < 1e-4);
        assert!(bounds.center().x.abs() < 1e-4);
        // placement leaves materials alone
        assert!(
            descriptors(&node)
                .iter()
                .all(|(_, d)| *d == MaterialDescriptor::from_hex(0x111111))
        );
    }

    #[test]
    fn model_attached_after_the_environment_reflects_it() {
        let mut scene = SceneGraph::new();
        let map = Arc::new(synthetic_environment());
        let mut environment = Some(map.clone());
        let settings = RenderSettings::default();
        let keywords = KeywordSet::default();
        let mut attachments = Attachments {
            scene: &mut scene,
            environment: &mut environment,
            settings: &settings,
            keywords: &keywords,
        };

        assert!(attachments.attach(finished_model(ship())));

        let seen = descriptors(scene.model().unwrap());
        assert_eq!(seen[1].0.as_deref(), Some("cockpit_glass"));
        let reflection = seen[1].1.reflection_map.as_ref().unwrap();
        assert!(Arc::ptr_eq(reflection, &map));
        assert_eq!(seen[0].1, Palette::dark_matte().entries[0]);
    }

    #[test]
    fn environment_arriving_later_recolours_the_model() {
        let mut scene = SceneGraph::new();
        let mut environment = None;
        let settings = RenderSettings::default();
        let keywords = KeywordSet::default();
        let mut attachments = Attachments {
            scene: &mut scene,
            environment: &mut environment,
            settings: &settings,
            keywords: &keywords,
        };
        assert!(attachments.attach(finished_model(ship())));

        let map = Arc::new(synthetic_environment());
        assert!(attachments.attach(Finished {
            slot: LoadSlot::Environment,
            generation: 1,
            result: Ok(Loaded::Environment(map.clone())),
        }));

        let seen = descriptors(scene.model().unwrap());
        assert!(Arc::ptr_eq(seen[1].1.reflection_map.as_ref().unwrap(), &map));
        assert!(Arc::ptr_eq(environment.as_ref().unwrap(), &map));
    }

    #[test]
    fn settings_changed_during_a_load_apply_at_attach_time() {
        let keywords = KeywordSet::default();
        let map = Arc::new(synthetic_environment());

        let mut settings = RenderSettings::default();
        settings.apply(Command::ToggleTheme, false);
        let mut scene = SceneGraph::new();
        let mut environment = Some(map.clone());
        Attachments {
            scene: &mut scene,
            environment: &mut environment,
            settings: &settings,
            keywords: &keywords,
        }
        .attach(finished_model(ship()));
        let light = Theme::LightMetallic.palette(Some(map.clone()));
        let seen = descriptors(scene.model().unwrap());
        assert_eq!(seen[0].1, light.entries[0]);
        assert_eq!(seen[1].1, light.special);

        settings.apply(Command::ApplyPalette(PaletteChoice::HighContrast), false);
        let mut scene = SceneGraph::new();
        Attachments {
            scene: &mut scene,
            environment: &mut environment,
            settings: &settings,
            keywords: &keywords,
        }
        .attach(finished_model(ship()));
        let varied = PaletteChoice::HighContrast.palette();
        let seen = descriptors(scene.model().unwrap());
        assert_eq!(seen[0].1, varied.entries[0]);
        assert_eq!(seen[1].1, varied.entries[1]);
    }

    #[test]
    fn uniform_choice_paints_every_mesh() {
        let mut node = ship();
        let report = dress_model(
            &mut node,
            MaterialChoice::Uniform(0x888888),
            Theme::DarkMatte,
            None,
            &KeywordSet::default(),
        );
        assert_eq!(report.assigned, 2);
        assert_eq!(report.special, 0);
        assert!(
            descriptors(&node)
                .iter()
                .all(|(_, d)| *d == MaterialDescriptor::from_hex(0x888888))
        );
    }

    #[test]
    fn failed_model_load_keeps_the_cube() {
        let mut scene = SceneGraph::new();
        let mut environment = None;
        let settings = RenderSettings::default();
        let keywords = KeywordSet::default();
        let changed = Attachments {
            scene: &mut scene,
            environment: &mut environment,
            settings: &settings,
            keywords: &keywords,
        }
        .attach(Finished {
            slot: LoadSlot::Model,
            generation: 1,
            result: Err(crate::resources::LoadError::Malformed("bad".to_string())),
        });
        assert!(!changed);
        assert!(!scene.has_model());
    }
}
