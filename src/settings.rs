//! Runtime render settings and the commands that change them.
//!
//! All mutable viewer state that user input may touch lives in
//! [`RenderSettings`]. It is passed into every frame update and only ever
//! changed through [`RenderSettings::apply`].

use std::ops::RangeInclusive;

use log::{debug, info};

use crate::data_structures::{
    material::{Palette, Theme},
    scene_graph::Visibility,
};

pub const DOT_SIZE_RANGE: RangeInclusive<f32> = 0.1..=10.0;
pub const DEFAULT_DOT_SIZE: f32 = 1.0;
/// Slider step, also used by the nudge keys.
pub const DOT_SIZE_STEP: f32 = 0.1;
pub const RENDER_SCALE_RANGE: RangeInclusive<f32> = 0.1..=1.0;
/// The stops the render scale cycles through.
pub const RENDER_SCALE_STOPS: [f32; 3] = [1.0, 0.75, 0.5];

fn clamp_into(value: f32, current: f32, range: &RangeInclusive<f32>, what: &str) -> f32 {
    if value.is_nan() {
        debug!("ignoring NaN {what}");
        return current;
    }
    let clamped = value.clamp(*range.start(), *range.end());
    if clamped != value {
        debug!("{what} {value} clamped to {clamped}");
    }
    clamped
}

/// Named palettes handed out in mesh order, ignoring mesh names.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PaletteChoice {
    /// Ten strongly differing colours.
    HighContrast,
    /// Colours chosen to land on or between the three dither levels.
    ThreeLevel,
    /// Mid greys, the look models get on load in the original app.
    DitheringOptimized,
}

impl PaletteChoice {
    pub fn palette(self) -> Palette {
        match self {
            PaletteChoice::HighContrast => Palette::high_contrast(),
            PaletteChoice::ThreeLevel => Palette::three_level(),
            PaletteChoice::DitheringOptimized => Palette::dithering_optimized(),
        }
    }
}

/// How the loaded model is coloured. Applied again to every newly attached
/// model.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MaterialChoice {
    /// The theme palette, special finish for name-matched parts.
    #[default]
    Theme,
    Palette(PaletteChoice),
    /// One colour for every mesh.
    Uniform(u32),
}

#[derive(Clone, Debug, PartialEq)]
pub struct RenderSettings {
    /// Draw the scene straight to the surface, skipping the dither pass.
    pub bypass: bool,
    pub theme: Theme,
    pub materials: MaterialChoice,
    pub visibility: Visibility,
    /// Advance the dither pattern with time.
    pub animate: bool,
    pub auto_rotate: bool,
    dot_size: f32,
    render_scale: f32,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            bypass: false,
            theme: Theme::default(),
            materials: MaterialChoice::default(),
            visibility: Visibility::default(),
            animate: true,
            auto_rotate: true,
            dot_size: DEFAULT_DOT_SIZE,
            render_scale: 1.0,
        }
    }
}

impl RenderSettings {
    pub fn dot_size(&self) -> f32 {
        self.dot_size
    }

    pub fn render_scale(&self) -> f32 {
        self.render_scale
    }

    /// Stores the value clamped into [0.1, 10].
    pub fn set_dot_size(&mut self, dot_size: f32) -> f32 {
        self.dot_size = clamp_into(dot_size, self.dot_size, &DOT_SIZE_RANGE, "dot size");
        self.dot_size
    }

    /// Stores the value clamped into [0.1, 1].
    pub fn set_render_scale(&mut self, scale: f32) -> f32 {
        self.render_scale = clamp_into(scale, self.render_scale, &RENDER_SCALE_RANGE, "render scale");
        self.render_scale
    }

    pub fn apply(&mut self, command: Command, has_model: bool) -> Change {
        match command {
            Command::SetVisibility(Visibility::Model) if !has_model => {
                info!("no model loaded yet, showing the cube");
                Change::Nothing
            }
            Command::SetVisibility(visibility) => {
                if self.visibility == visibility {
                    return Change::Nothing;
                }
                info!("visibility: {visibility:?}");
                self.visibility = visibility;
                Change::Visibility
            }
            Command::TogglePostProcessing => {
                self.bypass = !self.bypass;
                info!("post-processing {}", if self.bypass { "off" } else { "on" });
                Change::Passes
            }
            Command::ShowOriginalColors => {
                if self.bypass {
                    return Change::Nothing;
                }
                info!("showing original colours");
                self.bypass = true;
                Change::Passes
            }
            Command::ToggleTheme => {
                self.theme = self.theme.toggled();
                self.materials = MaterialChoice::Theme;
                info!("theme: {:?}", self.theme);
                Change::Materials
            }
            Command::ApplyPalette(choice) => {
                self.materials_change(MaterialChoice::Palette(choice), has_model)
            }
            Command::ApplyUniformColor(hex) => {
                self.materials_change(MaterialChoice::Uniform(hex), has_model)
            }
            Command::SetDotSize(size) => self.dot_size_change(size),
            Command::NudgeDotSize(delta) => self.dot_size_change(self.dot_size + delta),
            Command::ResetDotSize => self.dot_size_change(DEFAULT_DOT_SIZE),
            Command::CycleRenderScale => {
                let next = RENDER_SCALE_STOPS
                    .iter()
                    .position(|&s| (s - self.render_scale).abs() < 1e-6)
                    .map_or(RENDER_SCALE_STOPS[0], |i| {
                        RENDER_SCALE_STOPS[(i + 1) % RENDER_SCALE_STOPS.len()]
                    });
                self.render_scale_change(next)
            }
            Command::BoostDarkMaterials => Change::Boost,
            Command::ToggleAnimation => {
                self.animate = !self.animate;
                Change::Animation
            }
            Command::ToggleAutoRotate => {
                self.auto_rotate = !self.auto_rotate;
                Change::Nothing
            }
        }
    }

    fn dot_size_change(&mut self, size: f32) -> Change {
        let before = self.dot_size;
        if self.set_dot_size(size) == before {
            return Change::Nothing;
        }
        info!("dot size: {:.1}", self.dot_size);
        Change::DotSize
    }

    fn materials_change(&mut self, choice: MaterialChoice, has_model: bool) -> Change {
        self.materials = choice;
        if !has_model {
            info!("no model loaded yet, {choice:?} applies to the next one");
            return Change::Nothing;
        }
        info!("materials: {choice:?}");
        Change::Materials
    }

    fn render_scale_change(&mut self, scale: f32) -> Change {
        let before = self.render_scale;
        if self.set_render_scale(scale) == before {
            return Change::Nothing;
        }
        info!("render scale: {:.2}", self.render_scale);
        Change::RenderScale
    }
}

/// Discrete user requests, produced by [`crate::input`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Command {
    SetVisibility(Visibility),
    TogglePostProcessing,
    ShowOriginalColors,
    ToggleTheme,
    ApplyPalette(PaletteChoice),
    /// Give every mesh this `0xRRGGBB` colour.
    ApplyUniformColor(u32),
    SetDotSize(f32),
    NudgeDotSize(f32),
    ResetDotSize,
    CycleRenderScale,
    BoostDarkMaterials,
    ToggleAnimation,
    ToggleAutoRotate,
}

/// What the viewer has to redo after a command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Change {
    Nothing,
    Visibility,
    /// The pass list changed (bypass flag).
    Passes,
    /// The model has to be recoloured from [`RenderSettings::materials`].
    Materials,
    /// Only the dither uniform changes.
    DotSize,
    /// The render target and resolution uniform have to be resized.
    RenderScale,
    /// Dark materials have to be brightened.
    Boost,
    Animation,
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn dot_size_is_clamped_on_every_write() {
        let mut settings = RenderSettings::default();
        assert_eq!(settings.set_dot_size(15.0), 10.0);
        assert_eq!(settings.dot_size(), 10.0);
        assert_eq!(settings.set_dot_size(0.0), 0.1);
        assert_eq!(settings.set_dot_size(f32::NAN), 0.1);
        assert_eq!(settings.set_dot_size(f32::INFINITY), 10.0);
    }

    #[test]
    fn out_of_range_dot_size_command_is_clamped_not_rejected() {
        let mut settings = RenderSettings::default();
        assert_eq!(settings.apply(Command::SetDotSize(15.0), true), Change::DotSize);
        assert_eq!(settings.dot_size(), 10.0);
        assert_eq!(settings.apply(Command::SetDotSize(15.0), true), Change::Nothing);
    }

    #[test]
    fn nudges_step_by_a_tenth() {
        let mut settings = RenderSettings::default();
        settings.apply(Command::NudgeDotSize(DOT_SIZE_STEP), true);
        assert_relative_eq!(settings.dot_size(), 1.1);
        settings.apply(Command::ResetDotSize, true);
        assert_eq!(settings.dot_size(), DEFAULT_DOT_SIZE);
    }

    #[test]
    fn render_scale_is_clamped_and_cycles() {
        let mut settings = RenderSettings::default();
        assert_eq!(settings.set_render_scale(2.0), 1.0);
        assert_eq!(settings.set_render_scale(0.01), 0.1);

        settings.set_render_scale(1.0);
        assert_eq!(settings.apply(Command::CycleRenderScale, true), Change::RenderScale);
        assert_eq!(settings.render_scale(), 0.75);
        settings.apply(Command::CycleRenderScale, true);
        assert_eq!(settings.render_scale(), 0.5);
        settings.apply(Command::CycleRenderScale, true);
        assert_eq!(settings.render_scale(), 1.0);

        settings.set_render_scale(0.3);
        settings.apply(Command::CycleRenderScale, true);
        assert_eq!(settings.render_scale(), 1.0);
    }

    #[test]
    fn model_visibility_needs_a_model() {
        let mut settings = RenderSettings::default();
        assert_eq!(
            settings.apply(Command::SetVisibility(Visibility::Primary), false),
            Change::Visibility
        );
        assert_eq!(
            settings.apply(Command::SetVisibility(Visibility::Model), false),
            Change::Nothing
        );
        assert_eq!(settings.visibility, Visibility::Primary);
        assert_eq!(
            settings.apply(Command::SetVisibility(Visibility::Model), true),
            Change::Visibility
        );
    }

    #[test]
    fn both_slots_can_be_shown_without_a_model() {
        let mut settings = RenderSettings {
            visibility: Visibility::Primary,
            ..Default::default()
        };
        assert_eq!(
            settings.apply(Command::SetVisibility(Visibility::Both), false),
            Change::Visibility
        );
        assert_eq!(settings.visibility, Visibility::Both);
    }

    #[test]
    fn original_colours_force_direct_mode() {
        let mut settings = RenderSettings::default();
        assert_eq!(settings.apply(Command::ShowOriginalColors, true), Change::Passes);
        assert!(settings.bypass);
        assert_eq!(settings.apply(Command::ShowOriginalColors, true), Change::Nothing);
        settings.apply(Command::TogglePostProcessing, true);
        assert!(!settings.bypass);
    }

    #[test]
    fn theme_toggles() {
        let mut settings = RenderSettings::default();
        assert_eq!(settings.apply(Command::ToggleTheme, true), Change::Materials);
        assert_eq!(settings.theme, Theme::LightMetallic);
    }

    #[test]
    fn palette_commands_are_remembered_for_the_next_model() {
        let mut settings = RenderSettings::default();
        let varied = Command::ApplyPalette(PaletteChoice::HighContrast);
        assert_eq!(settings.apply(varied, false), Change::Nothing);
        assert_eq!(
            settings.materials,
            MaterialChoice::Palette(PaletteChoice::HighContrast)
        );

        assert_eq!(
            settings.apply(Command::ApplyUniformColor(0x888888), true),
            Change::Materials
        );
        assert_eq!(settings.materials, MaterialChoice::Uniform(0x888888));

        // a theme toggle goes back to theme colouring
        settings.apply(Command::ToggleTheme, true);
        assert_eq!(settings.materials, MaterialChoice::Theme);
    }

    #[test]
    fn palette_choices_name_their_palettes() {
        assert_eq!(PaletteChoice::HighContrast.palette().name, "high-contrast");
        assert_eq!(PaletteChoice::ThreeLevel.palette().len(), 7);
        assert_eq!(PaletteChoice::DitheringOptimized.palette().len(), 8);
    }
}
