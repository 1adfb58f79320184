//! Keyboard to [`Command`] mapping.

use winit::keyboard::{Key, NamedKey};

use crate::{
    data_structures::scene_graph::Visibility,
    settings::{Command, DOT_SIZE_STEP, PaletteChoice},
};

/// Colour of the single-colour override.
pub const CUSTOM_COLOUR: u32 = 0x888888;

pub fn command_for_key(key: &Key) -> Option<Command> {
    match key {
        Key::Character(c) => command_for_char(c.as_str()),
        Key::Named(NamedKey::Space) => Some(Command::ToggleAutoRotate),
        _ => None,
    }
}

fn command_for_char(c: &str) -> Option<Command> {
    let command = match c.to_ascii_lowercase().as_str() {
        "1" => Command::SetVisibility(Visibility::Primary),
        "2" => Command::SetVisibility(Visibility::Model),
        "3" => Command::SetVisibility(Visibility::Both),
        "[" => Command::NudgeDotSize(-DOT_SIZE_STEP),
        "]" => Command::NudgeDotSize(DOT_SIZE_STEP),
        "0" => Command::ResetDotSize,
        "p" => Command::TogglePostProcessing,
        "o" => Command::ShowOriginalColors,
        "t" => Command::ToggleTheme,
        "r" => Command::CycleRenderScale,
        "b" => Command::BoostDarkMaterials,
        "a" => Command::ToggleAnimation,
        "v" => Command::ApplyPalette(PaletteChoice::HighContrast),
        "l" => Command::ApplyPalette(PaletteChoice::ThreeLevel),
        "g" => Command::ApplyPalette(PaletteChoice::DitheringOptimized),
        "c" => Command::ApplyUniformColor(CUSTOM_COLOUR),
        _ => return None,
    };
    Some(command)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(c: &str) -> Key {
        Key::Character(c.into())
    }

    #[test]
    fn digit_keys_select_visibility() {
        assert_eq!(
            command_for_key(&key("1")),
            Some(Command::SetVisibility(Visibility::Primary))
        );
        assert_eq!(
            command_for_key(&key("3")),
            Some(Command::SetVisibility(Visibility::Both))
        );
    }

    #[test]
    fn letters_ignore_case() {
        assert_eq!(command_for_key(&key("P")), Some(Command::TogglePostProcessing));
        assert_eq!(command_for_key(&key("t")), Some(Command::ToggleTheme));
    }

    #[test]
    fn palette_keys() {
        assert_eq!(
            command_for_key(&key("v")),
            Some(Command::ApplyPalette(PaletteChoice::HighContrast))
        );
        assert_eq!(
            command_for_key(&key("G")),
            Some(Command::ApplyPalette(PaletteChoice::DitheringOptimized))
        );
        assert_eq!(
            command_for_key(&key("c")),
            Some(Command::ApplyUniformColor(CUSTOM_COLOUR))
        );
    }

    #[test]
    fn unbound_keys_do_nothing() {
        assert_eq!(command_for_key(&key("z")), None);
        assert_eq!(command_for_key(&Key::Named(NamedKey::Enter)), None);
    }
}
