//! Terminal UI: theme, glyphs and rendering of the console

pub mod icons;
mod render;
pub mod theme;

pub use render::draw;

/// Apply the UI preferences from the config
pub fn init(config: &crate::core::Config) {
    theme::init(config.ui.theme);
    icons::use_ascii(config.ui.ascii_icons);
}
