//! Color themes
//!
//! The theme is picked once from the config; everything else asks
//! [`current`] for styles.

use ratatui::style::{Color, Modifier, Style};
use ratatui::widgets::{Block, BorderType, Borders};
use std::sync::OnceLock;

use crate::supervisor::RunStatus;

/// Colors used by the console
#[derive(Debug, Clone)]
pub struct Palette {
    pub accent: Color,
    pub highlight: Color,

    pub ok: Color,
    pub warn: Color,
    pub err: Color,

    pub fg: Color,
    pub muted: Color,
    pub dim: Color,

    /// Status bar background
    pub bar: Color,

    pub frame: Color,
    pub frame_focus: Color,
    pub frame_edit: Color,
}

#[derive(Debug, Clone)]
pub struct Theme {
    pub palette: Palette,
    pub frame: BorderType,
    pub frame_focus: BorderType,
}

impl Theme {
    pub fn dark() -> Self {
        Self {
            palette: Palette {
                accent: Color::Cyan,
                highlight: Color::Yellow,
                ok: Color::Green,
                warn: Color::Yellow,
                err: Color::Red,
                fg: Color::White,
                muted: Color::Gray,
                dim: Color::DarkGray,
                bar: Color::Rgb(30, 30, 30),
                frame: Color::DarkGray,
                frame_focus: Color::Cyan,
                frame_edit: Color::Yellow,
            },
            frame: BorderType::Rounded,
            frame_focus: BorderType::Double,
        }
    }

    pub fn light() -> Self {
        Self {
            palette: Palette {
                accent: Color::Blue,
                highlight: Color::Rgb(200, 120, 0),
                ok: Color::Rgb(0, 150, 0),
                warn: Color::Rgb(200, 150, 0),
                err: Color::Rgb(200, 0, 0),
                fg: Color::Black,
                muted: Color::DarkGray,
                dim: Color::Gray,
                bar: Color::Rgb(240, 240, 240),
                frame: Color::Gray,
                frame_focus: Color::Blue,
                frame_edit: Color::Rgb(200, 120, 0),
            },
            frame: BorderType::Rounded,
            frame_focus: BorderType::Double,
        }
    }

    fn fg(color: Color) -> Style {
        Style::default().fg(color)
    }

    pub fn plain(&self) -> Style {
        Self::fg(self.palette.fg)
    }

    pub fn muted(&self) -> Style {
        Self::fg(self.palette.muted)
    }

    pub fn dim(&self) -> Style {
        Self::fg(self.palette.dim)
    }

    pub fn highlight(&self) -> Style {
        Self::fg(self.palette.highlight)
    }

    pub fn ok(&self) -> Style {
        Self::fg(self.palette.ok)
    }

    pub fn warn(&self) -> Style {
        Self::fg(self.palette.warn)
    }

    pub fn err(&self) -> Style {
        Self::fg(self.palette.err)
    }

    /// Titles and headings
    pub fn heading(&self) -> Style {
        Self::fg(self.palette.accent).add_modifier(Modifier::BOLD)
    }

    pub fn status_bar(&self) -> Style {
        Style::default().bg(self.palette.bar)
    }

    /// Color of a run status in the header
    pub fn run_status(&self, status: &RunStatus) -> Style {
        match status {
            RunStatus::Running | RunStatus::Exited(0) => self.ok(),
            RunStatus::Pending | RunStatus::Stopping => self.warn(),
            RunStatus::Exited(_) | RunStatus::Failed(_) => self.err(),
        }
    }

    /// Bordered block, emphasized when focused
    pub fn frame<'a>(&self, focused: bool) -> Block<'a> {
        let (kind, color) = if focused {
            (self.frame_focus, self.palette.frame_focus)
        } else {
            (self.frame, self.palette.frame)
        };
        Block::default()
            .borders(Borders::ALL)
            .border_type(kind)
            .border_style(Self::fg(color))
    }

    /// Block around the argument editor
    pub fn editing_frame<'a>(&self) -> Block<'a> {
        Block::default()
            .borders(Borders::ALL)
            .border_type(self.frame_focus)
            .border_style(Self::fg(self.palette.frame_edit))
    }
}

static CURRENT: OnceLock<Theme> = OnceLock::new();

/// Active theme, dark until [`init`] picks another one
pub fn current() -> &'static Theme {
    CURRENT.get_or_init(Theme::dark)
}

/// Select the theme named in the config. Only the first call has an effect.
pub fn init(kind: crate::core::Theme) {
    let theme = match kind {
        crate::core::Theme::Dark => Theme::dark(),
        crate::core::Theme::Light => Theme::light(),
    };
    let _ = CURRENT.set(theme);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_status_colors() {
        let theme = Theme::dark();
        assert_eq!(theme.run_status(&RunStatus::Exited(0)), theme.ok());
        assert_eq!(theme.run_status(&RunStatus::Exited(2)), theme.err());
        assert_eq!(theme.run_status(&RunStatus::Stopping), theme.warn());
    }
}
