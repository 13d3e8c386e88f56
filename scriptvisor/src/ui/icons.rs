//! Glyphs with an ASCII fallback for terminals without Unicode symbols

use std::sync::atomic::{AtomicBool, Ordering};

use crate::supervisor::RunStatus;

static ASCII: AtomicBool = AtomicBool::new(false);

/// Switch every glyph to its ASCII form
pub fn use_ascii(enabled: bool) {
    ASCII.store(enabled, Ordering::Relaxed);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Icon {
    ScrollUp,
    ScrollDown,
    Prompt,
    Pending,
    Running,
    Stopping,
    Success,
    NonZeroExit,
    Failed,
    Help,
    Info,
    Separator,
    Clock,
}

impl Icon {
    /// Icon shown next to a run status
    pub fn for_status(status: &RunStatus) -> Self {
        match status {
            RunStatus::Pending => Icon::Pending,
            RunStatus::Running => Icon::Running,
            RunStatus::Stopping => Icon::Stopping,
            RunStatus::Exited(0) => Icon::Success,
            RunStatus::Exited(_) => Icon::NonZeroExit,
            RunStatus::Failed(_) => Icon::Failed,
        }
    }

    pub fn unicode(self) -> &'static str {
        match self {
            Icon::ScrollUp => "▲",
            Icon::ScrollDown => "▼",
            Icon::Prompt => "❯",
            Icon::Pending => "◐",
            Icon::Running => "●",
            Icon::Stopping => "○",
            Icon::Success => "✓",
            Icon::NonZeroExit => "⚠",
            Icon::Failed => "✗",
            Icon::Help => "?",
            Icon::Info => "ℹ",
            Icon::Separator => "•",
            Icon::Clock => "⧗",
        }
    }

    pub fn ascii(self) -> &'static str {
        match self {
            Icon::ScrollUp => "^",
            Icon::ScrollDown => "v",
            Icon::Prompt => ">",
            Icon::Pending => "~",
            Icon::Running => "*",
            Icon::Stopping => "o",
            Icon::Success => "+",
            Icon::NonZeroExit => "!",
            Icon::Failed => "x",
            Icon::Help => "?",
            Icon::Info => "i",
            Icon::Separator => "*",
            Icon::Clock => "@",
        }
    }

    /// Glyph in the active set
    pub fn glyph(self) -> &'static str {
        if ASCII.load(Ordering::Relaxed) {
            self.ascii()
        } else {
            self.unicode()
        }
    }
}

impl std::fmt::Display for Icon {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.glyph())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_icons() {
        assert_eq!(Icon::for_status(&RunStatus::Exited(0)), Icon::Success);
        assert_eq!(Icon::for_status(&RunStatus::Exited(1)), Icon::NonZeroExit);
        assert_eq!(Icon::for_status(&RunStatus::Failed("x".into())).ascii(), "x");
    }
}
