//! Color palette for the UI.

use ratatui::style::Color;

/// Theme color palette (gruvbox dark).
#[derive(Debug, Clone)]
pub struct ThemeColors {
    /// Background color.
    pub bg: Color,
    /// Primary text color.
    pub text: Color,
    /// Heading text color.
    pub heading: Color,
    /// Label text color.
    pub label: Color,
    /// Value text color.
    pub value: Color,
    /// Border color.
    pub border: Color,
    /// Cursor foreground color.
    pub cursor_fg: Color,
    /// Cursor background color.
    pub cursor_bg: Color,
    /// Status bar foreground color.
    pub status_fg: Color,
    /// Status bar background color.
    pub status_bg: Color,
    /// Progress bar fill color.
    pub progress: Color,
    /// Error color.
    pub error: Color,
}

impl Default for ThemeColors {
    fn default() -> Self {
        Self {
            bg: Color::Rgb(40, 40, 40),
            text: Color::Rgb(235, 219, 178),
            heading: Color::Rgb(251, 184, 108),
            label: Color::Rgb(184, 187, 38),
            value: Color::Rgb(142, 192, 124),
            border: Color::Rgb(102, 92, 84),
            cursor_fg: Color::Rgb(40, 40, 40),
            cursor_bg: Color::Rgb(251, 184, 108),
            status_fg: Color::Rgb(235, 219, 178),
            status_bg: Color::Rgb(60, 56, 54),
            progress: Color::Rgb(142, 192, 124),
            error: Color::Rgb(251, 73, 52),
        }
    }
}
