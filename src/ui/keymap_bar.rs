//! Keymap hint bar.

use ratatui::{layout::Rect, style::Style, widgets::Paragraph, Frame};

use crate::app::App;
use crate::dispatch::Mode;
use crate::ui::ThemeColors;

/// Draw the hint bar for the active mode's bindings.
pub fn draw_keymap(f: &mut Frame<'_>, area: Rect, app: &App, colors: &ThemeColors) {
    let text = if app.prompt.is_some() {
        "Enter:submit | Esc:cancel | Type to edit".to_string()
    } else if app.mode == Mode::Search {
        "Enter:accept | Esc:cancel | Type to filter".to_string()
    } else {
        let mut hints: Vec<String> = app
            .keymap
            .bindings(app.mode)
            .into_iter()
            .map(|(key, action)| format!("{}:{}", key.label(), action.name()))
            .collect();
        if app.mode != Mode::Normal {
            hints.push("q/Esc:back".to_string());
        }
        format!("[{}] {}", app.mode.name(), hints.join(" | "))
    };

    let paragraph =
        Paragraph::new(text).style(Style::default().fg(colors.status_fg).bg(colors.status_bg));

    f.render_widget(paragraph, area);
}
