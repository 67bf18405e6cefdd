//! User interface rendering.

mod keymap_bar;
mod theme;

use std::sync::Arc;

use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Modifier, Style},
    symbols,
    text::{Line, Span},
    widgets::{Axis, BarChart, Block, Borders, Chart, Dataset, GraphType, List, ListItem,
        Paragraph, Wrap},
    Frame,
};
use unicode_width::UnicodeWidthStr;

use crate::app::{App, Panel};
use crate::plot::Figure;

pub use theme::ThemeColors;

/// Draw the UI.
pub fn draw(f: &mut Frame<'_>, app: &mut App) {
    let colors = ThemeColors::default();

    // Main layout with status bar and key map bar
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(1), Constraint::Length(1), Constraint::Length(1)])
        .split(f.area());

    let content = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
        .split(chunks[0]);

    draw_tree(f, app, content[0], &colors);

    let side = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
        .split(content[1]);

    draw_meta(f, app, side[0], &colors);
    match app.focus {
        Panel::Plot | Panel::Histogram if app.figure.is_some() => {
            draw_figure(f, app, side[1], &colors)
        }
        _ => draw_values(f, app, side[1], &colors),
    }

    draw_status(f, app, chunks[1], &colors);
    keymap_bar::draw_keymap(f, chunks[2], app, &colors);
}

fn draw_tree(f: &mut Frame<'_>, app: &App, area: Rect, colors: &ThemeColors) {
    let rows = app.tree.visible_rows();
    let cursor = app.tree.cursor;
    let height = area.height.saturating_sub(2) as usize;
    let offset = cursor.saturating_sub(height.saturating_sub(1));

    let items: Vec<ListItem<'_>> = rows
        .iter()
        .enumerate()
        .skip(offset)
        .take(height.max(1))
        .map(|(idx, path)| {
            let Some(node) = app.tree.node(path) else {
                return ListItem::new(Line::from(path.clone()));
            };
            let indent = "  ".repeat(node.depth);
            let expand_icon = if node.is_group() {
                if node.expanded {
                    "▼ "
                } else {
                    "▶ "
                }
            } else {
                "  "
            };
            // Filtered views show the full path so hits stay unambiguous.
            let name = if app.tree.is_filtered() {
                path.as_str()
            } else {
                node.name.as_str()
            };
            let text = if app.tree.is_filtered() {
                format!("{}{}", expand_icon, name)
            } else {
                format!("{}{}{}", indent, expand_icon, name)
            };

            let style = if idx == cursor {
                Style::default()
                    .fg(colors.cursor_fg)
                    .bg(colors.cursor_bg)
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(colors.text)
            };

            ListItem::new(Line::from(text)).style(style)
        })
        .collect();

    let title = if app.tree.is_filtered() {
        " matches ".to_string()
    } else {
        " taiga ".to_string()
    };

    let list = List::new(items).block(
        Block::default()
            .title(title)
            .borders(Borders::ALL)
            .border_style(border_style(app, Panel::Tree, colors))
            .style(Style::default().bg(colors.bg)),
    );

    f.render_widget(list, area);
}

fn draw_meta(f: &mut Frame<'_>, app: &mut App, area: Rect, colors: &ThemeColors) {
    let path = app.tree.current_path().to_string();
    let mut lines: Vec<Line<'_>> = app
        .tree
        .current()
        .meta_rows()
        .into_iter()
        .map(|(label, value)| kv_line(label, value, colors))
        .collect();

    let store = Arc::clone(&app.store);
    match app.tree.attributes(store.as_ref(), &path) {
        Ok(attrs) if !attrs.is_empty() => {
            lines.push(Line::from(Span::styled(
                "Attributes",
                Style::default().fg(colors.heading).add_modifier(Modifier::BOLD),
            )));
            for (name, value) in attrs.iter() {
                lines.push(kv_line(name.clone(), value.to_string(), colors));
            }
        }
        Ok(_) => {}
        Err(err) => lines.push(Line::from(Span::styled(
            err.to_string(),
            Style::default().fg(colors.error),
        ))),
    }

    if let Some(stats) = app.stats_lines.get(&path) {
        lines.push(Line::from(Span::styled(
            "Statistics",
            Style::default().fg(colors.heading).add_modifier(Modifier::BOLD),
        )));
        for (label, value) in stats {
            lines.push(kv_line(label.clone(), value.clone(), colors));
        }
    }

    let paragraph = Paragraph::new(lines)
        .block(
            Block::default()
                .title(" Metadata ")
                .borders(Borders::ALL)
                .border_style(border_style(app, Panel::Attributes, colors))
                .style(Style::default().bg(colors.bg)),
        )
        .wrap(Wrap { trim: true });

    f.render_widget(paragraph, area);
}

fn kv_line(label: String, value: String, colors: &ThemeColors) -> Line<'static> {
    Line::from(vec![
        Span::styled(format!("{:<12}", label), Style::default().fg(colors.label)),
        Span::styled(value, Style::default().fg(colors.value)),
    ])
}

fn draw_values(f: &mut Frame<'_>, app: &App, area: Rect, colors: &ThemeColors) {
    let (title, lines) = match &app.values {
        Some(view) => {
            let mut lines = Vec::new();
            let mut row = String::new();
            for (offset, value) in view.values.iter().enumerate() {
                let cell = format!("{:>12.6}", value);
                if row.width() + cell.width() + 1 > area.width.saturating_sub(2) as usize
                    && !row.is_empty()
                {
                    lines.push(Line::from(std::mem::take(&mut row)));
                }
                if row.is_empty() {
                    row.push_str(&format!("{:>8}:", view.start + offset));
                }
                row.push(' ');
                row.push_str(&cell);
            }
            if !row.is_empty() {
                lines.push(Line::from(row));
            }
            (format!(" {} ", view.path), lines)
        }
        None => (
            " Values ".to_string(),
            vec![Line::from(Span::styled(
                "v previews a dataset, V reads a range",
                Style::default().fg(colors.text),
            ))],
        ),
    };

    let paragraph = Paragraph::new(lines)
        .block(
            Block::default()
                .title(title)
                .borders(Borders::ALL)
                .border_style(border_style(app, Panel::Values, colors))
                .style(Style::default().bg(colors.bg)),
        )
        .style(Style::default().fg(colors.text));

    f.render_widget(paragraph, area);
}

fn draw_figure(f: &mut Frame<'_>, app: &App, area: Rect, colors: &ThemeColors) {
    match app.figure.as_ref() {
        Some(Figure::Scatter {
            points,
            config,
            x_label,
            y_label,
        }) => {
            // Log axes are rendered in log10 space; bounds come from the
            // (already validated, strictly positive) data.
            let data: Vec<(f64, f64)> = points
                .iter()
                .map(|&(x, y)| {
                    (
                        if config.x_scale.is_log() { x.log10() } else { x },
                        if config.y_scale.is_log() { y.log10() } else { y },
                    )
                })
                .collect();
            let (x_min, x_max) = bounds(data.iter().map(|p| p.0));
            let (y_min, y_max) = bounds(data.iter().map(|p| p.1));

            let dataset = Dataset::default()
                .marker(symbols::Marker::Braille)
                .graph_type(GraphType::Scatter)
                .style(Style::default().fg(colors.value))
                .data(&data);

            let chart = Chart::new(vec![dataset])
                .block(
                    Block::default()
                        .title(format!(" {} vs {} ", x_label, y_label))
                        .borders(Borders::ALL)
                        .border_style(border_style(app, Panel::Plot, colors))
                        .style(Style::default().bg(colors.bg)),
                )
                .x_axis(axis(x_label, config.x_scale.is_log(), x_min, x_max, colors))
                .y_axis(axis(y_label, config.y_scale.is_log(), y_min, y_max, colors));

            f.render_widget(chart, area);
        }
        Some(Figure::Histogram(hist)) => {
            let labels: Vec<String> = hist
                .bin_centers()
                .iter()
                .map(|c| format!("{:.3}", c))
                .collect();
            let data: Vec<(&str, u64)> = labels
                .iter()
                .map(String::as_str)
                .zip(hist.counts.iter().copied())
                .collect();

            let chart = BarChart::default()
                .block(
                    Block::default()
                        .title(format!(
                            " histogram ({} bins, x {}, count {}) ",
                            hist.spec.bins,
                            hist.spec.x_scale.label(),
                            hist.spec.count_scale.label()
                        ))
                        .borders(Borders::ALL)
                        .border_style(border_style(app, Panel::Histogram, colors))
                        .style(Style::default().bg(colors.bg)),
                )
                .bar_width(7)
                .bar_style(Style::default().fg(colors.value))
                .value_style(Style::default().fg(colors.cursor_fg).bg(colors.value))
                .data(data.as_slice());

            f.render_widget(chart, area);
        }
        None => {}
    }
}

/// The focused panel gets the accent border.
fn border_style(app: &App, panel: Panel, colors: &ThemeColors) -> Style {
    if app.focus == panel {
        Style::default().fg(colors.cursor_bg)
    } else {
        Style::default().fg(colors.border)
    }
}

fn bounds(values: impl Iterator<Item = f64>) -> (f64, f64) {
    let (mut min, mut max) = (f64::INFINITY, f64::NEG_INFINITY);
    for v in values {
        min = min.min(v);
        max = max.max(v);
    }
    if !min.is_finite() || !max.is_finite() {
        return (0.0, 1.0);
    }
    if min == max {
        (min - 0.5, max + 0.5)
    } else {
        (min, max)
    }
}

fn axis<'a>(
    label: &'a str,
    log: bool,
    min: f64,
    max: f64,
    colors: &ThemeColors,
) -> Axis<'a> {
    let title = if log {
        format!("log10 {}", label)
    } else {
        label.to_string()
    };
    Axis::default()
        .title(title)
        .style(Style::default().fg(colors.border))
        .bounds([min, max])
        .labels([format!("{:.3}", min), format!("{:.3}", max)])
}

fn draw_status(f: &mut Frame<'_>, app: &App, area: Rect, colors: &ThemeColors) {
    let (text, style) = if let Some(prompt) = &app.prompt {
        (
            format!("{}: {}▌", prompt.label, prompt.buffer),
            Style::default().fg(colors.status_fg).bg(colors.status_bg),
        )
    } else if app.mode == crate::dispatch::Mode::Search {
        (
            format!("/{} ({} matches)", app.search.query, app.search.hits.len()),
            Style::default().fg(colors.status_fg).bg(colors.status_bg),
        )
    } else if let Some((fraction, message)) = app.slots.any_progress() {
        (
            progress_line(fraction, &message),
            Style::default().fg(colors.progress).bg(colors.status_bg),
        )
    } else {
        (
            app.status.clone(),
            Style::default().fg(colors.status_fg).bg(colors.status_bg),
        )
    };

    f.render_widget(Paragraph::new(text).style(style), area);
}

/// One-line progress bar: `████████░░░░ |  66.67% (2/3 chunks [mean])`.
fn progress_line(fraction: f64, message: &str) -> String {
    const WIDTH: usize = 20;
    let filled = ((fraction * WIDTH as f64).round() as usize).min(WIDTH);
    let bar: String = "█".repeat(filled) + &"░".repeat(WIDTH - filled);
    format!("{} | {:>6.2}% ({})", bar, fraction * 100.0, message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_line_formats_fraction() {
        let line = progress_line(0.5, "1/2 chunks [min/max]");
        assert!(line.contains("50.00%"));
        assert!(line.contains("1/2 chunks"));
        assert_eq!(line.chars().filter(|&c| c == '█').count(), 10);
    }

    #[test]
    fn bounds_widens_degenerate_ranges() {
        assert_eq!(bounds([3.0, 3.0].into_iter()), (2.5, 3.5));
        assert_eq!(bounds(std::iter::empty()), (0.0, 1.0));
    }
}
