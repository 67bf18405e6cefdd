//! Application state and the handlers behind every key action.
//!
//! The interaction loop owns everything here; workers only ever talk back
//! through job result slots, which [`App::poll_jobs`] applies on each tick.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use crossterm::event::{KeyCode, KeyEvent};
use tracing::debug;

use crate::clipboard;
use crate::config::Config;
use crate::dispatch::{Action, Key, Keymap, Mode};
use crate::error::{Result, ScaleAxis, TaigaError};
use crate::jobs::{stats, Engine, JobId, JobKind, JobState, JobValue, Slot, SlotTable, StatKind};
use crate::plot::{self, Figure, HistogramSpec, PlotConfig};
use crate::rename;
use crate::search::SearchState;
use crate::store::DataStore;
use crate::tree::Tree;

const JUMP_DISTANCE: isize = 10;
const PREVIEW_LEN: usize = 100;

/// Which panel currently has focus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Panel {
    Tree,
    Attributes,
    Values,
    Plot,
    Histogram,
}

/// What a pending mini-buffer prompt does with its text on submit.
#[derive(Debug, Clone)]
pub enum PromptKind {
    GotoPath,
    JumpKey,
    Rename { path: String },
    ValueRange { path: String },
    BinCount,
    SavePath,
}

#[derive(Debug, Clone)]
pub struct Prompt {
    pub kind: PromptKind,
    pub buffer: String,
    pub label: &'static str,
}

/// Raw values shown in the values panel.
#[derive(Debug, Clone)]
pub struct ValuesView {
    pub path: String,
    pub start: usize,
    pub values: Vec<f64>,
}

pub struct App {
    pub store: Arc<dyn DataStore>,
    pub tree: Tree,
    pub engine: Engine,
    pub slots: SlotTable,
    pub keymap: Keymap,
    pub config: Config,
    pub mode: Mode,
    pub focus: Panel,
    pub prompt: Option<Prompt>,
    pub search: SearchState,
    pub status: String,
    pub should_quit: bool,
    /// Per-dataset statistic lines, keyed by path.
    pub stats_lines: HashMap<String, Vec<(String, String)>>,
    /// Cached min/max per path, reused by the histogram's first pass.
    range_cache: HashMap<String, (f64, f64)>,
    pub values: Option<ValuesView>,
    pub figure: Option<Figure>,
    pub plot_x: Option<String>,
    pub plot_y: Option<String>,
    pub plot_config: PlotConfig,
    pub hist_spec: HistogramSpec,
    /// Job id -> the path (or path pair label) it targets.
    job_targets: HashMap<JobId, String>,
}

impl App {
    pub fn new(store: Arc<dyn DataStore>, config: Config) -> Result<Self> {
        let keymap = Keymap::build(&config)?;
        let tree = Tree::open(store.as_ref())?;
        Ok(Self {
            store,
            tree,
            engine: Engine::new(),
            slots: SlotTable::default(),
            keymap,
            config,
            mode: Mode::Normal,
            focus: Panel::Tree,
            prompt: None,
            search: SearchState::default(),
            status: String::new(),
            should_quit: false,
            stats_lines: HashMap::new(),
            range_cache: HashMap::new(),
            values: None,
            figure: None,
            plot_x: None,
            plot_y: None,
            plot_config: PlotConfig::default(),
            hist_spec: HistogramSpec::default(),
            job_targets: HashMap::new(),
        })
    }

    fn fold_options(&self) -> stats::FoldOptions {
        stats::FoldOptions {
            always_chunk: self.config.always_chunk,
            ..stats::FoldOptions::default()
        }
    }

    /// Route one key event. Prompts and search input capture raw text; all
    /// other keys go through the dispatch table.
    pub fn handle_key(&mut self, event: KeyEvent) {
        if self.prompt.is_some() {
            self.handle_prompt_key(event);
            return;
        }
        if self.mode == Mode::Search {
            self.handle_search_key(event);
            return;
        }
        let key = Key::from_event(&event);
        if event.code == KeyCode::Esc {
            self.exit_mode();
            return;
        }
        if let KeyCode::Char('q') = event.code {
            if self.mode != Mode::Normal && key.mods.is_empty() {
                self.exit_mode();
                return;
            }
        }
        match self.keymap.lookup(self.mode, key) {
            Some(action) => self.dispatch(action),
            None => {
                // Tree navigation stays live inside every leader mode, so
                // the cursor can move between steps of a multi-key workflow
                // (select x, move, select y).
                let fallback = self
                    .keymap
                    .lookup(Mode::Normal, key)
                    .filter(|a| self.mode != Mode::Normal && a.is_navigation());
                match fallback {
                    Some(action) => self.dispatch(action),
                    None => debug!(mode = self.mode.name(), ?key, "unbound key"),
                }
            }
        }
    }

    fn dispatch(&mut self, action: Action) {
        let outcome = match action {
            Action::Quit | Action::ForceQuit => {
                self.should_quit = true;
                Ok(())
            }
            Action::MoveUp => {
                self.tree.move_cursor(-1);
                Ok(())
            }
            Action::MoveDown => {
                self.tree.move_cursor(1);
                Ok(())
            }
            Action::PageUp => {
                self.tree.move_cursor(-JUMP_DISTANCE);
                Ok(())
            }
            Action::PageDown => {
                self.tree.move_cursor(JUMP_DISTANCE);
                Ok(())
            }
            Action::JumpTop => {
                self.tree.jump_to_top();
                self.leave_leader();
                Ok(())
            }
            Action::JumpBottom => {
                self.tree.jump_to_bottom();
                self.leave_leader();
                Ok(())
            }
            Action::JumpParent => {
                self.tree.jump_to_parent();
                self.leave_leader();
                Ok(())
            }
            Action::JumpNextSibling => {
                self.tree.jump_to_next_sibling();
                self.leave_leader();
                Ok(())
            }
            Action::ExpandCollapse => self.tree.toggle_current(self.store.as_ref()),
            Action::Reset => {
                self.search.clear();
                self.tree.reset(self.store.as_ref())
            }
            Action::EnterGoto => self.enter_mode(Mode::Goto),
            Action::EnterSearch => {
                self.search.clear();
                self.enter_mode(Mode::Search)
            }
            Action::EnterDataset => self.enter_mode(Mode::Dataset),
            Action::EnterWindow => self.enter_mode(Mode::Window),
            Action::EnterPlot => self.enter_mode(Mode::Plot),
            Action::EnterHistogram => self.enter_mode(Mode::Histogram),
            Action::EnterEdit => self.enter_mode(Mode::Edit),
            Action::GotoPath => {
                self.open_prompt(PromptKind::GotoPath, "goto path");
                Ok(())
            }
            Action::JumpToKey => {
                self.open_prompt(PromptKind::JumpKey, "jump to key");
                Ok(())
            }
            Action::CopyPath => self.copy_current_path(),
            Action::MinMax => self.submit_stat(StatKind::MinMax),
            Action::Mean => self.submit_stat(StatKind::Mean),
            Action::Std => self.submit_stat(StatKind::Std),
            Action::Preview => self.submit_preview(),
            Action::PreviewRange => {
                match self.current_dataset_path() {
                    Ok(path) => {
                        self.open_prompt(PromptKind::ValueRange { path }, "range START-END");
                        Ok(())
                    }
                    Err(e) => Err(e),
                }
            }
            Action::CancelJob => {
                self.slots.cancel_all();
                self.status = "cancellation requested".to_string();
                Ok(())
            }
            Action::ClearValues => {
                self.values = None;
                Ok(())
            }
            Action::FocusTree => self.set_focus(Panel::Tree),
            Action::FocusAttributes => self.set_focus(Panel::Attributes),
            Action::FocusValues => self.set_focus(Panel::Values),
            // Combined transition: focus the panel and switch mode in one
            // step.
            Action::FocusPlot => {
                self.focus = Panel::Plot;
                self.enter_mode(Mode::Plot)
            }
            Action::FocusHistogram => {
                self.focus = Panel::Histogram;
                self.enter_mode(Mode::Histogram)
            }
            Action::SelectX => self.select_axis(true),
            Action::SelectY => self.select_axis(false),
            Action::ToggleXLog => self.toggle_x_log(),
            Action::ToggleYLog => self.toggle_y_log(),
            Action::ToggleCountLog => {
                self.hist_spec.count_scale = self.hist_spec.count_scale.toggled();
                Ok(())
            }
            Action::Generate => match self.mode {
                Mode::Histogram => self.submit_histogram(),
                _ => self.submit_scatter(),
            },
            Action::SaveFigure => {
                if self.figure.is_none() {
                    self.status = "no figure to save".to_string();
                } else {
                    self.open_prompt(PromptKind::SavePath, "save to");
                }
                Ok(())
            }
            Action::ResetFigure => {
                self.figure = None;
                self.plot_x = None;
                self.plot_y = None;
                self.plot_config = PlotConfig::default();
                self.hist_spec = HistogramSpec::default();
                Ok(())
            }
            Action::SetBins => {
                self.open_prompt(PromptKind::BinCount, "bin count");
                Ok(())
            }
            Action::Rename => {
                let path = self.tree.current_path().to_string();
                self.open_prompt(PromptKind::Rename { path }, "new name");
                Ok(())
            }
        };
        self.report(outcome);
    }

    /// Copy the current node's key (path without the leading slash) to the
    /// system clipboard.
    fn copy_current_path(&mut self) -> Result<()> {
        let key = self.tree.current_path().trim_start_matches('/').to_string();
        clipboard::copy_to_clipboard(&key)?;
        self.status = format!("copied '{}' to clipboard", key);
        Ok(())
    }

    /// Reject a switch to log scale when the axis dataset's cached minimum
    /// is known to be non-positive. An unknown range is allowed through;
    /// generation re-validates against the freshly computed one.
    fn check_known_min(&self, path: &str, axis: ScaleAxis) -> Result<()> {
        match self.range_cache.get(path) {
            Some(&(min, _)) => plot::check_log_axis(axis, min),
            None => Ok(()),
        }
    }

    fn toggle_x_log(&mut self) -> Result<()> {
        match self.mode {
            Mode::Histogram => {
                let next = self.hist_spec.x_scale.toggled();
                if next.is_log() {
                    if let Ok(path) = self.current_dataset_path() {
                        self.check_known_min(&path, ScaleAxis::X)?;
                    }
                }
                self.hist_spec.x_scale = next;
            }
            _ => {
                let next = self.plot_config.x_scale.toggled();
                if next.is_log() {
                    if let Some(path) = self.plot_x.clone() {
                        self.check_known_min(&path, ScaleAxis::X)?;
                    }
                }
                self.plot_config.x_scale = next;
            }
        }
        Ok(())
    }

    fn toggle_y_log(&mut self) -> Result<()> {
        let next = self.plot_config.y_scale.toggled();
        if next.is_log() {
            if let Some(path) = self.plot_y.clone() {
                self.check_known_min(&path, ScaleAxis::Y)?;
            }
        }
        self.plot_config.y_scale = next;
        Ok(())
    }

    /// Goto actions fire once and drop back to normal mode.
    fn leave_leader(&mut self) {
        if self.mode == Mode::Goto {
            self.mode = Mode::Normal;
        }
    }

    fn set_focus(&mut self, panel: Panel) -> Result<()> {
        self.focus = panel;
        self.mode = Mode::Normal;
        Ok(())
    }

    /// Entering a leader mode while another is active first force-exits the
    /// current one, so exactly one mode is ever active.
    fn enter_mode(&mut self, mode: Mode) -> Result<()> {
        if self.mode != Mode::Normal {
            self.exit_mode();
        }
        self.mode = mode;
        Ok(())
    }

    fn exit_mode(&mut self) {
        match self.mode {
            Mode::Search => {
                // Cancelling search restores the unfiltered view.
                self.search.clear();
                self.tree.clear_filter();
            }
            Mode::Plot | Mode::Histogram => {
                // Axis selections are mode-session state; the rendered
                // figure stays visible.
                self.plot_x = None;
                self.plot_y = None;
            }
            _ => {}
        }
        self.prompt = None;
        self.mode = Mode::Normal;
    }

    // ---- prompts ----------------------------------------------------------

    fn open_prompt(&mut self, kind: PromptKind, label: &'static str) {
        self.prompt = Some(Prompt {
            kind,
            buffer: String::new(),
            label,
        });
    }

    fn handle_prompt_key(&mut self, event: KeyEvent) {
        match event.code {
            KeyCode::Esc => {
                // In edit mode this cancels back to the mode's idle state;
                // elsewhere the mode stays as it was.
                self.prompt = None;
            }
            KeyCode::Enter => {
                if let Some(prompt) = self.prompt.take() {
                    let outcome = self.submit_prompt(prompt);
                    self.report(outcome);
                }
            }
            KeyCode::Backspace => {
                if let Some(prompt) = &mut self.prompt {
                    prompt.buffer.pop();
                }
            }
            KeyCode::Char(c) => {
                if let Some(prompt) = &mut self.prompt {
                    prompt.buffer.push(c);
                }
            }
            _ => {}
        }
    }

    fn submit_prompt(&mut self, prompt: Prompt) -> Result<()> {
        let text = prompt.buffer.trim().to_string();
        match prompt.kind {
            PromptKind::GotoPath => {
                self.tree.goto_path(self.store.as_ref(), &text)?;
                self.leave_leader();
                Ok(())
            }
            PromptKind::JumpKey => {
                if !self.tree.jump_to_key(&text) {
                    self.status = format!("no row matching '{}'", text);
                }
                self.leave_leader();
                Ok(())
            }
            PromptKind::Rename { path } => self.submit_rename(&path, &text),
            PromptKind::ValueRange { path } => {
                let (start, end) = parse_range(&text)?;
                self.submit_values(path, start, end)
            }
            PromptKind::BinCount => {
                let bins: usize = text
                    .parse()
                    .map_err(|_| TaigaError::BadRange { input: text.clone() })?;
                self.hist_spec.bins = bins.max(1);
                self.status = format!("{} bins", self.hist_spec.bins);
                Ok(())
            }
            PromptKind::SavePath => {
                let Some(figure) = &self.figure else {
                    self.status = "no figure to save".to_string();
                    return Ok(());
                };
                figure.save_csv(&PathBuf::from(&text))?;
                self.status = format!("saved {}", text);
                Ok(())
            }
        }
    }

    // ---- search -----------------------------------------------------------

    fn handle_search_key(&mut self, event: KeyEvent) {
        match event.code {
            KeyCode::Esc => self.exit_mode(),
            KeyCode::Enter => {
                // Accepting freezes the filtered view until reset.
                self.mode = Mode::Normal;
                self.status = format!("{} matches", self.search.hits.len());
            }
            KeyCode::Backspace => {
                let paths = self.tree.materialized_paths();
                self.search.backspace(&paths);
                self.apply_search_view();
            }
            KeyCode::Char(c) => {
                let paths = self.tree.materialized_paths();
                self.search.push(c, &paths);
                self.apply_search_view();
            }
            _ => {}
        }
    }

    fn apply_search_view(&mut self) {
        if self.search.query.is_empty() {
            self.tree.clear_filter();
        } else {
            self.tree.set_filter(self.search.view());
        }
    }

    // ---- job submission ---------------------------------------------------

    fn start_job(&mut self, slot: Slot, target: String, handle: crate::jobs::JobHandle) {
        self.job_targets.insert(handle.id(), target);
        if let Some(superseded) = self.slots.start(slot, handle) {
            self.job_targets.remove(&superseded.id());
        }
    }

    fn current_dataset_path(&self) -> Result<String> {
        let node = self.tree.current();
        if node.is_group() {
            return Err(TaigaError::NonNumericData {
                path: node.path.clone(),
                dtype: "group".to_string(),
            });
        }
        Ok(node.path.clone())
    }

    fn submit_stat(&mut self, kind: StatKind) -> Result<()> {
        let path = self.current_dataset_path()?;
        let store = Arc::clone(&self.store);
        let opts = self.fold_options();
        let job_path = path.clone();
        let handle = self.engine.submit(
            JobKind::Stats(kind),
            Box::new(move |ctx| match kind {
                StatKind::MinMax => stats::min_max(&store, &job_path, opts, ctx),
                StatKind::Mean => stats::mean(&store, &job_path, opts, ctx),
                StatKind::Std => stats::std_dev(&store, &job_path, opts, ctx),
            }),
        );
        self.start_job(Slot::Stats, path, handle);
        Ok(())
    }

    fn submit_preview(&mut self) -> Result<()> {
        let path = self.current_dataset_path()?;
        let size = self.tree.dataset_info(&path)?.size();
        self.submit_values(path, 0, size.min(PREVIEW_LEN))
    }

    fn submit_values(&mut self, path: String, start: usize, end: usize) -> Result<()> {
        let store = Arc::clone(&self.store);
        let opts = self.fold_options();
        let job_path = path.clone();
        let handle = self.engine.submit(
            JobKind::ValueRange,
            Box::new(move |ctx| stats::value_range(&store, &job_path, start, end, opts, ctx)),
        );
        self.start_job(Slot::Values, path, handle);
        Ok(())
    }

    fn select_axis(&mut self, x: bool) -> Result<()> {
        let path = self.current_dataset_path()?;
        if x {
            self.plot_x = Some(path.clone());
            self.status = format!("x = {}", path);
        } else {
            self.plot_y = Some(path.clone());
            self.status = format!("y = {}", path);
        }
        // Compute the range in the background so a later log toggle can be
        // checked against the observed minimum.
        if !self.range_cache.contains_key(&path) {
            self.submit_stat(StatKind::MinMax)?;
        }
        Ok(())
    }

    fn submit_scatter(&mut self) -> Result<()> {
        let (Some(x_path), Some(y_path)) = (self.plot_x.clone(), self.plot_y.clone()) else {
            self.status = "select x and y datasets first".to_string();
            return Ok(());
        };
        let store = Arc::clone(&self.store);
        let config = self.plot_config;
        let opts = self.fold_options();
        let (jx, jy) = (x_path.clone(), y_path.clone());
        let handle = self.engine.submit(
            JobKind::Scatter,
            Box::new(move |ctx| stats::scatter(&store, &jx, &jy, config, opts, ctx)),
        );
        self.start_job(Slot::Plot, format!("{} vs {}", x_path, y_path), handle);
        Ok(())
    }

    fn submit_histogram(&mut self) -> Result<()> {
        let path = self.current_dataset_path()?;
        let store = Arc::clone(&self.store);
        let spec = self.hist_spec;
        let cached = self.range_cache.get(&path).copied();
        let opts = self.fold_options();
        let job_path = path.clone();
        let handle = self.engine.submit(
            JobKind::Histogram,
            Box::new(move |ctx| stats::histogram(&store, &job_path, spec, cached, opts, ctx)),
        );
        self.start_job(Slot::Histogram, path, handle);
        Ok(())
    }

    fn submit_rename(&mut self, path: &str, new_name: &str) -> Result<()> {
        // Validation is synchronous; no job is created on failure.
        rename::validate(self.store.as_ref(), path, new_name)?;
        let store = Arc::clone(&self.store);
        let (job_path, job_name) = (path.to_string(), new_name.to_string());
        let handle = self.engine.submit(
            JobKind::Rename,
            Box::new(move |ctx| rename::execute(&store, &job_path, &job_name, ctx)),
        );
        self.start_job(Slot::Rename, path.to_string(), handle);
        Ok(())
    }

    // ---- job outcomes -----------------------------------------------------

    /// Apply every finished job to UI state. Called once per tick.
    pub fn poll_jobs(&mut self) {
        for (slot, handle) in self.slots.drain_finished() {
            let target = self
                .job_targets
                .remove(&handle.id())
                .unwrap_or_default();
            match handle.poll() {
                JobState::Done(value) => self.apply_value(slot, target, value),
                JobState::Cancelled => {
                    self.status = format!("cancelled [{}]", target);
                }
                JobState::Failed(msg) => {
                    self.status = msg;
                }
                JobState::Pending | JobState::Progress(..) => {}
            }
        }
    }

    fn apply_value(&mut self, _slot: Slot, target: String, value: JobValue) {
        match value {
            JobValue::MinMax { min, max } => {
                self.range_cache.insert(target.clone(), (min, max));
                let lines = self.stats_lines.entry(target).or_default();
                lines.retain(|(k, _)| k != "min" && k != "max");
                lines.push(("min".to_string(), format!("{}", min)));
                lines.push(("max".to_string(), format!("{}", max)));
                self.status = format!("min = {}, max = {}", min, max);
            }
            JobValue::Mean(mean) => {
                let lines = self.stats_lines.entry(target).or_default();
                lines.retain(|(k, _)| k != "mean");
                lines.push(("mean".to_string(), format!("{}", mean)));
                self.status = format!("mean = {}", mean);
            }
            JobValue::Std(std) => {
                let lines = self.stats_lines.entry(target).or_default();
                lines.retain(|(k, _)| k != "std");
                lines.push(("std".to_string(), format!("{}", std)));
                self.status = format!("std = {}", std);
            }
            JobValue::Values { start, values } => {
                self.status = format!("{} values from {}", values.len(), start);
                self.values = Some(ValuesView {
                    path: target,
                    start,
                    values,
                });
                self.focus = Panel::Values;
            }
            JobValue::Points(points) => {
                let (x_label, y_label) = match target.split_once(" vs ") {
                    Some((x, y)) => (x.to_string(), y.to_string()),
                    None => (target.clone(), String::new()),
                };
                self.status = format!("{} points [{}]", points.len(), target);
                self.figure = Some(Figure::Scatter {
                    points,
                    config: self.plot_config,
                    x_label,
                    y_label,
                });
                self.focus = Panel::Plot;
            }
            JobValue::Histogram(histogram) => {
                self.status = format!("histogram of {}", target);
                self.figure = Some(Figure::Histogram(histogram));
                self.focus = Panel::Histogram;
            }
            JobValue::Renamed { old_path, new_name } => {
                // The tree is rewritten only now, after the store reports
                // the copy-then-delete finished.
                self.tree.apply_rename(&old_path, &new_name);
                self.stats_lines.remove(&old_path);
                self.range_cache.remove(&old_path);
                self.status = format!("renamed {} -> {}", old_path, new_name);
            }
        }
    }

    fn report(&mut self, outcome: Result<()>) {
        if let Err(err) = outcome {
            self.status = err.to_string();
        }
    }
}

/// Parse a half-open index range written `START-END`.
pub fn parse_range(input: &str) -> Result<(usize, usize)> {
    let bad = || TaigaError::BadRange {
        input: input.to_string(),
    };
    let (start, end) = input.split_once('-').ok_or_else(bad)?;
    let start: usize = start.trim().parse().map_err(|_| bad())?;
    let end: usize = end.trim().parse().map_err(|_| bad())?;
    if start >= end {
        return Err(bad());
    }
    Ok((start, end))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crossterm::event::KeyModifiers;
    use ndarray::Array;
    use std::time::Duration;

    fn fixture_app() -> App {
        let store = MemoryStore::new();
        store
            .add_group("/a")
            .add_dataset("/b", Array::from_vec(vec![1.0, 2.0, 3.0]).into_dyn());
        App::new(Arc::new(store), Config::default()).unwrap()
    }

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn wait_jobs(app: &mut App) {
        for _ in 0..2000 {
            app.poll_jobs();
            if app.slots.get(Slot::Stats).is_none()
                && app.slots.get(Slot::Values).is_none()
                && app.slots.get(Slot::Rename).is_none()
                && app.slots.get(Slot::Histogram).is_none()
                && app.slots.get(Slot::Plot).is_none()
            {
                return;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        panic!("jobs never drained");
    }

    #[test]
    fn vim_navigation_moves_cursor() {
        let mut app = fixture_app();
        app.handle_key(key(KeyCode::Char('j')));
        assert_eq!(app.tree.current_path(), "/a");
        app.handle_key(key(KeyCode::Char('G')));
        assert_eq!(app.tree.current_path(), "/b");
        app.handle_key(key(KeyCode::Char('g')));
        assert_eq!(app.tree.current_path(), "/");
    }

    #[test]
    fn goto_key_prompt_jumps_to_matching_row() {
        let mut app = fixture_app();
        app.handle_key(key(KeyCode::Char('o'))); // goto mode
        app.handle_key(key(KeyCode::Char('k'))); // jump-to-key prompt
        app.handle_key(key(KeyCode::Char('b')));
        app.handle_key(key(KeyCode::Enter));
        assert_eq!(app.tree.current_path(), "/b");
        assert_eq!(app.mode, Mode::Normal);
    }

    #[test]
    fn plot_mode_keeps_tree_navigation_live_between_axis_picks() {
        let store = MemoryStore::new();
        store
            .add_dataset("/x", Array::from_vec(vec![1.0, 2.0, 3.0]).into_dyn())
            .add_dataset("/y", Array::from_vec(vec![4.0, 5.0, 6.0]).into_dyn());
        let mut app = App::new(Arc::new(store), Config::default()).unwrap();
        app.handle_key(key(KeyCode::Char('j'))); // cursor to /x
        app.handle_key(key(KeyCode::Char('p'))); // plot mode
        app.handle_key(key(KeyCode::Char('x')));
        app.handle_key(key(KeyCode::Char('j'))); // cursor movement inside plot mode
        assert_eq!(app.tree.current_path(), "/y");
        app.handle_key(key(KeyCode::Char('y')));
        app.handle_key(key(KeyCode::Char('p'))); // generate
        wait_jobs(&mut app);
        match &app.figure {
            Some(Figure::Scatter { points, .. }) => assert_eq!(points.len(), 3),
            other => panic!("expected scatter figure, got {:?}", other),
        }
    }

    #[test]
    fn log_toggle_rejects_known_non_positive_minimum() {
        let store = MemoryStore::new();
        store.add_dataset("/neg", Array::from_vec(vec![-1.0, 2.0, 3.0]).into_dyn());
        let mut app = App::new(Arc::new(store), Config::default()).unwrap();
        app.handle_key(key(KeyCode::Char('G'))); // cursor to /neg
        app.handle_key(key(KeyCode::Char('p')));
        app.handle_key(key(KeyCode::Char('x'))); // select x, range job kicked off
        wait_jobs(&mut app);
        app.handle_key(key(KeyCode::Char('X')));
        assert!(app.status.contains("Log scale incompatible"), "{}", app.status);
        assert!(!app.plot_config.x_scale.is_log());
        // No y selection, so nothing is known; the toggle goes through.
        app.handle_key(key(KeyCode::Char('Y')));
        assert!(app.plot_config.y_scale.is_log());
    }

    #[test]
    fn histogram_log_toggle_uses_cached_range() {
        let store = MemoryStore::new();
        store.add_dataset("/neg", Array::from_vec(vec![-1.0, 2.0, 3.0]).into_dyn());
        let mut app = App::new(Arc::new(store), Config::default()).unwrap();
        app.handle_key(key(KeyCode::Char('G')));
        app.handle_key(key(KeyCode::Char('d')));
        app.handle_key(key(KeyCode::Char('m'))); // fills the range cache
        wait_jobs(&mut app);
        app.handle_key(key(KeyCode::Char('q')));
        app.handle_key(key(KeyCode::Char('H')));
        app.handle_key(key(KeyCode::Char('X')));
        assert!(app.status.contains("Log scale incompatible"), "{}", app.status);
        assert!(!app.hist_spec.x_scale.is_log());
    }

    #[test]
    fn copy_path_reports_an_outcome() {
        let mut app = fixture_app();
        app.handle_key(key(KeyCode::Char('G'))); // /b
        app.handle_key(key(KeyCode::Char('c')));
        // Headless machines have no clipboard; the error lands in the
        // status line, otherwise the copied key is echoed.
        assert!(
            app.status.contains("'b'") || app.status.contains("Clipboard error"),
            "{}",
            app.status
        );
    }

    #[test]
    fn leader_mode_roundtrip() {
        let mut app = fixture_app();
        app.handle_key(key(KeyCode::Char('d')));
        assert_eq!(app.mode, Mode::Dataset);
        app.handle_key(key(KeyCode::Char('q')));
        assert_eq!(app.mode, Mode::Normal);
    }

    #[test]
    fn entering_a_mode_force_exits_the_current_one() {
        let mut app = fixture_app();
        app.handle_key(key(KeyCode::Char('d')));
        // `w` is unbound in dataset mode; switch via escape-free path.
        app.dispatch(Action::EnterWindow);
        assert_eq!(app.mode, Mode::Window);
    }

    #[test]
    fn min_max_reaches_done_on_selected_dataset() {
        let mut app = fixture_app();
        app.handle_key(key(KeyCode::Char('G'))); // cursor to /b
        app.handle_key(key(KeyCode::Char('d')));
        app.handle_key(key(KeyCode::Char('m')));
        wait_jobs(&mut app);
        let lines = &app.stats_lines["/b"];
        assert!(lines.contains(&("min".to_string(), "1".to_string())));
        assert!(lines.contains(&("max".to_string(), "3".to_string())));
    }

    #[test]
    fn stat_on_group_reports_error_without_job() {
        let mut app = fixture_app();
        app.handle_key(key(KeyCode::Char('j'))); // cursor to /a (group)
        app.handle_key(key(KeyCode::Char('d')));
        app.handle_key(key(KeyCode::Char('m')));
        assert!(app.slots.get(Slot::Stats).is_none());
        assert!(!app.status.is_empty());
    }

    #[test]
    fn search_accept_freezes_and_reset_restores() {
        let mut app = fixture_app();
        app.handle_key(key(KeyCode::Char('/')));
        assert_eq!(app.mode, Mode::Search);
        app.handle_key(key(KeyCode::Char('b')));
        app.handle_key(key(KeyCode::Enter));
        assert_eq!(app.mode, Mode::Normal);
        assert!(app.tree.is_filtered());
        assert_eq!(app.tree.visible_rows(), &["/b"]);
        app.handle_key(key(KeyCode::Char('r'))); // reset
        assert!(!app.tree.is_filtered());
    }

    #[test]
    fn search_cancel_restores_prior_view() {
        let mut app = fixture_app();
        app.handle_key(key(KeyCode::Char('/')));
        app.handle_key(key(KeyCode::Char('b')));
        app.handle_key(key(KeyCode::Esc));
        assert_eq!(app.mode, Mode::Normal);
        assert!(!app.tree.is_filtered());
        assert_eq!(app.tree.visible_rows().len(), 3);
    }

    #[test]
    fn rename_prompt_applies_to_tree_after_done() {
        let mut app = fixture_app();
        app.handle_key(key(KeyCode::Char('G'))); // /b
        app.handle_key(key(KeyCode::Char('e'))); // edit mode
        app.handle_key(key(KeyCode::Char('r'))); // rename prompt
        for c in "data".chars() {
            app.handle_key(key(KeyCode::Char(c)));
        }
        app.handle_key(key(KeyCode::Enter));
        wait_jobs(&mut app);
        assert!(app.tree.node("/data").is_some());
        assert!(app.tree.node("/b").is_none());
        assert!(app.store.exists("/data"));
    }

    #[test]
    fn rename_to_existing_sibling_creates_no_job() {
        let mut app = fixture_app();
        app.handle_key(key(KeyCode::Char('G')));
        app.handle_key(key(KeyCode::Char('e')));
        app.handle_key(key(KeyCode::Char('r')));
        app.handle_key(key(KeyCode::Char('a'))); // "/a" already exists
        app.handle_key(key(KeyCode::Enter));
        assert!(app.slots.get(Slot::Rename).is_none());
        assert!(app.store.exists("/b"));
        assert!(app.tree.node("/b").is_some());
        assert!(app.status.contains("already exists"));
    }

    #[test]
    fn edit_escape_cancels_buffer_but_stays_in_edit() {
        let mut app = fixture_app();
        app.handle_key(key(KeyCode::Char('e')));
        app.handle_key(key(KeyCode::Char('r')));
        assert!(app.prompt.is_some());
        app.handle_key(key(KeyCode::Esc));
        assert!(app.prompt.is_none());
        assert_eq!(app.mode, Mode::Edit);
        app.handle_key(key(KeyCode::Char('q')));
        assert_eq!(app.mode, Mode::Normal);
    }

    #[test]
    fn window_plot_key_is_a_combined_transition() {
        let mut app = fixture_app();
        app.handle_key(key(KeyCode::Char('w')));
        app.handle_key(key(KeyCode::Char('p')));
        assert_eq!(app.mode, Mode::Plot);
        assert_eq!(app.focus, Panel::Plot);
    }

    #[test]
    fn cancelled_stat_then_fresh_request_reaches_done() {
        let mut app = fixture_app();
        app.handle_key(key(KeyCode::Char('G')));
        app.handle_key(key(KeyCode::Char('d')));
        app.handle_key(key(KeyCode::Char('m')));
        app.handle_key(key(KeyCode::Char('c'))); // cancel
        app.handle_key(key(KeyCode::Char('m'))); // supersede with a fresh job
        wait_jobs(&mut app);
        assert!(app.stats_lines.contains_key("/b"));
    }

    #[test]
    fn value_range_prompt_rejects_malformed_input() {
        assert!(matches!(parse_range("abc-3"), Err(TaigaError::BadRange { .. })));
        assert!(matches!(parse_range("5-2"), Err(TaigaError::BadRange { .. })));
        assert_eq!(parse_range("2-5").unwrap(), (2, 5));
        assert_eq!(parse_range(" 0 - 10 ").unwrap(), (0, 10));
    }
}
