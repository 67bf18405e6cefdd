//! Modal key dispatch.
//!
//! Interaction modes form a small FSM; each mode owns a keymap from keys to
//! [`Action`]s. The table is built once at startup from the compiled-in
//! defaults plus config overrides, so dispatch is a single map lookup and
//! never touches strings. While `vim_mode` is on, the navigation keys
//! `h j k l g G` are fixed rows that config cannot reassign.

use std::collections::HashMap;

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::config::Config;
use crate::error::{Result, TaigaError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    Normal,
    Goto,
    Search,
    Dataset,
    Window,
    Plot,
    Histogram,
    Edit,
}

impl Mode {
    pub fn name(self) -> &'static str {
        match self {
            Mode::Normal => "normal",
            Mode::Goto => "goto",
            Mode::Search => "search",
            Mode::Dataset => "dataset",
            Mode::Window => "window",
            Mode::Plot => "plot",
            Mode::Histogram => "histogram",
            Mode::Edit => "edit",
        }
    }

}

/// Every dispatchable action across all modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Quit,
    ForceQuit,
    MoveUp,
    MoveDown,
    PageUp,
    PageDown,
    JumpTop,
    JumpBottom,
    JumpParent,
    JumpNextSibling,
    ExpandCollapse,
    Reset,
    EnterGoto,
    EnterSearch,
    EnterDataset,
    EnterWindow,
    EnterPlot,
    EnterHistogram,
    EnterEdit,
    GotoPath,
    JumpToKey,
    CopyPath,
    MinMax,
    Mean,
    Std,
    Preview,
    PreviewRange,
    CancelJob,
    ClearValues,
    FocusTree,
    FocusAttributes,
    FocusValues,
    FocusPlot,
    FocusHistogram,
    SelectX,
    SelectY,
    ToggleXLog,
    ToggleYLog,
    ToggleCountLog,
    Generate,
    SaveFigure,
    ResetFigure,
    SetBins,
    Rename,
}

impl Action {
    pub fn name(self) -> &'static str {
        match self {
            Action::Quit => "quit",
            Action::ForceQuit => "force_quit",
            Action::MoveUp => "move_up",
            Action::MoveDown => "move_down",
            Action::PageUp => "page_up",
            Action::PageDown => "page_down",
            Action::JumpTop => "jump_top",
            Action::JumpBottom => "jump_bottom",
            Action::JumpParent => "jump_parent",
            Action::JumpNextSibling => "jump_next_sibling",
            Action::ExpandCollapse => "expand_collapse",
            Action::Reset => "reset",
            Action::EnterGoto => "goto_mode",
            Action::EnterSearch => "search_mode",
            Action::EnterDataset => "dataset_mode",
            Action::EnterWindow => "window_mode",
            Action::EnterPlot => "plot_mode",
            Action::EnterHistogram => "histogram_mode",
            Action::EnterEdit => "edit_mode",
            Action::GotoPath => "goto_path",
            Action::JumpToKey => "jump_to_key",
            Action::CopyPath => "copy_path",
            Action::MinMax => "min_max",
            Action::Mean => "mean",
            Action::Std => "std",
            Action::Preview => "preview",
            Action::PreviewRange => "preview_range",
            Action::CancelJob => "cancel_job",
            Action::ClearValues => "clear_values",
            Action::FocusTree => "focus_tree",
            Action::FocusAttributes => "focus_attributes",
            Action::FocusValues => "focus_values",
            Action::FocusPlot => "focus_plot",
            Action::FocusHistogram => "focus_histogram",
            Action::SelectX => "select_x",
            Action::SelectY => "select_y",
            Action::ToggleXLog => "toggle_x_log",
            Action::ToggleYLog => "toggle_y_log",
            Action::ToggleCountLog => "toggle_count_log",
            Action::Generate => "generate",
            Action::SaveFigure => "save_figure",
            Action::ResetFigure => "reset_figure",
            Action::SetBins => "set_bins",
            Action::Rename => "rename",
        }
    }

    /// Cursor-movement actions stay live inside every leader mode, so the
    /// current row can change between steps of a multi-key workflow.
    pub fn is_navigation(self) -> bool {
        matches!(
            self,
            Action::MoveUp
                | Action::MoveDown
                | Action::PageUp
                | Action::PageDown
                | Action::JumpTop
                | Action::JumpBottom
                | Action::JumpParent
                | Action::JumpNextSibling
                | Action::ExpandCollapse
        )
    }
}

/// A normalized key: code plus the modifiers that matter for dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Key {
    pub code: KeyCode,
    pub mods: KeyModifiers,
}

impl Key {
    pub fn char(c: char) -> Self {
        Self {
            code: KeyCode::Char(c),
            mods: KeyModifiers::NONE,
        }
    }

    pub fn ctrl(c: char) -> Self {
        Self {
            code: KeyCode::Char(c),
            mods: KeyModifiers::CONTROL,
        }
    }

    /// Terminal emulators report shifted characters with the SHIFT modifier
    /// set; the character itself already carries the case.
    pub fn from_event(event: &KeyEvent) -> Self {
        let mods = match event.code {
            KeyCode::Char(_) => event.modifiers.difference(KeyModifiers::SHIFT),
            _ => event.modifiers,
        };
        Self {
            code: event.code,
            mods,
        }
    }

    /// Parse a config key string: a single character, a named key
    /// (`enter`, `escape`, `tab`, `space`, `up`, `down`, `left`, `right`),
    /// or `c-<char>` for a control chord.
    pub fn parse(text: &str) -> Option<Self> {
        let named = |code| Some(Self { code, mods: KeyModifiers::NONE });
        match text {
            "enter" => named(KeyCode::Enter),
            "escape" => named(KeyCode::Esc),
            "tab" => named(KeyCode::Tab),
            "space" => named(KeyCode::Char(' ')),
            "up" => named(KeyCode::Up),
            "down" => named(KeyCode::Down),
            "left" => named(KeyCode::Left),
            "right" => named(KeyCode::Right),
            _ => {
                if let Some(rest) = text.strip_prefix("c-") {
                    let mut chars = rest.chars();
                    match (chars.next(), chars.next()) {
                        (Some(c), None) => Some(Self::ctrl(c)),
                        _ => None,
                    }
                } else {
                    let mut chars = text.chars();
                    match (chars.next(), chars.next()) {
                        (Some(c), None) => Some(Self::char(c)),
                        _ => None,
                    }
                }
            }
        }
    }

    pub fn label(&self) -> String {
        let base = match self.code {
            KeyCode::Char(' ') => "space".to_string(),
            KeyCode::Char(c) => c.to_string(),
            KeyCode::Enter => "⏎".to_string(),
            KeyCode::Esc => "esc".to_string(),
            KeyCode::Tab => "tab".to_string(),
            KeyCode::Up => "↑".to_string(),
            KeyCode::Down => "↓".to_string(),
            KeyCode::Left => "←".to_string(),
            KeyCode::Right => "→".to_string(),
            other => format!("{:?}", other),
        };
        if self.mods.contains(KeyModifiers::CONTROL) {
            format!("C-{}", base)
        } else {
            base
        }
    }
}

/// Default bindings, overridable from config by `<mode>.<action>` name.
const DEFAULTS: &[(Mode, Action, &str)] = &[
    (Mode::Normal, Action::Quit, "q"),
    (Mode::Normal, Action::ForceQuit, "c-q"),
    (Mode::Normal, Action::MoveUp, "up"),
    (Mode::Normal, Action::MoveDown, "down"),
    (Mode::Normal, Action::PageUp, "c-u"),
    (Mode::Normal, Action::PageDown, "c-d"),
    (Mode::Normal, Action::ExpandCollapse, "enter"),
    (Mode::Normal, Action::JumpNextSibling, "tab"),
    (Mode::Normal, Action::Reset, "r"),
    (Mode::Normal, Action::EnterGoto, "o"),
    (Mode::Normal, Action::EnterSearch, "/"),
    (Mode::Normal, Action::EnterDataset, "d"),
    (Mode::Normal, Action::EnterWindow, "w"),
    (Mode::Normal, Action::EnterPlot, "p"),
    (Mode::Normal, Action::EnterHistogram, "H"),
    (Mode::Normal, Action::EnterEdit, "e"),
    (Mode::Normal, Action::CopyPath, "c"),
    (Mode::Goto, Action::JumpTop, "t"),
    (Mode::Goto, Action::JumpBottom, "b"),
    (Mode::Goto, Action::JumpParent, "p"),
    (Mode::Goto, Action::JumpNextSibling, "n"),
    (Mode::Goto, Action::GotoPath, "f"),
    (Mode::Goto, Action::JumpToKey, "k"),
    (Mode::Dataset, Action::MinMax, "m"),
    (Mode::Dataset, Action::Mean, "a"),
    (Mode::Dataset, Action::Std, "s"),
    (Mode::Dataset, Action::Preview, "v"),
    (Mode::Dataset, Action::PreviewRange, "V"),
    (Mode::Dataset, Action::CancelJob, "c"),
    (Mode::Dataset, Action::ClearValues, "x"),
    (Mode::Window, Action::FocusTree, "t"),
    (Mode::Window, Action::FocusAttributes, "a"),
    (Mode::Window, Action::FocusValues, "v"),
    (Mode::Window, Action::FocusPlot, "p"),
    (Mode::Window, Action::FocusHistogram, "H"),
    (Mode::Plot, Action::SelectX, "x"),
    (Mode::Plot, Action::SelectY, "y"),
    (Mode::Plot, Action::ToggleXLog, "X"),
    (Mode::Plot, Action::ToggleYLog, "Y"),
    (Mode::Plot, Action::Generate, "p"),
    (Mode::Plot, Action::SaveFigure, "w"),
    (Mode::Plot, Action::ResetFigure, "r"),
    (Mode::Plot, Action::CancelJob, "c"),
    (Mode::Histogram, Action::SetBins, "b"),
    (Mode::Histogram, Action::ToggleXLog, "X"),
    (Mode::Histogram, Action::ToggleCountLog, "C"),
    (Mode::Histogram, Action::Generate, "p"),
    (Mode::Histogram, Action::SaveFigure, "w"),
    (Mode::Histogram, Action::ResetFigure, "r"),
    (Mode::Histogram, Action::CancelJob, "c"),
    (Mode::Edit, Action::Rename, "r"),
    (Mode::Edit, Action::CancelJob, "c"),
];

/// Fixed rows added while vim navigation is on; reserved, not overridable.
const VIM_ROWS: &[(Mode, Action, &str)] = &[
    (Mode::Normal, Action::JumpParent, "h"),
    (Mode::Normal, Action::MoveDown, "j"),
    (Mode::Normal, Action::MoveUp, "k"),
    (Mode::Normal, Action::ExpandCollapse, "l"),
    (Mode::Normal, Action::JumpTop, "g"),
    (Mode::Normal, Action::JumpBottom, "G"),
];

/// The enum-keyed dispatch table, built once at startup.
pub struct Keymap {
    table: HashMap<(Mode, Key), Action>,
}

impl Keymap {
    pub fn build(config: &Config) -> Result<Self> {
        let mut table = HashMap::new();
        for &(mode, action, default_key) in DEFAULTS {
            let key_text = config
                .key_override(mode.name(), action.name())
                .unwrap_or(default_key);
            let key = Key::parse(key_text).ok_or_else(|| TaigaError::UnknownKey {
                mode: mode.name().to_string(),
                action: action.name().to_string(),
                key: key_text.to_string(),
            })?;
            table.insert((mode, key), action);
        }
        if config.vim_mode {
            for &(mode, action, key_text) in VIM_ROWS {
                let key = Key::parse(key_text).ok_or_else(|| TaigaError::UnknownKey {
                    mode: mode.name().to_string(),
                    action: action.name().to_string(),
                    key: key_text.to_string(),
                })?;
                table.insert((mode, key), action);
            }
        }
        Ok(Self { table })
    }

    pub fn lookup(&self, mode: Mode, key: Key) -> Option<Action> {
        self.table.get(&(mode, key)).copied()
    }

    /// Key/action pairs for one mode, for the hint bar. Stable order by
    /// key label.
    pub fn bindings(&self, mode: Mode) -> Vec<(Key, Action)> {
        let mut rows: Vec<(Key, Action)> = self
            .table
            .iter()
            .filter(|((m, _), _)| *m == mode)
            .map(|((_, k), a)| (*k, *a))
            .collect();
        rows.sort_by_key(|(k, _)| k.label());
        rows
    }
}
