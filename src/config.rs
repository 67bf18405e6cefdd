//! User configuration.
//!
//! A YAML file supplies keymap overrides (`keymaps.<mode>.<action>: key`)
//! and feature flags. Everything has a compiled-in default; a missing file
//! is not an error. Overrides that reassign a reserved vim-navigation key
//! while `vim_mode` is on are rejected at load with every conflicting entry
//! listed, rather than silently applied.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use crate::error::{Result, TaigaError};

/// Keys vim navigation owns while `vim_mode` is enabled.
pub const RESERVED_VIM_KEYS: [&str; 6] = ["h", "j", "k", "l", "g", "G"];

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub vim_mode: bool,
    pub always_chunk: bool,
    /// Overrides by mode name, then action name, to a key string.
    pub keymaps: HashMap<String, HashMap<String, String>>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            vim_mode: true,
            always_chunk: false,
            keymaps: HashMap::new(),
        }
    }
}

impl Config {
    /// Load from `path`, falling back to defaults when it does not exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) if path.exists() => {
                debug!(path = %path.display(), "loading config");
                let text = std::fs::read_to_string(path)?;
                serde_yaml::from_str(&text)?
            }
            Some(path) => {
                debug!(path = %path.display(), "config file missing, using defaults");
                Self::default()
            }
            None => Self::default(),
        };
        config.validate_reserved_keys()?;
        Ok(config)
    }

    fn validate_reserved_keys(&self) -> Result<()> {
        if !self.vim_mode {
            return Ok(());
        }
        let mut conflicts: Vec<String> = self
            .keymaps
            .iter()
            .flat_map(|(mode, actions)| {
                actions.iter().filter_map(move |(action, key)| {
                    RESERVED_VIM_KEYS
                        .contains(&key.as_str())
                        .then(|| format!("{}.{} -> '{}' (reserved for vim navigation)", mode, action, key))
                })
            })
            .collect();
        if conflicts.is_empty() {
            Ok(())
        } else {
            conflicts.sort();
            Err(TaigaError::ReservedKeys { conflicts })
        }
    }

    /// The override key for `mode.action`, if the file set one.
    pub fn key_override(&self, mode: &str, action: &str) -> Option<&str> {
        self.keymaps.get(mode)?.get(action).map(String::as_str)
    }
}
