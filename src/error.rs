//! Error types for Taiga.
//!
//! This module provides a unified error handling approach using `thiserror`.
//! Validation errors abort an operation before any state is touched; data
//! errors surface as a failed job; I/O errors are never silently swallowed.
//! Cancellation is deliberately *not* an error: it is a distinct job
//! terminal state.

use thiserror::Error;

/// Result type alias for Taiga operations.
pub type Result<T> = std::result::Result<T, TaigaError>;

/// The axis a scale error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleAxis {
    /// The x axis of a plot or the value axis of a histogram.
    X,
    /// The y axis of a scatter plot.
    Y,
    /// The count axis of a histogram.
    Count,
}

impl std::fmt::Display for ScaleAxis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScaleAxis::X => write!(f, "x"),
            ScaleAxis::Y => write!(f, "y"),
            ScaleAxis::Count => write!(f, "count"),
        }
    }
}

/// Errors that can occur in Taiga.
#[derive(Debug, Error)]
pub enum TaigaError {
    /// Tried to expand or list a node that is not a group.
    #[error("Not a group: {path}")]
    NotAGroup { path: String },

    /// Path does not exist in the store or tree.
    #[error("Path not found: {path}")]
    PathNotFound { path: String },

    /// A statistic or histogram was requested on a non-numeric dataset.
    #[error("Non-numeric data: {path} has dtype {dtype}")]
    NonNumericData { path: String, dtype: String },

    /// A reduction was requested on a dataset with no elements.
    #[error("Dataset is empty: {path}")]
    EmptyDataset { path: String },

    /// Cross-dataset plotting with unreconcilable shapes.
    #[error("Incompatible shapes: {left:?} vs {right:?}")]
    ShapeIncompatible { left: Vec<usize>, right: Vec<usize> },

    /// Logarithmic scaling requested on an axis whose minimum is not
    /// strictly positive, or a log count axis with an empty bin.
    #[error("Log scale incompatible with {axis} axis (minimum observed: {min_observed})")]
    IncompatibleScale { axis: ScaleAxis, min_observed: f64 },

    /// Rename target name failed validation.
    #[error("Invalid name: {reason}")]
    InvalidName { reason: String },

    /// Rename target already exists as a sibling.
    #[error("'{name}' already exists in {parent}")]
    NameExists { parent: String, name: String },

    /// Rename to the current name; reported distinctly from success.
    #[error("Name unchanged")]
    NameUnchanged,

    /// A malformed value-range expression like "abc-3".
    #[error("Invalid range '{input}': expected START-END with START < END")]
    BadRange { input: String },

    /// Keymap entries that reassign reserved vim-navigation keys.
    #[error("Reserved key remap rejected:\n{}", conflicts.join("\n"))]
    ReservedKeys { conflicts: Vec<String> },

    /// A keymap entry whose key string could not be parsed.
    #[error("Unknown key '{key}' for {mode}.{action}")]
    UnknownKey {
        mode: String,
        action: String,
        key: String,
    },

    /// Failure reported by the underlying data store.
    #[error("Store error: {0}")]
    Store(String),

    /// A background worker panicked; converted rather than crashing.
    #[error("Worker panicked: {0}")]
    WorkerPanic(String),

    /// Configuration file could not be parsed.
    #[error("Config error: {0}")]
    Config(String),

    /// Clipboard error.
    #[error("Clipboard error: {0}")]
    Clipboard(#[from] arboard::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TaigaError {
    /// Create a `NotAGroup` error.
    pub fn not_a_group(path: impl Into<String>) -> Self {
        Self::NotAGroup { path: path.into() }
    }

    /// Create a `PathNotFound` error.
    pub fn path_not_found(path: impl Into<String>) -> Self {
        Self::PathNotFound { path: path.into() }
    }

    /// Create a `Store` error.
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// True for errors that abort synchronously with no state mutated.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidName { .. }
                | Self::NameExists { .. }
                | Self::NameUnchanged
                | Self::BadRange { .. }
                | Self::ReservedKeys { .. }
                | Self::UnknownKey { .. }
        )
    }
}

impl From<serde_yaml::Error> for TaigaError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Config(err.to_string())
    }
}
