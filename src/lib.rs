//! Taiga - a terminal explorer for hierarchical chunked array files.
//!
//! Taiga browses HDF5-style group/dataset/attribute trees lazily, so a file
//! far larger than memory opens instantly, and computes statistics over
//! datasets chunk by chunk on background workers while the interface stays
//! responsive.
//!
//! # Features
//!
//! - Lazy tree navigation with expand/collapse and vim-style shortcuts
//! - Fuzzy search over the materialized hierarchy
//! - Cancellable chunked min/max, mean, std and histogram jobs with
//!   progress reporting
//! - Scatter plots and histograms rendered in the terminal
//! - Safe copy-then-delete renames of groups and datasets
//!
//! # Example
//!
//! ```
//! use taiga::store::MemoryStore;
//! use taiga::tree::Tree;
//!
//! let store = MemoryStore::new();
//! store.add_group("/gas");
//! let tree = Tree::open(&store).unwrap();
//! assert_eq!(tree.visible_rows(), &["/", "/gas"]);
//! ```

#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod app;
pub mod clipboard;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod jobs;
pub mod plot;
pub mod rename;
pub mod search;
pub mod store;
pub mod tree;
pub mod ui;

pub use error::{Result, TaigaError};
