//! confgraph library
//!
//! Hierarchical configuration composition: config groups and variants, a
//! defaults list, deep merging, schema-driven typed instantiation, sweep
//! expansion and content-addressed keys for configuration sub-trees.

pub mod cli;
pub mod compose;
pub mod config;
pub mod error;
pub mod format;
pub mod instantiate;
pub mod keys;
pub mod logging;
pub mod path;
pub mod schema;
pub mod settings;
pub mod sweep;

pub use compose::{Composer, RunConfiguration};
pub use error::{ResolveError, SweepError, ValidationError};
