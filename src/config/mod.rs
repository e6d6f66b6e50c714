//! Config groups, defaults resolution and merging.
//!
//! A config directory looks like:
//!
//! ```text
//! config/
//!   config.yaml            # base: defaults list plus top-level keys
//!   connection/
//!     postgres.yaml
//!     sqlite.yaml
//!   hyperparameters/
//!     small.yaml
//!     large.yaml
//! ```
//!
//! ## Resolution
//! 1. **Defaults** - [`defaults::resolve`] picks one variant per group from the
//!    defaults list and group overrides
//! 2. **Merge** - [`merge::merge`] splices each variant under its group key on
//!    top of the base body, then applies path assignments
//!
//! The merged tree is untyped; [`crate::instantiate`] turns it into typed nodes.

pub mod base;
pub mod defaults;
pub mod merge;
pub mod overrides;
pub mod registry;

pub use base::{BaseConfig, DefaultsEntry};
pub use defaults::{Selection, SelectionOrigin, Selections};
pub use merge::{deep_merge, deep_merge_all, set_path};
pub use overrides::{OverrideSpec, SweepTarget, parse_literal, parse_override, parse_overrides};
pub use registry::{ConfigGroup, ConfigGroupRegistry, ConfigVariant};
