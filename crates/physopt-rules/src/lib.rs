//! # Built-in Rewrite Passes
//!
//! This crate provides the default set of passes run over a finished physical plan:
//!
//! - **`StarColumnPass`**: Prefixes columns expanded from `*` when they would be
//!   ambiguous and restores the original names at the result boundary.
//! - **`JoinInputPass`**: Renames join inputs to the names the join exposes.
//!
//! Each pass can be switched off through [`PlannerSettings`](physopt_core::settings::PlannerSettings).

pub mod join_input;
pub mod star_columns;

use physopt_core::pass::PassRegistry;

pub use star_columns::insert_rename_project;

/// Create a pass registry with all built-in passes.
///
/// Star columns are resolved first so that join inputs are renamed against the
/// prefixed names.
pub fn default_pass_registry() -> PassRegistry {
    let mut registry = PassRegistry::new();
    registry.add_pass(Box::new(star_columns::StarColumnPass));
    registry.add_pass(Box::new(join_input::JoinInputPass));
    registry
}
