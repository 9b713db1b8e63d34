//! # physopt-core: Physical Plan Layer
//!
//! This crate holds the physical-plan representation of a cost-based SQL optimizer and
//! the machinery that runs over finished plans.
//!
//! ## Module Overview
//!
//! - **`plan`**: Immutable operator tree (`PhysicalNode`, `PlanRef`), one variant per
//!   physical operator, with typed constructors that derive output schemas.
//! - **`expr`**: Scalar expressions, data types and join/aggregate/sort descriptors.
//! - **`schema`**: Named, typed output rows.
//! - **`names`**: Case-insensitive unique-name resolution shared by the rewrites.
//! - **`properties`**: Physical traits (distribution, collation).
//! - **`visitor`**: Bottom-up rewrite primitive used by every pass.
//! - **`join`**: Join predicate classification into equi-key conditions and a residual.
//! - **`metadata`**: Per-operator metadata dispatch with a process-wide dispatcher cache
//!   and per-session memoisation.
//! - **`pass`**: The `PlanPass` trait and `PassRegistry`.
//! - **`settings`**: `PlannerSettings`, loadable from TOML.
//! - **`error`**: `PlanError` and `PlanResult`.

pub mod error;
pub mod expr;
pub mod join;
pub mod metadata;
pub mod names;
pub mod pass;
pub mod plan;
pub mod properties;
pub mod schema;
pub mod settings;
pub mod visitor;

pub use error::{PlanError, PlanResult};
pub use join::classify;
pub use metadata::resolve_dispatcher;
pub use plan::{PhysicalNode, PhysicalOp, PhysicalOpKind, PlanRef};
