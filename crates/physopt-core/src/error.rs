//! Error types for plan rewriting, join classification and metadata dispatch.

use crate::plan::PhysicalOpKind;
use thiserror::Error;

/// Errors raised while working on a physical plan.
///
/// None of these are retried: they surface immediately and abort the rewrite or
/// metadata resolution of the whole plan.
#[derive(Debug, Error)]
pub enum PlanError {
    /// A join conjunct at an equi-key position is neither `=` nor
    /// `IS NOT DISTINCT FROM`.
    #[error("Unsupported comparator in join condition {expr}")]
    UnsupportedJoinPredicate { expr: String },

    /// The join declares more key pairs than its condition has conjuncts.
    #[error("join key pair {position} has no matching conjunct ({available} available)")]
    MissingJoinConjunct { position: usize, available: usize },

    /// A residual join predicate references a field outside both inputs.
    #[error("Unable to handle input number: {index} (left has {left} fields, right has {right})")]
    InputResolution {
        index: usize,
        left: usize,
        right: usize,
    },

    /// An expression references a field its input does not have.
    #[error("input reference ${index} out of range for a row of {width} fields")]
    InvalidInputRef { index: usize, width: usize },

    /// A projection list and its name list disagree in length.
    #[error("{exprs} expressions but {names} field names")]
    SchemaMismatch { exprs: usize, names: usize },

    /// A projection that must keep its row type unique names two fields alike,
    /// ignoring case.
    #[error("duplicate field names in projection {names:?}")]
    DuplicateFieldName { names: Vec<String> },

    /// A node was built with the wrong number of children for its kind.
    #[error("{kind:?} expects {expected} inputs, got {actual}")]
    ChildCount {
        kind: PhysicalOpKind,
        expected: usize,
        actual: usize,
    },

    /// A handler set could not be turned into a dispatcher. This is a registration
    /// bug, not a property of the query.
    #[error("cannot build metadata dispatcher for {variant:?}: handler '{handler}' {reason}\n{diagnostic}")]
    DispatcherBuild {
        variant: PhysicalOpKind,
        handler: String,
        reason: String,
        /// Rendered dispatch table at the point of failure.
        diagnostic: String,
    },

    /// Arguments passed for a metadata kind do not match its parameter list.
    #[error("invalid arguments for {kind}: {reason}")]
    InvalidMetadataArgs { kind: String, reason: String },

    /// A dispatcher was asked about a node of another operator variant.
    #[error("dispatcher for {expected:?} cannot serve a {actual:?} node")]
    VariantMismatch {
        expected: PhysicalOpKind,
        actual: PhysicalOpKind,
    },

    /// Planner settings could not be read.
    #[error("invalid planner settings: {0}")]
    Settings(String),
}

/// Result type for plan operations.
pub type PlanResult<T> = Result<T, PlanError>;
