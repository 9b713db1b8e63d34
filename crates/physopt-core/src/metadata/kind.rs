//! Metadata kinds, their parameter lists, and the values they produce.

use crate::expr::{Expr, SortKey};
use crate::properties::Distribution;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A category of derived information about a subplan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MetadataKind {
    /// Estimated number of output rows.
    RowCount,
    /// Upper bound on the number of output rows, if any.
    MaxRowCount,
    /// Estimated number of distinct values of a column set, optionally under a
    /// predicate.
    DistinctRowCount,
    /// Fraction of rows passing a predicate.
    Selectivity,
    /// Whether a column set is unique, optionally ignoring rows with NULLs.
    ColumnUniqueness,
    Distribution,
    Collation,
}

/// Parameter slot of a metadata kind or handler.
///
/// Every handler's declared parameters start with the two implicit slots `Node` and
/// `Context`, followed by the kind's own parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParamType {
    Node,
    Context,
    Columns,
    Predicate,
    Flag,
}

impl ParamType {
    /// The two leading parameters every handler declares.
    pub const IMPLICIT: [ParamType; 2] = [ParamType::Node, ParamType::Context];
}

impl MetadataKind {
    pub const ALL: [MetadataKind; 7] = [
        MetadataKind::RowCount,
        MetadataKind::MaxRowCount,
        MetadataKind::DistinctRowCount,
        MetadataKind::Selectivity,
        MetadataKind::ColumnUniqueness,
        MetadataKind::Distribution,
        MetadataKind::Collation,
    ];

    /// Parameters of this kind, excluding the implicit node and context.
    pub fn params(&self) -> &'static [ParamType] {
        match self {
            MetadataKind::RowCount
            | MetadataKind::MaxRowCount
            | MetadataKind::Distribution
            | MetadataKind::Collation => &[],
            MetadataKind::DistinctRowCount => &[ParamType::Columns, ParamType::Predicate],
            MetadataKind::Selectivity => &[ParamType::Predicate],
            MetadataKind::ColumnUniqueness => &[ParamType::Columns, ParamType::Flag],
        }
    }

    /// Full handler signature for this kind: implicit parameters, then `params()`.
    pub fn handler_signature(&self) -> Vec<ParamType> {
        ParamType::IMPLICIT
            .iter()
            .chain(self.params())
            .copied()
            .collect()
    }
}

impl fmt::Display for MetadataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Argument passed for one of a kind's parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MetadataArg {
    Columns(Vec<usize>),
    Predicate(Option<Expr>),
    Flag(bool),
}

impl MetadataArg {
    pub fn param_type(&self) -> ParamType {
        match self {
            MetadataArg::Columns(_) => ParamType::Columns,
            MetadataArg::Predicate(_) => ParamType::Predicate,
            MetadataArg::Flag(_) => ParamType::Flag,
        }
    }
}

/// Result of a metadata request.
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataValue {
    Number(f64),
    Bool(bool),
    Distribution(Distribution),
    Collation(Vec<SortKey>),
}

impl MetadataValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            MetadataValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            MetadataValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handler_signature_leads_with_implicit_params() {
        assert_eq!(
            MetadataKind::DistinctRowCount.handler_signature(),
            vec![
                ParamType::Node,
                ParamType::Context,
                ParamType::Columns,
                ParamType::Predicate
            ]
        );
        assert_eq!(
            MetadataKind::RowCount.handler_signature(),
            ParamType::IMPLICIT.to_vec()
        );
    }
}
