//! # Join Predicate Classification
//!
//! Execution needs a join's condition split in two:
//!
//! - **Join conditions**: one `(comparator, left field, right field)` triple per
//!   equi-key, used to build and probe hash tables or to merge sorted streams.
//! - **Extra condition**: everything else, evaluated per matching row pair, with each
//!   field reference resolved to the input it comes from.
//!
//! The planner hands over the condition together with the equi-key pairs it already
//! recognised. Conjuncts are matched against key pairs by position: the Nth conjunct
//! is the Nth key pair. Only `=` and `IS NOT DISTINCT FROM` may appear at a key
//! position; anything else there is a planning bug and is rejected rather than
//! silently dropped.

use crate::error::{PlanError, PlanResult};
use crate::expr::{BinaryOp, ColumnRef, Expr};
use crate::plan::{JoinSpec, PhysicalNode};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Comparator of one equi-join key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Comparator {
    /// `=`: a NULL key never matches.
    Equals,
    /// `IS NOT DISTINCT FROM`: NULL keys match each other.
    IsNotDistinctFrom,
}

impl Comparator {
    fn from_op(op: BinaryOp) -> Option<Self> {
        match op {
            BinaryOp::Eq => Some(Comparator::Equals),
            BinaryOp::IsNotDistinctFrom => Some(Comparator::IsNotDistinctFrom),
            _ => None,
        }
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Comparator::Equals => f.write_str("EQUALS"),
            Comparator::IsNotDistinctFrom => f.write_str("IS_NOT_DISTINCT_FROM"),
        }
    }
}

/// Quoted reference to a single field by name.
///
/// The name is taken verbatim as one path segment (dots are not split) and rendered
/// between back-ticks, with embedded back-ticks and backslashes escaped.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldReference {
    name: String,
}

impl FieldReference {
    pub fn quoted(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// The unquoted field name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for FieldReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("`")?;
        for c in self.name.chars() {
            if c == '`' || c == '\\' {
                f.write_str("\\")?;
            }
            write!(f, "{}", c)?;
        }
        f.write_str("`")
    }
}

/// One equi-join key as handed to execution.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JoinCondition {
    pub comparator: Comparator,
    pub left: FieldReference,
    pub right: FieldReference,
}

impl fmt::Display for JoinCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.left, self.comparator, self.right)
    }
}

/// Build one [`JoinCondition`] per equi-key pair.
///
/// `condition`'s conjuncts are consumed in source order, one per key pair. Each must
/// be `=` or `IS NOT DISTINCT FROM`; the first that is not fails the whole call with
/// [`PlanError::UnsupportedJoinPredicate`]. Conjuncts past the last key pair are not
/// inspected. Field references are the quoted names of the key fields on each side.
pub fn classify<L: AsRef<str>, R: AsRef<str>>(
    condition: &Expr,
    left_fields: &[L],
    right_fields: &[R],
    left_keys: &[usize],
    right_keys: &[usize],
) -> PlanResult<Vec<JoinCondition>> {
    let conjuncts = condition.conjuncts();
    let mut conditions = Vec::with_capacity(left_keys.len());

    for (position, (&l, &r)) in left_keys.iter().zip(right_keys.iter()).enumerate() {
        let conjunct = conjuncts.get(position).ok_or(PlanError::MissingJoinConjunct {
            position,
            available: conjuncts.len(),
        })?;
        let comparator = match conjunct {
            Expr::BinaryOp { op, .. } => Comparator::from_op(*op),
            _ => None,
        }
        .ok_or_else(|| PlanError::UnsupportedJoinPredicate {
            expr: conjunct.to_string(),
        })?;

        let left = left_fields.get(l).ok_or(PlanError::InvalidInputRef {
            index: l,
            width: left_fields.len(),
        })?;
        let right = right_fields.get(r).ok_or(PlanError::InvalidInputRef {
            index: r,
            width: right_fields.len(),
        })?;

        conditions.push(JoinCondition {
            comparator,
            left: FieldReference::quoted(left.as_ref()),
            right: FieldReference::quoted(right.as_ref()),
        });
    }

    Ok(conditions)
}

/// Rewrite `expr`, written over the combined join row, so that every reference names
/// the input it reads from.
///
/// Ordinals below the left width resolve to the left input, the rest to the right
/// input. A reference past both inputs is an [`PlanError::InputResolution`].
pub fn resolve_join_inputs<L: AsRef<str>, R: AsRef<str>>(
    expr: &Expr,
    left_fields: &[L],
    right_fields: &[R],
) -> PlanResult<Expr> {
    let left_count = left_fields.len();
    let total = left_count + right_fields.len();
    expr.try_map_inputs(&mut |r| {
        let (input, index, name) = if r.index < left_count {
            (0, r.index, left_fields[r.index].as_ref())
        } else if r.index < total {
            let index = r.index - left_count;
            (1, index, right_fields[index].as_ref())
        } else {
            return Err(PlanError::InputResolution {
                index: r.index,
                left: left_count,
                right: right_fields.len(),
            });
        };
        Ok(Expr::Column(ColumnRef {
            input,
            index,
            name: name.to_string(),
            data_type: r.data_type,
        }))
    })
}

impl PhysicalNode {
    /// Equi-key conditions of this join, named after its inputs' fields.
    pub fn build_join_conditions(&self) -> PlanResult<Vec<JoinCondition>> {
        let (spec, left, right) = self.join_parts()?;
        classify(
            &spec.condition,
            &left.field_names(),
            &right.field_names(),
            &spec.left_keys(),
            &spec.right_keys(),
        )
    }

    /// The residual predicate with references resolved per input.
    ///
    /// Returns `None` when `vectorize` is off, when there is no residual predicate, or
    /// when it is always true.
    pub fn build_extra_condition(&self, vectorize: bool) -> PlanResult<Option<Expr>> {
        let (spec, left, right) = self.join_parts()?;
        match &spec.extra_condition {
            Some(extra) if vectorize && !extra.is_always_true() => Ok(Some(resolve_join_inputs(
                extra,
                &left.field_names(),
                &right.field_names(),
            )?)),
            _ => Ok(None),
        }
    }

    fn join_parts(&self) -> PlanResult<(&JoinSpec, &PhysicalNode, &PhysicalNode)> {
        let spec = self.op().join_spec().ok_or(PlanError::ChildCount {
            kind: self.kind(),
            expected: 2,
            actual: self.children().len(),
        })?;
        match self.children() {
            [left, right] => Ok((spec, left.as_ref(), right.as_ref())),
            _ => Err(PlanError::ChildCount {
                kind: self.kind(),
                expected: 2,
                actual: self.children().len(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{DataType, JoinType, ScalarValue};
    use crate::plan::{JoinAlgorithm, PlanRef, TableRef};
    use crate::schema::{Field, Schema};
    use crate::settings::PlannerSettings;

    fn col(i: usize) -> Expr {
        Expr::input_ref(i, DataType::Int64)
    }

    const LEFT: [&str; 2] = ["a_id", "a_v"];
    const RIGHT: [&str; 2] = ["b_id", "b_v"];

    #[test]
    fn test_classify_equals_and_null_safe() {
        let cond = Expr::and(vec![
            Expr::equals(col(0), col(2)),
            Expr::is_not_distinct_from(col(1), col(3)),
        ]);
        let conds = classify(&cond, &LEFT, &RIGHT, &[0, 1], &[0, 1]).unwrap();
        assert_eq!(conds.len(), 2);
        assert_eq!(conds[0].comparator, Comparator::Equals);
        assert_eq!(conds[0].left.to_string(), "`a_id`");
        assert_eq!(conds[0].right.to_string(), "`b_id`");
        assert_eq!(conds[1].comparator, Comparator::IsNotDistinctFrom);
        assert_eq!(conds[1].to_string(), "`a_v` IS_NOT_DISTINCT_FROM `b_v`");
    }

    #[test]
    fn test_classify_rejects_non_equi_at_key_position() {
        let cond = Expr::and(vec![
            Expr::equals(col(0), col(2)),
            Expr::binary(BinaryOp::Lt, col(1), col(3)),
        ]);
        let err = classify(&cond, &LEFT, &RIGHT, &[0, 1], &[0, 1]).unwrap_err();
        match err {
            PlanError::UnsupportedJoinPredicate { expr } => assert_eq!(expr, "<($1, $3)"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_classify_ignores_conjuncts_past_keys() {
        let cond = Expr::and(vec![
            Expr::equals(col(0), col(2)),
            Expr::binary(BinaryOp::Gt, col(1), col(3)),
        ]);
        let conds = classify(&cond, &LEFT, &RIGHT, &[0], &[0]).unwrap();
        assert_eq!(conds.len(), 1);
    }

    #[test]
    fn test_classify_missing_conjunct() {
        let cond = Expr::equals(col(0), col(2));
        let err = classify(&cond, &LEFT, &RIGHT, &[0, 1], &[0, 1]).unwrap_err();
        assert!(matches!(
            err,
            PlanError::MissingJoinConjunct {
                position: 1,
                available: 1
            }
        ));
    }

    #[test]
    fn test_field_reference_escapes_backticks() {
        assert_eq!(FieldReference::quoted("a.b").to_string(), "`a.b`");
        assert_eq!(FieldReference::quoted("we`ird").to_string(), "`we\\`ird`");
    }

    #[test]
    fn test_resolve_join_inputs_splits_sides() {
        let extra = Expr::binary(BinaryOp::Lt, col(1), col(3));
        let resolved = resolve_join_inputs(&extra, &LEFT, &RIGHT).unwrap();
        assert_eq!(resolved.to_string(), "<($0.a_v, $1.b_v)");
    }

    #[test]
    fn test_resolve_join_inputs_out_of_range() {
        let extra = Expr::binary(BinaryOp::Lt, col(1), col(4));
        let err = resolve_join_inputs(&extra, &LEFT, &RIGHT).unwrap_err();
        assert!(matches!(
            err,
            PlanError::InputResolution {
                index: 4,
                left: 2,
                right: 2
            }
        ));
    }

    fn join_with_extra(extra: Option<Expr>) -> PlanRef {
        let side = |name: &str, cols: [&str; 2]| {
            PhysicalNode::scan(
                TableRef::new("s", name),
                Schema::new(cols.iter().map(|c| Field::new(*c, DataType::Int64)).collect()),
            )
        };
        let spec = JoinSpec {
            join_type: JoinType::Inner,
            condition: Expr::and(vec![
                Expr::equals(col(0), col(2)),
                Expr::binary(BinaryOp::NotEq, col(1), col(3)),
            ]),
            equi_keys: vec![(0, 0)],
            extra_condition: extra,
        };
        PhysicalNode::join(JoinAlgorithm::Hash, spec, side("a", LEFT), side("b", RIGHT)).unwrap()
    }

    #[test]
    fn test_join_node_conditions_and_extra() {
        let join = join_with_extra(Some(Expr::binary(BinaryOp::NotEq, col(1), col(3))));
        let conds = join.build_join_conditions().unwrap();
        assert_eq!(conds.len(), 1);
        assert_eq!(conds[0].to_string(), "`a_id` EQUALS `b_id`");

        let vectorize = PlannerSettings::default().vectorize_extra_join_condition;
        let extra = join.build_extra_condition(vectorize).unwrap().unwrap();
        assert_eq!(extra.to_string(), "<>($0.a_v, $1.b_v)");
        assert!(join.build_extra_condition(false).unwrap().is_none());
    }

    #[test]
    fn test_always_true_extra_is_dropped() {
        let join = join_with_extra(Some(Expr::literal(ScalarValue::Bool(true))));
        assert!(join.build_extra_condition(true).unwrap().is_none());
        let join = join_with_extra(None);
        assert!(join.build_extra_condition(true).unwrap().is_none());
    }
}
