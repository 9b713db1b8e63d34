//! # Scalar Expressions
//!
//! Scalar expressions appear inside physical operators: projection lists, filter
//! predicates, join conditions, sort keys. Column references are *positional*: an
//! `InputRef` points at a field of the operator's input row by ordinal, so renaming a
//! column never changes an expression, only the schema around it.
//!
//! Joins see a single combined input row (left fields followed by right fields). When
//! a residual join predicate is handed to execution it is rewritten so every reference
//! names one specific side; those resolved references are `Expr::Column`.

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Logical type of a column or expression result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    Null,
    Boolean,
    Int64,
    Float64,
    Utf8,
    /// Days since the Unix epoch.
    Date,
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DataType::Null => "NULL",
            DataType::Boolean => "BOOLEAN",
            DataType::Int64 => "BIGINT",
            DataType::Float64 => "DOUBLE",
            DataType::Utf8 => "VARCHAR",
            DataType::Date => "DATE",
        };
        f.write_str(s)
    }
}

/// Constant value inside an expression.
///
/// `Float64` is wrapped in `OrderedFloat` so expressions can be compared and hashed;
/// metadata results are memoised with their arguments as part of the key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ScalarValue {
    Null,
    Bool(bool),
    Int64(i64),
    Float64(OrderedFloat<f64>),
    Utf8(String),
    Date(i32),
}

impl ScalarValue {
    pub fn data_type(&self) -> DataType {
        match self {
            ScalarValue::Null => DataType::Null,
            ScalarValue::Bool(_) => DataType::Boolean,
            ScalarValue::Int64(_) => DataType::Int64,
            ScalarValue::Float64(_) => DataType::Float64,
            ScalarValue::Utf8(_) => DataType::Utf8,
            ScalarValue::Date(_) => DataType::Date,
        }
    }
}

impl PartialEq for ScalarValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int64(a), Self::Int64(b)) => a == b,
            (Self::Float64(a), Self::Float64(b)) => a == b,
            (Self::Utf8(a), Self::Utf8(b)) => a == b,
            (Self::Date(a), Self::Date(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for ScalarValue {}

impl Hash for ScalarValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Self::Null => {}
            Self::Bool(v) => v.hash(state),
            Self::Int64(v) => v.hash(state),
            Self::Float64(v) => v.hash(state),
            Self::Utf8(v) => v.hash(state),
            Self::Date(v) => v.hash(state),
        }
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::Null => f.write_str("null"),
            ScalarValue::Bool(v) => write!(f, "{}", v),
            ScalarValue::Int64(v) => write!(f, "{}", v),
            ScalarValue::Float64(v) => write!(f, "{}", v),
            ScalarValue::Utf8(v) => write!(f, "'{}'", v),
            ScalarValue::Date(v) => write!(f, "DATE({})", v),
        }
    }
}

/// Positional reference to a field of the operator's input row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InputRef {
    pub index: usize,
    pub data_type: DataType,
}

/// Reference to a field of one specific join input.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnRef {
    /// 0 for the left input, 1 for the right input.
    pub input: usize,
    /// Ordinal within that input.
    pub index: usize,
    pub name: String,
    pub data_type: DataType,
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}.{}", self.input, self.name)
    }
}

/// Scalar expression tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Expr {
    InputRef(InputRef),
    Column(ColumnRef),
    Literal(ScalarValue),
    BinaryOp {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    UnaryOp {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Function {
        name: String,
        args: Vec<Expr>,
        return_type: DataType,
    },
    /// Conjunction stored flat so join conditions decompose without walking a
    /// nested binary tree.
    And(Vec<Expr>),
    Or(Vec<Expr>),
}

impl Expr {
    pub fn input_ref(index: usize, data_type: DataType) -> Expr {
        Expr::InputRef(InputRef { index, data_type })
    }

    pub fn literal(value: ScalarValue) -> Expr {
        Expr::Literal(value)
    }

    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
        Expr::BinaryOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn equals(left: Expr, right: Expr) -> Expr {
        Expr::binary(BinaryOp::Eq, left, right)
    }

    pub fn is_not_distinct_from(left: Expr, right: Expr) -> Expr {
        Expr::binary(BinaryOp::IsNotDistinctFrom, left, right)
    }

    pub fn and(exprs: Vec<Expr>) -> Expr {
        Expr::And(exprs)
    }

    /// Result type of the expression.
    pub fn data_type(&self) -> DataType {
        match self {
            Expr::InputRef(r) => r.data_type,
            Expr::Column(c) => c.data_type,
            Expr::Literal(v) => v.data_type(),
            Expr::BinaryOp { op, left, .. } => {
                if op.is_comparison() {
                    DataType::Boolean
                } else {
                    left.data_type()
                }
            }
            Expr::UnaryOp { op, operand } => match op {
                UnaryOp::Neg => operand.data_type(),
                UnaryOp::Not | UnaryOp::IsNull | UnaryOp::IsNotNull => DataType::Boolean,
            },
            Expr::Function { return_type, .. } => *return_type,
            Expr::And(_) | Expr::Or(_) => DataType::Boolean,
        }
    }

    /// The referenced input ordinal when this expression is a bare input reference.
    pub fn as_input_ref(&self) -> Option<usize> {
        match self {
            Expr::InputRef(r) => Some(r.index),
            _ => None,
        }
    }

    /// True for the literal `TRUE` and for an empty conjunction.
    pub fn is_always_true(&self) -> bool {
        match self {
            Expr::Literal(ScalarValue::Bool(true)) => true,
            Expr::And(exprs) => exprs.iter().all(Expr::is_always_true),
            _ => false,
        }
    }

    /// Flatten AND-chains into their conjuncts in source order.
    ///
    /// Literal `TRUE` conjuncts carry no information and are dropped, so a join whose
    /// condition is `TRUE` has no conjuncts at all.
    pub fn conjuncts(&self) -> Vec<&Expr> {
        match self {
            Expr::And(exprs) => exprs.iter().flat_map(|e| e.conjuncts()).collect(),
            Expr::Literal(ScalarValue::Bool(true)) => vec![],
            other => vec![other],
        }
    }

    /// All input ordinals referenced by this expression, in visit order.
    pub fn input_refs(&self) -> Vec<usize> {
        let mut refs = Vec::new();
        self.collect_input_refs(&mut refs);
        refs
    }

    fn collect_input_refs(&self, out: &mut Vec<usize>) {
        match self {
            Expr::InputRef(r) => out.push(r.index),
            Expr::Column(_) | Expr::Literal(_) => {}
            Expr::BinaryOp { left, right, .. } => {
                left.collect_input_refs(out);
                right.collect_input_refs(out);
            }
            Expr::UnaryOp { operand, .. } => operand.collect_input_refs(out),
            Expr::Function { args, .. } | Expr::And(args) | Expr::Or(args) => {
                for a in args {
                    a.collect_input_refs(out);
                }
            }
        }
    }

    /// Rebuild the expression, replacing every `InputRef` with the result of `f`.
    pub fn try_map_inputs<E, F>(&self, f: &mut F) -> Result<Expr, E>
    where
        F: FnMut(&InputRef) -> Result<Expr, E>,
    {
        Ok(match self {
            Expr::InputRef(r) => f(r)?,
            Expr::Column(_) | Expr::Literal(_) => self.clone(),
            Expr::BinaryOp { op, left, right } => Expr::BinaryOp {
                op: *op,
                left: Box::new(left.try_map_inputs(f)?),
                right: Box::new(right.try_map_inputs(f)?),
            },
            Expr::UnaryOp { op, operand } => Expr::UnaryOp {
                op: *op,
                operand: Box::new(operand.try_map_inputs(f)?),
            },
            Expr::Function {
                name,
                args,
                return_type,
            } => Expr::Function {
                name: name.clone(),
                args: map_all(args, f)?,
                return_type: *return_type,
            },
            Expr::And(exprs) => Expr::And(map_all(exprs, f)?),
            Expr::Or(exprs) => Expr::Or(map_all(exprs, f)?),
        })
    }
}

fn map_all<E, F>(exprs: &[Expr], f: &mut F) -> Result<Vec<Expr>, E>
where
    F: FnMut(&InputRef) -> Result<Expr, E>,
{
    exprs.iter().map(|e| e.try_map_inputs(f)).collect()
}

/// Renders in the prefix form planners print in diagnostics: `=($0, $3)`.
impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::InputRef(r) => write!(f, "${}", r.index),
            Expr::Column(c) => write!(f, "{}", c),
            Expr::Literal(v) => write!(f, "{}", v),
            Expr::BinaryOp { op, left, right } => write!(f, "{}({}, {})", op, left, right),
            Expr::UnaryOp { op, operand } => write!(f, "{}({})", op, operand),
            Expr::Function { name, args, .. } => {
                write!(f, "{}(", name)?;
                write_list(f, args)?;
                f.write_str(")")
            }
            Expr::And(exprs) => {
                f.write_str("AND(")?;
                write_list(f, exprs)?;
                f.write_str(")")
            }
            Expr::Or(exprs) => {
                f.write_str("OR(")?;
                write_list(f, exprs)?;
                f.write_str(")")
            }
        }
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, exprs: &[Expr]) -> fmt::Result {
    for (i, e) in exprs.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{}", e)?;
    }
    Ok(())
}

/// Binary operators for comparison and arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    /// `=`. Two NULLs do not compare equal.
    Eq,
    /// `IS NOT DISTINCT FROM`. Like `=`, except two NULLs compare equal.
    IsNotDistinctFrom,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    pub fn is_comparison(&self) -> bool {
        !matches!(
            self,
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div
        )
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BinaryOp::Eq => "=",
            BinaryOp::IsNotDistinctFrom => "IS NOT DISTINCT FROM",
            BinaryOp::NotEq => "<>",
            BinaryOp::Lt => "<",
            BinaryOp::LtEq => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::GtEq => ">=",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
        };
        f.write_str(s)
    }
}

/// Unary operators for boolean logic and null checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    Not,
    Neg,
    IsNull,
    IsNotNull,
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UnaryOp::Not => "NOT",
            UnaryOp::Neg => "-",
            UnaryOp::IsNull => "IS NULL",
            UnaryOp::IsNotNull => "IS NOT NULL",
        };
        f.write_str(s)
    }
}

/// SQL join types.
///
/// Semi and anti joins only emit the left input's columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Full,
    Semi,
    Anti,
}

impl JoinType {
    /// Whether the join's output row includes the right input's fields.
    pub fn projects_right(&self) -> bool {
        !matches!(self, JoinType::Semi | JoinType::Anti)
    }
}

/// Aggregate expression over input ordinals.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AggExpr {
    pub func: AggFunc,
    pub args: Vec<usize>,
    pub distinct: bool,
    pub name: String,
    pub data_type: DataType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AggFunc {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

/// Sort key over an input ordinal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortKey {
    pub index: usize,
    pub ascending: bool,
    pub nulls_first: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(i: usize) -> Expr {
        Expr::input_ref(i, DataType::Int64)
    }

    #[test]
    fn test_conjuncts_flatten_and_drop_true() {
        let cond = Expr::and(vec![
            Expr::equals(col(0), col(2)),
            Expr::and(vec![
                Expr::literal(ScalarValue::Bool(true)),
                Expr::binary(BinaryOp::Lt, col(1), col(3)),
            ]),
        ]);
        let conjuncts = cond.conjuncts();
        assert_eq!(conjuncts.len(), 2);
        assert_eq!(conjuncts[0].to_string(), "=($0, $2)");
        assert_eq!(conjuncts[1].to_string(), "<($1, $3)");

        assert!(Expr::literal(ScalarValue::Bool(true)).conjuncts().is_empty());
    }

    #[test]
    fn test_data_type_of_comparison_and_arithmetic() {
        assert_eq!(Expr::equals(col(0), col(1)).data_type(), DataType::Boolean);
        assert_eq!(
            Expr::binary(BinaryOp::Add, col(0), col(1)).data_type(),
            DataType::Int64
        );
        let f = Expr::Function {
            name: "UPPER".into(),
            args: vec![Expr::input_ref(0, DataType::Utf8)],
            return_type: DataType::Utf8,
        };
        assert_eq!(f.data_type(), DataType::Utf8);
        assert_eq!(f.to_string(), "UPPER($0)");
    }

    #[test]
    fn test_try_map_inputs_replaces_every_reference() {
        let e = Expr::and(vec![
            Expr::equals(col(0), col(4)),
            Expr::UnaryOp {
                op: UnaryOp::IsNull,
                operand: Box::new(col(2)),
            },
        ]);
        let shifted: Result<Expr, ()> =
            e.try_map_inputs(&mut |r| Ok(Expr::input_ref(r.index + 1, r.data_type)));
        let shifted = shifted.unwrap();
        assert_eq!(shifted.input_refs(), vec![1, 5, 3]);
    }

    #[test]
    fn test_is_always_true() {
        assert!(Expr::literal(ScalarValue::Bool(true)).is_always_true());
        assert!(Expr::and(vec![]).is_always_true());
        assert!(!Expr::equals(col(0), col(1)).is_always_true());
    }
}
