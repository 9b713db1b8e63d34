//! # Row Schemas
//!
//! A schema is the ordered list of `(name, type)` fields an operator produces. Names
//! are not required to be unique in general; passes that need uniqueness run the names
//! through [`crate::names::make_unique_names`].

use crate::error::{PlanError, PlanResult};
use crate::expr::{DataType, Expr, JoinType};
use crate::names::make_unique_names;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One output field of an operator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub data_type: DataType,
}

impl Field {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }
}

/// Ordered row type of an operator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Schema {
    pub fields: Vec<Field>,
}

impl Schema {
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Derive a schema from a projection list and a parallel list of names.
    ///
    /// Each field takes its type from the expression at the same position.
    pub fn from_exprs<S: AsRef<str>>(exprs: &[Expr], names: &[S]) -> PlanResult<Self> {
        if exprs.len() != names.len() {
            return Err(PlanError::SchemaMismatch {
                exprs: exprs.len(),
                names: names.len(),
            });
        }
        let fields = exprs
            .iter()
            .zip(names)
            .map(|(e, n)| Field::new(n.as_ref(), e.data_type()))
            .collect();
        Ok(Self { fields })
    }

    /// Row type produced by a join of `left` and `right`.
    ///
    /// Fields are the left fields followed by the right fields, with names made unique.
    /// Semi and anti joins only produce the left fields.
    pub fn join(left: &Schema, right: &Schema, join_type: JoinType) -> Self {
        if !join_type.projects_right() {
            return left.clone();
        }
        let combined: Vec<&Field> = left.fields.iter().chain(right.fields.iter()).collect();
        let names: Vec<&str> = combined.iter().map(|f| f.name.as_str()).collect();
        let fields = make_unique_names(&names)
            .into_iter()
            .zip(combined)
            .map(|(name, f)| Field::new(name, f.data_type))
            .collect();
        Self { fields }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field(&self, index: usize) -> Option<&Field> {
        self.fields.get(index)
    }

    pub fn field_names(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.name.clone()).collect()
    }

    pub fn data_types(&self) -> Vec<DataType> {
        self.fields.iter().map(|f| f.data_type).collect()
    }

    /// Same types in the same order, with `names` substituted.
    pub fn renamed<S: AsRef<str>>(&self, names: &[S]) -> PlanResult<Self> {
        if names.len() != self.fields.len() {
            return Err(PlanError::SchemaMismatch {
                exprs: self.fields.len(),
                names: names.len(),
            });
        }
        let fields = self
            .fields
            .iter()
            .zip(names)
            .map(|(f, n)| Field::new(n.as_ref(), f.data_type))
            .collect();
        Ok(Self { fields })
    }

    /// One input reference per field: the identity projection over this schema.
    pub fn identity_exprs(&self) -> Vec<Expr> {
        self.fields
            .iter()
            .enumerate()
            .map(|(i, f)| Expr::input_ref(i, f.data_type))
            .collect()
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", field.name)?;
        }
        f.write_str("]")
    }
}
