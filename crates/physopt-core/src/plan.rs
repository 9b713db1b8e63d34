//! # Physical Operator Tree
//!
//! A physical plan is a tree of immutable [`PhysicalNode`]s shared through `Arc`
//! ([`PlanRef`]). Every node owns its children exclusively; nothing points back to a
//! parent. Passes never mutate a node: a rewrite builds a new node of the same kind
//! over the rewritten children with [`PhysicalNode::with_new_children`], so an
//! untouched subtree can be returned as-is by cloning its `Arc`.
//!
//! ## Operators
//!
//! `PhysicalOp` is a closed set of operator variants, and `PhysicalOpKind` is its
//! data-free discriminant. The kind is what the metadata dispatcher keys on, and every
//! pass matches on the full enum, so adding a variant forces each pass to handle it.
//!
//! ## Schemas
//!
//! Each node carries its output schema. Scans, values, projections, and writers declare
//! theirs; every other operator derives it from its inputs, and
//! `with_new_children` re-derives it, so renaming a column below a filter is visible
//! above it.
//!
//! ## Identity
//!
//! Each constructed node receives a process-unique [`NodeId`]. Per-session metadata
//! memoisation keys results by this id, so a node's contents are fixed for its
//! lifetime: fields are private and nodes are only handed out behind `Arc`. Sharing
//! a `PlanRef` keeps the id; a rebuilt node gets a fresh one.

use crate::error::{PlanError, PlanResult};
use crate::expr::{AggExpr, DataType, Expr, JoinType, SortKey};
use crate::names::are_unique;
use crate::properties::{Distribution, PhysicalTraits};
use crate::schema::{Field, Schema};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Shared handle to an immutable plan node.
pub type PlanRef = Arc<PhysicalNode>;

/// Process-unique identity of a constructed node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(0);
        NodeId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Reference to a table in a catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableRef {
    pub schema: String,
    pub name: String,
}

impl TableRef {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

/// Join description shared by the hash, merge and nested-loop join operators.
///
/// `condition` is expressed over the combined row (left fields, then right fields).
/// Its leading conjuncts correspond one-for-one to `equi_keys`; whatever is not an
/// equi-key lives in `extra_condition`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JoinSpec {
    pub join_type: JoinType,
    pub condition: Expr,
    /// `(left ordinal, right ordinal)` pairs, right ordinals relative to the right input.
    pub equi_keys: Vec<(usize, usize)>,
    pub extra_condition: Option<Expr>,
}

impl JoinSpec {
    pub fn left_keys(&self) -> Vec<usize> {
        self.equi_keys.iter().map(|(l, _)| *l).collect()
    }

    pub fn right_keys(&self) -> Vec<usize> {
        self.equi_keys.iter().map(|(_, r)| *r).collect()
    }
}

/// Join algorithm, selecting which join operator variant is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JoinAlgorithm {
    Hash,
    Merge,
    NestedLoop,
}

/// Physical operators.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PhysicalOp {
    /// Table scan. Leaf.
    Scan { table: TableRef },
    /// Inline rows. Leaf.
    Values { rows: usize },
    Filter { predicate: Expr },
    /// Projection. With `allow_duplicates` the output may carry repeated names, which
    /// only happens for the projection restoring user-visible names under a screen.
    Project {
        exprs: Vec<Expr>,
        allow_duplicates: bool,
    },
    HashJoin(JoinSpec),
    MergeJoin(JoinSpec),
    NestedLoopJoin(JoinSpec),
    HashAggregate {
        group_by: Vec<usize>,
        aggregates: Vec<AggExpr>,
    },
    Sort { order: Vec<SortKey> },
    Limit { offset: u64, count: u64 },
    Exchange { distribution: Distribution },
    /// Writes its input to `target` (CREATE TABLE AS SELECT). Emits a summary row.
    Writer { target: TableRef },
    /// Terminal node returning rows to the client.
    Screen,
}

/// Discriminant of [`PhysicalOp`] without its data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PhysicalOpKind {
    Scan,
    Values,
    Filter,
    Project,
    HashJoin,
    MergeJoin,
    NestedLoopJoin,
    HashAggregate,
    Sort,
    Limit,
    Exchange,
    Writer,
    Screen,
}

impl PhysicalOpKind {
    pub const ALL: [PhysicalOpKind; 13] = [
        PhysicalOpKind::Scan,
        PhysicalOpKind::Values,
        PhysicalOpKind::Filter,
        PhysicalOpKind::Project,
        PhysicalOpKind::HashJoin,
        PhysicalOpKind::MergeJoin,
        PhysicalOpKind::NestedLoopJoin,
        PhysicalOpKind::HashAggregate,
        PhysicalOpKind::Sort,
        PhysicalOpKind::Limit,
        PhysicalOpKind::Exchange,
        PhysicalOpKind::Writer,
        PhysicalOpKind::Screen,
    ];

    /// Number of inputs an operator of this kind takes.
    pub fn arity(&self) -> usize {
        match self {
            PhysicalOpKind::Scan | PhysicalOpKind::Values => 0,
            PhysicalOpKind::HashJoin
            | PhysicalOpKind::MergeJoin
            | PhysicalOpKind::NestedLoopJoin => 2,
            _ => 1,
        }
    }

    pub fn is_join(&self) -> bool {
        self.arity() == 2
    }
}

impl PhysicalOp {
    pub fn kind(&self) -> PhysicalOpKind {
        match self {
            PhysicalOp::Scan { .. } => PhysicalOpKind::Scan,
            PhysicalOp::Values { .. } => PhysicalOpKind::Values,
            PhysicalOp::Filter { .. } => PhysicalOpKind::Filter,
            PhysicalOp::Project { .. } => PhysicalOpKind::Project,
            PhysicalOp::HashJoin(_) => PhysicalOpKind::HashJoin,
            PhysicalOp::MergeJoin(_) => PhysicalOpKind::MergeJoin,
            PhysicalOp::NestedLoopJoin(_) => PhysicalOpKind::NestedLoopJoin,
            PhysicalOp::HashAggregate { .. } => PhysicalOpKind::HashAggregate,
            PhysicalOp::Sort { .. } => PhysicalOpKind::Sort,
            PhysicalOp::Limit { .. } => PhysicalOpKind::Limit,
            PhysicalOp::Exchange { .. } => PhysicalOpKind::Exchange,
            PhysicalOp::Writer { .. } => PhysicalOpKind::Writer,
            PhysicalOp::Screen => PhysicalOpKind::Screen,
        }
    }

    /// The join description when this is one of the join operators.
    pub fn join_spec(&self) -> Option<&JoinSpec> {
        match self {
            PhysicalOp::HashJoin(spec)
            | PhysicalOp::MergeJoin(spec)
            | PhysicalOp::NestedLoopJoin(spec) => Some(spec),
            _ => None,
        }
    }
}

/// One node of a physical plan.
#[derive(Debug)]
pub struct PhysicalNode {
    id: NodeId,
    op: PhysicalOp,
    schema: Schema,
    traits: PhysicalTraits,
    children: Vec<PlanRef>,
}

impl PhysicalNode {
    /// Build a node from its parts. The caller is responsible for a schema that fits
    /// the operator; the typed constructors below derive it.
    pub fn new(
        op: PhysicalOp,
        schema: Schema,
        traits: PhysicalTraits,
        children: Vec<PlanRef>,
    ) -> PlanResult<PlanRef> {
        let kind = op.kind();
        if children.len() != kind.arity() {
            return Err(PlanError::ChildCount {
                kind,
                expected: kind.arity(),
                actual: children.len(),
            });
        }
        Ok(Arc::new(Self {
            id: NodeId::next(),
            op,
            schema,
            traits,
            children,
        }))
    }

    fn build(op: PhysicalOp, schema: Schema, traits: PhysicalTraits, children: Vec<PlanRef>) -> PlanRef {
        Arc::new(Self {
            id: NodeId::next(),
            op,
            schema,
            traits,
            children,
        })
    }

    pub fn scan(table: TableRef, schema: Schema) -> PlanRef {
        Self::build(
            PhysicalOp::Scan { table },
            schema,
            PhysicalTraits::any(),
            vec![],
        )
    }

    pub fn values(schema: Schema, rows: usize) -> PlanRef {
        Self::build(
            PhysicalOp::Values { rows },
            schema,
            PhysicalTraits::with_distribution(Distribution::Single),
            vec![],
        )
    }

    pub fn filter(input: PlanRef, predicate: Expr) -> PlanResult<PlanRef> {
        check_refs(&predicate, input.schema.len())?;
        Ok(Self::build(
            PhysicalOp::Filter { predicate },
            input.schema.clone(),
            input.traits.clone(),
            vec![input],
        ))
    }

    /// Projection of `exprs` over `input`, output fields named by `names`.
    pub fn project<S: AsRef<str>>(input: PlanRef, exprs: Vec<Expr>, names: &[S]) -> PlanResult<PlanRef> {
        Self::make_project(input, exprs, names, false)
    }

    /// Projection whose output may repeat field names.
    pub fn project_allow_duplicates<S: AsRef<str>>(
        input: PlanRef,
        exprs: Vec<Expr>,
        names: &[S],
    ) -> PlanResult<PlanRef> {
        Self::make_project(input, exprs, names, true)
    }

    fn make_project<S: AsRef<str>>(
        input: PlanRef,
        exprs: Vec<Expr>,
        names: &[S],
        allow_duplicates: bool,
    ) -> PlanResult<PlanRef> {
        for e in &exprs {
            check_refs(e, input.schema.len())?;
        }
        if !allow_duplicates && !are_unique(names) {
            return Err(PlanError::DuplicateFieldName {
                names: names.iter().map(|n| n.as_ref().to_string()).collect(),
            });
        }
        let schema = Schema::from_exprs(&exprs, names)?;
        Ok(Self::build(
            PhysicalOp::Project {
                exprs,
                allow_duplicates,
            },
            schema,
            input.traits.clone(),
            vec![input],
        ))
    }

    /// Join of `left` and `right` using `algorithm`.
    ///
    /// Joins do not preserve distribution; the result has `Distribution::Any`.
    pub fn join(
        algorithm: JoinAlgorithm,
        spec: JoinSpec,
        left: PlanRef,
        right: PlanRef,
    ) -> PlanResult<PlanRef> {
        let width = left.schema.len() + right.schema.len();
        check_refs(&spec.condition, width)?;
        if let Some(extra) = &spec.extra_condition {
            check_refs(extra, width)?;
        }
        for &(l, r) in &spec.equi_keys {
            if l >= left.schema.len() {
                return Err(PlanError::InvalidInputRef {
                    index: l,
                    width: left.schema.len(),
                });
            }
            if r >= right.schema.len() {
                return Err(PlanError::InvalidInputRef {
                    index: r,
                    width: right.schema.len(),
                });
            }
        }
        let schema = Schema::join(&left.schema, &right.schema, spec.join_type);
        let traits = left.traits.without_distribution();
        let op = match algorithm {
            JoinAlgorithm::Hash => PhysicalOp::HashJoin(spec),
            JoinAlgorithm::Merge => PhysicalOp::MergeJoin(spec),
            JoinAlgorithm::NestedLoop => PhysicalOp::NestedLoopJoin(spec),
        };
        Ok(Self::build(op, schema, traits, vec![left, right]))
    }

    pub fn hash_aggregate(
        input: PlanRef,
        group_by: Vec<usize>,
        aggregates: Vec<AggExpr>,
    ) -> PlanResult<PlanRef> {
        let schema = aggregate_schema(&input.schema, &group_by, &aggregates)?;
        Ok(Self::build(
            PhysicalOp::HashAggregate {
                group_by,
                aggregates,
            },
            schema,
            PhysicalTraits::any(),
            vec![input],
        ))
    }

    pub fn sort(input: PlanRef, order: Vec<SortKey>) -> PlanResult<PlanRef> {
        for k in &order {
            if k.index >= input.schema.len() {
                return Err(PlanError::InvalidInputRef {
                    index: k.index,
                    width: input.schema.len(),
                });
            }
        }
        let traits = PhysicalTraits {
            distribution: input.traits.distribution.clone(),
            collation: Some(order.clone()),
        };
        Ok(Self::build(
            PhysicalOp::Sort { order },
            input.schema.clone(),
            traits,
            vec![input],
        ))
    }

    pub fn limit(input: PlanRef, offset: u64, count: u64) -> PlanRef {
        Self::build(
            PhysicalOp::Limit { offset, count },
            input.schema.clone(),
            input.traits.clone(),
            vec![input],
        )
    }

    pub fn exchange(input: PlanRef, distribution: Distribution) -> PlanRef {
        Self::build(
            PhysicalOp::Exchange {
                distribution: distribution.clone(),
            },
            input.schema.clone(),
            PhysicalTraits::with_distribution(distribution),
            vec![input],
        )
    }

    /// Writer over `input`. Its own output is the write summary, not the input rows.
    pub fn writer(input: PlanRef, target: TableRef) -> PlanRef {
        Self::build(
            PhysicalOp::Writer { target },
            writer_schema(),
            PhysicalTraits::with_distribution(Distribution::Single),
            vec![input],
        )
    }

    pub fn screen(input: PlanRef) -> PlanRef {
        Self::build(
            PhysicalOp::Screen,
            input.schema.clone(),
            PhysicalTraits::with_distribution(Distribution::Single),
            vec![input],
        )
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn op(&self) -> &PhysicalOp {
        &self.op
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn traits(&self) -> &PhysicalTraits {
        &self.traits
    }

    /// Inputs in order.
    pub fn children(&self) -> &[PlanRef] {
        &self.children
    }

    pub fn kind(&self) -> PhysicalOpKind {
        self.op.kind()
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    pub fn field_names(&self) -> Vec<String> {
        self.schema.field_names()
    }

    pub fn input(&self, i: usize) -> Option<&PlanRef> {
        self.children.get(i)
    }

    /// Rebuild this node over `children`, keeping its operator and traits.
    ///
    /// Schemas that derive from inputs are derived again; declared schemas
    /// (scan, values, project, writer) are kept.
    pub fn with_new_children(&self, children: Vec<PlanRef>) -> PlanResult<PlanRef> {
        let kind = self.kind();
        if children.len() != kind.arity() {
            return Err(PlanError::ChildCount {
                kind,
                expected: kind.arity(),
                actual: children.len(),
            });
        }
        let mut traits = self.traits.clone();
        let schema = match &self.op {
            PhysicalOp::Scan { .. }
            | PhysicalOp::Values { .. }
            | PhysicalOp::Project { .. }
            | PhysicalOp::Writer { .. } => self.schema.clone(),
            PhysicalOp::Filter { .. }
            | PhysicalOp::Sort { .. }
            | PhysicalOp::Limit { .. }
            | PhysicalOp::Exchange { .. }
            | PhysicalOp::Screen => children[0].schema.clone(),
            PhysicalOp::HashJoin(spec)
            | PhysicalOp::MergeJoin(spec)
            | PhysicalOp::NestedLoopJoin(spec) => {
                traits = traits.without_distribution();
                Schema::join(&children[0].schema, &children[1].schema, spec.join_type)
            }
            PhysicalOp::HashAggregate {
                group_by,
                aggregates,
            } => aggregate_schema(&children[0].schema, group_by, aggregates)?,
        };
        Ok(Self::build(self.op.clone(), schema, traits, children))
    }

    /// Whether this is a projection that returns its input unchanged: one input
    /// reference per input field, in order, with matching types. Names are ignored.
    pub fn is_trivial_project(&self) -> bool {
        let PhysicalOp::Project { exprs, .. } = &self.op else {
            return false;
        };
        let Some(input) = self.children.first() else {
            return false;
        };
        exprs.len() == input.schema.len()
            && exprs.iter().enumerate().all(|(i, e)| match e {
                Expr::InputRef(r) => {
                    r.index == i && input.schema.fields[i].data_type == r.data_type
                }
                _ => false,
            })
    }

    /// Make the field names of one join input agree with the join's output names.
    ///
    /// `offset` is where the input's fields start in the join output (0 for the left
    /// input, the left width for the right input). When the names already agree the
    /// input is returned unchanged; otherwise it is wrapped in a renaming projection.
    pub fn join_input(&self, offset: usize, input: &PlanRef) -> PlanResult<PlanRef> {
        let outputs = &self.schema.fields;
        let width = input.schema.len();
        if offset + width > outputs.len() {
            return Err(PlanError::InputResolution {
                index: offset + width,
                left: offset,
                right: outputs.len().saturating_sub(offset),
            });
        }
        let output_names: Vec<&str> = outputs[offset..offset + width]
            .iter()
            .map(|f| f.name.as_str())
            .collect();
        let same = output_names
            .iter()
            .zip(input.schema.fields.iter())
            .all(|(o, f)| *o == f.name);
        if same {
            return Ok(input.clone());
        }
        Self::project(input.clone(), input.schema.identity_exprs(), &output_names)
    }

    /// Render the subtree as indented explain text.
    pub fn display(&self, indent: usize) -> String {
        let pad = "  ".repeat(indent);
        let mut s = format!("{}{} {}\n", pad, self.describe_op(), self.schema);
        for child in &self.children {
            s.push_str(&child.display(indent + 1));
        }
        s
    }

    pub fn describe_op(&self) -> String {
        match &self.op {
            PhysicalOp::Scan { table } => format!("Scan({})", table),
            PhysicalOp::Values { rows } => format!("Values(rows={})", rows),
            PhysicalOp::Filter { predicate } => format!("Filter({})", predicate),
            PhysicalOp::Project {
                exprs,
                allow_duplicates,
            } => {
                let list: Vec<String> = exprs.iter().map(|e| e.to_string()).collect();
                let name = if *allow_duplicates {
                    "ProjectAllowDup"
                } else {
                    "Project"
                };
                format!("{}({})", name, list.join(", "))
            }
            PhysicalOp::HashJoin(spec)
            | PhysicalOp::MergeJoin(spec)
            | PhysicalOp::NestedLoopJoin(spec) => {
                format!("{:?}({:?}, {})", self.kind(), spec.join_type, spec.condition)
            }
            PhysicalOp::HashAggregate { group_by, aggregates } => {
                format!("HashAggregate(group={:?}, aggs={})", group_by, aggregates.len())
            }
            PhysicalOp::Sort { order } => {
                let keys: Vec<usize> = order.iter().map(|k| k.index).collect();
                format!("Sort({:?})", keys)
            }
            PhysicalOp::Limit { offset, count } => format!("Limit({}, {})", offset, count),
            PhysicalOp::Exchange { distribution } => format!("Exchange({:?})", distribution),
            PhysicalOp::Writer { target } => format!("Writer({})", target),
            PhysicalOp::Screen => "Screen".to_string(),
        }
    }
}

impl fmt::Display for PhysicalNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display(0))
    }
}

/// Structural equality; node ids are ignored.
impl PartialEq for PhysicalNode {
    fn eq(&self, other: &Self) -> bool {
        self.op == other.op
            && self.schema == other.schema
            && self.traits == other.traits
            && self.children.len() == other.children.len()
            && self
                .children
                .iter()
                .zip(other.children.iter())
                .all(|(a, b)| Arc::ptr_eq(a, b) || a == b)
    }
}

impl Eq for PhysicalNode {}

fn writer_schema() -> Schema {
    Schema::new(vec![
        Field::new("Fragment", DataType::Utf8),
        Field::new("Records", DataType::Int64),
    ])
}

fn aggregate_schema(input: &Schema, group_by: &[usize], aggregates: &[AggExpr]) -> PlanResult<Schema> {
    let mut fields = Vec::with_capacity(group_by.len() + aggregates.len());
    for &g in group_by {
        let field = input.field(g).ok_or(PlanError::InvalidInputRef {
            index: g,
            width: input.len(),
        })?;
        fields.push(field.clone());
    }
    for agg in aggregates {
        if let Some(&bad) = agg.args.iter().find(|&&a| a >= input.len()) {
            return Err(PlanError::InvalidInputRef {
                index: bad,
                width: input.len(),
            });
        }
        fields.push(Field::new(agg.name.clone(), agg.data_type));
    }
    Ok(Schema::new(fields))
}

fn check_refs(expr: &Expr, width: usize) -> PlanResult<()> {
    match expr.input_refs().into_iter().find(|&i| i >= width) {
        Some(index) => Err(PlanError::InvalidInputRef { index, width }),
        None => Ok(()),
    }
}
