//! # Star Column Prefixing
//!
//! A `*` in a select list expands, per source table, into a star column named `**`.
//! Once a row carries a star column next to another column (a second star, or an
//! explicitly selected column), later stages can no longer tell which table a column
//! came from. This pass detects that situation and disambiguates the star columns:
//!
//! - **Project above scan**: every star-expanded leaf visited after the ambiguity is
//!   detected gets an identity projection that renames its star columns to
//!   `T{id}$**`, with a fresh `id` per leaf.
//! - **Project under screen**: the plan's result boundary gets a positional projection
//!   restoring the original output names.
//! - **Writer**: for a create-as-select plan the writer takes over unprefixing and no
//!   projection is added under the screen.
//!
//! ## Order Dependence
//!
//! The decision is a single flag set during one left-to-right, depth-first walk. A
//! star-expanded leaf visited before some later node sets the flag is not prefixed,
//! even though the plan as a whole ends up prefixed.
//!
//! ## Table Ids
//!
//! Prefix ids are numbered per call to [`insert_rename_project`], starting at `T0`.
//! They are unique within one rewritten plan only: two plans rewritten by separate
//! calls both use `T0`, `T1`, ..., so their subtrees must not be combined afterwards.
//! Rewrite the combined plan instead.

use physopt_core::error::{PlanError, PlanResult};
use physopt_core::expr::Expr;
use physopt_core::names::make_unique_names;
use physopt_core::pass::PlanPass;
use physopt_core::plan::{PhysicalNode, PhysicalOp, PlanRef};
use physopt_core::schema::Schema;
use physopt_core::settings::PlannerSettings;
use physopt_core::visitor::{children_unchanged, rewrite_postorder, PlanVisitor};
use tracing::{debug, trace};

/// Name given to a column expanded from `*`.
pub const STAR_COLUMN: &str = "**";
/// Separates a table prefix from the star column name.
pub const PREFIX_DELIMITER: &str = "$";

/// Whether `name` is a star column that has not been prefixed yet.
pub fn is_non_prefixed_star_column(name: &str) -> bool {
    name.starts_with(STAR_COLUMN)
}

/// Whether `name` is a star column carrying a table prefix, e.g. `T3$**`.
pub fn is_prefixed_star_column(name: &str) -> bool {
    name.find("$**").is_some_and(|pos| pos > 0)
}

/// Whether the row has an unprefixed star column.
pub fn contains_star_column(schema: &Schema) -> bool {
    schema
        .fields
        .iter()
        .any(|f| is_non_prefixed_star_column(&f.name))
}

/// Whether some projected input reference points at a star column of the input.
pub fn projects_star_column(input: &Schema, exprs: &[Expr]) -> bool {
    exprs.iter().any(|e| {
        e.as_input_ref()
            .and_then(|i| input.field(i))
            .is_some_and(|f| is_non_prefixed_star_column(&f.name))
    })
}

/// `T{table_id}$name`.
pub fn prefixed_name(table_id: u64, name: &str) -> String {
    format!("T{}{}{}", table_id, PREFIX_DELIMITER, name)
}

/// Disambiguate star columns in `root`, adding prefixes above star-expanded leaves and
/// removing them again at the result boundary. Returns `root` itself when no
/// prefixing is needed.
pub fn insert_rename_project(root: &PlanRef) -> PlanResult<PlanRef> {
    let mut converter = StarColumnConverter {
        state: RewriteState::default(),
    };
    let rewritten = rewrite_postorder(root, &mut converter)?;
    debug!(
        prefix_required = converter.state.prefix_required,
        prefixed_leaves = converter.state.next_table_id,
        writer_owns_unprefixing = converter.state.writer_owns_unprefixing,
        "star column rewrite finished"
    );
    Ok(rewritten)
}

/// Decisions accumulated over one rewrite call.
#[derive(Debug, Default)]
struct RewriteState {
    prefix_required: bool,
    writer_owns_unprefixing: bool,
    any_scan_prefixed: bool,
    /// Table ids are numbered per call, starting at zero.
    next_table_id: u64,
}

struct StarColumnConverter {
    state: RewriteState,
}

impl StarColumnConverter {
    fn require_prefix(&mut self, node: &PlanRef) {
        trace!(node = %node.id(), op = %node.describe_op(), "star column prefix required");
        self.state.prefix_required = true;
    }

    /// A row mixing a star column with any other column needs prefixing.
    fn check_row(&mut self, node: &PlanRef) {
        if !self.state.prefix_required
            && contains_star_column(node.schema())
            && node.schema().len() > 1
        {
            self.require_prefix(node);
        }
    }

    fn visit_leaf(&mut self, leaf: &PlanRef) -> PlanResult<PlanRef> {
        if !(self.state.prefix_required && contains_star_column(leaf.schema())) {
            self.check_row(leaf);
            return Ok(leaf.clone());
        }

        let table_id = self.state.next_table_id;
        self.state.next_table_id += 1;
        self.state.any_scan_prefixed = true;

        let names: Vec<String> = leaf
            .schema()
            .fields
            .iter()
            .map(|f| {
                if is_non_prefixed_star_column(&f.name) {
                    prefixed_name(table_id, &f.name)
                } else {
                    f.name.clone()
                }
            })
            .collect();
        trace!(node = %leaf.id(), table_id, "prefixing star columns above leaf");
        PhysicalNode::project(leaf.clone(), leaf.schema().identity_exprs(), &names)
    }

    fn visit_writer(&mut self, writer: &PlanRef, children: Vec<PlanRef>) -> PlanResult<PlanRef> {
        if !self.state.prefix_required {
            return Ok(writer.clone());
        }
        self.state.writer_owns_unprefixing = true;
        writer.with_new_children(children)
    }

    fn visit_screen(&mut self, screen: &PlanRef, children: Vec<PlanRef>) -> PlanResult<PlanRef> {
        if !(self.state.prefix_required && self.state.any_scan_prefixed) {
            return Ok(screen.clone());
        }
        if self.state.writer_owns_unprefixing {
            return screen.with_new_children(children);
        }

        let [child] = <[PlanRef; 1]>::try_from(children).map_err(|c| PlanError::ChildCount {
            kind: screen.kind(),
            expected: 1,
            actual: c.len(),
        })?;
        // A screen exposes its original input row unchanged.
        let names = screen.schema().field_names();
        let exprs = screen.schema().identity_exprs();
        trace!(node = %screen.id(), fields = names.len(), "restoring names under screen");

        let unprefix = if screen.schema().len() > 1 {
            PhysicalNode::project_allow_duplicates(child, exprs, &names)?
        } else {
            PhysicalNode::project(child, exprs, &names)?
        };
        screen.with_new_children(vec![unprefix])
    }

    fn visit_project(&mut self, project: &PlanRef, children: Vec<PlanRef>) -> PlanResult<PlanRef> {
        let PhysicalOp::Project { exprs, .. } = project.op() else {
            return project.with_new_children(children);
        };
        let [child] = <[PlanRef; 1]>::try_from(children).map_err(|c| PlanError::ChildCount {
            kind: project.kind(),
            expected: 1,
            actual: c.len(),
        })?;

        // Pass-through columns follow the child, which may have just been renamed.
        let candidates: Vec<String> = exprs
            .iter()
            .zip(&project.schema().fields)
            .map(|(e, f)| {
                e.as_input_ref()
                    .and_then(|i| child.schema().field(i))
                    .map(|input| input.name.clone())
                    .unwrap_or_else(|| f.name.clone())
            })
            .collect();
        let names = make_unique_names(&candidates);

        let rebuilt = PhysicalNode::project(child.clone(), exprs.clone(), &names)?;
        if rebuilt.is_trivial_project() {
            trace!(node = %project.id(), "eliding identity projection");
            return Ok(child);
        }
        Ok(rebuilt)
    }
}

impl PlanVisitor for StarColumnConverter {
    type Error = PlanError;

    fn pre_visit(&mut self, node: &PlanRef) -> PlanResult<()> {
        match node.op() {
            // Leaves decide when visited; the result boundary never sets the flag.
            _ if node.is_leaf() => {}
            PhysicalOp::Screen | PhysicalOp::Writer { .. } => {}
            PhysicalOp::Project { exprs, .. } => {
                if let Some(input) = node.input(0) {
                    if !self.state.prefix_required
                        && projects_star_column(input.schema(), exprs)
                        && node.schema().len() > 1
                    {
                        self.require_prefix(node);
                    }
                }
            }
            _ => self.check_row(node),
        }
        Ok(())
    }

    fn post_visit(&mut self, node: &PlanRef, children: Vec<PlanRef>) -> PlanResult<PlanRef> {
        match node.op() {
            _ if node.is_leaf() => self.visit_leaf(node),
            PhysicalOp::Writer { .. } => self.visit_writer(node, children),
            PhysicalOp::Screen => self.visit_screen(node, children),
            PhysicalOp::Project { .. } => self.visit_project(node, children),
            _ if children_unchanged(node, &children) => Ok(node.clone()),
            _ => node.with_new_children(children),
        }
    }
}

/// Runs [`insert_rename_project`] over the whole plan.
pub struct StarColumnPass;

impl PlanPass for StarColumnPass {
    fn name(&self) -> &str {
        "StarColumnConverter"
    }

    fn enabled(&self, settings: &PlannerSettings) -> bool {
        settings.rename_star_columns
    }

    fn rewrite(&self, root: &PlanRef, _settings: &PlannerSettings) -> PlanResult<PlanRef> {
        insert_rename_project(root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_star_column_names() {
        assert!(is_non_prefixed_star_column("**"));
        assert!(is_non_prefixed_star_column("**0"));
        assert!(!is_non_prefixed_star_column("T0$**"));
        assert!(is_prefixed_star_column("T0$**"));
        assert!(!is_prefixed_star_column("$**"));
        assert!(!is_prefixed_star_column("name"));
        assert!(is_prefixed_star_column("T12$**1"));
        assert!(!is_non_prefixed_star_column("a*b"));
        assert!(!is_prefixed_star_column("a*b"));
    }

    #[test]
    fn test_prefixed_name() {
        assert_eq!(prefixed_name(0, "**"), "T0$**");
        assert_eq!(prefixed_name(7, "**0"), "T7$**0");
        assert!(is_prefixed_star_column(&prefixed_name(3, STAR_COLUMN)));
    }
}
