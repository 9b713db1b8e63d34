//! # Join Input Renaming
//!
//! A join makes its output names unique (`id`, `name`, `id0`, `name0`), so the fields
//! of an input and the join's fields at the same positions may disagree. Executors
//! that address join inputs by name need them to agree. This pass wraps every join
//! input whose names differ in a renaming projection; inputs that already agree are
//! left alone.
//!
//! Semi and anti joins only expose their left input, so only the left side is renamed.

use physopt_core::error::{PlanError, PlanResult};
use physopt_core::pass::PlanPass;
use physopt_core::plan::PlanRef;
use physopt_core::settings::PlannerSettings;
use physopt_core::visitor::{children_unchanged, rewrite_postorder, PlanVisitor};
use std::sync::Arc;
use tracing::trace;

/// Rename the inputs of every join in `root` to the join's output names.
pub fn rename_join_inputs(root: &PlanRef) -> PlanResult<PlanRef> {
    rewrite_postorder(root, &mut JoinInputRenamer)
}

struct JoinInputRenamer;

impl JoinInputRenamer {
    fn rename_inputs(join: &PlanRef) -> PlanResult<PlanRef> {
        let Some(spec) = join.op().join_spec() else {
            return Ok(join.clone());
        };
        let (Some(left), Some(right)) = (join.input(0), join.input(1)) else {
            return Err(PlanError::ChildCount {
                kind: join.kind(),
                expected: 2,
                actual: join.children().len(),
            });
        };

        let new_left = join.join_input(0, left)?;
        let new_right = if spec.join_type.projects_right() {
            join.join_input(left.schema().len(), right)?
        } else {
            right.clone()
        };
        if Arc::ptr_eq(&new_left, left) && Arc::ptr_eq(&new_right, right) {
            return Ok(join.clone());
        }
        trace!(node = %join.id(), "renaming join inputs");
        join.with_new_children(vec![new_left, new_right])
    }
}

impl PlanVisitor for JoinInputRenamer {
    type Error = PlanError;

    fn post_visit(&mut self, node: &PlanRef, children: Vec<PlanRef>) -> PlanResult<PlanRef> {
        let node = if children_unchanged(node, &children) {
            node.clone()
        } else {
            node.with_new_children(children)?
        };
        if node.kind().is_join() {
            Self::rename_inputs(&node)
        } else {
            Ok(node)
        }
    }
}

/// Runs [`rename_join_inputs`] over the whole plan.
pub struct JoinInputPass;

impl PlanPass for JoinInputPass {
    fn name(&self) -> &str {
        "JoinInputRenamer"
    }

    fn enabled(&self, settings: &PlannerSettings) -> bool {
        settings.rename_join_inputs
    }

    fn rewrite(&self, root: &PlanRef, _settings: &PlannerSettings) -> PlanResult<PlanRef> {
        rename_join_inputs(root)
    }
}
