//! Bottom-up plan rewriting.
//!
//! Operators form a closed enum, so a rewrite is a single `post_visit` that matches on
//! [`PhysicalOp`](crate::plan::PhysicalOp) rather than one visit method per operator.
//! [`rewrite_postorder`] walks the tree depth first, calls `pre_visit` on the way
//! down and `post_visit` on the way up with the already rewritten children, which is
//! where a visitor decides whether to keep, rebuild or replace the node.

use crate::plan::PlanRef;

/// Callbacks driven by [`rewrite_postorder`].
pub trait PlanVisitor {
    type Error;

    /// Called before any child of `node` is visited.
    fn pre_visit(&mut self, _node: &PlanRef) -> Result<(), Self::Error> {
        Ok(())
    }

    /// Produce the replacement for `node` given its rewritten children, in input
    /// order. Returning `node` itself keeps the subtree untouched.
    fn post_visit(&mut self, node: &PlanRef, children: Vec<PlanRef>) -> Result<PlanRef, Self::Error>;
}

/// Rewrite `root` bottom-up. The first error aborts the traversal.
pub fn rewrite_postorder<V: PlanVisitor>(root: &PlanRef, visitor: &mut V) -> Result<PlanRef, V::Error> {
    visitor.pre_visit(root)?;
    let children = root
        .children()
        .iter()
        .map(|child| rewrite_postorder(child, visitor))
        .collect::<Result<Vec<_>, _>>()?;
    visitor.post_visit(root, children)
}

/// True when every rewritten child is the very node it replaces.
pub fn children_unchanged(node: &PlanRef, children: &[PlanRef]) -> bool {
    node.children().len() == children.len()
        && node
            .children()
            .iter()
            .zip(children)
            .all(|(old, new)| std::sync::Arc::ptr_eq(old, new))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{PlanError, PlanResult};
    use crate::expr::{DataType, Expr};
    use crate::plan::{PhysicalNode, PhysicalOp, TableRef};
    use crate::schema::{Field, Schema};
    use std::sync::Arc;

    fn scan(name: &str) -> PlanRef {
        PhysicalNode::scan(
            TableRef::new("s", name),
            Schema::new(vec![Field::new("a", DataType::Int64)]),
        )
    }

    struct Recorder {
        pre: Vec<String>,
        post: Vec<String>,
    }

    impl PlanVisitor for Recorder {
        type Error = PlanError;

        fn pre_visit(&mut self, node: &PlanRef) -> PlanResult<()> {
            self.pre.push(node.describe_op());
            Ok(())
        }

        fn post_visit(&mut self, node: &PlanRef, children: Vec<PlanRef>) -> PlanResult<PlanRef> {
            self.post.push(node.describe_op());
            if children_unchanged(node, &children) {
                Ok(node.clone())
            } else {
                node.with_new_children(children)
            }
        }
    }

    #[test]
    fn test_visit_order() {
        let filter = PhysicalNode::filter(scan("t"), Expr::input_ref(0, DataType::Int64)).unwrap();
        let root = PhysicalNode::limit(filter, 0, 10);

        let mut recorder = Recorder {
            pre: Vec::new(),
            post: Vec::new(),
        };
        let out = rewrite_postorder(&root, &mut recorder).unwrap();

        assert!(Arc::ptr_eq(&out, &root));
        assert!(recorder.pre[0].starts_with("Limit"));
        assert!(recorder.pre[2].starts_with("Scan"));
        assert!(recorder.post[0].starts_with("Scan"));
        assert!(recorder.post[2].starts_with("Limit"));
    }

    struct Failing;

    impl PlanVisitor for Failing {
        type Error = PlanError;

        fn post_visit(&mut self, node: &PlanRef, _children: Vec<PlanRef>) -> PlanResult<PlanRef> {
            if matches!(node.op(), PhysicalOp::Scan { .. }) {
                return Err(PlanError::Settings("boom".into()));
            }
            Ok(node.clone())
        }
    }

    #[test]
    fn test_error_aborts_traversal() {
        let root = PhysicalNode::limit(scan("t"), 0, 1);
        assert!(rewrite_postorder(&root, &mut Failing).is_err());
    }
}
