//! # Rewrite Passes
//!
//! A pass is a whole-tree rewrite run once over a finished physical plan, after
//! operator selection and before the plan is handed to execution. Passes repair
//! artifacts of plan construction (ambiguous star columns, join inputs whose names
//! disagree with the join's own output) and must leave the plan's observable output
//! unchanged.
//!
//! Passes run in registration order; each sees the output of the previous one. A pass
//! that has nothing to do returns its input unchanged, so callers can detect a no-op
//! with `Arc::ptr_eq`.

use crate::error::PlanResult;
use crate::plan::PlanRef;
use crate::settings::PlannerSettings;
use std::sync::Arc;
use tracing::debug;

/// A whole-plan rewrite.
pub trait PlanPass: Send + Sync {
    /// Unique name of this pass.
    fn name(&self) -> &str;

    /// Whether the pass runs under `settings`.
    fn enabled(&self, _settings: &PlannerSettings) -> bool {
        true
    }

    /// Rewrite the plan rooted at `root`.
    fn rewrite(&self, root: &PlanRef, settings: &PlannerSettings) -> PlanResult<PlanRef>;
}

/// Ordered collection of rewrite passes.
pub struct PassRegistry {
    passes: Vec<Box<dyn PlanPass>>,
}

impl PassRegistry {
    pub fn new() -> Self {
        Self { passes: Vec::new() }
    }

    pub fn add_pass(&mut self, pass: Box<dyn PlanPass>) {
        self.passes.push(pass);
    }

    pub fn passes(&self) -> Vec<&dyn PlanPass> {
        self.passes.iter().map(|p| p.as_ref()).collect()
    }

    /// Run every enabled pass in order. The first failing pass aborts the run.
    pub fn run(&self, root: &PlanRef, settings: &PlannerSettings) -> PlanResult<PlanRef> {
        let mut plan = root.clone();
        for pass in &self.passes {
            if !pass.enabled(settings) {
                debug!(pass = pass.name(), "pass disabled");
                continue;
            }
            let rewritten = pass.rewrite(&plan, settings)?;
            debug!(
                pass = pass.name(),
                changed = !Arc::ptr_eq(&rewritten, &plan),
                "pass finished"
            );
            plan = rewritten;
        }
        Ok(plan)
    }
}

impl Default for PassRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::DataType;
    use crate::plan::{PhysicalNode, TableRef};
    use crate::schema::{Field, Schema};

    struct AddLimit;

    impl PlanPass for AddLimit {
        fn name(&self) -> &str {
            "add_limit"
        }

        fn enabled(&self, settings: &PlannerSettings) -> bool {
            settings.rename_join_inputs
        }

        fn rewrite(&self, root: &PlanRef, _settings: &PlannerSettings) -> PlanResult<PlanRef> {
            Ok(PhysicalNode::limit(root.clone(), 0, 1))
        }
    }

    fn scan() -> PlanRef {
        PhysicalNode::scan(
            TableRef::new("s", "t"),
            Schema::new(vec![Field::new("a", DataType::Int64)]),
        )
    }

    #[test]
    fn test_passes_run_in_order() {
        let mut registry = PassRegistry::new();
        registry.add_pass(Box::new(AddLimit));
        registry.add_pass(Box::new(AddLimit));
        assert_eq!(registry.passes().len(), 2);

        let out = registry.run(&scan(), &PlannerSettings::default()).unwrap();
        assert_eq!(out.display(0).lines().count(), 3);
    }

    #[test]
    fn test_disabled_pass_is_skipped() {
        let mut registry = PassRegistry::new();
        registry.add_pass(Box::new(AddLimit));
        let settings = PlannerSettings {
            rename_join_inputs: false,
            ..Default::default()
        };
        let root = scan();
        let out = registry.run(&root, &settings).unwrap();
        assert!(Arc::ptr_eq(&out, &root));
    }
}
