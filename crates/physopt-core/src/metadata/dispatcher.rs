//! Per-variant dispatch tables routing metadata kinds to handler slots.

use super::handler::{handler_addr, HandlerBinding, MetadataHandler};
use super::kind::{MetadataArg, MetadataKind, MetadataValue, ParamType};
use super::query::MetadataQuery;
use crate::error::{PlanError, PlanResult};
use crate::plan::{PhysicalNode, PhysicalOpKind};
use std::collections::BTreeMap;
use std::fmt::Write;
use std::sync::Arc;
use tracing::trace;

/// Value-comparable identity of a handler set for one operator variant.
///
/// Handlers are identified by reference: `providers` holds the address of each distinct
/// handler instance in order of first appearance, and `bindings` the `(kind, slot)`
/// pairs in registration order. A cached dispatcher keeps its handlers alive, so an
/// address in a cached key can never be reused by another handler.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DispatchSignature {
    pub variant: PhysicalOpKind,
    pub providers: Vec<usize>,
    pub bindings: Vec<(MetadataKind, usize)>,
}

impl DispatchSignature {
    pub fn of(variant: PhysicalOpKind, bindings: &[HandlerBinding]) -> Self {
        let (providers, slots) = assign_slots(bindings);
        Self {
            variant,
            providers: providers.iter().map(handler_addr).collect(),
            bindings: bindings.iter().map(|b| b.kind).zip(slots).collect(),
        }
    }
}

/// Distinct handlers in first-appearance order, and the slot of each binding.
fn assign_slots(bindings: &[HandlerBinding]) -> (Vec<Arc<dyn MetadataHandler>>, Vec<usize>) {
    let mut providers: Vec<Arc<dyn MetadataHandler>> = Vec::new();
    let mut slots = Vec::with_capacity(bindings.len());
    for binding in bindings {
        let addr = handler_addr(&binding.handler);
        let slot = match providers.iter().position(|p| handler_addr(p) == addr) {
            Some(slot) => slot,
            None => {
                providers.push(binding.handler.clone());
                providers.len() - 1
            }
        };
        slots.push(slot);
    }
    (providers, slots)
}

/// Routes each metadata kind of one operator variant to its handler slots.
///
/// Built once per distinct handler set and shared through [`super::DispatcherCache`].
pub struct Dispatcher {
    variant: PhysicalOpKind,
    providers: Vec<Arc<dyn MetadataHandler>>,
    routes: BTreeMap<MetadataKind, Vec<usize>>,
}

impl Dispatcher {
    /// Build the dispatch table for `variant` from its handler bindings.
    ///
    /// A binding serves its kind when the handler's declared parameters, after the
    /// leading node and context, equal the kind's parameters. Bindings that do not
    /// match are ignored; a handler that does not declare `(Node, Context)` first
    /// fails the whole build.
    pub fn build(variant: PhysicalOpKind, bindings: &[HandlerBinding]) -> PlanResult<Self> {
        let (providers, slots) = assign_slots(bindings);
        let mut routes: BTreeMap<MetadataKind, Vec<usize>> = BTreeMap::new();

        for (binding, slot) in bindings.iter().zip(slots) {
            let declared = binding.handler.signature(binding.kind);
            if !declared.starts_with(&ParamType::IMPLICIT) {
                let diagnostic = render_table(variant, &providers, &routes);
                return Err(PlanError::DispatcherBuild {
                    variant,
                    handler: binding.handler.name().to_string(),
                    reason: format!(
                        "declares {declared:?} for {}, which does not start with (Node, Context)",
                        binding.kind
                    ),
                    diagnostic,
                });
            }
            if declared[ParamType::IMPLICIT.len()..] != *binding.kind.params() {
                trace!(
                    ?variant,
                    kind = %binding.kind,
                    handler = binding.handler.name(),
                    "handler parameters do not match kind, not routed"
                );
                continue;
            }
            let route = routes.entry(binding.kind).or_default();
            if !route.contains(&slot) {
                route.push(slot);
            }
        }

        for route in routes.values_mut() {
            route.sort_unstable();
        }

        Ok(Self {
            variant,
            providers,
            routes,
        })
    }

    pub fn variant(&self) -> PhysicalOpKind {
        self.variant
    }

    /// Number of distinct handler instances.
    pub fn slot_count(&self) -> usize {
        self.providers.len()
    }

    /// Slots consulted for `kind`, in order.
    pub fn slots(&self, kind: MetadataKind) -> &[usize] {
        self.routes.get(&kind).map(|r| r.as_slice()).unwrap_or(&[])
    }

    pub fn supports(&self, kind: MetadataKind) -> bool {
        !self.slots(kind).is_empty()
    }

    /// Ask the handlers associated with `kind` in slot order; the first defined answer
    /// wins. `Ok(None)` when no handler has an answer or none is associated. A handler
    /// error is returned as-is and no later handler is asked.
    pub fn dispatch(
        &self,
        kind: MetadataKind,
        node: &PhysicalNode,
        mq: &MetadataQuery<'_>,
        args: &[MetadataArg],
    ) -> PlanResult<Option<MetadataValue>> {
        if node.kind() != self.variant {
            return Err(PlanError::VariantMismatch {
                expected: self.variant,
                actual: node.kind(),
            });
        }
        for &slot in self.slots(kind) {
            let handler = &self.providers[slot];
            if let Some(value) = handler.handle(kind, node, mq, args)? {
                trace!(node = %node.id(), %kind, handler = handler.name(), "metadata answered");
                return Ok(Some(value));
            }
        }
        Ok(None)
    }

    /// Render the dispatch table, one line per slot and one per routed kind.
    pub fn describe(&self) -> String {
        render_table(self.variant, &self.providers, &self.routes)
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.describe())
    }
}

fn render_table(
    variant: PhysicalOpKind,
    providers: &[Arc<dyn MetadataHandler>],
    routes: &BTreeMap<MetadataKind, Vec<usize>>,
) -> String {
    let mut out = format!("dispatcher for {variant:?}\n");
    for (slot, handler) in providers.iter().enumerate() {
        let _ = writeln!(out, "  provider{slot}: {}", handler.name());
    }
    for kind in MetadataKind::ALL {
        match routes.get(&kind) {
            Some(slots) => {
                let names: Vec<String> = slots.iter().map(|s| format!("provider{s}")).collect();
                let _ = writeln!(out, "  {kind} -> {}", names.join(", "));
            }
            None => {
                let _ = writeln!(out, "  {kind} -> no definition");
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed {
        name: &'static str,
        value: Option<f64>,
    }

    impl MetadataHandler for Fixed {
        fn name(&self) -> &str {
            self.name
        }

        fn handle(
            &self,
            _kind: MetadataKind,
            _node: &PhysicalNode,
            _mq: &MetadataQuery<'_>,
            _args: &[MetadataArg],
        ) -> PlanResult<Option<MetadataValue>> {
            Ok(self.value.map(MetadataValue::Number))
        }
    }

    fn fixed(name: &'static str, value: Option<f64>) -> Arc<dyn MetadataHandler> {
        Arc::new(Fixed { name, value })
    }

    #[test]
    fn test_same_instance_shares_a_slot() {
        let a = fixed("a", Some(1.0));
        let b = fixed("b", Some(2.0));
        let bindings = vec![
            HandlerBinding::new(MetadataKind::RowCount, a.clone()),
            HandlerBinding::new(MetadataKind::MaxRowCount, b.clone()),
            HandlerBinding::new(MetadataKind::Selectivity, a.clone()),
        ];
        let sig = DispatchSignature::of(PhysicalOpKind::Filter, &bindings);
        assert_eq!(sig.providers.len(), 2);
        assert_eq!(
            sig.bindings,
            vec![
                (MetadataKind::RowCount, 0),
                (MetadataKind::MaxRowCount, 1),
                (MetadataKind::Selectivity, 0)
            ]
        );

        let dispatcher = Dispatcher::build(PhysicalOpKind::Filter, &bindings).unwrap();
        assert_eq!(dispatcher.slot_count(), 2);
        assert_eq!(dispatcher.slots(MetadataKind::Selectivity), &[0]);
        assert!(!dispatcher.supports(MetadataKind::Collation));
    }

    #[test]
    fn test_equal_but_distinct_instances_differ() {
        let first = vec![HandlerBinding::new(MetadataKind::RowCount, fixed("a", None))];
        let second = vec![HandlerBinding::new(MetadataKind::RowCount, fixed("a", None))];
        assert_ne!(
            DispatchSignature::of(PhysicalOpKind::Scan, &first),
            DispatchSignature::of(PhysicalOpKind::Scan, &second)
        );
    }

    #[test]
    fn test_describe_lists_unsupported_kinds() {
        let bindings = vec![HandlerBinding::new(
            MetadataKind::RowCount,
            fixed("rows", Some(10.0)),
        )];
        let text = Dispatcher::build(PhysicalOpKind::Scan, &bindings)
            .unwrap()
            .describe();
        assert!(text.contains("provider0: rows"));
        assert!(text.contains("RowCount -> provider0"));
        assert!(text.contains("Collation -> no definition"));
    }
}
