//! Metadata handlers and the registry that binds them to operator variants.

use super::kind::{MetadataArg, MetadataKind, MetadataValue, ParamType};
use super::query::MetadataQuery;
use crate::error::PlanResult;
use crate::plan::{PhysicalNode, PhysicalOpKind};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Computes one or more metadata kinds for the operator variants it is bound to.
///
/// A handler is opaque to the dispatcher: it is identified by instance (two bindings of
/// the same `Arc` are the same handler) and matched to a kind by its declared
/// signature.
pub trait MetadataHandler: Send + Sync {
    /// Name used in logs and dispatch diagnostics.
    fn name(&self) -> &str;

    /// Declared parameters of the handler method serving `kind`, including the
    /// leading node and context parameters.
    fn signature(&self, kind: MetadataKind) -> Vec<ParamType> {
        kind.handler_signature()
    }

    /// Compute `kind` for `node`. `Ok(None)` means the handler has no answer and the
    /// next associated handler, if any, is asked. An error aborts the whole query,
    /// including when it comes from a nested `mq` call on an input.
    fn handle(
        &self,
        kind: MetadataKind,
        node: &PhysicalNode,
        mq: &MetadataQuery<'_>,
        args: &[MetadataArg],
    ) -> PlanResult<Option<MetadataValue>>;
}

/// One `kind → handler` entry of a variant's binding multi-map.
#[derive(Clone)]
pub struct HandlerBinding {
    pub kind: MetadataKind,
    pub handler: Arc<dyn MetadataHandler>,
}

impl HandlerBinding {
    pub fn new(kind: MetadataKind, handler: Arc<dyn MetadataHandler>) -> Self {
        Self { kind, handler }
    }
}

impl fmt::Debug for HandlerBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerBinding")
            .field("kind", &self.kind)
            .field("handler", &self.handler.name())
            .finish()
    }
}

/// Reference identity of a handler instance.
pub(crate) fn handler_addr(handler: &Arc<dyn MetadataHandler>) -> usize {
    Arc::as_ptr(handler).cast::<()>() as usize
}

/// Registry of metadata handlers per operator variant.
///
/// Bindings are kept in registration order and never deduplicated; binding the same
/// handler instance twice only collapses when the dispatcher assigns slots.
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    bindings: HashMap<PhysicalOpKind, Vec<HandlerBinding>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `handler` to compute `kind` for `variant`.
    pub fn register(
        &mut self,
        variant: PhysicalOpKind,
        kind: MetadataKind,
        handler: Arc<dyn MetadataHandler>,
    ) {
        self.bindings
            .entry(variant)
            .or_default()
            .push(HandlerBinding::new(kind, handler));
    }

    /// Bind `handler` to compute `kind` for every operator variant.
    pub fn register_all(&mut self, kind: MetadataKind, handler: Arc<dyn MetadataHandler>) {
        for variant in PhysicalOpKind::ALL {
            self.register(variant, kind, handler.clone());
        }
    }

    /// Bindings for `variant`, in registration order.
    pub fn bindings(&self, variant: PhysicalOpKind) -> &[HandlerBinding] {
        self.bindings
            .get(&variant)
            .map(|b| b.as_slice())
            .unwrap_or(&[])
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.bindings.iter()).finish()
    }
}
