//! Process-wide cache of built dispatchers.

use super::dispatcher::{DispatchSignature, Dispatcher};
use super::handler::HandlerBinding;
use crate::error::PlanResult;
use crate::plan::PhysicalOpKind;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, error, trace};

static GLOBAL: Lazy<DispatcherCache> = Lazy::new(DispatcherCache::new);

/// Dispatchers keyed by handler-set signature.
///
/// Entries are never evicted. Readers never block each other; a miss builds the
/// dispatcher outside any lock and inserts it only if no racing caller got there
/// first, so every caller of one signature observes the same instance.
pub struct DispatcherCache {
    entries: DashMap<DispatchSignature, Arc<Dispatcher>>,
    builds: AtomicUsize,
}

impl Default for DispatcherCache {
    fn default() -> Self {
        Self::new()
    }
}

impl DispatcherCache {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            builds: AtomicUsize::new(0),
        }
    }

    /// The cache shared by every planning session of the process.
    pub fn global() -> &'static DispatcherCache {
        &GLOBAL
    }

    /// Get or build the dispatcher for `variant` with the given handler bindings.
    pub fn resolve(
        &self,
        variant: PhysicalOpKind,
        bindings: &[HandlerBinding],
    ) -> PlanResult<Arc<Dispatcher>> {
        let signature = DispatchSignature::of(variant, bindings);
        if let Some(hit) = self.entries.get(&signature) {
            trace!(?variant, "dispatcher cache hit");
            return Ok(Arc::clone(hit.value()));
        }

        let built = match Dispatcher::build(variant, bindings) {
            Ok(dispatcher) => Arc::new(dispatcher),
            Err(err) => {
                error!(?variant, error = %err, "failed to build metadata dispatcher");
                return Err(err);
            }
        };
        self.builds.fetch_add(1, Ordering::Relaxed);
        debug!(
            ?variant,
            slots = built.slot_count(),
            bindings = bindings.len(),
            "built metadata dispatcher"
        );

        let winner = self.entries.entry(signature).or_insert(built);
        Ok(Arc::clone(winner.value()))
    }

    /// Number of dispatchers built by this cache, including builds that lost an
    /// insertion race.
    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Resolve a dispatcher through the process-wide cache.
pub fn resolve_dispatcher(
    variant: PhysicalOpKind,
    bindings: &[HandlerBinding],
) -> PlanResult<Arc<Dispatcher>> {
    DispatcherCache::global().resolve(variant, bindings)
}
