//! Metadata requests of one planning session.

use super::cache::DispatcherCache;
use super::handler::HandlerRegistry;
use super::kind::{MetadataArg, MetadataKind, MetadataValue};
use crate::error::{PlanError, PlanResult};
use crate::expr::{Expr, SortKey};
use crate::plan::{NodeId, PhysicalNode, PhysicalOpKind};
use crate::properties::Distribution;
use crate::settings::PlannerSettings;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use tracing::{debug, trace};

type MemoKey = (NodeId, MetadataKind, Vec<MetadataArg>);

/// Entry point for metadata requests during one planning session.
///
/// Results are memoised per `(node, kind, arguments)` for the lifetime of the query,
/// so a subplan reached along several paths is computed once. Handlers receive the
/// query and may ask it about child nodes. A query belongs to one thread.
pub struct MetadataQuery<'a> {
    registry: &'a HandlerRegistry,
    cache: &'a DispatcherCache,
    memo: RefCell<HashMap<MemoKey, Option<MetadataValue>>>,
    log_dispatch_tables: bool,
    logged_variants: RefCell<HashSet<PhysicalOpKind>>,
}

impl<'a> MetadataQuery<'a> {
    /// Session over `registry`, resolving dispatchers through the process-wide cache.
    pub fn new(registry: &'a HandlerRegistry) -> Self {
        Self::with_cache(registry, DispatcherCache::global())
    }

    pub fn with_cache(registry: &'a HandlerRegistry, cache: &'a DispatcherCache) -> Self {
        Self {
            registry,
            cache,
            memo: RefCell::new(HashMap::new()),
            log_dispatch_tables: false,
            logged_variants: RefCell::new(HashSet::new()),
        }
    }

    pub fn with_settings(mut self, settings: &PlannerSettings) -> Self {
        self.log_dispatch_tables = settings.log_dispatch_tables;
        self
    }

    /// Compute `kind` for `node`. `Ok(None)` means no handler defines it.
    pub fn get(
        &self,
        kind: MetadataKind,
        node: &PhysicalNode,
        args: &[MetadataArg],
    ) -> PlanResult<Option<MetadataValue>> {
        check_args(kind, args)?;

        let key = (node.id(), kind, args.to_vec());
        if let Some(cached) = self.memo.borrow().get(&key) {
            trace!(node = %node.id(), %kind, "metadata memo hit");
            return Ok(cached.clone());
        }

        let variant = node.kind();
        let dispatcher = self
            .cache
            .resolve(variant, self.registry.bindings(variant))?;
        if self.log_dispatch_tables && self.logged_variants.borrow_mut().insert(variant) {
            debug!("{}", dispatcher.describe());
        }

        // Handlers may re-enter the query for child nodes; no memo borrow is held here.
        let value = dispatcher.dispatch(kind, node, self, args)?;
        self.memo.borrow_mut().insert(key, value.clone());
        Ok(value)
    }

    pub fn row_count(&self, node: &PhysicalNode) -> PlanResult<Option<f64>> {
        Ok(self
            .get(MetadataKind::RowCount, node, &[])?
            .and_then(|v| v.as_number()))
    }

    pub fn max_row_count(&self, node: &PhysicalNode) -> PlanResult<Option<f64>> {
        Ok(self
            .get(MetadataKind::MaxRowCount, node, &[])?
            .and_then(|v| v.as_number()))
    }

    pub fn distinct_row_count(
        &self,
        node: &PhysicalNode,
        columns: &[usize],
        predicate: Option<&Expr>,
    ) -> PlanResult<Option<f64>> {
        let args = [
            MetadataArg::Columns(columns.to_vec()),
            MetadataArg::Predicate(predicate.cloned()),
        ];
        Ok(self
            .get(MetadataKind::DistinctRowCount, node, &args)?
            .and_then(|v| v.as_number()))
    }

    pub fn selectivity(
        &self,
        node: &PhysicalNode,
        predicate: Option<&Expr>,
    ) -> PlanResult<Option<f64>> {
        let args = [MetadataArg::Predicate(predicate.cloned())];
        Ok(self
            .get(MetadataKind::Selectivity, node, &args)?
            .and_then(|v| v.as_number()))
    }

    pub fn column_uniqueness(
        &self,
        node: &PhysicalNode,
        columns: &[usize],
        ignore_nulls: bool,
    ) -> PlanResult<Option<bool>> {
        let args = [
            MetadataArg::Columns(columns.to_vec()),
            MetadataArg::Flag(ignore_nulls),
        ];
        Ok(self
            .get(MetadataKind::ColumnUniqueness, node, &args)?
            .and_then(|v| v.as_bool()))
    }

    pub fn distribution(&self, node: &PhysicalNode) -> PlanResult<Option<Distribution>> {
        Ok(match self.get(MetadataKind::Distribution, node, &[])? {
            Some(MetadataValue::Distribution(d)) => Some(d),
            _ => None,
        })
    }

    pub fn collation(&self, node: &PhysicalNode) -> PlanResult<Option<Vec<SortKey>>> {
        Ok(match self.get(MetadataKind::Collation, node, &[])? {
            Some(MetadataValue::Collation(keys)) => Some(keys),
            _ => None,
        })
    }

    /// Number of memoised results.
    pub fn memo_len(&self) -> usize {
        self.memo.borrow().len()
    }
}

fn check_args(kind: MetadataKind, args: &[MetadataArg]) -> PlanResult<()> {
    let expected = kind.params();
    let actual: Vec<_> = args.iter().map(|a| a.param_type()).collect();
    if actual != expected {
        return Err(PlanError::InvalidMetadataArgs {
            kind: kind.to_string(),
            reason: format!("expected {expected:?}, got {actual:?}"),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_args_rejects_wrong_shape() {
        assert!(check_args(MetadataKind::RowCount, &[]).is_ok());
        assert!(check_args(
            MetadataKind::Selectivity,
            &[MetadataArg::Predicate(None)]
        )
        .is_ok());

        let err = check_args(MetadataKind::Selectivity, &[MetadataArg::Flag(true)]).unwrap_err();
        assert!(matches!(err, PlanError::InvalidMetadataArgs { .. }));
        assert!(check_args(MetadataKind::RowCount, &[MetadataArg::Flag(true)]).is_err());
    }
}
