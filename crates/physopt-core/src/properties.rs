//! # Physical Traits
//!
//! Physical traits describe *how* an operator's output is organised at runtime:
//!
//! - **Distribution**: how rows are partitioned across workers (single node,
//!   broadcast, hash-partitioned on input ordinals, round-robin).
//! - **Collation**: the sort order the output is known to satisfy.
//!
//! Traits travel with every node and are copied as-is when a pass rebuilds a node over
//! new children. Joins are the exception: they never preserve their inputs'
//! distribution, so a join is always built with `Distribution::Any`.

use crate::expr::SortKey;
use serde::{Deserialize, Serialize};

/// Data distribution of an operator's output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Distribution {
    /// Nothing is known about the distribution.
    #[default]
    Any,
    /// All rows on a single node.
    Single,
    /// Every row replicated to all nodes.
    Broadcast,
    /// Hash-partitioned on the given output ordinals.
    Hash(Vec<usize>),
    RoundRobin,
}

/// Physical traits of a node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PhysicalTraits {
    pub distribution: Distribution,
    pub collation: Option<Vec<SortKey>>,
}

impl PhysicalTraits {
    pub fn any() -> Self {
        Self::default()
    }

    pub fn with_distribution(distribution: Distribution) -> Self {
        Self {
            distribution,
            collation: None,
        }
    }

    /// The same traits with the distribution reset to `Any`.
    pub fn without_distribution(&self) -> Self {
        Self {
            distribution: Distribution::Any,
            collation: self.collation.clone(),
        }
    }
}
