//! Query optimization (spec §4.10): a logical plan is looked up in a plan
//! cache keyed by its digest; on a miss it is rewritten, physically
//! enumerated, and the resulting plan inserted back into the cache.

pub mod cache;
pub mod physical;
pub mod rewrite;

use crate::core::catalogue::Catalogue;
use crate::core::config::Config;
use crate::core::indexing::IndexManager;
use crate::core::query::plan::PlanNode;

pub use cache::PlanCache;

/// Optimizes `logical_plan`, reusing `cache` across calls.
///
/// On a cache hit the cached physical plan is returned untouched. On a
/// miss, logical rewrites run first, then physical enumeration assigns
/// cost/ordering attributes (and swaps in index scans where cheaper); the
/// result is cached under the logical plan's digest before being returned.
#[must_use]
pub fn optimize(
    cache: &mut PlanCache,
    logical_plan: &PlanNode,
    catalogue: &Catalogue,
    indexes: &IndexManager,
    config: &Config,
) -> PlanNode {
    let digest = logical_plan.digest();
    if let Some(cached) = cache.get(digest) {
        return cached;
    }

    let rewritten = rewrite::rewrite_logical(logical_plan);
    let physical = physical::enumerate_physical(&rewritten, catalogue, indexes, config.cost_weights, config.simd_thresholds);
    cache.insert(digest, physical.clone());
    physical
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::common::types::{ColumnDef, DataType};
    use crate::core::query::plan::Operator;
    use tempfile::tempdir;

    #[test]
    fn repeated_optimization_of_the_same_logical_plan_hits_the_cache() {
        let dir = tempdir().unwrap();
        let catalogue = Catalogue::open(dir.path()).unwrap();
        catalogue.create_schema("main").unwrap();
        catalogue
            .create_entity(
                "main",
                "features",
                vec![ColumnDef::new("id".to_string(), DataType::Long, false, true)],
            )
            .unwrap();
        let indexes = IndexManager::new();
        let config = Config::default();
        let mut cache = PlanCache::new(config.plan_cache_capacity);

        let plan = PlanNode::leaf(
            1,
            Operator::EntityCount { schema: "main".to_string(), entity: "features".to_string() },
            Vec::new(),
            Vec::new(),
        );

        let first = optimize(&mut cache, &plan, &catalogue, &indexes, &config);
        let second = optimize(&mut cache, &plan, &catalogue, &indexes, &config);
        assert_eq!(first.physical.map(|p| p.output_size), second.physical.map(|p| p.output_size));
        assert_eq!(cache.len(), 1);
    }
}
