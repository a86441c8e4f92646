use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::instrument;

use crate::{
    db::DbPool,
    entities::{
        bom_item::{self, Entity as BomItemEntity},
        bom_version::{self, Entity as BomVersionEntity},
        catalog_item::{self, Entity as CatalogItemEntity},
    },
    errors::ServiceError,
};

/// Rolled-up cost of one root item of a version
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollupLine {
    pub catalog_item_id: i64,
    pub item_number: String,
    pub name: String,
    pub quantity: Decimal,
    pub unit_cost: Decimal,
    /// This root's own contribution plus every descendant's, recursively.
    pub total_cost: Decimal,
}

/// Cost rollup of a whole version
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionRollup {
    pub version_id: i64,
    pub total_cost: Decimal,
    pub items: Vec<RollupLine>,
}

/// Recursive bottom-up cost aggregation over a version's tree. Pure over
/// the loaded data: no writes, no side effects, decimal arithmetic
/// throughout.
#[derive(Clone)]
pub struct RollupService {
    db: Arc<DbPool>,
}

impl RollupService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    /// Rollup of a structure's current version.
    #[instrument(skip(self))]
    pub async fn rollup_structure(
        &self,
        structure_id: i64,
    ) -> Result<VersionRollup, ServiceError> {
        let version = BomVersionEntity::find()
            .filter(bom_version::Column::StructureId.eq(structure_id))
            .filter(bom_version::Column::IsCurrent.eq(true))
            .one(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| {
                ServiceError::NotFound(format!(
                    "Structure {} has no current version",
                    structure_id
                ))
            })?;

        self.rollup_version(version.id).await
    }

    #[instrument(skip(self))]
    pub async fn rollup_version(&self, version_id: i64) -> Result<VersionRollup, ServiceError> {
        let db = self.db.as_ref();

        BomVersionEntity::find_by_id(version_id)
            .one(db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Version {} not found", version_id)))?;

        let items = BomItemEntity::find()
            .filter(bom_item::Column::VersionId.eq(version_id))
            .all(db)
            .await
            .map_err(ServiceError::db_error)?;

        let catalog_ids: Vec<i64> = items.iter().map(|i| i.catalog_item_id).collect();
        let catalog: HashMap<i64, catalog_item::Model> = if catalog_ids.is_empty() {
            HashMap::new()
        } else {
            CatalogItemEntity::find()
                .filter(catalog_item::Column::ItemId.is_in(catalog_ids))
                .all(db)
                .await
                .map_err(ServiceError::db_error)?
                .into_iter()
                .map(|c| (c.item_id, c))
                .collect()
        };

        let costs: HashMap<i64, Decimal> = catalog
            .values()
            .map(|c| (c.item_id, c.unit_cost.unwrap_or(Decimal::ZERO)))
            .collect();

        let root_costs = rollup_roots(&items, &costs);

        let mut lines = Vec::with_capacity(root_costs.len());
        let mut total = Decimal::ZERO;

        for (pos, cost) in root_costs {
            let item = &items[pos];
            let meta = catalog.get(&item.catalog_item_id);
            total += cost;

            lines.push(RollupLine {
                catalog_item_id: item.catalog_item_id,
                item_number: meta.map(|c| c.item_number.clone()).unwrap_or_default(),
                name: meta.map(|c| c.name.clone()).unwrap_or_default(),
                quantity: item.quantity,
                unit_cost: costs.get(&item.catalog_item_id).copied().unwrap_or_default(),
                total_cost: cost,
            });
        }

        Ok(VersionRollup {
            version_id,
            total_cost: total,
            items: lines,
        })
    }
}

/// Subtree cost per root node: each node contributes
/// `quantity × unit_cost` plus the sum over its direct children,
/// recursively. Missing unit costs count as zero.
pub(crate) fn rollup_roots(
    items: &[bom_item::Model],
    unit_costs: &HashMap<i64, Decimal>,
) -> Vec<(usize, Decimal)> {
    let mut children: HashMap<Option<i64>, Vec<usize>> = HashMap::new();
    for (pos, item) in items.iter().enumerate() {
        children.entry(item.parent_item_id).or_default().push(pos);
    }

    fn subtree_cost(
        items: &[bom_item::Model],
        unit_costs: &HashMap<i64, Decimal>,
        children: &HashMap<Option<i64>, Vec<usize>>,
        pos: usize,
    ) -> Decimal {
        let item = &items[pos];
        let unit_cost = unit_costs
            .get(&item.catalog_item_id)
            .copied()
            .unwrap_or(Decimal::ZERO);

        let own = item.quantity * unit_cost;

        let nested: Decimal = children
            .get(&Some(item.id))
            .map(|bucket| {
                bucket
                    .iter()
                    .map(|&child| subtree_cost(items, unit_costs, children, child))
                    .sum()
            })
            .unwrap_or(Decimal::ZERO);

        own + nested
    }

    children
        .get(&None)
        .map(|roots| {
            roots
                .iter()
                .map(|&root| (root, subtree_cost(items, unit_costs, &children, root)))
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn node(id: i64, parent: Option<i64>, catalog_item_id: i64, quantity: Decimal) -> bom_item::Model {
        bom_item::Model {
            id,
            version_id: 1,
            parent_item_id: parent,
            catalog_item_id,
            quantity,
            unit_of_measure: "EA".to_string(),
            level: if parent.is_some() { 1 } else { 0 },
            sequence_number: 10,
            reference_designators: None,
            notes: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn leaf_cost_is_quantity_times_unit_cost() {
        let items = vec![node(1, None, 100, dec!(4))];
        let costs = HashMap::from([(100, dec!(2.5))]);

        let roots = rollup_roots(&items, &costs);
        assert_eq!(roots, vec![(0, dec!(10.0))]);
    }

    #[test]
    fn internal_node_adds_children_to_own_contribution() {
        // root: qty 2 × cost 10 = 20; child: qty 3 × cost 5 = 15
        let items = vec![node(1, None, 100, dec!(2)), node(2, Some(1), 200, dec!(3))];
        let costs = HashMap::from([(100, dec!(10)), (200, dec!(5))]);

        let roots = rollup_roots(&items, &costs);
        assert_eq!(roots.len(), 1);
        assert_eq!(roots[0].1, dec!(35));
    }

    #[test]
    fn missing_unit_cost_counts_as_zero() {
        let items = vec![node(1, None, 100, dec!(2)), node(2, Some(1), 200, dec!(3))];
        let costs = HashMap::from([(200, dec!(5))]);

        let roots = rollup_roots(&items, &costs);
        assert_eq!(roots[0].1, dec!(15));
    }

    #[test]
    fn multiple_roots_reported_separately() {
        let items = vec![node(1, None, 100, dec!(1)), node(2, None, 200, dec!(2))];
        let costs = HashMap::from([(100, dec!(3)), (200, dec!(4))]);

        let roots = rollup_roots(&items, &costs);
        let total: Decimal = roots.iter().map(|(_, c)| *c).sum();
        assert_eq!(roots.len(), 2);
        assert_eq!(total, dec!(11));
    }
}
