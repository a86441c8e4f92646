use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::instrument;

use crate::{
    db::DbPool,
    entities::{
        bom_item::{self, Entity as BomItemEntity},
        bom_version::Entity as BomVersionEntity,
    },
    errors::ServiceError,
};

/// Projection of a tree node as the differencer sees it. The parent is
/// identified by the parent node's catalog item rather than its row id, so
/// the comparison is meaningful across versions whose ids never coincide.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffNode {
    pub node_id: i64,
    pub catalog_item_id: i64,
    pub quantity: Decimal,
    pub unit_of_measure: String,
    pub level: i32,
    pub parent_catalog_item_id: Option<i64>,
}

/// A node present in both versions whose compared fields differ
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModifiedPair {
    pub before: DiffNode,
    pub after: DiffNode,
}

/// Structural difference between two versions of one structure.
/// Deliberately asymmetric: swapping the arguments swaps added/removed and
/// flips each modified pair.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VersionDiff {
    pub added: Vec<DiffNode>,
    pub removed: Vec<DiffNode>,
    pub modified: Vec<ModifiedPair>,
}

/// Computes added/removed/modified node sets between two versions of the
/// same structure, keyed by catalog item identity.
#[derive(Clone)]
pub struct DiffService {
    db: Arc<DbPool>,
}

impl DiffService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    #[instrument(skip(self))]
    pub async fn diff_versions(
        &self,
        version_a_id: i64,
        version_b_id: i64,
    ) -> Result<VersionDiff, ServiceError> {
        let db = self.db.as_ref();

        let version_a = BomVersionEntity::find_by_id(version_a_id)
            .one(db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Version {} not found", version_a_id))
            })?;

        let version_b = BomVersionEntity::find_by_id(version_b_id)
            .one(db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Version {} not found", version_b_id))
            })?;

        if version_a.structure_id != version_b.structure_id {
            return Err(ServiceError::ConsistencyError(format!(
                "Versions {} and {} belong to different structures",
                version_a_id, version_b_id
            )));
        }

        let items_a = self.load_items(version_a_id).await?;
        let items_b = self.load_items(version_b_id).await?;

        Ok(diff_node_sets(&items_a, &items_b))
    }

    async fn load_items(&self, version_id: i64) -> Result<Vec<bom_item::Model>, ServiceError> {
        BomItemEntity::find()
            .filter(bom_item::Column::VersionId.eq(version_id))
            .order_by_asc(bom_item::Column::Id)
            .all(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)
    }
}

fn project(items: &[bom_item::Model]) -> BTreeMap<i64, DiffNode> {
    let by_id: HashMap<i64, &bom_item::Model> = items.iter().map(|i| (i.id, i)).collect();

    // BTreeMap keyed by catalog item id: deterministic output order, and
    // last-write-wins if an item number repeats within a version (which
    // should not happen by construction).
    items
        .iter()
        .map(|item| {
            let parent_catalog_item_id = item
                .parent_item_id
                .and_then(|pid| by_id.get(&pid))
                .map(|parent| parent.catalog_item_id);

            (
                item.catalog_item_id,
                DiffNode {
                    node_id: item.id,
                    catalog_item_id: item.catalog_item_id,
                    quantity: item.quantity,
                    unit_of_measure: item.unit_of_measure.clone(),
                    level: item.level,
                    parent_catalog_item_id,
                },
            )
        })
        .collect()
}

/// Pure diff over two flat node sets. Present only in `b`: added. Only in
/// `a`: removed. Present in both with any compared field differing:
/// modified, reporting both sides.
pub fn diff_node_sets(a: &[bom_item::Model], b: &[bom_item::Model]) -> VersionDiff {
    let map_a = project(a);
    let map_b = project(b);

    let mut diff = VersionDiff::default();

    for (key, node_b) in &map_b {
        match map_a.get(key) {
            None => diff.added.push(node_b.clone()),
            Some(node_a) => {
                let changed = node_a.quantity != node_b.quantity
                    || node_a.unit_of_measure != node_b.unit_of_measure
                    || node_a.parent_catalog_item_id != node_b.parent_catalog_item_id
                    || node_a.level != node_b.level;

                if changed {
                    diff.modified.push(ModifiedPair {
                        before: node_a.clone(),
                        after: node_b.clone(),
                    });
                }
            }
        }
    }

    for (key, node_a) in &map_a {
        if !map_b.contains_key(key) {
            diff.removed.push(node_a.clone());
        }
    }

    diff
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn node(
        id: i64,
        parent: Option<i64>,
        catalog_item_id: i64,
        quantity: Decimal,
        level: i32,
    ) -> bom_item::Model {
        bom_item::Model {
            id,
            version_id: 1,
            parent_item_id: parent,
            catalog_item_id,
            quantity,
            unit_of_measure: "EA".to_string(),
            level,
            sequence_number: 10,
            reference_designators: None,
            notes: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn detects_added_and_removed_by_catalog_item() {
        let a = vec![node(1, None, 100, dec!(1), 0)];
        let b = vec![node(9, None, 200, dec!(1), 0)];

        let diff = diff_node_sets(&a, &b);

        assert_eq!(diff.added.len(), 1);
        assert_eq!(diff.added[0].catalog_item_id, 200);
        assert_eq!(diff.removed.len(), 1);
        assert_eq!(diff.removed[0].catalog_item_id, 100);
        assert!(diff.modified.is_empty());
    }

    #[test]
    fn quantity_change_reports_both_sides() {
        let a = vec![node(1, None, 100, dec!(1), 0)];
        let b = vec![node(7, None, 100, dec!(2), 0)];

        let diff = diff_node_sets(&a, &b);

        assert!(diff.added.is_empty());
        assert!(diff.removed.is_empty());
        assert_eq!(diff.modified.len(), 1);
        assert_eq!(diff.modified[0].before.quantity, dec!(1));
        assert_eq!(diff.modified[0].after.quantity, dec!(2));
    }

    #[test]
    fn reparenting_counts_as_modified() {
        // same item set, but 300 moves from under 100 to under 200
        let a = vec![
            node(1, None, 100, dec!(1), 0),
            node(2, None, 200, dec!(1), 0),
            node(3, Some(1), 300, dec!(1), 1),
        ];
        let b = vec![
            node(11, None, 100, dec!(1), 0),
            node(12, None, 200, dec!(1), 0),
            node(13, Some(12), 300, dec!(1), 1),
        ];

        let diff = diff_node_sets(&a, &b);

        assert!(diff.added.is_empty());
        assert!(diff.removed.is_empty());
        assert_eq!(diff.modified.len(), 1);
        assert_eq!(diff.modified[0].before.parent_catalog_item_id, Some(100));
        assert_eq!(diff.modified[0].after.parent_catalog_item_id, Some(200));
    }

    #[test]
    fn identical_sets_with_different_ids_diff_clean() {
        let a = vec![node(1, None, 100, dec!(2), 0), node(2, Some(1), 200, dec!(3), 1)];
        let b = vec![node(5, None, 100, dec!(2), 0), node(6, Some(5), 200, dec!(3), 1)];

        let diff = diff_node_sets(&a, &b);

        assert!(diff.added.is_empty());
        assert!(diff.removed.is_empty());
        assert!(diff.modified.is_empty());
    }

    prop_compose! {
        fn arb_node_set(version_id: i64)(entries in prop::collection::vec((1i64..20, 1u32..100, 0i32..4), 0..12)) -> Vec<bom_item::Model> {
            entries
                .iter()
                .enumerate()
                .map(|(pos, &(catalog_item_id, quantity, level))| {
                    let mut m = node(
                        (pos as i64) + version_id * 1000,
                        None,
                        catalog_item_id,
                        Decimal::from(quantity),
                        level,
                    );
                    m.version_id = version_id;
                    m
                })
                .collect()
        }
    }

    proptest! {
        #[test]
        fn swap_swaps_added_and_removed(a in arb_node_set(1), b in arb_node_set(2)) {
            let forward = diff_node_sets(&a, &b);
            let backward = diff_node_sets(&b, &a);

            prop_assert_eq!(&forward.added, &backward.removed);
            prop_assert_eq!(&forward.removed, &backward.added);

            let flipped: Vec<ModifiedPair> = backward
                .modified
                .iter()
                .map(|pair| ModifiedPair {
                    before: pair.after.clone(),
                    after: pair.before.clone(),
                })
                .collect();
            prop_assert_eq!(&forward.modified, &flipped);
        }
    }
}
