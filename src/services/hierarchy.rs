use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::{
    db::DbPool,
    entities::{
        bill_of_material::{self, Entity as BillOfMaterialEntity},
        bom_item::{self, Entity as BomItemEntity},
        bom_version::{self, Entity as BomVersionEntity},
        catalog_item::{self, Entity as CatalogItemEntity},
    },
    errors::ServiceError,
};

/// One node of a single version's nested tree. Field names mirror the
/// nested-JSON import shape so the same projection round-trips through the
/// export surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionTreeNode {
    pub id: i64,
    pub catalog_item_id: i64,
    pub item_number: String,
    pub name: String,
    pub quantity: Decimal,
    pub unit_of_measure: String,
    pub level: i32,
    pub sequence_number: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_designators: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub children: Vec<VersionTreeNode>,
}

/// One node of the cross-structure composite hierarchy: a read-only
/// display projection, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HierarchyNode {
    pub id: i64,
    pub number: String,
    pub name: String,
    pub level: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantity: Option<Decimal>,
    pub children: Vec<HierarchyNode>,
}

/// Builds nested trees out of flat parent-pointer node sets, and walks the
/// composite graph formed by catalog items that carry their own current
/// structure. The cross-structure graph is not guaranteed acyclic; a
/// path-scoped visited set and a hard depth ceiling bound the walk.
#[derive(Clone)]
pub struct HierarchyService {
    db: Arc<DbPool>,
    max_depth: i32,
}

struct VersionContext {
    items: Vec<bom_item::Model>,
    // index into `items`, keyed by parent node id (None = roots), each
    // bucket in (sequence_number, id) order
    children: HashMap<Option<i64>, Vec<usize>>,
    catalog: HashMap<i64, catalog_item::Model>,
}

impl HierarchyService {
    pub fn new(db: Arc<DbPool>, max_depth: i32) -> Self {
        Self { db, max_depth }
    }

    /// Nested tree of one version, children in sibling-sequence order.
    #[instrument(skip(self))]
    pub async fn build_version_tree(
        &self,
        version_id: i64,
    ) -> Result<Vec<VersionTreeNode>, ServiceError> {
        let db = self.db.as_ref();

        BomVersionEntity::find_by_id(version_id)
            .one(db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Version {} not found", version_id)))?;

        let ctx = self.load_version_context(version_id).await?;
        Ok(assemble_version_tree(&ctx.items, &ctx.catalog))
    }

    /// Composite hierarchy rooted at a structure, expanding each node whose
    /// catalog item has its own current structure. A structure id already on
    /// the current path terminates that branch silently; the depth ceiling
    /// bounds pathological but acyclic chains.
    #[instrument(skip(self))]
    pub async fn build_hierarchy(
        &self,
        structure_id: i64,
    ) -> Result<HierarchyNode, ServiceError> {
        let mut visited = HashSet::new();

        self.expand_structure(structure_id, 0, &mut visited)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Structure {} not found", structure_id)))
    }

    async fn expand_structure(
        &self,
        structure_id: i64,
        level: i32,
        visited: &mut HashSet<i64>,
    ) -> Result<Option<HierarchyNode>, ServiceError> {
        if visited.contains(&structure_id) {
            debug!(
                "Hierarchy walk revisited structure {}; terminating branch",
                structure_id
            );
            return Ok(None);
        }

        if level >= self.max_depth {
            debug!(
                "Hierarchy walk hit depth ceiling {} at structure {}",
                self.max_depth, structure_id
            );
            return Ok(None);
        }

        let Some(structure) = BillOfMaterialEntity::find_by_id(structure_id)
            .one(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)?
        else {
            return Ok(None);
        };

        visited.insert(structure_id);

        let mut node = HierarchyNode {
            id: structure.id,
            number: structure.number,
            name: structure.name,
            level,
            quantity: None,
            children: Vec::new(),
        };

        let current_version = BomVersionEntity::find()
            .filter(bom_version::Column::StructureId.eq(structure_id))
            .filter(bom_version::Column::IsCurrent.eq(true))
            .one(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)?;

        if let Some(version) = current_version {
            let ctx = self.load_version_context(version.id).await?;

            if let Some(roots) = ctx.children.get(&None) {
                for &root in roots {
                    let child = Box::pin(self.expand_item(&ctx, root, level + 1, visited)).await?;
                    node.children.push(child);
                }
            }
        }

        visited.remove(&structure_id);

        Ok(Some(node))
    }

    async fn expand_item(
        &self,
        ctx: &VersionContext,
        index: usize,
        level: i32,
        visited: &mut HashSet<i64>,
    ) -> Result<HierarchyNode, ServiceError> {
        let item = &ctx.items[index];
        let catalog = ctx.catalog.get(&item.catalog_item_id);

        let mut node = HierarchyNode {
            id: item.id,
            number: catalog.map(|c| c.item_number.clone()).unwrap_or_default(),
            name: catalog.map(|c| c.name.clone()).unwrap_or_default(),
            level,
            quantity: Some(item.quantity),
            children: Vec::new(),
        };

        if let Some(children) = ctx.children.get(&Some(item.id)) {
            for &child in children {
                let child_node =
                    Box::pin(self.expand_item(ctx, child, level + 1, visited)).await?;
                node.children.push(child_node);
            }
        }

        // A node whose catalog item has its own current structure expands
        // that structure as a sub-hierarchy one display level down.
        if let Some(sub_structure_id) = catalog.and_then(|c| c.current_structure_id) {
            if let Some(sub) =
                Box::pin(self.expand_structure(sub_structure_id, level + 1, visited)).await?
            {
                node.children.push(sub);
            }
        }

        Ok(node)
    }

    async fn load_version_context(&self, version_id: i64) -> Result<VersionContext, ServiceError> {
        let db = self.db.as_ref();

        let items = BomItemEntity::find()
            .filter(bom_item::Column::VersionId.eq(version_id))
            .order_by_asc(bom_item::Column::Level)
            .order_by_asc(bom_item::Column::SequenceNumber)
            .order_by_asc(bom_item::Column::Id)
            .all(db)
            .await
            .map_err(ServiceError::db_error)?;

        let item_ids: Vec<i64> = items.iter().map(|i| i.catalog_item_id).collect();
        let catalog = if item_ids.is_empty() {
            HashMap::new()
        } else {
            CatalogItemEntity::find()
                .filter(catalog_item::Column::ItemId.is_in(item_ids))
                .all(db)
                .await
                .map_err(ServiceError::db_error)?
                .into_iter()
                .map(|c| (c.item_id, c))
                .collect()
        };

        let children = children_index(&items);

        Ok(VersionContext {
            items,
            children,
            catalog,
        })
    }
}

/// One-pass parent-id → children index, each bucket sorted by
/// (sequence_number, id) for deterministic sibling order.
fn children_index(items: &[bom_item::Model]) -> HashMap<Option<i64>, Vec<usize>> {
    let mut index: HashMap<Option<i64>, Vec<usize>> = HashMap::new();

    for (pos, item) in items.iter().enumerate() {
        index.entry(item.parent_item_id).or_default().push(pos);
    }

    for bucket in index.values_mut() {
        bucket.sort_by_key(|&pos| (items[pos].sequence_number, items[pos].id));
    }

    index
}

/// Pure flat→nested build over one version's node set. O(n) index build
/// plus an emit from the roots.
pub(crate) fn assemble_version_tree(
    items: &[bom_item::Model],
    catalog: &HashMap<i64, catalog_item::Model>,
) -> Vec<VersionTreeNode> {
    let index = children_index(items);

    fn emit(
        items: &[bom_item::Model],
        catalog: &HashMap<i64, catalog_item::Model>,
        index: &HashMap<Option<i64>, Vec<usize>>,
        pos: usize,
    ) -> VersionTreeNode {
        let item = &items[pos];
        let meta = catalog.get(&item.catalog_item_id);

        let children = index
            .get(&Some(item.id))
            .map(|bucket| {
                bucket
                    .iter()
                    .map(|&child| emit(items, catalog, index, child))
                    .collect()
            })
            .unwrap_or_default();

        VersionTreeNode {
            id: item.id,
            catalog_item_id: item.catalog_item_id,
            item_number: meta.map(|c| c.item_number.clone()).unwrap_or_default(),
            name: meta.map(|c| c.name.clone()).unwrap_or_default(),
            quantity: item.quantity,
            unit_of_measure: item.unit_of_measure.clone(),
            level: item.level,
            sequence_number: item.sequence_number,
            reference_designators: item.reference_designators.clone(),
            notes: item.notes.clone(),
            children,
        }
    }

    index
        .get(&None)
        .map(|roots| {
            roots
                .iter()
                .map(|&root| emit(items, catalog, &index, root))
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn node(id: i64, parent: Option<i64>, level: i32, sequence: i32) -> bom_item::Model {
        bom_item::Model {
            id,
            version_id: 1,
            parent_item_id: parent,
            catalog_item_id: id * 100,
            quantity: dec!(1),
            unit_of_measure: "EA".to_string(),
            level,
            sequence_number: sequence,
            reference_designators: None,
            notes: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn assembles_nested_tree_in_sequence_order() {
        let items = vec![
            node(1, None, 0, 10),
            node(2, Some(1), 1, 20),
            node(3, Some(1), 1, 10),
            node(4, Some(3), 2, 10),
            node(5, None, 0, 5),
        ];

        let tree = assemble_version_tree(&items, &HashMap::new());

        assert_eq!(tree.len(), 2);
        // roots ordered by sequence
        assert_eq!(tree[0].id, 5);
        assert_eq!(tree[1].id, 1);
        // children of node 1 ordered by sequence: 3 before 2
        let first = &tree[1];
        assert_eq!(first.children.len(), 2);
        assert_eq!(first.children[0].id, 3);
        assert_eq!(first.children[1].id, 2);
        assert_eq!(first.children[0].children[0].id, 4);
    }

    #[test]
    fn sequence_ties_break_by_node_id() {
        let items = vec![
            node(7, None, 0, 10),
            node(3, None, 0, 10),
            node(5, None, 0, 10),
        ];

        let tree = assemble_version_tree(&items, &HashMap::new());

        let ids: Vec<i64> = tree.iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![3, 5, 7]);
    }

    #[test]
    fn empty_node_set_yields_empty_tree() {
        let tree = assemble_version_tree(&[], &HashMap::new());
        assert!(tree.is_empty());
    }
}
