use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::ActiveValue::Set;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, IntoActiveModel, ModelTrait,
    PaginatorTrait, QueryFilter, QueryOrder, TransactionTrait,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::{
    db::DbPool,
    entities::{
        bill_of_material::Entity as BillOfMaterialEntity,
        bom_item::{self, Entity as BomItemEntity},
        bom_version::{self, Entity as BomVersionEntity},
        catalog_item::Entity as CatalogItemEntity,
    },
    errors::ServiceError,
    events::{Event, EventSender},
};

/// Input payload for appending a node to a version's tree
#[derive(Debug, Clone, Validate)]
pub struct AddItemInput {
    pub catalog_item_id: i64,
    pub parent_item_id: Option<i64>,
    pub quantity: Decimal,
    #[validate(length(min = 1))]
    pub unit_of_measure: String,
    pub reference_designators: Option<String>,
    pub notes: Option<String>,
}

/// Service for the version lifecycle: drafts are appended, one version per
/// structure is current at a time, and superseded versions are read-only.
#[derive(Clone)]
pub struct VersionService {
    db: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    sequence_gap: i32,
}

impl VersionService {
    pub fn new(db: Arc<DbPool>, event_sender: Arc<EventSender>, sequence_gap: i32) -> Self {
        Self {
            db,
            event_sender,
            sequence_gap,
        }
    }

    /// Creates the next draft version for a structure. The node set starts
    /// empty; nothing about the structure's current version changes.
    #[instrument(skip(self))]
    pub async fn create_version(
        &self,
        structure_id: i64,
        revision_note: Option<String>,
        actor: Option<Uuid>,
    ) -> Result<bom_version::Model, ServiceError> {
        let db = self.db.as_ref();

        BillOfMaterialEntity::find_by_id(structure_id)
            .one(db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Structure {} not found", structure_id))
            })?;

        let txn = db.begin().await.map_err(ServiceError::db_error)?;

        let latest = BomVersionEntity::find()
            .filter(bom_version::Column::StructureId.eq(structure_id))
            .order_by_desc(bom_version::Column::VersionNumber)
            .one(&txn)
            .await
            .map_err(ServiceError::db_error)?;

        let next_number = latest.map(|v| v.version_number + 1).unwrap_or(1);
        let now = Utc::now();

        let version = bom_version::ActiveModel {
            structure_id: Set(structure_id),
            version_number: Set(next_number),
            revision_note: Set(revision_note),
            is_current: Set(false),
            published_at: Set(Some(now)),
            published_by: Set(actor),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };

        let created = version.insert(&txn).await.map_err(ServiceError::db_error)?;

        txn.commit().await.map_err(ServiceError::db_error)?;

        info!(
            "Version created: structure_id={}, version_number={}",
            structure_id, next_number
        );

        self.event_sender
            .send_or_log(Event::VersionCreated {
                structure_id,
                version_id: created.id,
                version_number: next_number,
            })
            .await;

        Ok(created)
    }

    /// Copies the entire node set of `source_version_id` into the version
    /// of the same structure identified by `target_version_number`,
    /// preserving relative tree shape. All-or-nothing: a failure partway
    /// leaves no partial node set.
    #[instrument(skip(self))]
    pub async fn clone_version(
        &self,
        structure_id: i64,
        source_version_id: i64,
        target_version_number: i32,
        actor: Option<Uuid>,
    ) -> Result<(), ServiceError> {
        let db = self.db.as_ref();
        let txn = db.begin().await.map_err(ServiceError::db_error)?;

        let source = BomVersionEntity::find_by_id(source_version_id)
            .one(&txn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Version {} not found", source_version_id))
            })?;

        if source.structure_id != structure_id {
            return Err(ServiceError::ConsistencyError(format!(
                "Version {} belongs to structure {}, not {}",
                source_version_id, source.structure_id, structure_id
            )));
        }

        let target = BomVersionEntity::find()
            .filter(bom_version::Column::StructureId.eq(structure_id))
            .filter(bom_version::Column::VersionNumber.eq(target_version_number))
            .one(&txn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| {
                ServiceError::NotFound(format!(
                    "Structure {} has no version {}",
                    structure_id, target_version_number
                ))
            })?;

        if target.id == source.id {
            return Err(ServiceError::ConsistencyError(
                "Cannot clone a version onto itself".to_string(),
            ));
        }

        let existing_nodes = BomItemEntity::find()
            .filter(bom_item::Column::VersionId.eq(target.id))
            .count(&txn)
            .await
            .map_err(ServiceError::db_error)?;

        if existing_nodes > 0 {
            return Err(ServiceError::ConsistencyError(format!(
                "Version {} already has {} nodes; clone targets must be empty",
                target.id, existing_nodes
            )));
        }

        // Parents are cloned before any child references them: level order,
        // then id for a stable tiebreak.
        let source_items = BomItemEntity::find()
            .filter(bom_item::Column::VersionId.eq(source.id))
            .order_by_asc(bom_item::Column::Level)
            .order_by_asc(bom_item::Column::Id)
            .all(&txn)
            .await
            .map_err(ServiceError::db_error)?;

        let node_count = source_items.len();
        let mut id_map: HashMap<i64, i64> = HashMap::with_capacity(node_count);
        let now = Utc::now();

        for item in source_items {
            let parent_item_id = match item.parent_item_id {
                Some(old_parent) => Some(*id_map.get(&old_parent).ok_or_else(|| {
                    ServiceError::InternalError(format!(
                        "Clone ordering violated: parent {} of node {} not yet cloned",
                        old_parent, item.id
                    ))
                })?),
                None => None,
            };

            let clone = bom_item::ActiveModel {
                version_id: Set(target.id),
                parent_item_id: Set(parent_item_id),
                catalog_item_id: Set(item.catalog_item_id),
                quantity: Set(item.quantity),
                unit_of_measure: Set(item.unit_of_measure.clone()),
                level: Set(item.level),
                sequence_number: Set(item.sequence_number),
                reference_designators: Set(item.reference_designators.clone()),
                notes: Set(item.notes.clone()),
                created_at: Set(now),
                updated_at: Set(now),
                ..Default::default()
            };

            let created = clone.insert(&txn).await.map_err(ServiceError::db_error)?;
            id_map.insert(item.id, created.id);
        }

        txn.commit().await.map_err(ServiceError::db_error)?;

        info!(
            "Version cloned: structure_id={}, source={}, target={}, nodes={}",
            structure_id, source.id, target.id, node_count
        );

        self.event_sender
            .send_or_log(Event::VersionCloned {
                structure_id,
                source_version_id: source.id,
                target_version_id: target.id,
                node_count,
            })
            .await;

        Ok(())
    }

    /// Atomically makes `version_id` the structure's current version,
    /// unsetting whichever version held the flag before. Serialized by the
    /// store's transaction isolation; two concurrent switches cannot leave
    /// zero or two current versions.
    #[instrument(skip(self))]
    pub async fn set_current_version(
        &self,
        structure_id: i64,
        version_id: i64,
    ) -> Result<(), ServiceError> {
        let db = self.db.as_ref();
        let txn = db.begin().await.map_err(ServiceError::db_error)?;

        let version = BomVersionEntity::find_by_id(version_id)
            .one(&txn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Version {} not found", version_id)))?;

        if version.structure_id != structure_id {
            return Err(ServiceError::ConsistencyError(format!(
                "Version {} belongs to structure {}, not {}",
                version_id, version.structure_id, structure_id
            )));
        }

        if version.is_current {
            debug!("Version {} is already current", version_id);
            return Ok(());
        }

        let previous = BomVersionEntity::find()
            .filter(bom_version::Column::StructureId.eq(structure_id))
            .filter(bom_version::Column::IsCurrent.eq(true))
            .one(&txn)
            .await
            .map_err(ServiceError::db_error)?;

        if let Some(previous) = previous {
            let mut active = previous.into_active_model();
            active.is_current = Set(false);
            active.updated_at = Set(Utc::now());
            active.update(&txn).await.map_err(ServiceError::db_error)?;
        }

        let mut active = version.into_active_model();
        active.is_current = Set(true);
        active.updated_at = Set(Utc::now());
        active.update(&txn).await.map_err(ServiceError::db_error)?;

        txn.commit().await.map_err(ServiceError::db_error)?;

        info!(
            "Current version switched: structure_id={}, version_id={}",
            structure_id, version_id
        );

        self.event_sender
            .send_or_log(Event::CurrentVersionChanged {
                structure_id,
                version_id,
            })
            .await;

        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn get_version(
        &self,
        version_id: i64,
    ) -> Result<Option<bom_version::Model>, ServiceError> {
        BomVersionEntity::find_by_id(version_id)
            .one(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)
    }

    /// Versions of a structure, newest first.
    #[instrument(skip(self))]
    pub async fn list_versions(
        &self,
        structure_id: i64,
    ) -> Result<Vec<bom_version::Model>, ServiceError> {
        BomVersionEntity::find()
            .filter(bom_version::Column::StructureId.eq(structure_id))
            .order_by_desc(bom_version::Column::VersionNumber)
            .all(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)
    }

    /// Flat node set of a version, in (level, sequence) order.
    #[instrument(skip(self))]
    pub async fn get_version_items(
        &self,
        version_id: i64,
    ) -> Result<Vec<bom_item::Model>, ServiceError> {
        BomItemEntity::find()
            .filter(bom_item::Column::VersionId.eq(version_id))
            .order_by_asc(bom_item::Column::Level)
            .order_by_asc(bom_item::Column::SequenceNumber)
            .order_by_asc(bom_item::Column::Id)
            .all(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)
    }

    /// Appends a node to a version's tree. The level is derived from the
    /// parent; the sequence number takes the max among siblings plus the
    /// configured gap so later inserts can slot between existing rows.
    #[instrument(skip(self, input))]
    pub async fn add_item(
        &self,
        version_id: i64,
        input: AddItemInput,
    ) -> Result<bom_item::Model, ServiceError> {
        input.validate()?;

        if input.quantity <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Quantity must be greater than zero".to_string(),
            ));
        }

        let db = self.db.as_ref();
        let txn = db.begin().await.map_err(ServiceError::db_error)?;

        let version = BomVersionEntity::find_by_id(version_id)
            .one(&txn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Version {} not found", version_id)))?;

        self.ensure_not_superseded(&txn, &version).await?;

        CatalogItemEntity::find_by_id(input.catalog_item_id)
            .one(&txn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Item {} not found", input.catalog_item_id))
            })?;

        let level = match input.parent_item_id {
            Some(parent_id) => {
                let parent = BomItemEntity::find_by_id(parent_id)
                    .one(&txn)
                    .await
                    .map_err(ServiceError::db_error)?
                    .ok_or_else(|| {
                        ServiceError::NotFound(format!("Parent node {} not found", parent_id))
                    })?;

                if parent.version_id != version_id {
                    return Err(ServiceError::ConsistencyError(format!(
                        "Parent node {} belongs to version {}, not {}",
                        parent_id, parent.version_id, version_id
                    )));
                }

                parent.level + 1
            }
            None => 0,
        };

        let sequence_number = self
            .next_sequence_number(&txn, version_id, input.parent_item_id)
            .await?;

        let now = Utc::now();
        let item = bom_item::ActiveModel {
            version_id: Set(version_id),
            parent_item_id: Set(input.parent_item_id),
            catalog_item_id: Set(input.catalog_item_id),
            quantity: Set(input.quantity),
            unit_of_measure: Set(input.unit_of_measure),
            level: Set(level),
            sequence_number: Set(sequence_number),
            reference_designators: Set(input.reference_designators),
            notes: Set(input.notes),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };

        let created = item.insert(&txn).await.map_err(ServiceError::db_error)?;

        txn.commit().await.map_err(ServiceError::db_error)?;

        self.event_sender
            .send_or_log(Event::ItemAddedToVersion {
                version_id,
                item_id: created.id,
            })
            .await;

        Ok(created)
    }

    /// Removes a leaf node. A node that still has children is rejected;
    /// children must be removed first.
    #[instrument(skip(self))]
    pub async fn remove_item(&self, version_id: i64, item_id: i64) -> Result<(), ServiceError> {
        let db = self.db.as_ref();
        let txn = db.begin().await.map_err(ServiceError::db_error)?;

        let item = BomItemEntity::find_by_id(item_id)
            .one(&txn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Node {} not found", item_id)))?;

        if item.version_id != version_id {
            return Err(ServiceError::ConsistencyError(format!(
                "Node {} belongs to version {}, not {}",
                item_id, item.version_id, version_id
            )));
        }

        let version = BomVersionEntity::find_by_id(version_id)
            .one(&txn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Version {} not found", version_id)))?;

        self.ensure_not_superseded(&txn, &version).await?;

        let child_count = BomItemEntity::find()
            .filter(bom_item::Column::ParentItemId.eq(item_id))
            .count(&txn)
            .await
            .map_err(ServiceError::db_error)?;

        if child_count > 0 {
            return Err(ServiceError::ConsistencyError(format!(
                "Node {} has {} children; remove them first",
                item_id, child_count
            )));
        }

        item.delete(&txn).await.map_err(ServiceError::db_error)?;

        txn.commit().await.map_err(ServiceError::db_error)?;

        self.event_sender
            .send_or_log(Event::ItemRemovedFromVersion {
                version_id,
                item_id,
            })
            .await;

        Ok(())
    }

    /// Historical versions are read-only: once a later version has become
    /// current, the node set of this one is frozen.
    async fn ensure_not_superseded<C: ConnectionTrait>(
        &self,
        conn: &C,
        version: &bom_version::Model,
    ) -> Result<(), ServiceError> {
        let current = BomVersionEntity::find()
            .filter(bom_version::Column::StructureId.eq(version.structure_id))
            .filter(bom_version::Column::IsCurrent.eq(true))
            .one(conn)
            .await
            .map_err(ServiceError::db_error)?;

        if let Some(current) = current {
            if current.version_number > version.version_number {
                return Err(ServiceError::ConsistencyError(format!(
                    "Version {} is superseded by version {} and is read-only",
                    version.version_number, current.version_number
                )));
            }
        }

        Ok(())
    }

    async fn next_sequence_number<C: ConnectionTrait>(
        &self,
        conn: &C,
        version_id: i64,
        parent_item_id: Option<i64>,
    ) -> Result<i32, ServiceError> {
        let mut query = BomItemEntity::find().filter(bom_item::Column::VersionId.eq(version_id));

        query = match parent_item_id {
            Some(parent_id) => query.filter(bom_item::Column::ParentItemId.eq(parent_id)),
            None => query.filter(bom_item::Column::ParentItemId.is_null()),
        };

        let max_existing = query
            .order_by_desc(bom_item::Column::SequenceNumber)
            .one(conn)
            .await
            .map_err(ServiceError::db_error)?
            .map(|item| item.sequence_number)
            .unwrap_or(0);

        Ok(max_existing + self.sequence_gap)
    }
}
