use chrono::{DateTime, Utc};
use sea_orm::ActiveValue::Set;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, IntoActiveModel, ModelTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::{
    db::DbPool,
    entities::{
        bill_of_material::{self, Entity as BillOfMaterialEntity},
        bom_item::{self, Entity as BomItemEntity},
        bom_version::{self, Entity as BomVersionEntity},
        catalog_item::{self, Entity as CatalogItemEntity},
    },
    errors::ServiceError,
    events::{Event, EventSender},
};

/// Summary view returned when listing structures
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructureSummary {
    pub id: i64,
    pub number: String,
    pub name: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Detailed structure view including the current version, if any
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructureDetail {
    pub id: i64,
    pub number: String,
    pub name: String,
    pub description: Option<String>,
    pub external_reference: Option<String>,
    pub produced_item_id: Option<i64>,
    pub is_active: bool,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub current_version: Option<bom_version::Model>,
    pub version_count: u64,
}

/// Input payload for creating a structure
#[derive(Debug, Clone, Validate)]
pub struct CreateStructureInput {
    #[validate(length(min = 1))]
    pub number: String,
    #[validate(length(min = 1))]
    pub name: String,
    pub description: Option<String>,
    pub external_reference: Option<String>,
    pub produced_item_id: Option<i64>,
}

/// Input payload for metadata-only structure updates
#[derive(Debug, Clone, Default)]
pub struct UpdateStructureInput {
    pub name: Option<String>,
    pub description: Option<String>,
    pub external_reference: Option<String>,
    pub produced_item_id: Option<i64>,
    pub is_active: Option<bool>,
}

/// Service for structure (bill of material container) lifecycle. Versions
/// and tree nodes are managed by the version service; a structure itself
/// only soft-evolves through metadata edits.
#[derive(Clone)]
pub struct StructureService {
    db: Arc<DbPool>,
    event_sender: Arc<EventSender>,
}

impl StructureService {
    pub fn new(db: Arc<DbPool>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Creates a structure with no versions.
    #[instrument(skip(self, input))]
    pub async fn create_structure(
        &self,
        input: CreateStructureInput,
        actor: Option<Uuid>,
    ) -> Result<bill_of_material::Model, ServiceError> {
        input.validate()?;

        let db = self.db.as_ref();

        let duplicate = BillOfMaterialEntity::find()
            .filter(bill_of_material::Column::Number.eq(input.number.as_str()))
            .one(db)
            .await
            .map_err(ServiceError::db_error)?;

        if duplicate.is_some() {
            return Err(ServiceError::ValidationError(format!(
                "Structure number {} already in use",
                input.number
            )));
        }

        if let Some(item_id) = input.produced_item_id {
            CatalogItemEntity::find_by_id(item_id)
                .one(db)
                .await
                .map_err(ServiceError::db_error)?
                .ok_or_else(|| ServiceError::NotFound(format!("Item {} not found", item_id)))?;
        }

        let now = Utc::now();
        let structure = bill_of_material::ActiveModel {
            number: Set(input.number),
            name: Set(input.name),
            description: Set(input.description),
            external_reference: Set(input.external_reference),
            produced_item_id: Set(input.produced_item_id),
            is_active: Set(true),
            created_by: Set(actor),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };

        let created = structure.insert(db).await.map_err(ServiceError::db_error)?;

        info!(
            "Structure created: id={}, number={}",
            created.id, created.number
        );

        self.event_sender
            .send_or_log(Event::StructureCreated {
                structure_id: created.id,
            })
            .await;

        Ok(created)
    }

    #[instrument(skip(self))]
    pub async fn get_structure(
        &self,
        structure_id: i64,
    ) -> Result<Option<bill_of_material::Model>, ServiceError> {
        BillOfMaterialEntity::find_by_id(structure_id)
            .one(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)
    }

    /// Fetches a structure together with its current version summary.
    #[instrument(skip(self))]
    pub async fn get_structure_detail(
        &self,
        structure_id: i64,
    ) -> Result<Option<StructureDetail>, ServiceError> {
        let db = self.db.as_ref();

        let Some(model) = BillOfMaterialEntity::find_by_id(structure_id)
            .one(db)
            .await
            .map_err(ServiceError::db_error)?
        else {
            return Ok(None);
        };

        let current_version = BomVersionEntity::find()
            .filter(bom_version::Column::StructureId.eq(structure_id))
            .filter(bom_version::Column::IsCurrent.eq(true))
            .one(db)
            .await
            .map_err(ServiceError::db_error)?;

        let version_count = BomVersionEntity::find()
            .filter(bom_version::Column::StructureId.eq(structure_id))
            .count(db)
            .await
            .map_err(ServiceError::db_error)?;

        Ok(Some(StructureDetail {
            id: model.id,
            number: model.number,
            name: model.name,
            description: model.description,
            external_reference: model.external_reference,
            produced_item_id: model.produced_item_id,
            is_active: model.is_active,
            created_by: model.created_by,
            created_at: model.created_at,
            updated_at: model.updated_at,
            current_version,
            version_count,
        }))
    }

    /// Returns paginated structure summaries.
    #[instrument(skip(self))]
    pub async fn list_structures(
        &self,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<StructureSummary>, u64), ServiceError> {
        let db = self.db.as_ref();
        let limit = limit.max(1);
        let page = page.max(1) - 1;

        let paginator = BillOfMaterialEntity::find()
            .order_by_desc(bill_of_material::Column::CreatedAt)
            .paginate(db, limit);

        let total = paginator.num_items().await.map_err(ServiceError::db_error)?;

        let models = paginator
            .fetch_page(page)
            .await
            .map_err(ServiceError::db_error)?;

        let summaries = models
            .into_iter()
            .map(|model| StructureSummary {
                id: model.id,
                number: model.number,
                name: model.name,
                is_active: model.is_active,
                created_at: model.created_at,
                updated_at: model.updated_at,
            })
            .collect();

        Ok((summaries, total))
    }

    /// Applies metadata updates; versions and nodes are untouched.
    #[instrument(skip(self, input))]
    pub async fn update_structure(
        &self,
        structure_id: i64,
        input: UpdateStructureInput,
    ) -> Result<(), ServiceError> {
        let db = self.db.as_ref();

        let mut model = BillOfMaterialEntity::find_by_id(structure_id)
            .one(db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Structure {} not found", structure_id))
            })?;

        if let Some(item_id) = input.produced_item_id {
            CatalogItemEntity::find_by_id(item_id)
                .one(db)
                .await
                .map_err(ServiceError::db_error)?
                .ok_or_else(|| ServiceError::NotFound(format!("Item {} not found", item_id)))?;
        }

        if let Some(name) = input.name {
            model.name = name;
        }
        if let Some(desc) = input.description {
            model.description = Some(desc);
        }
        if let Some(reference) = input.external_reference {
            model.external_reference = Some(reference);
        }
        if let Some(item_id) = input.produced_item_id {
            model.produced_item_id = Some(item_id);
        }
        if let Some(is_active) = input.is_active {
            model.is_active = is_active;
        }
        model.updated_at = Utc::now();

        let active = model.into_active_model();
        active.update(db).await.map_err(ServiceError::db_error)?;

        self.event_sender
            .send_or_log(Event::StructureUpdated { structure_id })
            .await;

        Ok(())
    }

    /// True when any catalog item names this structure as its current
    /// structure. The order-management collaborator calls this before
    /// allowing deletion; the engine also enforces it in
    /// [`delete_structure`](Self::delete_structure).
    #[instrument(skip(self))]
    pub async fn is_referenced(&self, structure_id: i64) -> Result<bool, ServiceError> {
        let count = CatalogItemEntity::find()
            .filter(catalog_item::Column::CurrentStructureId.eq(structure_id))
            .count(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)?;

        Ok(count > 0)
    }

    /// Deletes a structure with all its versions and nodes. Rejected while
    /// the structure is still referenced.
    #[instrument(skip(self))]
    pub async fn delete_structure(&self, structure_id: i64) -> Result<(), ServiceError> {
        let db = self.db.as_ref();

        let structure = BillOfMaterialEntity::find_by_id(structure_id)
            .one(db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Structure {} not found", structure_id))
            })?;

        if self.is_referenced(structure_id).await? {
            return Err(ServiceError::ReferentialError(format!(
                "Structure {} is assigned to catalog items and cannot be deleted",
                structure_id
            )));
        }

        let txn = db.begin().await.map_err(ServiceError::db_error)?;

        let version_ids: Vec<i64> = BomVersionEntity::find()
            .filter(bom_version::Column::StructureId.eq(structure_id))
            .select_only()
            .column(bom_version::Column::Id)
            .into_tuple()
            .all(&txn)
            .await
            .map_err(ServiceError::db_error)?;

        if !version_ids.is_empty() {
            BomItemEntity::delete_many()
                .filter(bom_item::Column::VersionId.is_in(version_ids.clone()))
                .exec(&txn)
                .await
                .map_err(ServiceError::db_error)?;

            BomVersionEntity::delete_many()
                .filter(bom_version::Column::StructureId.eq(structure_id))
                .exec(&txn)
                .await
                .map_err(ServiceError::db_error)?;
        }

        structure
            .delete(&txn)
            .await
            .map_err(ServiceError::db_error)?;

        txn.commit().await.map_err(ServiceError::db_error)?;

        warn!("Structure deleted: id={}", structure_id);

        self.event_sender
            .send_or_log(Event::StructureDeleted { structure_id })
            .await;

        Ok(())
    }
}
