use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::ActiveValue::Set;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, IntoActiveModel, QueryFilter,
};
use std::sync::Arc;
use tracing::{info, instrument};
use validator::Validate;

use crate::{
    db::DbPool,
    entities::{
        bill_of_material::Entity as BillOfMaterialEntity,
        catalog_item::{self, Entity as CatalogItemEntity},
    },
    errors::ServiceError,
};

/// Input payload for creating a catalog item
#[derive(Debug, Clone, Validate)]
pub struct CreateCatalogItemInput {
    #[validate(length(min = 1))]
    pub item_number: String,
    #[validate(length(min = 1))]
    pub name: String,
    pub description: Option<String>,
    pub unit_cost: Option<Decimal>,
    pub unit_of_measure: Option<String>,
    pub can_be_manufactured: bool,
}

/// Narrow service over the catalog master data the engine reads. Item
/// lifecycle beyond lookup/upsert and the current-structure pointer belongs
/// to the surrounding platform.
#[derive(Clone)]
pub struct CatalogService {
    db: Arc<DbPool>,
}

impl CatalogService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    #[instrument(skip(self))]
    pub async fn get_item(&self, item_id: i64) -> Result<Option<catalog_item::Model>, ServiceError> {
        CatalogItemEntity::find_by_id(item_id)
            .one(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)
    }

    #[instrument(skip(self))]
    pub async fn find_by_number(
        &self,
        item_number: &str,
    ) -> Result<Option<catalog_item::Model>, ServiceError> {
        CatalogItemEntity::find()
            .filter(catalog_item::Column::ItemNumber.eq(item_number))
            .one(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)
    }

    /// Creates a catalog item from explicit input.
    #[instrument(skip(self, input))]
    pub async fn create_item(
        &self,
        input: CreateCatalogItemInput,
    ) -> Result<catalog_item::Model, ServiceError> {
        input.validate()?;

        if self.find_by_number(&input.item_number).await?.is_some() {
            return Err(ServiceError::ValidationError(format!(
                "Item number {} already exists",
                input.item_number
            )));
        }

        let now = Utc::now();
        let item = catalog_item::ActiveModel {
            item_number: Set(input.item_number),
            name: Set(input.name),
            description: Set(input.description),
            unit_cost: Set(input.unit_cost),
            unit_of_measure: Set(input.unit_of_measure),
            can_be_manufactured: Set(input.can_be_manufactured),
            current_structure_id: Set(None),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };

        let created = item
            .insert(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)?;

        info!(
            "Catalog item created: id={}, number={}",
            created.item_id, created.item_number
        );

        Ok(created)
    }

    /// Points an item at the structure currently used to build it. The
    /// cross-structure hierarchy walk follows these pointers.
    #[instrument(skip(self))]
    pub async fn assign_current_structure(
        &self,
        item_id: i64,
        structure_id: i64,
    ) -> Result<(), ServiceError> {
        let db = self.db.as_ref();

        let item = CatalogItemEntity::find_by_id(item_id)
            .one(db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Item {} not found", item_id)))?;

        BillOfMaterialEntity::find_by_id(structure_id)
            .one(db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Structure {} not found", structure_id))
            })?;

        let mut active = item.into_active_model();
        active.current_structure_id = Set(Some(structure_id));
        active.updated_at = Set(Utc::now());
        active.update(db).await.map_err(ServiceError::db_error)?;

        Ok(())
    }

    /// Clears an item's current-structure pointer.
    #[instrument(skip(self))]
    pub async fn clear_current_structure(&self, item_id: i64) -> Result<(), ServiceError> {
        let db = self.db.as_ref();

        let item = CatalogItemEntity::find_by_id(item_id)
            .one(db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Item {} not found", item_id)))?;

        let mut active = item.into_active_model();
        active.current_structure_id = Set(None);
        active.updated_at = Set(Utc::now());
        active.update(db).await.map_err(ServiceError::db_error)?;

        Ok(())
    }

    /// Finds an item by number on the given connection, creating it when
    /// absent. Used by the import adapters inside their transactions so the
    /// upsert rolls back with the rest of the import. Returns the item and
    /// whether it was created.
    pub async fn find_or_create_in<C: ConnectionTrait>(
        conn: &C,
        item_number: &str,
        name: Option<&str>,
        unit_of_measure: Option<&str>,
    ) -> Result<(catalog_item::Model, bool), ServiceError> {
        let existing = CatalogItemEntity::find()
            .filter(catalog_item::Column::ItemNumber.eq(item_number))
            .one(conn)
            .await
            .map_err(ServiceError::db_error)?;

        if let Some(item) = existing {
            return Ok((item, false));
        }

        let now = Utc::now();
        let item = catalog_item::ActiveModel {
            item_number: Set(item_number.to_string()),
            name: Set(name.unwrap_or(item_number).to_string()),
            description: Set(None),
            unit_cost: Set(None),
            unit_of_measure: Set(unit_of_measure.map(|u| u.to_string())),
            can_be_manufactured: Set(false),
            current_structure_id: Set(None),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };

        let created = item.insert(conn).await.map_err(ServiceError::db_error)?;

        Ok((created, true))
    }
}
