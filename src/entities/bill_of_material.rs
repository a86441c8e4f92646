use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A named, numbered container for one product's versioned bill of
/// materials. Metadata evolves in place; the tree itself only changes by
/// appending versions.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "bill_of_materials")]
pub struct Model {
    #[sea_orm(primary_key)]
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
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::bom_version::Entity")]
    Versions,
    #[sea_orm(
        belongs_to = "super::catalog_item::Entity",
        from = "Column::ProducedItemId",
        to = "super::catalog_item::Column::ItemId"
    )]
    ProducedItem,
}

impl Related<super::bom_version::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Versions.def()
    }
}

impl Related<super::catalog_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ProducedItem.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
