use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// A single line within a version's tree. `parent_item_id` always points
/// at a node of the same version; `level` is 0 for roots and
/// `parent.level + 1` otherwise.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "bom_items")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub version_id: i64,
    pub parent_item_id: Option<i64>,
    pub catalog_item_id: i64,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub quantity: Decimal,
    pub unit_of_measure: String,
    pub level: i32,
    pub sequence_number: i32,
    pub reference_designators: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::bom_version::Entity",
        from = "Column::VersionId",
        to = "super::bom_version::Column::Id"
    )]
    Version,
    #[sea_orm(
        belongs_to = "super::catalog_item::Entity",
        from = "Column::CatalogItemId",
        to = "super::catalog_item::Column::ItemId"
    )]
    CatalogItem,
    #[sea_orm(
        belongs_to = "Entity",
        from = "Column::ParentItemId",
        to = "Column::Id"
    )]
    Parent,
}

impl Related<super::bom_version::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Version.def()
    }
}

impl Related<super::catalog_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CatalogItem.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
