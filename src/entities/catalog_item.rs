use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Master part/assembly record referenced by BOM tree nodes. The engine
/// reads and upserts these by item number; the wider item lifecycle is
/// owned elsewhere.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "catalog_items")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub item_id: i64,
    pub item_number: String,
    pub name: String,
    pub description: Option<String>,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))", nullable)]
    pub unit_cost: Option<Decimal>,
    pub unit_of_measure: Option<String>,
    pub can_be_manufactured: bool,
    /// The item's own recipe: the structure currently used to build it.
    pub current_structure_id: Option<i64>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::bill_of_material::Entity",
        from = "Column::CurrentStructureId",
        to = "super::bill_of_material::Column::Id"
    )]
    CurrentStructure,
    #[sea_orm(has_many = "super::bom_item::Entity")]
    BomItems,
}

impl Related<super::bill_of_material::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CurrentStructure.def()
    }
}

impl Related<super::bom_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::BomItems.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
