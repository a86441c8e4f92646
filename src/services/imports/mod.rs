use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::ActiveValue::Set;
use sea_orm::{ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::{
    entities::{bill_of_material, bom_item, bom_version, catalog_item},
    errors::{ImportError, ServiceError},
    services::catalog::CatalogService,
};

pub mod delimited;
pub mod nested_json;

pub use delimited::{DelimitedImportRequest, DelimitedImportService, FieldMapping};
pub use nested_json::{NestedBomDocument, NestedBomEntry, NestedJsonImportService};

/// Result of a successful import: the new structure, its version 1 (made
/// current inside the import transaction), and non-fatal warnings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportOutcome {
    pub structure_id: i64,
    pub version_id: i64,
    pub node_count: usize,
    pub warnings: Vec<String>,
}

/// Structure header for an import
#[derive(Debug, Clone, Validate)]
pub struct ImportStructureInput {
    #[validate(length(min = 1))]
    pub number: String,
    #[validate(length(min = 1))]
    pub name: String,
    pub description: Option<String>,
    pub external_reference: Option<String>,
}

/// Both adapters reduce their source grammar to this flat, already
/// validated node list before anything touches the database.
#[derive(Debug, Clone)]
pub(crate) struct PendingNode {
    /// 1-based source row (text) or pre-order position (JSON), for warnings
    /// and error context.
    pub row: usize,
    pub item_number: String,
    pub item_name: Option<String>,
    pub quantity: Decimal,
    pub unit_of_measure: Option<String>,
    pub level: i32,
    /// Index of the parent within the pending list; always less than the
    /// node's own index.
    pub parent: Option<usize>,
    pub sequence_number: i32,
    pub reference_designators: Option<String>,
    pub notes: Option<String>,
}

/// An import adapter turns one externally authored source into a new
/// structure with a consistent version-1 node set, inside one transaction.
#[async_trait]
pub trait ImportAdapter {
    type Source;

    async fn import(
        &self,
        source: Self::Source,
        actor: Option<Uuid>,
    ) -> Result<ImportOutcome, ServiceError>;
}

/// Default unit of measure when the source does not carry one.
pub(crate) const DEFAULT_UOM: &str = "EA";

/// Writes a validated pending node set as structure + version 1 + nodes on
/// the given transaction. Catalog items are resolved by number on the same
/// connection so implicit creations roll back with everything else.
/// Returns (structure_id, version_id).
pub(crate) async fn persist_import<C: ConnectionTrait>(
    txn: &C,
    header: &ImportStructureInput,
    actor: Option<Uuid>,
    nodes: &[PendingNode],
    allow_item_autocreate: bool,
    warnings: &mut Vec<String>,
) -> Result<(i64, i64), ServiceError> {
    let duplicate = bill_of_material::Entity::find()
        .filter(bill_of_material::Column::Number.eq(header.number.as_str()))
        .one(txn)
        .await
        .map_err(ServiceError::db_error)?;

    if duplicate.is_some() {
        return Err(ServiceError::ValidationError(format!(
            "Structure number {} already in use",
            header.number
        )));
    }

    let now = Utc::now();

    let structure = bill_of_material::ActiveModel {
        number: Set(header.number.clone()),
        name: Set(header.name.clone()),
        description: Set(header.description.clone()),
        external_reference: Set(header.external_reference.clone()),
        produced_item_id: Set(None),
        is_active: Set(true),
        created_by: Set(actor),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };
    let structure = structure.insert(txn).await.map_err(ServiceError::db_error)?;

    let version = bom_version::ActiveModel {
        structure_id: Set(structure.id),
        version_number: Set(1),
        revision_note: Set(Some("Imported".to_string())),
        is_current: Set(true),
        published_at: Set(Some(now)),
        published_by: Set(actor),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };
    let version = version.insert(txn).await.map_err(ServiceError::db_error)?;

    let mut inserted_ids: Vec<i64> = Vec::with_capacity(nodes.len());

    for (pos, pending) in nodes.iter().enumerate() {
        let existing = catalog_item::Entity::find()
            .filter(catalog_item::Column::ItemNumber.eq(pending.item_number.as_str()))
            .one(txn)
            .await
            .map_err(ServiceError::db_error)?;

        let (catalog_item, created) = match existing {
            Some(item) => (item, false),
            None if allow_item_autocreate => {
                CatalogService::find_or_create_in(
                    txn,
                    &pending.item_number,
                    pending.item_name.as_deref(),
                    pending.unit_of_measure.as_deref(),
                )
                .await?
            }
            None => {
                return Err(ImportError::UnknownItem {
                    row: pending.row,
                    item_number: pending.item_number.clone(),
                }
                .into())
            }
        };

        if created {
            warnings.push(format!(
                "row {}: item {} created in catalog",
                pending.row, pending.item_number
            ));
        }

        let parent_item_id = match pending.parent {
            Some(parent_pos) => Some(*inserted_ids.get(parent_pos).ok_or_else(|| {
                ServiceError::InternalError(format!(
                    "Import ordering violated: node {} references unprocessed parent {}",
                    pos, parent_pos
                ))
            })?),
            None => None,
        };

        let item = bom_item::ActiveModel {
            version_id: Set(version.id),
            parent_item_id: Set(parent_item_id),
            catalog_item_id: Set(catalog_item.item_id),
            quantity: Set(pending.quantity),
            unit_of_measure: Set(pending
                .unit_of_measure
                .clone()
                .unwrap_or_else(|| DEFAULT_UOM.to_string())),
            level: Set(pending.level),
            sequence_number: Set(pending.sequence_number),
            reference_designators: Set(pending.reference_designators.clone()),
            notes: Set(pending.notes.clone()),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };

        let item = item.insert(txn).await.map_err(ServiceError::db_error)?;
        inserted_ids.push(item.id);
    }

    Ok((structure.id, version.id))
}
