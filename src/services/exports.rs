use csv::WriterBuilder;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::instrument;

use crate::{
    db::DbPool,
    entities::{
        bill_of_material::Entity as BillOfMaterialEntity,
        bom_version::{self, Entity as BomVersionEntity},
    },
    errors::ServiceError,
    services::{
        diff::{DiffService, VersionDiff},
        hierarchy::{HierarchyService, VersionTreeNode},
    },
};

/// Nested export of a structure's current version: the import document
/// shape plus the computed `level` and `sequence_number` fields carried by
/// every node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NestedExportDocument {
    pub name: String,
    pub number: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_reference: Option<String>,
    pub version_number: i32,
    pub items: Vec<VersionTreeNode>,
}

/// Read-only export surface over the hierarchy and diff services.
#[derive(Clone)]
pub struct ExportService {
    db: Arc<DbPool>,
    hierarchy: Arc<HierarchyService>,
    diff: Arc<DiffService>,
}

impl ExportService {
    pub fn new(db: Arc<DbPool>, hierarchy: Arc<HierarchyService>, diff: Arc<DiffService>) -> Self {
        Self {
            db,
            hierarchy,
            diff,
        }
    }

    /// Current version of a structure as a nested JSON document mirroring
    /// the import shape.
    #[instrument(skip(self))]
    pub async fn export_nested_json(
        &self,
        structure_id: i64,
    ) -> Result<NestedExportDocument, ServiceError> {
        let (structure, version) = self.load_current(structure_id).await?;
        let items = self.hierarchy.build_version_tree(version.id).await?;

        Ok(NestedExportDocument {
            name: structure.name,
            number: structure.number,
            external_reference: structure.external_reference,
            version_number: version.version_number,
            items,
        })
    }

    /// Current version of a structure as a flattened, indentation-prefixed
    /// delimited table suitable for spreadsheet consumption. Columns:
    /// level, item number, item name, quantity, unit, reference
    /// designators, notes; the name is indented two spaces per level by a
    /// pre-order walk.
    #[instrument(skip(self))]
    pub async fn export_delimited(&self, structure_id: i64) -> Result<String, ServiceError> {
        let (_, version) = self.load_current(structure_id).await?;
        let tree = self.hierarchy.build_version_tree(version.id).await?;

        let mut writer = WriterBuilder::new().from_writer(Vec::new());

        writer
            .write_record([
                "level",
                "item_number",
                "item_name",
                "quantity",
                "unit_of_measure",
                "reference_designators",
                "notes",
            ])
            .map_err(|e| ServiceError::InternalError(e.to_string()))?;

        for node in &tree {
            write_rows(&mut writer, node)?;
        }

        let bytes = writer
            .into_inner()
            .map_err(|e| ServiceError::InternalError(e.to_string()))?;

        String::from_utf8(bytes).map_err(|e| ServiceError::InternalError(e.to_string()))
    }

    /// Differencer output for two versions of the same structure, as the
    /// `{added, removed, modified}` JSON document.
    #[instrument(skip(self))]
    pub async fn export_comparison(
        &self,
        version_a_id: i64,
        version_b_id: i64,
    ) -> Result<serde_json::Value, ServiceError> {
        let diff: VersionDiff = self.diff.diff_versions(version_a_id, version_b_id).await?;
        serde_json::to_value(diff).map_err(|e| ServiceError::InternalError(e.to_string()))
    }

    async fn load_current(
        &self,
        structure_id: i64,
    ) -> Result<
        (
            crate::entities::bill_of_material::Model,
            bom_version::Model,
        ),
        ServiceError,
    > {
        let db = self.db.as_ref();

        let structure = BillOfMaterialEntity::find_by_id(structure_id)
            .one(db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Structure {} not found", structure_id))
            })?;

        let version = BomVersionEntity::find()
            .filter(bom_version::Column::StructureId.eq(structure_id))
            .filter(bom_version::Column::IsCurrent.eq(true))
            .one(db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| {
                ServiceError::NotFound(format!(
                    "Structure {} has no current version",
                    structure_id
                ))
            })?;

        Ok((structure, version))
    }
}

fn write_rows(
    writer: &mut csv::Writer<Vec<u8>>,
    node: &VersionTreeNode,
) -> Result<(), ServiceError> {
    let indent = "  ".repeat(node.level.max(0) as usize);

    writer
        .write_record([
            node.level.to_string(),
            node.item_number.clone(),
            format!("{}{}", indent, node.name),
            node.quantity.to_string(),
            node.unit_of_measure.clone(),
            node.reference_designators.clone().unwrap_or_default(),
            node.notes.clone().unwrap_or_default(),
        ])
        .map_err(|e| ServiceError::InternalError(e.to_string()))?;

    for child in &node.children {
        write_rows(writer, child)?;
    }

    Ok(())
}
