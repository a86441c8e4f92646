use async_trait::async_trait;
use rust_decimal::Decimal;
use sea_orm::TransactionTrait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::{
    config::ImportConfig,
    db::DbPool,
    errors::{ImportError, ServiceError},
    events::{Event, EventSender},
    services::imports::{
        persist_import, ImportAdapter, ImportOutcome, ImportStructureInput, PendingNode,
    },
};

/// CAD/engineering-tool export document: a named structure with nested
/// item arrays.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NestedBomDocument {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_reference: Option<String>,
    #[serde(default)]
    pub items: Vec<NestedBomEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NestedBomEntry {
    pub item_number: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub quantity: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_of_measure: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_designators: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NestedBomEntry>,
}

/// Imports a nested-JSON export by flattening the `children` arrays into a
/// tree node set: `level` from recursion depth, `sequence_number` 10, 20, …
/// per children array, catalog items upserted by item number.
#[derive(Clone)]
pub struct NestedJsonImportService {
    db: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    import_config: ImportConfig,
    sequence_gap: i32,
}

impl NestedJsonImportService {
    pub fn new(
        db: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        import_config: ImportConfig,
        sequence_gap: i32,
    ) -> Self {
        Self {
            db,
            event_sender,
            import_config,
            sequence_gap,
        }
    }

    /// Parses a raw JSON payload and imports it.
    pub async fn import_json_bytes(
        &self,
        data: &[u8],
        actor: Option<Uuid>,
    ) -> Result<ImportOutcome, ServiceError> {
        let document: NestedBomDocument =
            serde_json::from_slice(data).map_err(ImportError::from)?;
        self.import_document(document, actor).await
    }

    #[instrument(skip(self, document), fields(structure_name = %document.name))]
    pub async fn import_document(
        &self,
        document: NestedBomDocument,
        actor: Option<Uuid>,
    ) -> Result<ImportOutcome, ServiceError> {
        let header = ImportStructureInput {
            number: document
                .number
                .clone()
                .unwrap_or_else(|| format!("BOM-{}", Uuid::new_v4().simple())),
            name: document.name.clone(),
            description: None,
            external_reference: document.external_reference.clone(),
        };
        header.validate()?;

        let nodes = flatten_document(&document, self.sequence_gap)?;

        if nodes.is_empty() {
            return Err(ImportError::EmptyDocument.into());
        }
        if nodes.len() > self.import_config.max_nodes {
            return Err(ImportError::TooManyNodes {
                count: nodes.len(),
                max: self.import_config.max_nodes,
            }
            .into());
        }

        let mut warnings = Vec::new();
        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;

        let (structure_id, version_id) = persist_import(
            &txn,
            &header,
            actor,
            &nodes,
            self.import_config.allow_item_autocreate,
            &mut warnings,
        )
        .await?;

        txn.commit().await.map_err(ServiceError::db_error)?;

        info!(
            "Nested JSON import complete: structure_id={}, nodes={}",
            structure_id,
            nodes.len()
        );

        self.event_sender
            .send_or_log(Event::StructureImported {
                structure_id,
                version_id,
                node_count: nodes.len(),
            })
            .await;

        Ok(ImportOutcome {
            structure_id,
            version_id,
            node_count: nodes.len(),
            warnings,
        })
    }
}

#[async_trait]
impl ImportAdapter for NestedJsonImportService {
    type Source = NestedBomDocument;

    async fn import(
        &self,
        source: NestedBomDocument,
        actor: Option<Uuid>,
    ) -> Result<ImportOutcome, ServiceError> {
        self.import_document(source, actor).await
    }
}

/// Depth-first flatten of the nested document. Position is the 1-based
/// pre-order ordinal, used as row context in errors and warnings.
fn flatten_document(
    document: &NestedBomDocument,
    sequence_gap: i32,
) -> Result<Vec<PendingNode>, ImportError> {
    let mut nodes = Vec::new();
    let mut position = 0usize;

    flatten_entries(
        &document.items,
        None,
        0,
        sequence_gap,
        &mut nodes,
        &mut position,
    )?;

    Ok(nodes)
}

fn flatten_entries(
    entries: &[NestedBomEntry],
    parent: Option<usize>,
    level: i32,
    sequence_gap: i32,
    nodes: &mut Vec<PendingNode>,
    position: &mut usize,
) -> Result<(), ImportError> {
    for (sibling, entry) in entries.iter().enumerate() {
        *position += 1;
        let row = *position;

        if entry.item_number.trim().is_empty() {
            return Err(ImportError::MissingValue {
                row,
                field: "item_number",
            });
        }
        if entry.quantity <= Decimal::ZERO {
            return Err(ImportError::NonPositiveQuantity { row });
        }

        let index = nodes.len();
        nodes.push(PendingNode {
            row,
            item_number: entry.item_number.trim().to_string(),
            item_name: entry.name.clone(),
            quantity: entry.quantity,
            unit_of_measure: entry.unit_of_measure.clone(),
            level,
            parent,
            sequence_number: (sibling as i32 + 1) * sequence_gap,
            reference_designators: entry.reference_designators.clone(),
            notes: entry.notes.clone(),
        });

        flatten_entries(
            &entry.children,
            Some(index),
            level + 1,
            sequence_gap,
            nodes,
            position,
        )?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;

    fn entry(item_number: &str, quantity: Decimal, children: Vec<NestedBomEntry>) -> NestedBomEntry {
        NestedBomEntry {
            item_number: item_number.to_string(),
            name: None,
            quantity,
            unit_of_measure: None,
            reference_designators: None,
            notes: None,
            children,
        }
    }

    #[test]
    fn flattens_children_by_depth_with_gapped_sequences() {
        let document = NestedBomDocument {
            name: "X".to_string(),
            number: None,
            external_reference: None,
            items: vec![entry(
                "A",
                dec!(1),
                vec![entry("B", dec!(2), vec![]), entry("C", dec!(1), vec![])],
            )],
        };

        let nodes = flatten_document(&document, 10).unwrap();

        assert_eq!(nodes.len(), 3);
        assert_eq!(nodes[0].item_number, "A");
        assert_eq!(nodes[0].level, 0);
        assert_eq!(nodes[0].sequence_number, 10);
        assert_eq!(nodes[1].item_number, "B");
        assert_eq!(nodes[1].level, 1);
        assert_eq!(nodes[1].parent, Some(0));
        assert_eq!(nodes[1].sequence_number, 10);
        assert_eq!(nodes[2].sequence_number, 20);
    }

    #[test]
    fn document_parses_from_plain_json() {
        let raw = r#"{"name":"X","items":[{"item_number":"A","quantity":1,"children":[{"item_number":"B","quantity":2}]}]}"#;
        let document: NestedBomDocument = serde_json::from_str(raw).unwrap();

        let nodes = flatten_document(&document, 10).unwrap();

        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0].level, 0);
        assert_eq!(nodes[1].level, 1);
        assert_eq!(nodes[1].parent, Some(0));
    }

    #[test]
    fn zero_quantity_cites_preorder_position() {
        let document = NestedBomDocument {
            name: "X".to_string(),
            number: None,
            external_reference: None,
            items: vec![entry("A", dec!(1), vec![entry("B", dec!(0), vec![])])],
        };

        let err = flatten_document(&document, 10).unwrap_err();
        assert_matches!(err, ImportError::NonPositiveQuantity { row: 2 });
    }
}
