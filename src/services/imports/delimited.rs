use async_trait::async_trait;
use csv::{ReaderBuilder, Trim};
use rust_decimal::Decimal;
use sea_orm::TransactionTrait;
use std::collections::HashMap;
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

/// Column mapping from the caller's delimited source onto engine fields.
/// Values are source column names as they appear in the header row;
/// `item_number`, `name`, `quantity` and `unit_of_measure` must be mapped,
/// the rest are optional.
#[derive(Debug, Clone, Validate)]
pub struct FieldMapping {
    #[validate(length(min = 1))]
    pub item_number: String,
    #[validate(length(min = 1))]
    pub name: String,
    #[validate(length(min = 1))]
    pub quantity: String,
    #[validate(length(min = 1))]
    pub unit_of_measure: String,
    pub level: Option<String>,
    pub parent: Option<String>,
    pub reference_designators: Option<String>,
    pub notes: Option<String>,
}

/// One delimited-text import call
#[derive(Debug, Clone)]
pub struct DelimitedImportRequest {
    pub structure: ImportStructureInput,
    pub mapping: FieldMapping,
    pub delimiter: u8,
    pub data: Vec<u8>,
}

impl DelimitedImportRequest {
    pub fn new(structure: ImportStructureInput, mapping: FieldMapping, data: Vec<u8>) -> Self {
        Self {
            structure,
            mapping,
            delimiter: b',',
            data,
        }
    }
}

/// Imports delimited rows with a configurable column mapping. Parent
/// linkage comes from an explicit parent-reference column when mapped, or
/// is inferred from a `level` column (nearest preceding row one level up);
/// rows whose level is inconsistent with the resolved parent depth are
/// rejected with their row index.
#[derive(Clone)]
pub struct DelimitedImportService {
    db: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    import_config: ImportConfig,
    sequence_gap: i32,
}

impl DelimitedImportService {
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

    #[instrument(skip(self, request), fields(structure_number = %request.structure.number))]
    pub async fn import_delimited(
        &self,
        request: DelimitedImportRequest,
        actor: Option<Uuid>,
    ) -> Result<ImportOutcome, ServiceError> {
        request.structure.validate()?;
        request.mapping.validate()?;

        let mut warnings = Vec::new();
        let nodes = parse_rows(
            &request.mapping,
            request.delimiter,
            &request.data,
            self.sequence_gap,
            &mut warnings,
        )?;

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

        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;

        let (structure_id, version_id) = persist_import(
            &txn,
            &request.structure,
            actor,
            &nodes,
            self.import_config.allow_item_autocreate,
            &mut warnings,
        )
        .await?;

        txn.commit().await.map_err(ServiceError::db_error)?;

        info!(
            "Delimited import complete: structure_id={}, nodes={}",
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
impl ImportAdapter for DelimitedImportService {
    type Source = DelimitedImportRequest;

    async fn import(
        &self,
        source: DelimitedImportRequest,
        actor: Option<Uuid>,
    ) -> Result<ImportOutcome, ServiceError> {
        self.import_delimited(source, actor).await
    }
}

struct ColumnIndex {
    item_number: usize,
    name: usize,
    quantity: usize,
    unit_of_measure: usize,
    level: Option<usize>,
    parent: Option<usize>,
    reference_designators: Option<usize>,
    notes: Option<usize>,
}

fn resolve_column(
    header: &HashMap<String, usize>,
    field: &'static str,
    column: &str,
) -> Result<usize, ImportError> {
    header
        .get(column)
        .copied()
        .ok_or_else(|| ImportError::MissingColumn {
            field,
            column: column.to_string(),
        })
}

fn resolve_optional(
    header: &HashMap<String, usize>,
    field: &'static str,
    column: Option<&String>,
) -> Result<Option<usize>, ImportError> {
    column
        .map(|name| resolve_column(header, field, name))
        .transpose()
}

/// Parses the delimited source into a validated pending node list. Pure
/// over its input; nothing touches the database until every row has been
/// accepted.
fn parse_rows(
    mapping: &FieldMapping,
    delimiter: u8,
    data: &[u8],
    sequence_gap: i32,
    warnings: &mut Vec<String>,
) -> Result<Vec<PendingNode>, ImportError> {
    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .trim(Trim::All)
        .flexible(true)
        .from_reader(data);

    let header: HashMap<String, usize> = reader
        .headers()?
        .iter()
        .enumerate()
        .map(|(pos, name)| (name.trim().to_string(), pos))
        .collect();

    let columns = ColumnIndex {
        item_number: resolve_column(&header, "item_number", &mapping.item_number)?,
        name: resolve_column(&header, "name", &mapping.name)?,
        quantity: resolve_column(&header, "quantity", &mapping.quantity)?,
        unit_of_measure: resolve_column(&header, "unit_of_measure", &mapping.unit_of_measure)?,
        level: resolve_optional(&header, "level", mapping.level.as_ref())?,
        parent: resolve_optional(&header, "parent", mapping.parent.as_ref())?,
        reference_designators: resolve_optional(
            &header,
            "reference_designators",
            mapping.reference_designators.as_ref(),
        )?,
        notes: resolve_optional(&header, "notes", mapping.notes.as_ref())?,
    };

    let mut nodes: Vec<PendingNode> = Vec::new();
    // item number -> pending index, latest occurrence wins
    let mut by_number: HashMap<String, usize> = HashMap::new();
    // ancestor path for level inference, indices into `nodes`
    let mut stack: Vec<usize> = Vec::new();
    // next sequence per parent
    let mut sequences: HashMap<Option<usize>, i32> = HashMap::new();

    for (pos, record) in reader.records().enumerate() {
        let row = pos + 1;
        let record = record?;

        let value = |idx: usize| record.get(idx).unwrap_or("").trim().to_string();
        let optional = |idx: Option<usize>| {
            idx.map(|i| value(i)).filter(|v| !v.is_empty())
        };

        let item_number = value(columns.item_number);
        let name = value(columns.name);
        let quantity_raw = value(columns.quantity);
        let uom = value(columns.unit_of_measure);

        if item_number.is_empty() && name.is_empty() && quantity_raw.is_empty() {
            warnings.push(format!("row {}: blank row skipped", row));
            continue;
        }

        if item_number.is_empty() {
            return Err(ImportError::MissingValue {
                row,
                field: "item_number",
            });
        }
        if quantity_raw.is_empty() {
            return Err(ImportError::MissingValue {
                row,
                field: "quantity",
            });
        }

        let quantity: Decimal = quantity_raw
            .parse()
            .map_err(|_| ImportError::InvalidQuantity {
                row,
                value: quantity_raw.clone(),
            })?;
        if quantity <= Decimal::ZERO {
            return Err(ImportError::NonPositiveQuantity { row });
        }

        let declared_level = match optional(columns.level) {
            Some(raw) => Some(raw.parse::<i32>().map_err(|_| ImportError::InvalidLevel {
                row,
                value: raw.clone(),
            })?),
            None => None,
        };
        if let Some(level) = declared_level {
            if level < 0 {
                return Err(ImportError::InvalidLevel {
                    row,
                    value: level.to_string(),
                });
            }
        }

        let parent_reference = optional(columns.parent);

        let (parent, level) = match (parent_reference, declared_level) {
            // Explicit parent wins; a declared level must agree with the
            // resolved parent's depth.
            (Some(reference), declared) => {
                let parent_pos = *by_number.get(&reference).ok_or_else(|| {
                    ImportError::UnknownParent {
                        row,
                        reference: reference.clone(),
                    }
                })?;
                let level = nodes[parent_pos].level + 1;
                if let Some(declared) = declared {
                    if declared != level {
                        return Err(ImportError::LevelSequence {
                            row,
                            level: declared,
                        });
                    }
                }
                (Some(parent_pos), level)
            }
            // Level column only: parent is the nearest preceding row one
            // level up.
            (None, Some(level)) => {
                while let Some(&top) = stack.last() {
                    if nodes[top].level >= level {
                        stack.pop();
                    } else {
                        break;
                    }
                }

                if level == 0 {
                    (None, 0)
                } else {
                    match stack.last() {
                        Some(&top) if nodes[top].level == level - 1 => (Some(top), level),
                        _ => return Err(ImportError::LevelSequence { row, level }),
                    }
                }
            }
            // Neither mapped: a flat list of roots.
            (None, None) => (None, 0),
        };

        let sequence = sequences.entry(parent).or_insert(0);
        *sequence += sequence_gap;
        let sequence_number = *sequence;

        let node = PendingNode {
            row,
            item_number: item_number.clone(),
            item_name: if name.is_empty() { None } else { Some(name) },
            quantity,
            unit_of_measure: if uom.is_empty() { None } else { Some(uom) },
            level,
            parent,
            sequence_number,
            reference_designators: optional(columns.reference_designators),
            notes: optional(columns.notes),
        };

        let index = nodes.len();
        nodes.push(node);
        by_number.insert(item_number, index);

        // keep the ancestor path coherent for the next level-mode row
        while let Some(&top) = stack.last() {
            if nodes[top].level >= nodes[index].level {
                stack.pop();
            } else {
                break;
            }
        }
        stack.push(index);
    }

    Ok(nodes)
}
