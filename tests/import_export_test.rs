//! Import adapters end to end: transactional ingestion of delimited text
//! and nested JSON, rollback on validation failure, and the export
//! surfaces over imported structures.

mod common;

use assert_matches::assert_matches;
use bom_engine::{
    entities::{bill_of_material, bom_version, catalog_item},
    errors::ServiceError,
    services::imports::{
        DelimitedImportRequest, FieldMapping, ImportStructureInput, NestedBomDocument,
    },
};
use rust_decimal_macros::dec;
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter};

fn mapping_with_level() -> FieldMapping {
    FieldMapping {
        item_number: "Part Number".to_string(),
        name: "Description".to_string(),
        quantity: "Qty".to_string(),
        unit_of_measure: "UOM".to_string(),
        level: Some("Level".to_string()),
        parent: None,
        reference_designators: Some("RefDes".to_string()),
        notes: None,
    }
}

fn header(number: &str, name: &str) -> ImportStructureInput {
    ImportStructureInput {
        number: number.to_string(),
        name: name.to_string(),
        description: None,
        external_reference: None,
    }
}

#[tokio::test]
async fn delimited_import_builds_structure_version_and_tree() {
    let engine = common::setup().await;

    let data = b"Part Number,Description,Qty,UOM,Level,RefDes\n\
        TOP-1,Top assembly,1,EA,0,\n\
        SUB-1,Sub assembly,2,EA,1,\n\
        RES-1,Resistor,4,EA,2,\"R1,R2,R3,R4\"\n\
        SUB-2,Second sub,1,EA,1,\n"
        .to_vec();

    let outcome = engine
        .services
        .delimited_import
        .import_delimited(
            DelimitedImportRequest::new(header("IMP-1", "Imported assembly"), mapping_with_level(), data),
            None,
        )
        .await
        .unwrap();

    assert_eq!(outcome.node_count, 4);
    // every item was implicitly created
    assert_eq!(outcome.warnings.len(), 4);

    // version 1 exists and is current
    let version = bom_version::Entity::find_by_id(outcome.version_id)
        .one(engine.db.as_ref())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(version.version_number, 1);
    assert!(version.is_current);

    let items = engine
        .services
        .versions
        .get_version_items(outcome.version_id)
        .await
        .unwrap();
    assert_eq!(items.len(), 4);

    let top = items.iter().find(|i| i.level == 0).unwrap();
    let subs: Vec<_> = items.iter().filter(|i| i.level == 1).collect();
    let leaf = items.iter().find(|i| i.level == 2).unwrap();

    assert_eq!(subs.len(), 2);
    assert!(subs.iter().all(|s| s.parent_item_id == Some(top.id)));
    assert_eq!(leaf.parent_item_id, Some(subs[0].id));
    assert_eq!(leaf.quantity, dec!(4));
    assert_eq!(leaf.reference_designators.as_deref(), Some("R1,R2,R3,R4"));

    // gap-increment sibling sequences
    assert_eq!(subs[0].sequence_number, 10);
    assert_eq!(subs[1].sequence_number, 20);
}

#[tokio::test]
async fn delimited_import_reuses_existing_catalog_items() {
    let engine = common::setup().await;
    let existing = engine.seed_item("KNOWN-1", "Known part", Some(dec!(2))).await;

    let data = b"Part Number,Description,Qty,UOM,Level\n\
        KNOWN-1,Known part,3,EA,0\n"
        .to_vec();

    let outcome = engine
        .services
        .delimited_import
        .import_delimited(
            DelimitedImportRequest::new(header("IMP-2", "Reuse"), mapping_with_level(), data),
            None,
        )
        .await
        .unwrap();

    assert!(outcome.warnings.is_empty());

    let items = engine
        .services
        .versions
        .get_version_items(outcome.version_id)
        .await
        .unwrap();
    assert_eq!(items[0].catalog_item_id, existing.item_id);

    let catalog_count = catalog_item::Entity::find()
        .count(engine.db.as_ref())
        .await
        .unwrap();
    assert_eq!(catalog_count, 1);
}

#[tokio::test]
async fn level_gap_rejects_whole_import() {
    let engine = common::setup().await;

    // rows 2-3 claim level 2 directly under a level-0 row
    let data = b"Part Number,Description,Qty,UOM,Level\n\
        TOP-1,Top assembly,1,EA,0\n\
        BAD-1,Orphan,1,EA,2\n\
        BAD-2,Orphan too,1,EA,2\n\
        SUB-1,Sub,1,EA,1\n\
        RES-1,Resistor,2,EA,2\n"
        .to_vec();

    let err = engine
        .services
        .delimited_import
        .import_delimited(
            DelimitedImportRequest::new(header("IMP-3", "Broken"), mapping_with_level(), data),
            None,
        )
        .await
        .unwrap_err();

    match err {
        ServiceError::ValidationError(message) => {
            assert!(message.contains("row 2"), "message was: {}", message);
        }
        other => panic!("expected validation error, got {:?}", other),
    }

    // nothing was written: no structure, no versions, no items
    let structures = bill_of_material::Entity::find()
        .filter(bill_of_material::Column::Number.eq("IMP-3"))
        .count(engine.db.as_ref())
        .await
        .unwrap();
    assert_eq!(structures, 0);

    let catalog_count = catalog_item::Entity::find()
        .count(engine.db.as_ref())
        .await
        .unwrap();
    assert_eq!(catalog_count, 0);
}

#[tokio::test]
async fn nested_json_import_flattens_children() {
    let engine = common::setup().await;

    let raw = r#"{"name":"X","items":[{"item_number":"A","quantity":1,"children":[{"item_number":"B","quantity":2}]}]}"#;

    let outcome = engine
        .services
        .nested_json_import
        .import_json_bytes(raw.as_bytes(), None)
        .await
        .unwrap();

    assert_eq!(outcome.node_count, 2);

    let items = engine
        .services
        .versions
        .get_version_items(outcome.version_id)
        .await
        .unwrap();

    let node_a = items.iter().find(|i| i.level == 0).unwrap();
    let node_b = items.iter().find(|i| i.level == 1).unwrap();

    assert_eq!(node_a.sequence_number, 10);
    assert_eq!(node_b.sequence_number, 10);
    assert_eq!(node_b.parent_item_id, Some(node_a.id));
    assert_eq!(node_b.quantity, dec!(2));

    // both items upserted into the catalog
    let numbers: Vec<String> = catalog_item::Entity::find()
        .all(engine.db.as_ref())
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.item_number)
        .collect();
    assert!(numbers.contains(&"A".to_string()));
    assert!(numbers.contains(&"B".to_string()));
}

#[tokio::test]
async fn nested_json_rolls_back_on_invalid_quantity() {
    let engine = common::setup().await;

    let document = NestedBomDocument {
        name: "Broken".to_string(),
        number: Some("IMP-4".to_string()),
        external_reference: None,
        items: vec![bom_engine::services::imports::NestedBomEntry {
            item_number: "A".to_string(),
            name: None,
            quantity: dec!(1),
            unit_of_measure: None,
            reference_designators: None,
            notes: None,
            children: vec![bom_engine::services::imports::NestedBomEntry {
                item_number: "B".to_string(),
                name: None,
                quantity: dec!(0),
                unit_of_measure: None,
                reference_designators: None,
                notes: None,
                children: vec![],
            }],
        }],
    };

    let err = engine
        .services
        .nested_json_import
        .import_document(document, None)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));

    let structures = bill_of_material::Entity::find()
        .count(engine.db.as_ref())
        .await
        .unwrap();
    assert_eq!(structures, 0);
}

#[tokio::test]
async fn import_rejects_duplicate_structure_number() {
    let engine = common::setup().await;

    let raw = r#"{"name":"X","number":"DUP-1","items":[{"item_number":"A","quantity":1}]}"#;

    engine
        .services
        .nested_json_import
        .import_json_bytes(raw.as_bytes(), None)
        .await
        .unwrap();

    let err = engine
        .services
        .nested_json_import
        .import_json_bytes(raw.as_bytes(), None)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));

    let versions = bom_version::Entity::find()
        .count(engine.db.as_ref())
        .await
        .unwrap();
    assert_eq!(versions, 1);
}

#[tokio::test]
async fn exports_mirror_the_imported_structure() {
    let engine = common::setup().await;

    let raw = r#"{"name":"Widget","number":"EXP-1","items":[{"item_number":"A","name":"Assembly","quantity":1,"unit_of_measure":"EA","children":[{"item_number":"B","name":"Bracket","quantity":2,"unit_of_measure":"EA"}]}]}"#;

    let outcome = engine
        .services
        .nested_json_import
        .import_json_bytes(raw.as_bytes(), None)
        .await
        .unwrap();

    let document = engine
        .services
        .exports
        .export_nested_json(outcome.structure_id)
        .await
        .unwrap();

    assert_eq!(document.number, "EXP-1");
    assert_eq!(document.version_number, 1);
    assert_eq!(document.items.len(), 1);
    assert_eq!(document.items[0].item_number, "A");
    assert_eq!(document.items[0].level, 0);
    assert_eq!(document.items[0].sequence_number, 10);
    assert_eq!(document.items[0].children.len(), 1);
    assert_eq!(document.items[0].children[0].item_number, "B");
    assert_eq!(document.items[0].children[0].level, 1);

    let table = engine
        .services
        .exports
        .export_delimited(outcome.structure_id)
        .await
        .unwrap();

    let lines: Vec<&str> = table.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("level,item_number,item_name"));
    // pre-order: parent before child, child indented two spaces per level
    assert!(lines[1].contains("A,Assembly"));
    assert!(lines[2].contains("B,  Bracket"));
}

#[tokio::test]
async fn comparison_export_serializes_diff() {
    let engine = common::setup().await;

    let raw_v1 = r#"{"name":"Cmp","number":"CMP-1","items":[{"item_number":"A","quantity":1}]}"#;
    let outcome = engine
        .services
        .nested_json_import
        .import_json_bytes(raw_v1.as_bytes(), None)
        .await
        .unwrap();

    let v2 = engine
        .services
        .versions
        .create_version(outcome.structure_id, None, None)
        .await
        .unwrap();
    let item_b = engine.seed_item("NEW-B", "New part", None).await;
    engine
        .services
        .versions
        .add_item(
            v2.id,
            bom_engine::services::versions::AddItemInput {
                catalog_item_id: item_b.item_id,
                parent_item_id: None,
                quantity: dec!(1),
                unit_of_measure: "EA".to_string(),
                reference_designators: None,
                notes: None,
            },
        )
        .await
        .unwrap();

    let comparison = engine
        .services
        .exports
        .export_comparison(outcome.version_id, v2.id)
        .await
        .unwrap();

    let added = comparison["added"].as_array().unwrap();
    let removed = comparison["removed"].as_array().unwrap();
    assert_eq!(added.len(), 1);
    assert_eq!(removed.len(), 1);
    assert_eq!(added[0]["catalog_item_id"], item_b.item_id);
}
