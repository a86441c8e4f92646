//! Cross-structure hierarchy walk: nested expansion through catalog item
//! recipes, cycle termination and the depth ceiling.

mod common;

use std::time::Instant;

use bom_engine::services::{
    hierarchy::{HierarchyNode, HierarchyService},
    structures::CreateStructureInput,
    versions::AddItemInput,
};
use rust_decimal_macros::dec;

async fn structure_with_root_item(
    engine: &common::TestEngine,
    number: &str,
    item_number: &str,
) -> (i64, i64) {
    let structure = engine
        .services
        .structures
        .create_structure(
            CreateStructureInput {
                number: number.to_string(),
                name: format!("{} assembly", number),
                description: None,
                external_reference: None,
                produced_item_id: None,
            },
            None,
        )
        .await
        .unwrap();

    let item = engine.seed_item(item_number, item_number, None).await;

    let version = engine
        .services
        .versions
        .create_version(structure.id, None, None)
        .await
        .unwrap();
    engine
        .services
        .versions
        .add_item(
            version.id,
            AddItemInput {
                catalog_item_id: item.item_id,
                parent_item_id: None,
                quantity: dec!(1),
                unit_of_measure: "EA".to_string(),
                reference_designators: None,
                notes: None,
            },
        )
        .await
        .unwrap();
    engine
        .services
        .versions
        .set_current_version(structure.id, version.id)
        .await
        .unwrap();

    (structure.id, item.item_id)
}

fn count_nodes(node: &HierarchyNode) -> usize {
    1 + node.children.iter().map(count_nodes).sum::<usize>()
}

fn max_level(node: &HierarchyNode) -> i32 {
    node.children
        .iter()
        .map(max_level)
        .max()
        .unwrap_or(node.level)
}

#[tokio::test]
async fn single_structure_hierarchy_lists_version_tree() {
    let engine = common::setup().await;
    let (structure_id, _) = structure_with_root_item(&engine, "HX-1", "PART-1").await;

    let hierarchy = engine
        .services
        .hierarchy
        .build_hierarchy(structure_id)
        .await
        .unwrap();

    assert_eq!(hierarchy.id, structure_id);
    assert_eq!(hierarchy.level, 0);
    assert_eq!(hierarchy.children.len(), 1);
    assert_eq!(hierarchy.children[0].number, "PART-1");
    assert_eq!(hierarchy.children[0].level, 1);
}

#[tokio::test]
async fn item_with_own_structure_expands_two_levels_down() {
    let engine = common::setup().await;
    let (outer, outer_item) = structure_with_root_item(&engine, "HX-2", "SUB-ASSY").await;
    let (inner, _) = structure_with_root_item(&engine, "HX-3", "INNER-PART").await;

    engine
        .services
        .catalog
        .assign_current_structure(outer_item, inner)
        .await
        .unwrap();

    let hierarchy = engine
        .services
        .hierarchy
        .build_hierarchy(outer)
        .await
        .unwrap();

    // item node at level 1, the nested structure's root at level 2, its
    // items at level 3
    let item_node = &hierarchy.children[0];
    assert_eq!(item_node.number, "SUB-ASSY");
    assert_eq!(item_node.level, 1);

    let nested = item_node
        .children
        .iter()
        .find(|child| child.id == inner)
        .expect("nested structure expanded");
    assert_eq!(nested.level, 2);
    assert_eq!(nested.children[0].number, "INNER-PART");
    assert_eq!(nested.children[0].level, 3);
}

#[tokio::test]
async fn two_cycle_terminates_without_infinite_branch() {
    let engine = common::setup().await;
    let (structure_x, item_x) = structure_with_root_item(&engine, "HX-4", "CYCLIC").await;

    // the structure's own root item names the structure as its recipe
    engine
        .services
        .catalog
        .assign_current_structure(item_x, structure_x)
        .await
        .unwrap();

    let started = Instant::now();
    let hierarchy = engine
        .services
        .hierarchy
        .build_hierarchy(structure_x)
        .await
        .unwrap();

    // the walk terminates promptly and the revisited structure contributes
    // no further children
    assert!(started.elapsed().as_secs() < 5);
    assert!(count_nodes(&hierarchy) <= 3);
    assert_eq!(hierarchy.children[0].children.len(), 0);
}

#[tokio::test]
async fn mutual_cycle_between_two_structures_terminates() {
    let engine = common::setup().await;
    let (structure_a, item_a) = structure_with_root_item(&engine, "HX-5", "LEFT").await;
    let (structure_b, item_b) = structure_with_root_item(&engine, "HX-6", "RIGHT").await;

    engine
        .services
        .catalog
        .assign_current_structure(item_a, structure_b)
        .await
        .unwrap();
    engine
        .services
        .catalog
        .assign_current_structure(item_b, structure_a)
        .await
        .unwrap();

    let hierarchy = engine
        .services
        .hierarchy
        .build_hierarchy(structure_a)
        .await
        .unwrap();

    // A expands B once; B's attempt to re-expand A stops at the visited set
    assert!(count_nodes(&hierarchy) <= 5);
    assert!(max_level(&hierarchy) <= 4);
}

#[tokio::test]
async fn depth_ceiling_bounds_acyclic_chains() {
    let engine = common::setup().await;

    // chain of distinct structures, each naming the next as its item's
    // recipe; far longer than the ceiling
    let mut structures = Vec::new();
    for pos in 0..8 {
        let pair =
            structure_with_root_item(&engine, &format!("HX-C{}", pos), &format!("CHAIN-{}", pos))
                .await;
        structures.push(pair);
    }
    for window in structures.windows(2) {
        let (_, item) = window[0];
        let (next_structure, _) = window[1];
        engine
            .services
            .catalog
            .assign_current_structure(item, next_structure)
            .await
            .unwrap();
    }

    let walker = HierarchyService::new(engine.db.clone(), 4);
    let hierarchy = walker.build_hierarchy(structures[0].0).await.unwrap();

    // nothing deeper than the ceiling ever materializes
    assert!(max_level(&hierarchy) < 4);
}
