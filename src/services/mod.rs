// Core engine services
pub mod structures;
pub mod versions;

// Read projections
pub mod diff;
pub mod exports;
pub mod hierarchy;
pub mod rollup;

// Catalog collaborator surface
pub mod catalog;

// Import adapters
pub mod imports;

use std::sync::Arc;

use crate::{config::AppConfig, db::DbPool, events::EventSender};

/// Bundle of engine services wired against one connection pool, for
/// callers (HTTP/gRPC controllers, CLIs) that want everything constructed
/// consistently from one configuration.
#[derive(Clone)]
pub struct AppServices {
    pub catalog: Arc<catalog::CatalogService>,
    pub structures: Arc<structures::StructureService>,
    pub versions: Arc<versions::VersionService>,
    pub hierarchy: Arc<hierarchy::HierarchyService>,
    pub rollup: Arc<rollup::RollupService>,
    pub diff: Arc<diff::DiffService>,
    pub exports: Arc<exports::ExportService>,
    pub delimited_import: Arc<imports::DelimitedImportService>,
    pub nested_json_import: Arc<imports::NestedJsonImportService>,
}

impl AppServices {
    pub fn build(db: Arc<DbPool>, config: &AppConfig, event_sender: Arc<EventSender>) -> Self {
        let catalog = Arc::new(catalog::CatalogService::new(db.clone()));
        let structures = Arc::new(structures::StructureService::new(
            db.clone(),
            event_sender.clone(),
        ));
        let versions = Arc::new(versions::VersionService::new(
            db.clone(),
            event_sender.clone(),
            config.sequence_gap,
        ));
        let hierarchy = Arc::new(hierarchy::HierarchyService::new(
            db.clone(),
            config.hierarchy.max_depth,
        ));
        let rollup = Arc::new(rollup::RollupService::new(db.clone()));
        let diff = Arc::new(diff::DiffService::new(db.clone()));
        let exports = Arc::new(exports::ExportService::new(
            db.clone(),
            hierarchy.clone(),
            diff.clone(),
        ));
        let delimited_import = Arc::new(imports::DelimitedImportService::new(
            db.clone(),
            event_sender.clone(),
            config.import.clone(),
            config.sequence_gap,
        ));
        let nested_json_import = Arc::new(imports::NestedJsonImportService::new(
            db,
            event_sender,
            config.import.clone(),
            config.sequence_gap,
        ));

        Self {
            catalog,
            structures,
            versions,
            hierarchy,
            rollup,
            diff,
            exports,
            delimited_import,
            nested_json_import,
        }
    }
}
