//! BOM Engine Library
//!
//! Bill of materials versioning and hierarchy engine: multi-level product
//! structures, independently versioned, with recursive cost rollup,
//! structural diffing between versions, cycle-safe traversal across
//! structures that reference each other, and ingestion of externally
//! authored structures (delimited text, nested CAD-export JSON).
//!
//! Authentication, routing, scheduling and presentation are external
//! collaborators; they drive the engine through [`services`].
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod logging;
pub mod migrator;
pub mod services;

use sea_orm::DatabaseConnection;
use std::sync::Arc;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub event_sender: events::EventSender,
    pub services: services::AppServices,
}

impl AppState {
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: config::AppConfig,
        event_sender: events::EventSender,
    ) -> Self {
        let services =
            services::AppServices::build(db.clone(), &config, Arc::new(event_sender.clone()));

        Self {
            db,
            config,
            event_sender,
            services,
        }
    }

    pub fn structure_service(&self) -> Arc<services::structures::StructureService> {
        self.services.structures.clone()
    }

    pub fn version_service(&self) -> Arc<services::versions::VersionService> {
        self.services.versions.clone()
    }

    pub fn hierarchy_service(&self) -> Arc<services::hierarchy::HierarchyService> {
        self.services.hierarchy.clone()
    }

    pub fn rollup_service(&self) -> Arc<services::rollup::RollupService> {
        self.services.rollup.clone()
    }
}
