use std::sync::Arc;

use bom_engine::{
    config::{AppConfig, HierarchyConfig, ImportConfig},
    db::DbPool,
    entities::catalog_item,
    events::{self, Event},
    migrator::Migrator,
    services::{catalog::CreateCatalogItemInput, AppServices},
};
use rust_decimal::Decimal;
use sea_orm::{ConnectOptions, Database};
use sea_orm_migration::MigratorTrait;
use tokio::sync::mpsc;

/// Helper harness for spinning up the engine against an in-memory SQLite
/// database with the schema migrated.
pub struct TestEngine {
    pub db: Arc<DbPool>,
    pub services: AppServices,
    // keep the receiving side alive so post-commit events are not dropped
    #[allow(dead_code)]
    pub events: mpsc::Receiver<Event>,
}

pub fn test_config() -> AppConfig {
    AppConfig {
        database_url: "sqlite::memory:".to_string(),
        database_max_connections: 1,
        log_level: "info".to_string(),
        environment: "test".to_string(),
        sequence_gap: 10,
        event_buffer: 64,
        import: ImportConfig::default(),
        hierarchy: HierarchyConfig::default(),
    }
}

pub async fn setup() -> TestEngine {
    // a single pooled connection keeps every query on the same in-memory db
    let mut options = ConnectOptions::new("sqlite::memory:".to_string());
    options.max_connections(1).sqlx_logging(false);

    let db = Database::connect(options)
        .await
        .expect("connect to in-memory sqlite");

    Migrator::up(&db, None).await.expect("run migrations");

    let db = Arc::new(db);
    let (sender, receiver) = events::channel(64);
    let services = AppServices::build(db.clone(), &test_config(), Arc::new(sender));

    TestEngine {
        db,
        services,
        events: receiver,
    }
}

impl TestEngine {
    /// Seeds a catalog item and returns its row.
    pub async fn seed_item(
        &self,
        number: &str,
        name: &str,
        unit_cost: Option<Decimal>,
    ) -> catalog_item::Model {
        self.services
            .catalog
            .create_item(CreateCatalogItemInput {
                item_number: number.to_string(),
                name: name.to_string(),
                description: None,
                unit_cost,
                unit_of_measure: Some("EA".to_string()),
                can_be_manufactured: false,
            })
            .await
            .expect("seed catalog item")
    }
}
