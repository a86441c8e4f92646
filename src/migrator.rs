use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![Box::new(m20250301_000001_create_bom_tables::Migration)]
    }
}

// Migration implementations

mod m20250301_000001_create_bom_tables {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250301_000001_create_bom_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            // Catalog items, aligned with entities::catalog_item
            manager
                .create_table(
                    Table::create()
                        .table(CatalogItems::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(CatalogItems::ItemId)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(CatalogItems::ItemNumber)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(CatalogItems::Name).string().not_null())
                        .col(ColumnDef::new(CatalogItems::Description).string().null())
                        .col(
                            ColumnDef::new(CatalogItems::UnitCost)
                                .decimal_len(19, 4)
                                .null(),
                        )
                        .col(ColumnDef::new(CatalogItems::UnitOfMeasure).string().null())
                        .col(
                            ColumnDef::new(CatalogItems::CanBeManufactured)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(CatalogItems::CurrentStructureId)
                                .big_integer()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(CatalogItems::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(CatalogItems::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(CatalogItems::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(BillOfMaterials::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(BillOfMaterials::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(BillOfMaterials::Number)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(BillOfMaterials::Name).string().not_null())
                        .col(ColumnDef::new(BillOfMaterials::Description).string().null())
                        .col(
                            ColumnDef::new(BillOfMaterials::ExternalReference)
                                .string()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(BillOfMaterials::ProducedItemId)
                                .big_integer()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(BillOfMaterials::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(ColumnDef::new(BillOfMaterials::CreatedBy).uuid().null())
                        .col(
                            ColumnDef::new(BillOfMaterials::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(BillOfMaterials::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(BomVersions::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(BomVersions::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(BomVersions::StructureId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(BomVersions::VersionNumber)
                                .integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(BomVersions::RevisionNote).string().null())
                        .col(
                            ColumnDef::new(BomVersions::IsCurrent)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(BomVersions::PublishedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(ColumnDef::new(BomVersions::PublishedBy).uuid().null())
                        .col(
                            ColumnDef::new(BomVersions::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(BomVersions::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_bom_versions_structure")
                                .from(BomVersions::Table, BomVersions::StructureId)
                                .to(BillOfMaterials::Table, BillOfMaterials::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_bom_versions_structure_number")
                        .table(BomVersions::Table)
                        .col(BomVersions::StructureId)
                        .col(BomVersions::VersionNumber)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(BomItems::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(BomItems::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(BomItems::VersionId).big_integer().not_null())
                        .col(ColumnDef::new(BomItems::ParentItemId).big_integer().null())
                        .col(
                            ColumnDef::new(BomItems::CatalogItemId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(BomItems::Quantity)
                                .decimal_len(19, 4)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(BomItems::UnitOfMeasure)
                                .string()
                                .not_null(),
                        )
                        .col(ColumnDef::new(BomItems::Level).integer().not_null())
                        .col(
                            ColumnDef::new(BomItems::SequenceNumber)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(BomItems::ReferenceDesignators)
                                .string()
                                .null(),
                        )
                        .col(ColumnDef::new(BomItems::Notes).string().null())
                        .col(
                            ColumnDef::new(BomItems::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(BomItems::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_bom_items_version")
                                .from(BomItems::Table, BomItems::VersionId)
                                .to(BomVersions::Table, BomVersions::Id),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_bom_items_catalog_item")
                                .from(BomItems::Table, BomItems::CatalogItemId)
                                .to(CatalogItems::Table, CatalogItems::ItemId),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_bom_items_version_id")
                        .table(BomItems::Table)
                        .col(BomItems::VersionId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_bom_items_parent_item_id")
                        .table(BomItems::Table)
                        .col(BomItems::ParentItemId)
                        .to_owned(),
                )
                .await?;

            Ok(())
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(BomItems::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(BomVersions::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(BillOfMaterials::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(CatalogItems::Table).to_owned())
                .await?;
            Ok(())
        }
    }

    #[derive(Iden)]
    enum CatalogItems {
        Table,
        ItemId,
        ItemNumber,
        Name,
        Description,
        UnitCost,
        UnitOfMeasure,
        CanBeManufactured,
        CurrentStructureId,
        IsActive,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(Iden)]
    enum BillOfMaterials {
        Table,
        Id,
        Number,
        Name,
        Description,
        ExternalReference,
        ProducedItemId,
        IsActive,
        CreatedBy,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(Iden)]
    enum BomVersions {
        Table,
        Id,
        StructureId,
        VersionNumber,
        RevisionNote,
        IsCurrent,
        PublishedAt,
        PublishedBy,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(Iden)]
    enum BomItems {
        Table,
        Id,
        VersionId,
        ParentItemId,
        CatalogItemId,
        Quantity,
        UnitOfMeasure,
        Level,
        SequenceNumber,
        ReferenceDesignators,
        Notes,
        CreatedAt,
        UpdatedAt,
    }
}
