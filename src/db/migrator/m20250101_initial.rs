use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Properties::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Properties::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Properties::Source).string().not_null())
                    .col(ColumnDef::new(Properties::Link).string().not_null())
                    .col(ColumnDef::new(Properties::Code).string().not_null().default(""))
                    .col(ColumnDef::new(Properties::Title).string().not_null().default(""))
                    .col(ColumnDef::new(Properties::Description).text().not_null().default(""))
                    .col(ColumnDef::new(Properties::Location).string().not_null().default(""))
                    .col(ColumnDef::new(Properties::Price).big_integer().null())
                    .col(ColumnDef::new(Properties::Area).integer().null())
                    .col(ColumnDef::new(Properties::Bedrooms).integer().null())
                    .col(ColumnDef::new(Properties::Bathrooms).integer().null())
                    .col(ColumnDef::new(Properties::Parking).integer().null())
                    .col(ColumnDef::new(Properties::Estrato).integer().null())
                    .col(ColumnDef::new(Properties::Images).text().not_null().default("[]"))
                    .col(ColumnDef::new(Properties::ImageUrl).string().null())
                    .col(ColumnDef::new(Properties::Latitude).double().null())
                    .col(ColumnDef::new(Properties::Longitude).double().null())
                    .col(ColumnDef::new(Properties::CreatedAt).string().not_null())
                    .col(ColumnDef::new(Properties::UpdatedAt).string().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_properties_source_link")
                    .table(Properties::Table)
                    .col(Properties::Source)
                    .col(Properties::Link)
                    .unique()
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_properties_location")
                    .table(Properties::Table)
                    .col(Properties::Location)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ScrapeRuns::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ScrapeRuns::Source)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ScrapeRuns::LastRunAt).string().not_null())
                    .col(
                        ColumnDef::new(ScrapeRuns::LastResultSummary)
                            .text()
                            .not_null()
                            .default("{}"),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ScrapeRuns::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Properties::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum Properties {
    Table,
    Id,
    Source,
    Link,
    Code,
    Title,
    Description,
    Location,
    Price,
    Area,
    Bedrooms,
    Bathrooms,
    Parking,
    Estrato,
    Images,
    ImageUrl,
    Latitude,
    Longitude,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum ScrapeRuns {
    Table,
    Source,
    LastRunAt,
    LastResultSummary,
}
