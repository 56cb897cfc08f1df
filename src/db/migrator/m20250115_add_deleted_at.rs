use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        if !manager.has_column("properties", "deleted_at").await? {
            manager
                .alter_table(
                    Table::alter()
                        .table(Properties::Table)
                        .add_column(ColumnDef::new(Properties::DeletedAt).string().null())
                        .to_owned(),
                )
                .await?;
        }

        // Every read filters on it.
        manager
            .create_index(
                Index::create()
                    .name("idx_properties_deleted_at")
                    .table(Properties::Table)
                    .col(Properties::DeletedAt)
                    .if_not_exists()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let conn = manager.get_connection();
        conn.execute_unprepared("DROP INDEX IF EXISTS idx_properties_deleted_at")
            .await?;
        conn.execute_unprepared("ALTER TABLE properties DROP COLUMN deleted_at")
            .await?;
        Ok(())
    }
}

#[derive(Iden)]
enum Properties {
    Table,
    DeletedAt,
}
