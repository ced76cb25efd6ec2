use crate::{assert_not_has_tables, drop_tables};
use sea_orm::DbBackend;
use sea_orm_migration::prelude::{Index as MigrationIndex, Table as MigrationTable, *};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        assert_not_has_tables!(manager, MaterializedView, Collection);

        if manager.get_database_backend() == DbBackend::Sqlite {
            manager
                .get_connection()
                .execute_unprepared("PRAGMA journal_mode = WAL")
                .await?;
        }

        manager
            .create_table(
                MigrationTable::create()
                    .table(MaterializedView::Table)
                    .col(ColumnDef::new(MaterializedView::Project).string().not_null())
                    .col(ColumnDef::new(MaterializedView::Name).string().not_null())
                    .col(
                        ColumnDef::new(MaterializedView::TableName)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(MaterializedView::Query).text().not_null())
                    .col(
                        ColumnDef::new(MaterializedView::UpdateIntervalMillis)
                            .big_integer()
                            .null()
                            .check(Expr::col(MaterializedView::UpdateIntervalMillis).gte(0)),
                    )
                    .col(
                        ColumnDef::new(MaterializedView::LastUpdate)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .primary_key(
                        MigrationIndex::create()
                            .col(MaterializedView::Project)
                            .col(MaterializedView::Name),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                MigrationIndex::create()
                    .name("idx_materialized_view_table")
                    .table(MaterializedView::Table)
                    .col(MaterializedView::Project)
                    .col(MaterializedView::TableName)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                MigrationTable::create()
                    .table(Collection::Table)
                    .col(ColumnDef::new(Collection::Project).string().not_null())
                    .col(ColumnDef::new(Collection::Name).string().not_null())
                    .primary_key(
                        MigrationIndex::create()
                            .col(Collection::Project)
                            .col(Collection::Name),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        drop_tables!(manager, MaterializedView, Collection);
        Ok(())
    }
}

#[derive(DeriveIden)]
enum MaterializedView {
    Table,
    Project,
    Name,
    TableName,
    Query,
    UpdateIntervalMillis,
    LastUpdate,
}

#[derive(DeriveIden)]
enum Collection {
    Table,
    Project,
    Name,
}
