use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Current-state projection of every run
        manager
            .create_table(
                Table::create()
                    .table(Runs::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Runs::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Runs::BatchId).uuid().not_null())
                    .col(ColumnDef::new(Runs::SourceName).string().not_null())
                    .col(ColumnDef::new(Runs::State).string().not_null())
                    .col(ColumnDef::new(Runs::Outcome).string())
                    .col(ColumnDef::new(Runs::AttemptCount).integer().not_null().default(0))
                    .col(ColumnDef::new(Runs::MaxAttempts).integer().not_null().default(3))
                    .col(ColumnDef::new(Runs::ErrorDetail).text())
                    .col(
                        ColumnDef::new(Runs::NeedsRepair)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Runs::RequestedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Runs::StartedAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(Runs::EndedAt).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(Runs::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_runs_source_requested")
                    .table(Runs::Table)
                    .col(Runs::SourceName)
                    .col(Runs::RequestedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_runs_state_updated")
                    .table(Runs::Table)
                    .col(Runs::State)
                    .col(Runs::UpdatedAt)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Runs::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Runs {
    Table,
    Id,
    BatchId,
    SourceName,
    State,
    Outcome,
    AttemptCount,
    MaxAttempts,
    ErrorDetail,
    NeedsRepair,
    RequestedAt,
    StartedAt,
    EndedAt,
    UpdatedAt,
}
