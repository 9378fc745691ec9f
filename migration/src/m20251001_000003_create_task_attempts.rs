use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(TaskAttempts::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(TaskAttempts::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(TaskAttempts::RunId).uuid().not_null())
                    .col(ColumnDef::new(TaskAttempts::Attempt).integer().not_null())
                    .col(
                        ColumnDef::new(TaskAttempts::StartedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(TaskAttempts::EndedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(TaskAttempts::Outcome).string().not_null())
                    .col(ColumnDef::new(TaskAttempts::FailureClass).string())
                    .col(ColumnDef::new(TaskAttempts::RetryCause).text())
                    .col(
                        ColumnDef::new(TaskAttempts::UnitsStored)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(TaskAttempts::UnitsDuplicate)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(TaskAttempts::UnitsPending)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(TaskAttempts::UnitsFailed)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_task_attempts_run_id")
                    .table(TaskAttempts::Table)
                    .col(TaskAttempts::RunId)
                    .col(TaskAttempts::Attempt)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(TaskAttempts::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum TaskAttempts {
    Table,
    Id,
    RunId,
    Attempt,
    StartedAt,
    EndedAt,
    Outcome,
    FailureClass,
    RetryCause,
    UnitsStored,
    UnitsDuplicate,
    UnitsPending,
    UnitsFailed,
}
