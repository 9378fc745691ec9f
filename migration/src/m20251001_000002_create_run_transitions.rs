use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Append-only transition log, never updated
        manager
            .create_table(
                Table::create()
                    .table(RunTransitions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(RunTransitions::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(RunTransitions::RunId).uuid().not_null())
                    .col(ColumnDef::new(RunTransitions::FromState).string())
                    .col(ColumnDef::new(RunTransitions::ToState).string().not_null())
                    .col(
                        ColumnDef::new(RunTransitions::Attempt)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(RunTransitions::Detail).text())
                    .col(
                        ColumnDef::new(RunTransitions::At)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_run_transitions_run_id")
                    .table(RunTransitions::Table)
                    .col(RunTransitions::RunId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(RunTransitions::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum RunTransitions {
    Table,
    Id,
    RunId,
    FromState,
    ToState,
    Attempt,
    Detail,
    At,
}
