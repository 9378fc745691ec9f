use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // The fingerprint primary key is the dedup anchor: inserts race on it
        manager
            .create_table(
                Table::create()
                    .table(ContentRecords::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ContentRecords::Fingerprint)
                            .string_len(64)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ContentRecords::SourceName).string().not_null())
                    .col(ColumnDef::new(ContentRecords::RunId).uuid().not_null())
                    .col(ColumnDef::new(ContentRecords::Url).text().not_null())
                    .col(ColumnDef::new(ContentRecords::Title).text())
                    .col(ColumnDef::new(ContentRecords::Author).text())
                    .col(ColumnDef::new(ContentRecords::PublishedAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(ContentRecords::Metadata).json().not_null())
                    .col(ColumnDef::new(ContentRecords::PayloadKey).string().not_null())
                    .col(
                        ColumnDef::new(ContentRecords::PayloadPending)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(ContentRecords::ExtractedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ContentRecords::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_content_records_source")
                    .table(ContentRecords::Table)
                    .col(ContentRecords::SourceName)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_content_records_payload_pending")
                    .table(ContentRecords::Table)
                    .col(ContentRecords::PayloadPending)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ContentRecords::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ContentRecords {
    Table,
    Fingerprint,
    SourceName,
    RunId,
    Url,
    Title,
    Author,
    PublishedAt,
    Metadata,
    PayloadKey,
    PayloadPending,
    ExtractedAt,
    CreatedAt,
}
