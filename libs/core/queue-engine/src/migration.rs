//! Schema for `processing_queue`.
//!
//! A single `sea_orm_migration` migration, following the same
//! `MigratorTrait` shape the teacher's domain migrations use (and that
//! `test_utils::TestDatabase` already expects), generalized so this
//! workspace no longer needs a separate `migration` crate full of
//! unrelated domain tables.
//!
//! Three of the four indexes are partial (`WHERE status = ...`): each
//! sweep or claim path only ever touches rows of one status, so the
//! index stays a sliver of the table instead of scanning it all. Partial
//! indexes aren't expressible through `sea_orm_migration`'s `Index`
//! builder, so they're issued as raw DDL via `execute_unprepared`.

use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![Box::new(m20240101_000001_create_processing_queue::Migration)]
    }
}

mod m20240101_000001_create_processing_queue {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(ProcessingQueue::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(ProcessingQueue::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(ProcessingQueue::FlowName).text().not_null())
                        .col(ColumnDef::new(ProcessingQueue::Payload).json_binary().not_null())
                        .col(
                            ColumnDef::new(ProcessingQueue::Status)
                                .text()
                                .not_null()
                                .default("pending"),
                        )
                        .col(ColumnDef::new(ProcessingQueue::FlowInstanceId).text().null())
                        .col(
                            ColumnDef::new(ProcessingQueue::RetryCount)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(ProcessingQueue::ErrorMessage).text().null())
                        .col(
                            ColumnDef::new(ProcessingQueue::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null()
                                .default(Expr::current_timestamp()),
                        )
                        .col(ColumnDef::new(ProcessingQueue::ClaimedAt).timestamp_with_time_zone().null())
                        .col(ColumnDef::new(ProcessingQueue::CompletedAt).timestamp_with_time_zone().null())
                        .col(
                            ColumnDef::new(ProcessingQueue::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null()
                                .default(Expr::current_timestamp()),
                        )
                        .to_owned(),
                )
                .await?;

            // Partial indexes: each sweep only ever scans rows of one
            // status, so the predicate keeps the index a sliver of the
            // table instead of a full composite scan.
            manager
                .get_connection()
                .execute_unprepared(
                    "CREATE INDEX IF NOT EXISTS idx_processing_queue_claim \
                     ON processing_queue (flow_name, created_at) \
                     WHERE status = 'pending'",
                )
                .await?;

            manager
                .get_connection()
                .execute_unprepared(
                    "CREATE INDEX IF NOT EXISTS idx_processing_queue_orphans \
                     ON processing_queue (claimed_at) \
                     WHERE status = 'processing'",
                )
                .await?;

            manager
                .get_connection()
                .execute_unprepared(
                    "CREATE INDEX IF NOT EXISTS idx_processing_queue_status \
                     ON processing_queue (flow_name, status)",
                )
                .await?;

            manager
                .get_connection()
                .execute_unprepared(
                    "CREATE INDEX IF NOT EXISTS idx_processing_queue_failed_reset \
                     ON processing_queue (flow_name, retry_count) \
                     WHERE status = 'failed'",
                )
                .await?;

            Ok(())
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(ProcessingQueue::Table).to_owned())
                .await
        }
    }

    #[derive(Iden)]
    enum ProcessingQueue {
        Table,
        Id,
        FlowName,
        Payload,
        Status,
        FlowInstanceId,
        RetryCount,
        ErrorMessage,
        CreatedAt,
        ClaimedAt,
        CompletedAt,
        UpdatedAt,
    }
}
