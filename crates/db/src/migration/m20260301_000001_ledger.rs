//! Ledger schema: journal entries, postings, balances, fiscal periods, outbox.
//!
//! Built with the schema builder rather than raw SQL so the same migration
//! runs on `PostgreSQL` and on the `SQLite` databases used in tests.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(JournalEntries::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(JournalEntries::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(JournalEntries::TenantId).uuid().not_null())
                    .col(ColumnDef::new(JournalEntries::EffectiveDate).date().not_null())
                    .col(ColumnDef::new(JournalEntries::Status).string_len(16).not_null())
                    .col(ColumnDef::new(JournalEntries::Description).text().not_null())
                    .col(ColumnDef::new(JournalEntries::Reference).string_len(255).not_null())
                    .col(ColumnDef::new(JournalEntries::Version).big_integer().not_null())
                    .col(
                        ColumnDef::new(JournalEntries::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(JournalEntries::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_journal_entries_tenant_date")
                    .table(JournalEntries::Table)
                    .col(JournalEntries::TenantId)
                    .col(JournalEntries::EffectiveDate)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(PostingPairs::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(PostingPairs::EntryId).uuid().not_null())
                    .col(ColumnDef::new(PostingPairs::SeqNum).integer().not_null())
                    .col(ColumnDef::new(PostingPairs::DebitAccount).string_len(8).not_null())
                    .col(ColumnDef::new(PostingPairs::CreditAccount).string_len(8).not_null())
                    .col(ColumnDef::new(PostingPairs::Amount).decimal().not_null())
                    .col(ColumnDef::new(PostingPairs::Currency).string_len(3).not_null())
                    .col(ColumnDef::new(PostingPairs::Description).text().not_null())
                    .primary_key(
                        Index::create()
                            .col(PostingPairs::EntryId)
                            .col(PostingPairs::SeqNum),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_posting_pairs_entry")
                            .from(PostingPairs::Table, PostingPairs::EntryId)
                            .to(JournalEntries::Table, JournalEntries::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_posting_pairs_debit")
                    .table(PostingPairs::Table)
                    .col(PostingPairs::DebitAccount)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_posting_pairs_credit")
                    .table(PostingPairs::Table)
                    .col(PostingPairs::CreditAccount)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(AccountBalances::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(AccountBalances::AccountCode).string_len(8).not_null())
                    .col(ColumnDef::new(AccountBalances::Currency).string_len(3).not_null())
                    .col(ColumnDef::new(AccountBalances::Balance).decimal().not_null())
                    .col(
                        ColumnDef::new(AccountBalances::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .primary_key(
                        Index::create()
                            .col(AccountBalances::AccountCode)
                            .col(AccountBalances::Currency),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(FiscalPeriods::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(FiscalPeriods::TenantId).uuid().not_null())
                    .col(ColumnDef::new(FiscalPeriods::Year).integer().not_null())
                    .col(ColumnDef::new(FiscalPeriods::Month).integer().not_null())
                    .col(ColumnDef::new(FiscalPeriods::Status).string_len(16).not_null())
                    .col(ColumnDef::new(FiscalPeriods::ClosedAt).timestamp_with_time_zone().null())
                    .primary_key(
                        Index::create()
                            .col(FiscalPeriods::TenantId)
                            .col(FiscalPeriods::Year)
                            .col(FiscalPeriods::Month),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Outbox::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Outbox::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Outbox::AggregateId).uuid().not_null())
                    .col(ColumnDef::new(Outbox::AggregateType).string_len(64).not_null())
                    .col(ColumnDef::new(Outbox::EventType).string_len(128).not_null())
                    .col(ColumnDef::new(Outbox::TenantId).uuid().not_null())
                    .col(ColumnDef::new(Outbox::SchemaVersion).small_integer().not_null())
                    .col(ColumnDef::new(Outbox::Payload).text().not_null())
                    .col(ColumnDef::new(Outbox::CreatedAt).timestamp_with_time_zone().not_null())
                    .col(ColumnDef::new(Outbox::PublishedAt).timestamp_with_time_zone().null())
                    .col(ColumnDef::new(Outbox::DeadLetteredAt).timestamp_with_time_zone().null())
                    .col(ColumnDef::new(Outbox::LastError).text().null())
                    .to_owned(),
            )
            .await?;

        // Relay scans `published_at IS NULL AND dead_lettered_at IS NULL
        // ORDER BY created_at`.
        manager
            .create_index(
                Index::create()
                    .name("idx_outbox_unpublished")
                    .table(Outbox::Table)
                    .col(Outbox::PublishedAt)
                    .col(Outbox::DeadLetteredAt)
                    .col(Outbox::CreatedAt)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        for table in [
            Outbox::Table.into_iden(),
            FiscalPeriods::Table.into_iden(),
            AccountBalances::Table.into_iden(),
            PostingPairs::Table.into_iden(),
            JournalEntries::Table.into_iden(),
        ] {
            manager
                .drop_table(Table::drop().table(table).if_exists().to_owned())
                .await?;
        }
        Ok(())
    }
}

#[derive(DeriveIden)]
enum JournalEntries {
    Table,
    Id,
    TenantId,
    EffectiveDate,
    Status,
    Description,
    Reference,
    Version,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum PostingPairs {
    Table,
    EntryId,
    SeqNum,
    DebitAccount,
    CreditAccount,
    Amount,
    Currency,
    Description,
}

#[derive(DeriveIden)]
enum AccountBalances {
    Table,
    AccountCode,
    Currency,
    Balance,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum FiscalPeriods {
    Table,
    TenantId,
    Year,
    Month,
    Status,
    ClosedAt,
}

#[derive(DeriveIden)]
enum Outbox {
    Table,
    Id,
    AggregateId,
    AggregateType,
    EventType,
    TenantId,
    SchemaVersion,
    Payload,
    CreatedAt,
    PublishedAt,
    DeadLetteredAt,
    LastError,
}
