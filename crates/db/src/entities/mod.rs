//! `SeaORM` entity definitions for the ledger schema.

pub mod account_balances;
pub mod fiscal_periods;
pub mod journal_entries;
pub mod outbox;
pub mod posting_pairs;
