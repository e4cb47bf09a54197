//! Shared fixtures for repository tests.
//!
//! Every test gets its own in-memory `SQLite` database. The pool is pinned to
//! a single connection so the database outlives individual queries.

#![allow(dead_code)]

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use tally_core::ledger::{AccountCode, JournalEntry, PostingPair};
use tally_db::migration::{Migrator, MigratorTrait};
use tally_shared::types::TenantId;

pub async fn setup_db() -> DatabaseConnection {
    let mut options = ConnectOptions::new("sqlite::memory:");
    options
        .max_connections(1)
        .min_connections(1)
        .sqlx_logging(false);
    let db = Database::connect(options)
        .await
        .expect("failed to open sqlite database");
    Migrator::up(&db, None).await.expect("failed to migrate");
    db
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
}

pub fn code(s: &str) -> AccountCode {
    AccountCode::new(s).unwrap()
}

pub fn pair(debit: &str, credit: &str, amount: Decimal, currency: &str) -> PostingPair {
    PostingPair::new(code(debit), code(credit), amount, currency, "line").unwrap()
}

pub fn pending_entry(
    tenant_id: TenantId,
    effective_date: NaiveDate,
    postings: Vec<PostingPair>,
    now: DateTime<Utc>,
) -> JournalEntry {
    JournalEntry::new_at(tenant_id, effective_date, postings, "Test entry", "REF-1", now).unwrap()
}
