//! Use case tests against an in-memory SQLite database.

use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use tally_core::ledger::{AccountCode, EntryStatus, LedgerError};
use tally_db::OutboxRepository;
use tally_db::migration::{Migrator, MigratorTrait};
use tally_relay::{InMemoryBroker, OutboxRelay, Publisher, RetryPolicy, TopicRouter};
use tally_service::{LedgerService, NewJournalEntry, PostingRequest, ServiceError};
use tally_shared::types::{Currency, JournalEntryId, PageRequest, TenantId};

async fn setup_db() -> DatabaseConnection {
    let mut options = ConnectOptions::new("sqlite::memory:");
    options
        .max_connections(1)
        .min_connections(1)
        .sqlx_logging(false);
    let db = Database::connect(options).await.unwrap();
    Migrator::up(&db, None).await.unwrap();
    db
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn line(debit: &str, credit: &str, amount: Decimal) -> PostingRequest {
    PostingRequest {
        debit_account: debit.to_string(),
        credit_account: credit.to_string(),
        amount,
        currency: "USD".to_string(),
        description: "line".to_string(),
    }
}

fn request(tenant_id: TenantId, effective_date: NaiveDate) -> NewJournalEntry {
    NewJournalEntry {
        tenant_id,
        effective_date,
        postings: vec![
            line("1000", "4000", dec!(100.00)),
            line("5000", "1000", dec!(40.00)),
        ],
        description: "Daily sales".to_string(),
        reference: "Z-42".to_string(),
    }
}

async fn balance(service: &LedgerService, account: &str) -> Decimal {
    service
        .get_balance(
            &AccountCode::new(account).unwrap(),
            Currency::new("USD").unwrap(),
            Utc::now(),
        )
        .await
        .unwrap()
        .amount
}

fn ledger_error(err: ServiceError) -> LedgerError {
    match err {
        ServiceError::Ledger(e) => e,
        other => panic!("expected ledger error, got {other:?}"),
    }
}

// ============================================================================
// Posting
// ============================================================================

#[tokio::test]
async fn test_post_updates_balances_and_outbox() {
    let db = setup_db().await;
    let service = LedgerService::new(db.clone());
    let outbox = OutboxRepository::new(db);

    let posted = service
        .post_journal_entry(request(TenantId::new(), date(2024, 3, 15)))
        .await
        .unwrap();

    assert_eq!(posted.status(), EntryStatus::Posted);
    assert_eq!(posted.version(), 2);
    assert_eq!(balance(&service, "1000").await, dec!(60.00));
    assert_eq!(balance(&service, "4000").await, dec!(-100.00));
    assert_eq!(balance(&service, "5000").await, dec!(40.00));

    let rows = outbox.list_all().await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].event_type, "ledger.entry.posted");

    let loaded = service.get_entry(posted.id()).await.unwrap();
    assert_eq!(loaded.status(), EntryStatus::Posted);
    assert_eq!(loaded.reference(), "Z-42");
}

#[tokio::test]
async fn test_invalid_request_writes_nothing() {
    let db = setup_db().await;
    let service = LedgerService::new(db.clone());
    let tenant = TenantId::new();
    let mut bad = request(tenant, date(2024, 3, 15));
    bad.postings.push(line("1000", "1000", dec!(5.00)));

    let err = service.post_journal_entry(bad).await.unwrap_err();

    assert_eq!(err.error_code(), "SELF_POSTING");
    assert!(!err.is_retryable());
    let page = service
        .list_by_tenant(
            tenant,
            date(2024, 1, 1),
            date(2024, 12, 31),
            PageRequest::default(),
        )
        .await
        .unwrap();
    assert_eq!(page.meta.total, 0);
}

#[tokio::test]
async fn test_empty_postings_rejected() {
    let service = LedgerService::new(setup_db().await);
    let mut empty = request(TenantId::new(), date(2024, 3, 15));
    empty.postings.clear();

    let err = service.post_journal_entry(empty).await.unwrap_err();

    assert_eq!(ledger_error(err), LedgerError::NoPostings);
}

#[tokio::test]
async fn test_post_into_closed_period_rejected() {
    let db = setup_db().await;
    let service = LedgerService::new(db.clone());
    let tenant = TenantId::new();
    service.close_period(tenant, 2024, 2).await.unwrap();

    let err = service
        .post_journal_entry(request(tenant, date(2024, 2, 20)))
        .await
        .unwrap_err();

    assert!(matches!(ledger_error(err), LedgerError::PeriodClosed(p) if p.to_string() == "2024-02"));
    assert_eq!(balance(&service, "1000").await, Decimal::ZERO);

    // Other tenants are unaffected.
    service
        .post_journal_entry(request(TenantId::new(), date(2024, 2, 20)))
        .await
        .unwrap();
}

// ============================================================================
// Pending entries
// ============================================================================

#[tokio::test]
async fn test_pending_entry_moves_balances_only_when_posted() {
    let db = setup_db().await;
    let service = LedgerService::new(db.clone());
    let outbox = OutboxRepository::new(db);

    let pending = service
        .create_pending_entry(request(TenantId::new(), date(2024, 3, 15)))
        .await
        .unwrap();
    assert_eq!(pending.status(), EntryStatus::Pending);
    assert_eq!(balance(&service, "1000").await, Decimal::ZERO);
    assert_eq!(outbox.count_unpublished().await.unwrap(), 0);

    let posted = service.post_pending_entry(pending.id()).await.unwrap();

    assert_eq!(posted.version(), 2);
    assert_eq!(balance(&service, "1000").await, dec!(60.00));
    assert_eq!(outbox.count_unpublished().await.unwrap(), 1);
}

#[tokio::test]
async fn test_posting_twice_is_rejected() {
    let service = LedgerService::new(setup_db().await);
    let pending = service
        .create_pending_entry(request(TenantId::new(), date(2024, 3, 15)))
        .await
        .unwrap();
    service.post_pending_entry(pending.id()).await.unwrap();

    let err = service.post_pending_entry(pending.id()).await.unwrap_err();

    assert_eq!(err.error_code(), "INVALID_STATE_TRANSITION");
    assert_eq!(balance(&service, "1000").await, dec!(60.00));
}

#[tokio::test]
async fn test_concurrent_posts_apply_once() {
    let service = LedgerService::new(setup_db().await);
    let pending = service
        .create_pending_entry(request(TenantId::new(), date(2024, 3, 15)))
        .await
        .unwrap();

    let (a, b) = tokio::join!(
        service.post_pending_entry(pending.id()),
        service.post_pending_entry(pending.id()),
    );

    let results = [a, b];
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    let loser = results.into_iter().find_map(Result::err).unwrap();
    assert!(
        loser.is_retryable() || loser.error_code() == "INVALID_STATE_TRANSITION",
        "unexpected error: {loser:?}"
    );
    assert_eq!(balance(&service, "1000").await, dec!(60.00));
}

#[tokio::test]
async fn test_unknown_entry_not_found() {
    let service = LedgerService::new(setup_db().await);

    let err = service
        .post_pending_entry(JournalEntryId::new())
        .await
        .unwrap_err();

    assert!(err.is_not_found());
    assert_eq!(err.error_code(), "NOT_FOUND");
}

// ============================================================================
// Reversal
// ============================================================================

#[tokio::test]
async fn test_reversal_nets_balances_to_zero() {
    let db = setup_db().await;
    let service = LedgerService::new(db.clone());
    let outbox = OutboxRepository::new(db);
    let posted = service
        .post_journal_entry(request(TenantId::new(), date(2024, 3, 15)))
        .await
        .unwrap();

    let (reversed, reversal) = service
        .reverse_entry(posted.id(), "duplicate import")
        .await
        .unwrap();

    assert_eq!(reversed.status(), EntryStatus::Reversed);
    assert_eq!(reversed.version(), 3);
    assert_eq!(reversal.status(), EntryStatus::Posted);
    assert_eq!(reversal.reference(), posted.id().to_string());
    for account in ["1000", "4000", "5000"] {
        assert_eq!(balance(&service, account).await, Decimal::ZERO, "{account}");
    }

    let events: Vec<_> = outbox
        .list_all()
        .await
        .unwrap()
        .into_iter()
        .map(|row| row.event_type)
        .collect();
    assert_eq!(events, ["ledger.entry.posted", "ledger.entry.reversed"]);

    let stored = service.get_entry(reversal.id()).await.unwrap();
    assert_eq!(stored.postings()[0].debit_account().as_str(), "4000");
}

#[tokio::test]
async fn test_pending_entry_cannot_be_reversed() {
    let service = LedgerService::new(setup_db().await);
    let pending = service
        .create_pending_entry(request(TenantId::new(), date(2024, 3, 15)))
        .await
        .unwrap();

    let err = service.reverse_entry(pending.id(), "oops").await.unwrap_err();

    assert!(matches!(
        ledger_error(err),
        LedgerError::InvalidTransition {
            operation: "reverse",
            ..
        }
    ));
}

// ============================================================================
// Backvalue
// ============================================================================

#[tokio::test]
async fn test_backvalue_moves_pending_entry() {
    let db = setup_db().await;
    let service = LedgerService::new(db.clone());
    let outbox = OutboxRepository::new(db);
    let pending = service
        .create_pending_entry(request(TenantId::new(), date(2024, 3, 20)))
        .await
        .unwrap();

    let updated = service
        .backvalue_entry(pending.id(), date(2024, 3, 5))
        .await
        .unwrap();

    assert_eq!(updated.version(), 2);
    let stored = service.get_entry(pending.id()).await.unwrap();
    assert_eq!(stored.effective_date(), date(2024, 3, 5));
    assert_eq!(outbox.count_unpublished().await.unwrap(), 0);
}

#[tokio::test]
async fn test_backvalue_into_closed_period_rejected() {
    let service = LedgerService::new(setup_db().await);
    let tenant = TenantId::new();
    let pending = service
        .create_pending_entry(request(tenant, date(2024, 3, 20)))
        .await
        .unwrap();
    service.close_period(tenant, 2024, 2).await.unwrap();

    let err = service
        .backvalue_entry(pending.id(), date(2024, 2, 28))
        .await
        .unwrap_err();

    assert_eq!(err.error_code(), "PERIOD_CLOSED");
    let stored = service.get_entry(pending.id()).await.unwrap();
    assert_eq!(stored.effective_date(), date(2024, 3, 20));
    assert_eq!(stored.version(), 1);
}

#[tokio::test]
async fn test_backvalue_into_future_rejected() {
    let service = LedgerService::new(setup_db().await);
    let pending = service
        .create_pending_entry(request(TenantId::new(), date(2024, 3, 20)))
        .await
        .unwrap();
    let tomorrow = Utc::now().date_naive().succ_opt().unwrap();

    let err = service
        .backvalue_entry(pending.id(), tomorrow)
        .await
        .unwrap_err();

    assert_eq!(err.error_code(), "FUTURE_EFFECTIVE_DATE");
}

// ============================================================================
// Fiscal periods and queries
// ============================================================================

#[tokio::test]
async fn test_close_period_twice() {
    let db = setup_db().await;
    let service = LedgerService::new(db.clone());
    let outbox = OutboxRepository::new(db);
    let tenant = TenantId::new();

    let period = service.close_period(tenant, 2024, 1).await.unwrap();
    let err = service.close_period(tenant, 2024, 1).await.unwrap_err();

    assert_eq!(period.to_string(), "2024-01");
    assert_eq!(ledger_error(err), LedgerError::PeriodAlreadyClosed(period));
    assert_eq!(outbox.count_unpublished().await.unwrap(), 1);
}

#[tokio::test]
async fn test_close_invalid_period() {
    let service = LedgerService::new(setup_db().await);

    let err = service
        .close_period(TenantId::new(), 2024, 13)
        .await
        .unwrap_err();

    assert_eq!(ledger_error(err), LedgerError::InvalidFiscalMonth(13));
}

#[tokio::test]
async fn test_list_by_account_filters_dates() {
    let service = LedgerService::new(setup_db().await);
    let tenant = TenantId::new();
    for day in [5, 15, 25] {
        service
            .post_journal_entry(request(tenant, date(2024, 3, day)))
            .await
            .unwrap();
    }

    let page = service
        .list_by_account(
            tenant,
            &AccountCode::new("5000").unwrap(),
            date(2024, 3, 10),
            date(2024, 3, 31),
            PageRequest::default(),
        )
        .await
        .unwrap();

    let dates: Vec<_> = page.data.iter().map(|e| e.effective_date()).collect();
    assert_eq!(dates, [date(2024, 3, 15), date(2024, 3, 25)]);
    assert_eq!(page.meta.total, 2);
}

// ============================================================================
// In-process relay
// ============================================================================

#[tokio::test]
async fn test_service_with_relay_publishes_after_write() {
    let db = setup_db().await;
    let outbox = OutboxRepository::new(db.clone());
    let broker = Arc::new(InMemoryBroker::new());
    let relay = OutboxRelay::new(
        Arc::new(outbox.clone()),
        Publisher::new(
            broker.clone(),
            RetryPolicy {
                max_attempts: 1,
                base_delay: Duration::from_millis(1),
            },
        ),
        TopicRouter::new("ledger.entries"),
    );
    let service = LedgerService::new(db).with_relay(Arc::new(relay));

    let posted = service
        .post_journal_entry(request(TenantId::new(), date(2024, 3, 15)))
        .await
        .unwrap();

    assert_eq!(outbox.count_unpublished().await.unwrap(), 0);
    let messages = broker.published_on("ledger.entries");
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].key, posted.id().to_string());
}

#[tokio::test]
async fn test_relay_outage_neither_fails_nor_delays_the_write() {
    let db = setup_db().await;
    let outbox = OutboxRepository::new(db.clone());
    let broker = Arc::new(InMemoryBroker::new());
    broker.set_unavailable("ledger.entries", true);
    // The background relay would back off for minutes on this policy.
    let relay = OutboxRelay::new(
        Arc::new(outbox.clone()),
        Publisher::new(
            broker.clone(),
            RetryPolicy {
                max_attempts: 5,
                base_delay: Duration::from_secs(30),
            },
        ),
        TopicRouter::new("ledger.entries"),
    );
    let service = LedgerService::new(db).with_relay(Arc::new(relay));
    let started = std::time::Instant::now();

    service
        .post_journal_entry(request(TenantId::new(), date(2024, 3, 15)))
        .await
        .unwrap();

    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(broker.calls(), 1);
    assert_eq!(outbox.count_unpublished().await.unwrap(), 1);
    assert!(broker.published().is_empty());
}
