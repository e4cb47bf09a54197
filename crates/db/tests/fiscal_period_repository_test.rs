//! Integration tests for fiscal period status.

mod common;

use tally_core::ledger::{FiscalPeriod, PeriodStatus};
use tally_db::{CloseOutcome, FiscalPeriodRepository, OutboxRepository};
use tally_shared::types::TenantId;

use common::{at, setup_db};

#[tokio::test]
async fn test_period_without_row_is_open() {
    let db = setup_db().await;
    let repo = FiscalPeriodRepository::new(db);

    let status = repo
        .get_status(TenantId::new(), FiscalPeriod::new(2024, 1).unwrap())
        .await
        .unwrap();

    assert_eq!(status, PeriodStatus::Open);
}

#[tokio::test]
async fn test_close_period_writes_event() {
    let db = setup_db().await;
    let repo = FiscalPeriodRepository::new(db.clone());
    let outbox = OutboxRepository::new(db);
    let tenant = TenantId::new();
    let january = FiscalPeriod::new(2024, 1).unwrap();

    let outcome = repo.close(tenant, january, at(2024, 2, 1, 0)).await.unwrap();

    assert_eq!(outcome, CloseOutcome::Closed);
    assert_eq!(
        repo.get_status(tenant, january).await.unwrap(),
        PeriodStatus::Closed
    );
    let rows = outbox.list_all().await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].event_type, "ledger.period.closed");
    assert_eq!(rows[0].aggregate_type, "FiscalPeriod");
    assert_eq!(rows[0].tenant_id, tenant);
}

#[tokio::test]
async fn test_close_twice_reports_already_closed() {
    let db = setup_db().await;
    let repo = FiscalPeriodRepository::new(db.clone());
    let outbox = OutboxRepository::new(db);
    let tenant = TenantId::new();
    let january = FiscalPeriod::new(2024, 1).unwrap();

    repo.close(tenant, january, at(2024, 2, 1, 0)).await.unwrap();
    let second = repo.close(tenant, january, at(2024, 2, 2, 0)).await.unwrap();

    assert_eq!(second, CloseOutcome::AlreadyClosed);
    assert_eq!(outbox.count_unpublished().await.unwrap(), 1);
}

#[tokio::test]
async fn test_close_is_scoped_to_tenant_and_month() {
    let db = setup_db().await;
    let repo = FiscalPeriodRepository::new(db);
    let tenant = TenantId::new();
    let other = TenantId::new();
    let january = FiscalPeriod::new(2024, 1).unwrap();
    let february = FiscalPeriod::new(2024, 2).unwrap();

    repo.close(tenant, january, at(2024, 2, 1, 0)).await.unwrap();

    assert_eq!(
        repo.get_status(other, january).await.unwrap(),
        PeriodStatus::Open
    );
    assert_eq!(
        repo.get_status(tenant, february).await.unwrap(),
        PeriodStatus::Open
    );
}
