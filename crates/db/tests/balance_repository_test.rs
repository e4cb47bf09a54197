//! Integration tests for the balance projection.

mod common;

use futures::future::join_all;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tally_core::ledger::posting_deltas;
use tally_db::{BalanceRepository, JournalEntryRepository};
use tally_shared::types::{Currency, TenantId};

use common::{at, code, date, pair, pending_entry, setup_db};

#[tokio::test]
async fn test_unknown_account_has_zero_balance() {
    let db = setup_db().await;
    let repo = BalanceRepository::new(db);
    let as_of = at(2024, 6, 1, 0);

    let balance = repo
        .get_balance(&code("9999"), Currency::new("USD").unwrap(), as_of)
        .await
        .unwrap();

    assert!(balance.is_zero());
    assert_eq!(balance.as_of, as_of);
    assert_eq!(balance.account_code.as_str(), "9999");
}

#[tokio::test]
async fn test_update_balance_accumulates() {
    let db = setup_db().await;
    let repo = BalanceRepository::new(db);
    let usd = Currency::new("USD").unwrap();
    let cash = code("1000");

    repo.update_balance(&cash, usd, dec!(100.00)).await.unwrap();
    repo.update_balance(&cash, usd, dec!(-40.00)).await.unwrap();
    repo.update_balance(&cash, usd, dec!(250.50)).await.unwrap();

    let balance = repo.get_balance(&cash, usd, at(2024, 6, 1, 0)).await.unwrap();
    assert_eq!(balance.amount, dec!(310.50));
}

#[tokio::test]
async fn test_balances_are_per_currency() {
    let db = setup_db().await;
    let repo = BalanceRepository::new(db);
    let usd = Currency::new("USD").unwrap();
    let eur = Currency::new("EUR").unwrap();
    let cash = code("1000");

    repo.update_balance(&cash, usd, dec!(100.00)).await.unwrap();
    repo.update_balance(&cash, eur, dec!(40.00)).await.unwrap();

    let now = at(2024, 6, 1, 0);
    assert_eq!(
        repo.get_balance(&cash, usd, now).await.unwrap().amount,
        dec!(100.00)
    );
    assert_eq!(
        repo.get_balance(&cash, eur, now).await.unwrap().amount,
        dec!(40.00)
    );
}

#[tokio::test]
async fn test_concurrent_deltas_do_not_lose_updates() {
    let db = setup_db().await;
    let repo = BalanceRepository::new(db);
    let usd = Currency::new("USD").unwrap();
    let cash = code("1000");

    let updates = (0..20).map(|_| repo.update_balance(&cash, usd, dec!(5.00)));
    for result in join_all(updates).await {
        result.unwrap();
    }

    let balance = repo.get_balance(&cash, usd, at(2024, 6, 1, 0)).await.unwrap();
    assert_eq!(balance.amount, dec!(100.00));
}

#[tokio::test]
async fn test_rebuild_replays_non_pending_postings() {
    let db = setup_db().await;
    let journal = JournalEntryRepository::new(db.clone());
    let balances = BalanceRepository::new(db);
    let usd = Currency::new("USD").unwrap();
    let tenant = TenantId::new();

    let posted = pending_entry(
        tenant,
        date(2024, 2, 1),
        vec![pair("1000", "4000", dec!(250.50), "USD")],
        at(2024, 2, 1, 9),
    )
    .post(at(2024, 2, 1, 10))
    .unwrap();
    journal
        .save_all(&[&posted], &posting_deltas(posted.postings()))
        .await
        .unwrap();

    let pending = pending_entry(
        tenant,
        date(2024, 2, 2),
        vec![pair("1000", "4000", dec!(40.00), "USD")],
        at(2024, 2, 2, 9),
    );
    journal.save(&pending).await.unwrap();

    // Drift the projection, then rebuild it from the journal.
    balances
        .update_balance(&code("1000"), usd, dec!(999.00))
        .await
        .unwrap();
    balances
        .update_balance(&code("7000"), usd, dec!(1.00))
        .await
        .unwrap();

    let rebuilt = balances.rebuild().await.unwrap();
    assert_eq!(rebuilt, 2);

    let now = at(2024, 3, 1, 0);
    assert_eq!(
        balances.get_balance(&code("1000"), usd, now).await.unwrap().amount,
        dec!(250.50)
    );
    assert_eq!(
        balances.get_balance(&code("4000"), usd, now).await.unwrap().amount,
        dec!(-250.50)
    );
    assert_eq!(
        balances.get_balance(&code("7000"), usd, now).await.unwrap().amount,
        Decimal::ZERO
    );
}

#[tokio::test]
async fn test_apply_deltas_nets_an_entry() {
    let db = setup_db().await;
    let repo = BalanceRepository::new(db);
    let usd = Currency::new("USD").unwrap();
    let postings = vec![
        pair("1000", "2000", dec!(100.00), "USD"),
        pair("2000", "3000", dec!(40.00), "USD"),
    ];

    repo.apply_deltas(&posting_deltas(&postings)).await.unwrap();

    let now = at(2024, 6, 1, 0);
    assert_eq!(
        repo.get_balance(&code("1000"), usd, now).await.unwrap().amount,
        dec!(100.00)
    );
    assert_eq!(
        repo.get_balance(&code("2000"), usd, now).await.unwrap().amount,
        dec!(-60.00)
    );
    assert_eq!(
        repo.get_balance(&code("3000"), usd, now).await.unwrap().amount,
        dec!(-40.00)
    );
}
