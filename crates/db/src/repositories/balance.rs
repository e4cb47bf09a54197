//! Account balance projection.
//!
//! Balances are derived from posted journal entries. Deltas are applied with
//! a relative upsert (`balance = balance + delta`), so concurrent writers to
//! the same account never lose an update.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    TransactionTrait,
    sea_query::{Alias, Expr, OnConflict},
};
use tally_core::ledger::{
    AccountBalance, AccountCode, BalanceDelta, EntryStatus, PostingPair, posting_deltas,
};
use tally_shared::types::Currency;
use tracing::instrument;

use super::error::RepositoryError;
use crate::entities::{account_balances, journal_entries, posting_pairs};

/// Balance repository.
#[derive(Debug, Clone)]
pub struct BalanceRepository {
    db: DatabaseConnection,
}

impl BalanceRepository {
    /// Creates a new balance repository.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Returns the stored balance, or zero when the account has no activity.
    ///
    /// `as_of` is echoed back; the projection only holds the current value.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn get_balance(
        &self,
        account_code: &AccountCode,
        currency: Currency,
        as_of: DateTime<Utc>,
    ) -> Result<AccountBalance, RepositoryError> {
        let row = account_balances::Entity::find_by_id((
            account_code.as_str().to_string(),
            currency.as_str().to_string(),
        ))
        .one(&self.db)
        .await?;

        Ok(row.map_or_else(
            || AccountBalance::zero(account_code.clone(), currency, as_of),
            |row| AccountBalance {
                account_code: account_code.clone(),
                currency,
                amount: row.balance,
                as_of,
            },
        ))
    }

    /// Adds a signed delta to one balance.
    ///
    /// # Errors
    ///
    /// Returns an error if the upsert fails.
    pub async fn update_balance(
        &self,
        account_code: &AccountCode,
        currency: Currency,
        delta: Decimal,
    ) -> Result<(), RepositoryError> {
        let delta = BalanceDelta {
            account_code: account_code.clone(),
            currency,
            delta,
        };
        Self::apply_deltas_in(&self.db, &[delta], Utc::now()).await
    }

    /// Applies several deltas in one transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if an upsert fails; nothing is applied in that case.
    pub async fn apply_deltas(&self, deltas: &[BalanceDelta]) -> Result<(), RepositoryError> {
        let txn = self.db.begin().await?;
        Self::apply_deltas_in(&txn, deltas, Utc::now()).await?;
        txn.commit().await?;
        Ok(())
    }

    /// Applies deltas on `conn`, in the order given.
    ///
    /// Callers pass deltas from [`posting_deltas`], which are key-ordered so
    /// two transactions lock balance rows in the same order.
    ///
    /// # Errors
    ///
    /// Returns an error if an upsert fails.
    pub async fn apply_deltas_in<C: ConnectionTrait>(
        conn: &C,
        deltas: &[BalanceDelta],
        updated_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        for delta in deltas {
            let row = account_balances::ActiveModel {
                account_code: Set(delta.account_code.as_str().to_string()),
                currency: Set(delta.currency.as_str().to_string()),
                balance: Set(delta.delta),
                updated_at: Set(updated_at.into()),
            };
            account_balances::Entity::insert(row)
                .on_conflict(
                    OnConflict::columns([
                        account_balances::Column::AccountCode,
                        account_balances::Column::Currency,
                    ])
                    .value(
                        account_balances::Column::Balance,
                        Expr::col((account_balances::Entity, account_balances::Column::Balance))
                            .add(Expr::col((
                                Alias::new("excluded"),
                                account_balances::Column::Balance,
                            ))),
                    )
                    .update_column(account_balances::Column::UpdatedAt)
                    .to_owned(),
                )
                .exec_without_returning(conn)
                .await?;
        }
        Ok(())
    }

    /// Recomputes every balance from the postings of non-pending entries.
    ///
    /// Reversed entries stay in the replay: their reversal entries carry the
    /// offsetting postings.
    ///
    /// # Errors
    ///
    /// Returns an error if a query fails or a stored posting is invalid.
    #[instrument(skip(self), err)]
    pub async fn rebuild(&self) -> Result<usize, RepositoryError> {
        let txn = self.db.begin().await?;

        account_balances::Entity::delete_many().exec(&txn).await?;

        let rows = posting_pairs::Entity::find()
            .inner_join(journal_entries::Entity)
            .filter(journal_entries::Column::Status.ne(EntryStatus::Pending.as_str()))
            .all(&txn)
            .await?;

        let postings = rows
            .into_iter()
            .map(|row| {
                let entry_id = row.entry_id;
                let pair = AccountCode::new(&row.debit_account).and_then(|debit| {
                    PostingPair::new(
                        debit,
                        AccountCode::new(&row.credit_account)?,
                        row.amount,
                        &row.currency,
                        row.description,
                    )
                });
                pair.map_err(|e| {
                    RepositoryError::integrity("posting_pairs", entry_id, format!("invalid posting: {e}"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let deltas = posting_deltas(&postings);
        Self::apply_deltas_in(&txn, &deltas, Utc::now()).await?;
        txn.commit().await?;

        tracing::info!(postings = postings.len(), balances = deltas.len(), "balances rebuilt");
        Ok(deltas.len())
    }
}
