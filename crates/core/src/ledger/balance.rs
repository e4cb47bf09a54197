//! Account balance projection.
//!
//! Balances are derived from postings: each pair adds its amount to the
//! debit account and subtracts it from the credit account. The stored
//! projection is rebuilt from journal entries whenever it is in doubt.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tally_shared::types::Currency;

use super::account_code::AccountCode;
use super::posting_pair::PostingPair;

/// Balance of one account in one currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountBalance {
    /// The account.
    pub account_code: AccountCode,
    /// The currency.
    pub currency: Currency,
    /// Signed balance. Debits are positive.
    pub amount: Decimal,
    /// Point in time the balance was read for.
    pub as_of: DateTime<Utc>,
}

impl AccountBalance {
    /// A zero balance, used when an account has no activity yet.
    #[must_use]
    pub const fn zero(account_code: AccountCode, currency: Currency, as_of: DateTime<Utc>) -> Self {
        Self {
            account_code,
            currency,
            amount: Decimal::ZERO,
            as_of,
        }
    }

    /// Returns true if the balance is zero.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.amount.is_zero()
    }
}

/// A signed change to one account balance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceDelta {
    /// The account.
    pub account_code: AccountCode,
    /// The currency.
    pub currency: Currency,
    /// Signed change.
    pub delta: Decimal,
}

/// Computes the balance deltas of a set of postings.
///
/// Deltas are netted per `(account, currency)` and returned in key order,
/// so concurrent writers upsert balance rows in the same order. Accounts
/// that net to zero are omitted.
#[must_use]
pub fn posting_deltas(postings: &[PostingPair]) -> Vec<BalanceDelta> {
    let mut net: BTreeMap<(AccountCode, Currency), Decimal> = BTreeMap::new();
    for pair in postings {
        *net.entry((pair.debit_account().clone(), pair.currency()))
            .or_default() += pair.amount();
        *net.entry((pair.credit_account().clone(), pair.currency()))
            .or_default() -= pair.amount();
    }

    net.into_iter()
        .filter(|(_, delta)| !delta.is_zero())
        .map(|((account_code, currency), delta)| BalanceDelta {
            account_code,
            currency,
            delta,
        })
        .collect()
}
