//! Posting pairs: one debit leg and one credit leg of equal amount.
//!
//! A pair is balanced by construction, so an entry made of pairs is balanced
//! without a separate debit/credit sum check.

use rust_decimal::Decimal;
use serde::Serialize;
use tally_shared::types::Currency;

use super::account_code::AccountCode;
use super::error::LedgerError;

/// One debit and one credit of the same amount and currency.
///
/// Serializes as a flat record for event payloads. Pairs are only ever
/// rebuilt through [`PostingPair::new`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PostingPair {
    debit_account: AccountCode,
    credit_account: AccountCode,
    amount: Decimal,
    currency: Currency,
    description: String,
}

impl PostingPair {
    /// Creates a validated posting pair.
    ///
    /// # Errors
    ///
    /// - `LedgerError::SelfPosting` if `debit == credit`
    /// - `LedgerError::NonPositiveAmount` if `amount <= 0`
    /// - `LedgerError::Currency` if the currency is empty or not three letters
    pub fn new(
        debit_account: AccountCode,
        credit_account: AccountCode,
        amount: Decimal,
        currency: &str,
        description: impl Into<String>,
    ) -> Result<Self, LedgerError> {
        if debit_account == credit_account {
            return Err(LedgerError::SelfPosting(debit_account));
        }
        if amount <= Decimal::ZERO {
            return Err(LedgerError::NonPositiveAmount(amount));
        }
        let currency = Currency::new(currency)?;

        Ok(Self {
            debit_account,
            credit_account,
            amount,
            currency,
            description: description.into(),
        })
    }

    /// The debited account.
    #[must_use]
    pub const fn debit_account(&self) -> &AccountCode {
        &self.debit_account
    }

    /// The credited account.
    #[must_use]
    pub const fn credit_account(&self) -> &AccountCode {
        &self.credit_account
    }

    /// The amount moved, always positive.
    #[must_use]
    pub const fn amount(&self) -> Decimal {
        self.amount
    }

    /// The posting currency.
    #[must_use]
    pub const fn currency(&self) -> Currency {
        self.currency
    }

    /// Free-text description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Returns the inverse pair: debit and credit swapped, same amount and
    /// currency, with the given description.
    #[must_use]
    pub fn inverse(&self, description: impl Into<String>) -> Self {
        Self {
            debit_account: self.credit_account.clone(),
            credit_account: self.debit_account.clone(),
            amount: self.amount,
            currency: self.currency,
            description: description.into(),
        }
    }
}

impl std::fmt::Display for PostingPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "DR {} / CR {}: {} {}",
            self.debit_account, self.credit_account, self.amount, self.currency
        )
    }
}
