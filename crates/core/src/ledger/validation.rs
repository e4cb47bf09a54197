//! Posting validation shared by the use cases.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use tally_shared::types::Currency;

use super::error::LedgerError;
use super::posting_pair::PostingPair;

/// Sums posting amounts per currency.
#[must_use]
pub fn currency_totals(postings: &[PostingPair]) -> BTreeMap<Currency, Decimal> {
    let mut totals = BTreeMap::new();
    for pair in postings {
        *totals.entry(pair.currency()).or_insert(Decimal::ZERO) += pair.amount();
    }
    totals
}

/// Validates a set of postings before an entry is built from them.
///
/// Per-pair rules (distinct accounts, positive amount) hold by construction
/// of [`PostingPair`]; only set-level rules are checked here.
///
/// # Errors
///
/// Returns `LedgerError::NoPostings` for an empty set.
pub fn validate_postings(postings: &[PostingPair]) -> Result<(), LedgerError> {
    if postings.is_empty() {
        return Err(LedgerError::NoPostings);
    }
    Ok(())
}
