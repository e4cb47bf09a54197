//! Property-based tests for posting pair construction and balance deltas.

use proptest::prelude::*;
use rust_decimal::Decimal;

use super::account_code::AccountCode;
use super::balance::posting_deltas;
use super::error::LedgerError;
use super::posting_pair::PostingPair;

/// Strategy to generate a valid account code (`NNNN` or `NNNN-NNN`).
fn account_code() -> impl Strategy<Value = AccountCode> {
    (0u32..10_000, proptest::option::of(0u32..1_000)).prop_map(|(main, sub)| {
        let code = match sub {
            Some(sub) => format!("{main:04}-{sub:03}"),
            None => format!("{main:04}"),
        };
        AccountCode::new(&code).unwrap()
    })
}

/// Strategy to generate a valid positive amount (> 0).
fn positive_amount() -> impl Strategy<Value = Decimal> {
    // Generate amounts from 0.01 to 1,000,000.00
    (1i64..100_000_000i64).prop_map(|cents| Decimal::new(cents, 2))
}

/// Strategy to generate a zero or negative amount.
fn non_positive_amount() -> impl Strategy<Value = Decimal> {
    (0i64..100_000_000i64).prop_map(|cents| Decimal::new(-cents, 2))
}

fn currency() -> impl Strategy<Value = &'static str> {
    prop_oneof![Just("USD"), Just("EUR"), Just("IDR"), Just("JPY")]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// *For any* distinct accounts and positive amount, construction succeeds
    /// and preserves every field.
    #[test]
    fn prop_valid_inputs_construct(
        debit in account_code(),
        credit in account_code(),
        amount in positive_amount(),
        currency in currency(),
    ) {
        prop_assume!(debit != credit);
        let pair = PostingPair::new(debit.clone(), credit.clone(), amount, currency, "p").unwrap();
        prop_assert_eq!(pair.debit_account(), &debit);
        prop_assert_eq!(pair.credit_account(), &credit);
        prop_assert_eq!(pair.amount(), amount);
        let pair_currency = pair.currency();
        prop_assert_eq!(pair_currency.as_str(), currency);
    }

    /// *For any* account, debiting and crediting it in one pair is rejected.
    #[test]
    fn prop_self_posting_rejected(account in account_code(), amount in positive_amount()) {
        let result = PostingPair::new(account.clone(), account.clone(), amount, "USD", "");
        prop_assert_eq!(result, Err(LedgerError::SelfPosting(account)));
    }

    /// *For any* amount <= 0, construction fails.
    #[test]
    fn prop_non_positive_amount_rejected(
        debit in account_code(),
        credit in account_code(),
        amount in non_positive_amount(),
    ) {
        prop_assume!(debit != credit);
        let result = PostingPair::new(debit, credit, amount, "USD", "");
        prop_assert_eq!(result, Err(LedgerError::NonPositiveAmount(amount)));
    }

    /// *For any* set of pairs, deltas net to zero within each currency.
    #[test]
    fn prop_deltas_balance_per_currency(
        legs in prop::collection::vec((account_code(), account_code(), positive_amount(), currency()), 1..20),
    ) {
        let postings: Vec<PostingPair> = legs
            .into_iter()
            .filter(|(d, c, _, _)| d != c)
            .map(|(d, c, amount, cur)| PostingPair::new(d, c, amount, cur, "").unwrap())
            .collect();

        let deltas = posting_deltas(&postings);
        for currency in ["USD", "EUR", "IDR", "JPY"] {
            let sum: Decimal = deltas
                .iter()
                .filter(|d| d.currency.as_str() == currency)
                .map(|d| d.delta)
                .sum();
            prop_assert_eq!(sum, Decimal::ZERO);
        }
    }
}
