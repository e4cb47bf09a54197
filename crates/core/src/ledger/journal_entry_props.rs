//! Property-based tests for the journal entry state machine.
//!
//! Covers copy-on-write transitions, version monotonicity, and reversal as a
//! posting-level inverse.

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use proptest::prelude::*;
use rust_decimal::Decimal;
use tally_shared::types::TenantId;

use super::account_code::AccountCode;
use super::balance::posting_deltas;
use super::journal_entry::{EntryStatus, JournalEntry};
use super::posting_pair::PostingPair;

fn posting_pair() -> impl Strategy<Value = PostingPair> {
    (
        0u32..5_000,
        5_000u32..10_000,
        1i64..10_000_000i64,
        prop_oneof![Just("USD"), Just("EUR"), Just("SGD")],
        any::<bool>(),
    )
        .prop_map(|(low, high, cents, currency, swap)| {
            let (debit, credit) = if swap { (high, low) } else { (low, high) };
            PostingPair::new(
                AccountCode::new(&format!("{debit:04}")).unwrap(),
                AccountCode::new(&format!("{credit:04}")).unwrap(),
                Decimal::new(cents, 2),
                currency,
                format!("leg {cents}"),
            )
            .unwrap()
        })
}

fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 30, 12, 0, 0).unwrap()
}

fn pending(postings: Vec<PostingPair>) -> JournalEntry {
    JournalEntry::new_at(
        TenantId::new(),
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
        postings,
        "generated",
        "REF",
        base_time(),
    )
    .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// *For any* entry, `post` and `reverse` leave the receiver unchanged.
    #[test]
    fn prop_transitions_never_mutate_receiver(
        postings in prop::collection::vec(posting_pair(), 1..8),
        minutes in 1i64..10_000,
    ) {
        let entry = pending(postings);
        let before = entry.clone();
        let posted = entry.post(base_time() + Duration::minutes(minutes)).unwrap();
        prop_assert_eq!(&entry, &before);

        let posted_before = posted.clone();
        let _ = posted.reverse(base_time() + Duration::minutes(minutes + 1), "r").unwrap();
        prop_assert_eq!(&posted, &posted_before);
    }

    /// *For any* entry, each successful transition bumps version by exactly 1.
    #[test]
    fn prop_version_increments_by_one(
        postings in prop::collection::vec(posting_pair(), 1..8),
        back_days in 0i64..30,
    ) {
        let entry = pending(postings);
        let redated = entry
            .backvalue(NaiveDate::from_ymd_opt(2024, 6, 30).unwrap() - Duration::days(back_days), base_time())
            .unwrap();
        prop_assert_eq!(redated.version(), entry.version() + 1);

        let posted = redated.post(base_time()).unwrap();
        prop_assert_eq!(posted.version(), redated.version() + 1);

        let (reversed, reversal) = posted.reverse(base_time(), "r").unwrap();
        prop_assert_eq!(reversed.version(), posted.version() + 1);
        prop_assert_eq!(reversal.version(), 1);
    }

    /// *For any* posted entry, the reversal holds `(C, D, amt, cur)` for each
    /// original `(D, C, amt, cur)`, in order, and its deltas cancel the original's.
    #[test]
    fn prop_reversal_is_posting_inverse(postings in prop::collection::vec(posting_pair(), 1..8)) {
        let posted = pending(postings).post(base_time()).unwrap();
        let (_, reversal) = posted.reverse(base_time(), "r").unwrap();

        prop_assert_eq!(reversal.status(), EntryStatus::Posted);
        prop_assert_eq!(reversal.postings().len(), posted.postings().len());
        for (original, inverse) in posted.postings().iter().zip(reversal.postings()) {
            prop_assert_eq!(inverse.debit_account(), original.credit_account());
            prop_assert_eq!(inverse.credit_account(), original.debit_account());
            prop_assert_eq!(inverse.amount(), original.amount());
            prop_assert_eq!(inverse.currency(), original.currency());
        }

        let mut combined = posted.postings().to_vec();
        combined.extend_from_slice(reversal.postings());
        prop_assert!(posting_deltas(&combined).is_empty());
    }
}
