//! Nostro reconciliation: external bank statement lines against internal
//! ledger lines for one account.
//!
//! Matching is by reference, then direction, then amount. Each internal line
//! is consumed by at most one statement line, in statement order.

use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::error::LedgerError;

/// Debit/credit mark of a statement or ledger line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// `D`
    #[serde(rename = "D")]
    Debit,
    /// `C`
    #[serde(rename = "C")]
    Credit,
}

impl Direction {
    /// Returns the statement mark.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Debit => "D",
            Self::Credit => "C",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome for one external statement line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReconciliationStatus {
    /// Reference, direction and amount all agree.
    Matched,
    /// Reference and direction agree, amount does not.
    AmountMismatch,
    /// No unused internal line with this reference and direction.
    MissingLocal,
}

impl ReconciliationStatus {
    /// Returns the reported string form.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Matched => "MATCHED",
            Self::AmountMismatch => "AMOUNT_MISMATCH",
            Self::MissingLocal => "MISSING_LOCAL",
        }
    }
}

impl std::fmt::Display for ReconciliationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One line of an external bank statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalStatementEntry {
    /// Bank reference used for matching.
    pub reference: String,
    /// Value date on the statement.
    pub value_date: NaiveDate,
    /// Debit or credit.
    pub direction: Direction,
    /// Line amount.
    pub amount: Decimal,
    /// Free-text details.
    pub details: String,
}

/// One internal ledger line on the reconciled account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InternalLedgerEntry {
    /// Id of the journal entry the line belongs to.
    pub entry_id: String,
    /// Reference recorded on the entry.
    pub reference: String,
    /// Effective date of the entry.
    pub value_date: NaiveDate,
    /// Debit or credit.
    pub direction: Direction,
    /// Line amount.
    pub amount: Decimal,
    /// Entry description.
    pub description: String,
}

/// Result for one external line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconciliationResult {
    /// The statement line.
    pub external: ExternalStatementEntry,
    /// The internal line it was paired with, if any.
    pub internal: Option<InternalLedgerEntry>,
    /// Outcome.
    pub status: ReconciliationStatus,
    /// `external - internal`; zero unless `AmountMismatch`.
    pub amount_delta: Decimal,
    /// Human-readable explanation.
    pub remarks: String,
}

/// Outcome of a full reconciliation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconciliationSummary {
    /// Reconciled account.
    pub account_id: String,
    /// Statement date.
    pub statement_date: NaiveDate,
    /// One result per external line, in statement order.
    pub results: Vec<ReconciliationResult>,
    /// Number of external lines.
    pub total_external: usize,
    /// Number of internal lines.
    pub total_internal: usize,
    /// External lines with status `Matched`.
    pub matched: usize,
    /// External lines with status `AmountMismatch`.
    pub amount_mismatches: usize,
    /// External lines with status `MissingLocal`.
    pub missing_local: usize,
    /// Internal lines no external line was paired with.
    pub unmatched_local: usize,
}

impl ReconciliationSummary {
    /// True when every line on both sides matched exactly.
    #[must_use]
    pub const fn is_clean(&self) -> bool {
        self.matched == self.total_external && self.unmatched_local == 0
    }
}

/// Reconciles a statement against internal lines.
///
/// For each statement line, the first unused internal line with the same
/// reference and direction is taken. Equal amounts match; different amounts
/// are reported as `AmountMismatch` and still consume the internal line.
/// Amounts compare by value, so `10.0` equals `10.00`.
///
/// # Errors
///
/// Returns `LedgerError::MissingReconciliationAccount` for a blank account id.
pub fn reconcile(
    account_id: &str,
    statement_date: NaiveDate,
    external: &[ExternalStatementEntry],
    internal: &[InternalLedgerEntry],
) -> Result<ReconciliationSummary, LedgerError> {
    if account_id.trim().is_empty() {
        return Err(LedgerError::MissingReconciliationAccount);
    }

    let mut by_reference: HashMap<&str, Vec<usize>> = HashMap::new();
    for (idx, line) in internal.iter().enumerate() {
        by_reference.entry(line.reference.as_str()).or_default().push(idx);
    }
    let mut used: HashSet<usize> = HashSet::new();

    let mut summary = ReconciliationSummary {
        account_id: account_id.to_string(),
        statement_date,
        results: Vec::with_capacity(external.len()),
        total_external: external.len(),
        total_internal: internal.len(),
        matched: 0,
        amount_mismatches: 0,
        missing_local: 0,
        unmatched_local: 0,
    };

    for ext in external {
        let Some(candidates) = by_reference.get(ext.reference.as_str()) else {
            summary.missing_local += 1;
            summary.results.push(ReconciliationResult {
                external: ext.clone(),
                internal: None,
                status: ReconciliationStatus::MissingLocal,
                amount_delta: Decimal::ZERO,
                remarks: format!("no internal entry found for reference {}", ext.reference),
            });
            continue;
        };

        let candidate = candidates
            .iter()
            .copied()
            .find(|idx| !used.contains(idx) && internal[*idx].direction == ext.direction);

        let result = match candidate {
            None => {
                summary.missing_local += 1;
                ReconciliationResult {
                    external: ext.clone(),
                    internal: None,
                    status: ReconciliationStatus::MissingLocal,
                    amount_delta: Decimal::ZERO,
                    remarks: format!(
                        "no unmatched internal entry for reference {} with direction {}",
                        ext.reference, ext.direction
                    ),
                }
            }
            Some(idx) => {
                used.insert(idx);
                let line = &internal[idx];
                if line.amount == ext.amount {
                    summary.matched += 1;
                    ReconciliationResult {
                        external: ext.clone(),
                        internal: Some(line.clone()),
                        status: ReconciliationStatus::Matched,
                        amount_delta: Decimal::ZERO,
                        remarks: "exact match".to_string(),
                    }
                } else {
                    summary.amount_mismatches += 1;
                    let delta = ext.amount - line.amount;
                    ReconciliationResult {
                        external: ext.clone(),
                        internal: Some(line.clone()),
                        status: ReconciliationStatus::AmountMismatch,
                        amount_delta: delta,
                        remarks: format!("amount differs by {delta}"),
                    }
                }
            }
        };
        summary.results.push(result);
    }

    summary.unmatched_local = internal.len() - used.len();
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 15).unwrap()
    }

    fn ext(reference: &str, direction: Direction, amount: Decimal) -> ExternalStatementEntry {
        ExternalStatementEntry {
            reference: reference.to_string(),
            value_date: date(),
            direction,
            amount,
            details: String::new(),
        }
    }

    fn int(id: &str, reference: &str, direction: Direction, amount: Decimal) -> InternalLedgerEntry {
        InternalLedgerEntry {
            entry_id: id.to_string(),
            reference: reference.to_string(),
            value_date: date(),
            direction,
            amount,
            description: String::new(),
        }
    }

    #[test]
    fn test_exact_match() {
        let summary = reconcile(
            "NOSTRO-USD",
            date(),
            &[ext("REF1", Direction::Credit, dec!(100.00))],
            &[int("e1", "REF1", Direction::Credit, dec!(100.0))],
        )
        .unwrap();

        assert_eq!(summary.matched, 1);
        assert_eq!(summary.results[0].status, ReconciliationStatus::Matched);
        assert_eq!(summary.results[0].internal.as_ref().unwrap().entry_id, "e1");
        assert_eq!(summary.results[0].amount_delta, Decimal::ZERO);
        assert!(summary.is_clean());
    }

    #[test]
    fn test_amount_mismatch_reports_delta() {
        let summary = reconcile(
            "NOSTRO-USD",
            date(),
            &[ext("REF1", Direction::Debit, dec!(100))],
            &[int("e1", "REF1", Direction::Debit, dec!(120))],
        )
        .unwrap();

        let result = &summary.results[0];
        assert_eq!(result.status, ReconciliationStatus::AmountMismatch);
        assert_eq!(result.amount_delta, dec!(-20));
        assert_eq!(summary.amount_mismatches, 1);
        assert_eq!(summary.unmatched_local, 0);
        assert!(!summary.is_clean());
    }

    #[test]
    fn test_missing_local_for_unknown_reference() {
        let summary = reconcile(
            "NOSTRO-USD",
            date(),
            &[ext("REF9", Direction::Credit, dec!(5))],
            &[int("e1", "REF1", Direction::Credit, dec!(5))],
        )
        .unwrap();

        assert_eq!(summary.results[0].status, ReconciliationStatus::MissingLocal);
        assert!(summary.results[0].internal.is_none());
        assert_eq!(summary.missing_local, 1);
        assert_eq!(summary.unmatched_local, 1);
    }

    #[test]
    fn test_direction_must_agree() {
        let summary = reconcile(
            "NOSTRO-USD",
            date(),
            &[ext("REF1", Direction::Credit, dec!(5))],
            &[int("e1", "REF1", Direction::Debit, dec!(5))],
        )
        .unwrap();

        assert_eq!(summary.results[0].status, ReconciliationStatus::MissingLocal);
        assert_eq!(summary.unmatched_local, 1);
    }

    #[test]
    fn test_internal_line_used_once() {
        let summary = reconcile(
            "NOSTRO-USD",
            date(),
            &[
                ext("REF1", Direction::Credit, dec!(5)),
                ext("REF1", Direction::Credit, dec!(5)),
                ext("REF1", Direction::Credit, dec!(5)),
            ],
            &[
                int("e1", "REF1", Direction::Credit, dec!(5)),
                int("e2", "REF1", Direction::Credit, dec!(7)),
            ],
        )
        .unwrap();

        let statuses: Vec<_> = summary.results.iter().map(|r| r.status).collect();
        assert_eq!(
            statuses,
            vec![
                ReconciliationStatus::Matched,
                ReconciliationStatus::AmountMismatch,
                ReconciliationStatus::MissingLocal,
            ]
        );
        assert_eq!(summary.results[1].amount_delta, dec!(-2));
        assert_eq!(summary.unmatched_local, 0);
    }

    #[test]
    fn test_unmatched_local_counted() {
        let summary = reconcile(
            "NOSTRO-USD",
            date(),
            &[ext("REF1", Direction::Debit, dec!(1))],
            &[
                int("e1", "REF1", Direction::Debit, dec!(1)),
                int("e2", "REF2", Direction::Debit, dec!(2)),
                int("e3", "REF3", Direction::Credit, dec!(3)),
            ],
        )
        .unwrap();

        assert_eq!(summary.total_external, 1);
        assert_eq!(summary.total_internal, 3);
        assert_eq!(summary.matched, 1);
        assert_eq!(summary.unmatched_local, 2);
    }

    #[test]
    fn test_blank_account_rejected() {
        assert_eq!(
            reconcile(" ", date(), &[], &[]),
            Err(LedgerError::MissingReconciliationAccount)
        );
    }

    #[test]
    fn test_status_strings() {
        assert_eq!(ReconciliationStatus::AmountMismatch.as_str(), "AMOUNT_MISMATCH");
        assert_eq!(
            serde_json::to_string(&ReconciliationStatus::MissingLocal).unwrap(),
            "\"MISSING_LOCAL\""
        );
        assert_eq!(serde_json::to_string(&Direction::Debit).unwrap(), "\"D\"");
    }
}
