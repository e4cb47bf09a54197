//! Input types for the write use cases.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use tally_core::ledger::{AccountCode, LedgerError, PostingPair};
use tally_shared::types::TenantId;

/// One debit/credit line as submitted by a caller.
#[derive(Debug, Clone, Deserialize)]
pub struct PostingRequest {
    /// Account to debit (`NNNN` or `NNNN-NNN`).
    pub debit_account: String,
    /// Account to credit.
    pub credit_account: String,
    /// Positive amount.
    pub amount: Decimal,
    /// ISO 4217 code.
    pub currency: String,
    /// Line description.
    #[serde(default)]
    pub description: String,
}

impl PostingRequest {
    /// Builds the validated posting pair.
    ///
    /// # Errors
    ///
    /// Returns the first value object that fails validation.
    pub fn to_posting(&self) -> Result<PostingPair, LedgerError> {
        PostingPair::new(
            AccountCode::new(&self.debit_account)?,
            AccountCode::new(&self.credit_account)?,
            self.amount,
            &self.currency,
            self.description.clone(),
        )
    }
}

/// A journal entry to create.
#[derive(Debug, Clone, Deserialize)]
pub struct NewJournalEntry {
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Accounting date.
    pub effective_date: NaiveDate,
    /// Posting lines, at least one.
    pub postings: Vec<PostingRequest>,
    /// Free-text description.
    #[serde(default)]
    pub description: String,
    /// External reference.
    #[serde(default)]
    pub reference: String,
}

impl NewJournalEntry {
    /// Builds every posting pair, failing on the first invalid line.
    ///
    /// # Errors
    ///
    /// Returns the validation error of the first invalid line.
    pub fn to_postings(&self) -> Result<Vec<PostingPair>, LedgerError> {
        self.postings.iter().map(PostingRequest::to_posting).collect()
    }
}
