//! Ledger account codes.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::error::LedgerError;

static ACCOUNT_CODE_PATTERN: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^[0-9]{4}(-[0-9]{3})?$").ok());

/// A ledger account code: four digits, optionally followed by `-` and a
/// three-digit sub-account (`1000`, `1000-001`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AccountCode(String);

impl AccountCode {
    /// Parses and validates an account code.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::InvalidAccountCode` if the code does not match
    /// `NNNN` or `NNNN-NNN`.
    pub fn new(code: &str) -> Result<Self, LedgerError> {
        let matches = ACCOUNT_CODE_PATTERN
            .as_ref()
            .is_some_and(|pattern| pattern.is_match(code));
        if matches {
            Ok(Self(code.to_string()))
        } else {
            Err(LedgerError::InvalidAccountCode(code.to_string()))
        }
    }

    /// Returns the full code.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the four-digit main account.
    #[must_use]
    pub fn main_account(&self) -> &str {
        &self.0[..4]
    }

    /// Returns the three-digit sub-account, if any.
    #[must_use]
    pub fn sub_account(&self) -> Option<&str> {
        self.0.get(5..)
    }
}

impl std::fmt::Display for AccountCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for AccountCode {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for AccountCode {
    type Error = LedgerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<AccountCode> for String {
    fn from(value: AccountCode) -> Self {
        value.0
    }
}

impl AsRef<str> for AccountCode {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
