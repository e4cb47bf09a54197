//! Fiscal periods (calendar months) and their open/closed status.

use chrono::{Datelike, Months, NaiveDate};
use serde::{Deserialize, Serialize};

use super::error::LedgerError;

/// First supported fiscal year.
pub const MIN_FISCAL_YEAR: i32 = 2000;
/// Last supported fiscal year.
pub const MAX_FISCAL_YEAR: i32 = 2100;

/// A year and month accounting window, rendered as `YYYY-MM`.
///
/// Start and end dates are computed once at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FiscalPeriod {
    year: i32,
    month: u32,
    start: NaiveDate,
    end: NaiveDate,
}

impl FiscalPeriod {
    /// Creates a fiscal period.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFiscalYear` outside 2000..=2100 and
    /// `InvalidFiscalMonth` outside 1..=12.
    pub fn new(year: i32, month: u32) -> Result<Self, LedgerError> {
        if !(MIN_FISCAL_YEAR..=MAX_FISCAL_YEAR).contains(&year) {
            return Err(LedgerError::InvalidFiscalYear(year));
        }
        if !(1..=12).contains(&month) {
            return Err(LedgerError::InvalidFiscalMonth(month));
        }
        let start =
            NaiveDate::from_ymd_opt(year, month, 1).ok_or(LedgerError::InvalidFiscalMonth(month))?;
        let end = start
            .checked_add_months(Months::new(1))
            .and_then(|next| next.pred_opt())
            .ok_or(LedgerError::InvalidFiscalYear(year))?;

        Ok(Self {
            year,
            month,
            start,
            end,
        })
    }

    /// Returns the period containing `date`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFiscalYear` if the date's year is out of range.
    pub fn from_date(date: NaiveDate) -> Result<Self, LedgerError> {
        Self::new(date.year(), date.month())
    }

    /// The fiscal year.
    #[must_use]
    pub const fn year(&self) -> i32 {
        self.year
    }

    /// The month, 1..=12.
    #[must_use]
    pub const fn month(&self) -> u32 {
        self.month
    }

    /// First day of the period.
    #[must_use]
    pub const fn start_date(&self) -> NaiveDate {
        self.start
    }

    /// Last day of the period (28th to 31st).
    #[must_use]
    pub const fn end_date(&self) -> NaiveDate {
        self.end
    }

    /// Returns true if `date` falls within the period, inclusive.
    #[must_use]
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// The following period, rolling over into January of the next year.
    /// `None` past December 2100.
    #[must_use]
    pub fn next(&self) -> Option<Self> {
        let (year, month) = if self.month == 12 {
            (self.year + 1, 1)
        } else {
            (self.year, self.month + 1)
        };
        Self::new(year, month).ok()
    }

    /// The preceding period, rolling back into December of the previous
    /// year. `None` before January 2000.
    #[must_use]
    pub fn previous(&self) -> Option<Self> {
        let (year, month) = if self.month == 1 {
            (self.year - 1, 12)
        } else {
            (self.year, self.month - 1)
        };
        Self::new(year, month).ok()
    }
}

impl std::fmt::Display for FiscalPeriod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl std::str::FromStr for FiscalPeriod {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || LedgerError::InvalidFiscalPeriod(s.to_string());
        let (year, month) = s.split_once('-').ok_or_else(invalid)?;
        if year.len() != 4 || month.len() != 2 {
            return Err(invalid());
        }
        let year = year.parse::<i32>().map_err(|_| invalid())?;
        let month = month.parse::<u32>().map_err(|_| invalid())?;
        Self::new(year, month)
    }
}

impl TryFrom<String> for FiscalPeriod {
    type Error = LedgerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<FiscalPeriod> for String {
    fn from(value: FiscalPeriod) -> Self {
        value.to_string()
    }
}

/// Whether a tenant may still post into a period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PeriodStatus {
    /// Postings allowed. Periods without a stored status are open.
    #[default]
    Open,
    /// Frozen for reporting.
    Closed,
}

impl PeriodStatus {
    /// Returns the persisted string form.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::Closed => "CLOSED",
        }
    }
}

impl std::fmt::Display for PeriodStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PeriodStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OPEN" => Ok(Self::Open),
            "CLOSED" => Ok(Self::Closed),
            other => Err(format!("unknown period status: {other}")),
        }
    }
}
