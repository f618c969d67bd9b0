//! # Historical years
//! Store records carry the year as free text (`"1920"`, `"44 BC"`, `"AD 79"`).
//! We parse into astronomical numbering (1 BCE = 0, 2 BCE = -1) so that age
//! arithmetic and floor comparisons work across the era boundary.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A year in astronomical numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HistoricalYear(i32);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum YearError {
    #[error("empty year")]
    Empty,
    #[error("year `{0}` is not a number")]
    NotNumeric(String),
    #[error("year `{0}` has an era marker but no positive year")]
    BadEra(String),
}

impl HistoricalYear {
    /// Year of the common era (`ce_year` >= 1).
    pub fn ce(ce_year: i32) -> Self {
        Self(ce_year)
    }

    /// Year before the common era (`bce_year` >= 1), e.g. 44 BCE -> -43.
    pub fn bce(bce_year: i32) -> Self {
        Self(1 - bce_year)
    }

    pub fn value(self) -> i32 {
        self.0
    }

    /// Whole years from `self` to `current`.
    pub fn years_until(self, current: HistoricalYear) -> i64 {
        i64::from(current.0) - i64::from(self.0)
    }
}

impl fmt::Display for HistoricalYear {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 >= 1 {
            write!(f, "{}", self.0)
        } else {
            write!(f, "{} BC", 1 - i64::from(self.0))
        }
    }
}

impl FromStr for HistoricalYear {
    type Err = YearError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let s = raw.trim();
        if s.is_empty() {
            return Err(YearError::Empty);
        }

        let upper = s.to_ascii_uppercase();
        let (digits, bce) = if let Some(rest) = strip_era_suffix(&upper, &["BCE", "B.C.E.", "BC", "B.C."]) {
            (rest, true)
        } else if let Some(rest) = strip_era_suffix(&upper, &["CE", "C.E.", "AD", "A.D."]) {
            (rest, false)
        } else if let Some(rest) = upper.strip_prefix("AD").or_else(|| upper.strip_prefix("A.D.")) {
            (rest.trim(), false)
        } else {
            // plain astronomical number, sign allowed
            return s
                .parse::<i32>()
                .map(HistoricalYear)
                .map_err(|_| YearError::NotNumeric(s.to_string()));
        };

        let n: i32 = digits
            .parse()
            .map_err(|_| YearError::NotNumeric(s.to_string()))?;
        if n < 1 {
            return Err(YearError::BadEra(s.to_string()));
        }
        Ok(if bce { Self::bce(n) } else { Self::ce(n) })
    }
}

fn strip_era_suffix<'a>(s: &'a str, markers: &[&str]) -> Option<&'a str> {
    markers
        .iter()
        .find_map(|m| s.strip_suffix(m))
        .map(str::trim)
        .filter(|rest| !rest.is_empty())
}

/// How the configured year floor is compared against an event's year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum YearComparison {
    /// Parse both sides; unparseable event years never pass.
    #[default]
    Numeric,
    /// Plain string comparison. Kept for stores whose year field was
    /// always four digits; `"500" > "1900"` under this policy.
    Lexical,
}

/// Configured lower bound for event years (exclusive).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YearFloor {
    raw: String,
    parsed: Option<HistoricalYear>,
}

impl YearFloor {
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let parsed = raw.parse().ok();
        Self { raw, parsed }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Whether `admits` can ever say yes under `cmp`.
    pub fn is_usable(&self, cmp: YearComparison) -> bool {
        match cmp {
            YearComparison::Lexical => !self.raw.is_empty(),
            YearComparison::Numeric => self.parsed.is_some(),
        }
    }

    /// True when `year` is strictly later than the floor under `cmp`.
    pub fn admits(&self, year: &str, cmp: YearComparison) -> Result<bool, YearError> {
        match cmp {
            YearComparison::Lexical => Ok(year.cmp(self.raw.as_str()) == Ordering::Greater),
            YearComparison::Numeric => {
                let floor = self
                    .parsed
                    .ok_or_else(|| YearError::NotNumeric(self.raw.clone()))?;
                let y: HistoricalYear = year.parse()?;
                Ok(y > floor)
            }
        }
    }
}
