//! Compact season identifiers.
//!
//! A season is written as two 2-digit year suffixes, `"2324"` for 2023-24.
//! Input that is not such a pair is read as the 4-digit year the season
//! starts in, so `"2023"` and `"2324"` name the same season while `"2021"`
//! already is a pair (2020-21).

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::Date;

use crate::ValidationError;

/// Default season window when a league does not configure one: July to June.
pub const DEFAULT_START_MONTH: u8 = 7;
pub const DEFAULT_END_MONTH: u8 = 6;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Season(String);

impl Season {
    /// Season that starts in `year`, e.g. 2023 gives `"2324"`.
    pub fn from_start_year(year: i32) -> Self {
        let start = year.rem_euclid(100);
        let end = (year + 1).rem_euclid(100);
        Self(format!("{start:02}{end:02}"))
    }

    pub fn parse(value: &str) -> Result<Self, ValidationError> {
        let trimmed = value.trim();
        let invalid = || ValidationError::InvalidSeason {
            value: value.to_string(),
        };
        if trimmed.len() != 4 || !trimmed.bytes().all(|byte| byte.is_ascii_digit()) {
            return Err(invalid());
        }

        let first: i32 = trimmed[..2].parse().map_err(|_| invalid())?;
        let second: i32 = trimmed[2..].parse().map_err(|_| invalid())?;
        if (first + 1) % 100 == second {
            return Ok(Self(trimmed.to_string()));
        }

        let year: i32 = trimmed.parse().map_err(|_| invalid())?;
        Ok(Self::from_start_year(year))
    }

    /// One season per start year in `start..=end`.
    pub fn historical_range(start: i32, end: i32) -> Result<Vec<Self>, ValidationError> {
        if start > end {
            return Err(ValidationError::InvalidYearRange { start, end });
        }
        Ok((start..=end).map(Self::from_start_year).collect())
    }

    /// The season in play on `today` for a league running from `start_month`
    /// to `end_month`.
    ///
    /// Leagues that straddle the new year (start month after end month) are
    /// in the season that began this year once `start_month` is reached and
    /// in last year's season before that. Calendar-year leagues are always in
    /// the season that began this year.
    pub fn current_for(today: Date, start_month: u8, end_month: u8) -> Result<Self, ValidationError> {
        for month in [start_month, end_month] {
            if !(1..=12).contains(&month) {
                return Err(ValidationError::InvalidMonth { value: month });
            }
        }

        let month = u8::from(today.month());
        let year = today.year();
        let start_year = if start_month > end_month && month < start_month {
            year - 1
        } else {
            year
        };
        Ok(Self::from_start_year(start_year))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Season {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Season {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

impl TryFrom<String> for Season {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Season> for String {
    fn from(value: Season) -> Self {
        value.0
    }
}
