//! Resolution of absolute and relative date tokens
use crate::clock::Clock;
use crate::error::ValidationError;
use chrono::{DateTime, Days, NaiveDate, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use std::sync::Arc;

lazy_static! {
    static ref ABSOLUTE: Regex = Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap();
    static ref RELATIVE: Regex = Regex::new(r"^-(\d+)([dwmy])$").unwrap();
}

/// Example inputs reported back when a token cannot be read.
pub const ACCEPTED_DATE_FORMATS: &[&str] = &["2025-06-13", "-7d", "-2w", "-1m", "-1y"];

/// Resolves date tokens against an injected clock.
#[derive(Clone)]
pub struct DateResolver {
    clock: Arc<dyn Clock>,
}

impl DateResolver {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    pub fn resolve(&self, token: &str) -> Result<NaiveDate, ValidationError> {
        resolve_date(token, self.clock.now())
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.now().date_naive()
    }
}

/// Whether `token` has the `-<N><unit>` shape of a relative date.
pub fn is_relative_date(token: &str) -> bool {
    RELATIVE.is_match(token.trim())
}

/// Resolves `YYYY-MM-DD` unchanged and `-<N><unit>` relative to `now`.
///
/// Units are `d` (1 day), `w` (7), `m` (30) and `y` (365). The result is
/// always a whole calendar date.
pub fn resolve_date(token: &str, now: DateTime<Utc>) -> Result<NaiveDate, ValidationError> {
    let token = token.trim();
    let unrecognized = || ValidationError::UnrecognizedDateFormat {
        input: token.to_string(),
        accepted: ACCEPTED_DATE_FORMATS.to_vec(),
    };

    if ABSOLUTE.is_match(token) {
        return NaiveDate::parse_from_str(token, "%Y-%m-%d").map_err(|_| unrecognized());
    }

    let caps = RELATIVE.captures(token).ok_or_else(unrecognized)?;
    let count: u64 = caps[1].parse().map_err(|_| unrecognized())?;
    let unit_days: u64 = match &caps[2] {
        "d" => 1,
        "w" => 7,
        "m" => 30,
        "y" => 365,
        _ => return Err(unrecognized()),
    };
    let days = count.checked_mul(unit_days).ok_or_else(unrecognized)?;

    now.date_naive()
        .checked_sub_days(Days::new(days))
        .ok_or_else(unrecognized)
}
