//! Cron expression normalization and parsing.

use std::str::FromStr;

use cron::Schedule;

use vigil_core::{DetectorError, Result};

/// Normalize a 5-field cron expression to 6-field by prepending "0 " for seconds.
///
/// The `cron` crate requires at least 6 fields: `sec min hour day-of-month month
/// day-of-week [year]`. Operators often write standard 5-field cron.
pub fn normalize_cron(expression: &str) -> String {
    let trimmed = expression.trim();
    if trimmed.split_whitespace().count() == 5 {
        format!("0 {}", trimmed)
    } else {
        trimmed.to_string()
    }
}

/// Parse a cron expression, normalizing it first.
pub fn parse_schedule(expression: &str) -> Result<Schedule> {
    let normalized = normalize_cron(expression);
    Schedule::from_str(&normalized).map_err(|e| {
        DetectorError::Validation(format!("invalid cron expression {:?}: {}", expression, e))
    })
}
