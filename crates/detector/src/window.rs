//! Detection window computation.
//!
//! A window is the half-open `[start, end)` range one execution evaluates.
//! Bounds default to "now minus delay" for the end and "end minus window size"
//! for the start; either can be pinned explicitly with an ISO-8601 timestamp.

use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::Serialize;

use vigil_core::{AnomalyFunctionSpec, DetectorError, Result};

/// Concrete `[start, end)` range for one execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DetectionWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DetectionWindow {
    /// Reject empty or inverted windows.
    pub fn validate(&self) -> Result<()> {
        if self.start >= self.end {
            return Err(DetectorError::Validation(format!(
                "window start {} is not before end {}",
                self.start.to_rfc3339(),
                self.end.to_rfc3339()
            )));
        }
        Ok(())
    }
}

impl fmt::Display for DetectionWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start.to_rfc3339(), self.end.to_rfc3339())
    }
}

/// Explicit window overrides for an ad-hoc run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowBounds {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl WindowBounds {
    /// Parse optional ISO-8601 bounds. When both are given they must be ordered.
    pub fn parse(start: Option<&str>, end: Option<&str>) -> Result<Self> {
        let bounds = Self {
            start: start.map(parse_instant).transpose()?,
            end: end.map(parse_instant).transpose()?,
        };
        if let (Some(s), Some(e)) = (bounds.start, bounds.end) {
            DetectionWindow { start: s, end: e }.validate()?;
        }
        Ok(bounds)
    }
}

/// Parse an ISO-8601 instant.
///
/// Accepts RFC 3339 with an offset, a local date-time without offset (taken as
/// UTC, seconds and fraction optional) and a bare date (midnight UTC).
pub fn parse_instant(value: &str) -> Result<DateTime<Utc>> {
    let trimmed = value.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(Utc.from_utc_datetime(&naive));
        }
    }

    if let Some(midnight) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
    {
        return Ok(Utc.from_utc_datetime(&midnight));
    }

    Err(DetectorError::Validation(format!(
        "invalid ISO-8601 timestamp: {:?}",
        value
    )))
}

/// Resolve the window for `spec` at instant `now`, honoring explicit bounds.
pub fn resolve_window(
    spec: &AnomalyFunctionSpec,
    now: DateTime<Utc>,
    bounds: WindowBounds,
) -> Result<DetectionWindow> {
    let end = match bounds.end {
        Some(end) => end,
        None => now.checked_sub_signed(spec.delay_duration()).ok_or_else(|| {
            DetectorError::Validation(format!("window delay of function {} out of range", spec.id))
        })?,
    };

    let start = match bounds.start {
        Some(start) => start,
        None => end.checked_sub_signed(spec.window_duration()).ok_or_else(|| {
            DetectorError::Validation(format!("window size of function {} out of range", spec.id))
        })?,
    };

    Ok(DetectionWindow { start, end })
}

/// String-bounds convenience over [`resolve_window`].
pub fn compute_window(
    spec: &AnomalyFunctionSpec,
    now: DateTime<Utc>,
    start: Option<&str>,
    end: Option<&str>,
) -> Result<DetectionWindow> {
    let bounds = WindowBounds {
        start: start.map(parse_instant).transpose()?,
        end: end.map(parse_instant).transpose()?,
    };
    resolve_window(spec, now, bounds)
}
