//! Duration strings as they appear in property files.
//!
//! Accepted forms:
//! - a bare integer, read as milliseconds (`500`)
//! - an integer with a unit suffix: `ns`, `us`, `ms`, `s`, `m`, `h`, `d` (`90s`, `10m`)
//! - ISO-8601 `PnDTnHnMnS`, seconds may be fractional (`PT1M30S`, `PT0.5S`, `P1D`)

use std::time::Duration;

/// Error returned when a duration string cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DurationParseError {
    #[error("duration is empty")]
    Empty,
    #[error("negative durations are not allowed: '{0}'")]
    Negative(String),
    #[error("'{0}' is not a valid duration")]
    Invalid(String),
    #[error("duration '{0}' overflows")]
    Overflow(String),
}

/// Parse a duration string.
pub fn parse_duration(input: &str) -> Result<Duration, DurationParseError> {
    let value = input.trim();
    if value.is_empty() {
        return Err(DurationParseError::Empty);
    }
    if value.starts_with('-') {
        return Err(DurationParseError::Negative(value.to_string()));
    }
    let value = value.strip_prefix('+').unwrap_or(value);

    if value.starts_with(['P', 'p']) {
        parse_iso(value).ok_or_else(|| DurationParseError::Invalid(input.trim().to_string()))?
    } else {
        parse_simple(value, input.trim())
    }
}

fn parse_simple(value: &str, original: &str) -> Result<Duration, DurationParseError> {
    let split = value
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(value.len());
    let (digits, unit) = value.split_at(split);
    if digits.is_empty() {
        return Err(DurationParseError::Invalid(original.to_string()));
    }
    let amount: u64 = digits
        .parse()
        .map_err(|_| DurationParseError::Overflow(original.to_string()))?;

    let overflow = || DurationParseError::Overflow(original.to_string());
    let duration = match unit.trim().to_ascii_lowercase().as_str() {
        "" | "ms" => Duration::from_millis(amount),
        "ns" => Duration::from_nanos(amount),
        "us" => Duration::from_micros(amount),
        "s" => Duration::from_secs(amount),
        "m" => Duration::from_secs(amount.checked_mul(60).ok_or_else(overflow)?),
        "h" => Duration::from_secs(amount.checked_mul(3600).ok_or_else(overflow)?),
        "d" => Duration::from_secs(amount.checked_mul(86_400).ok_or_else(overflow)?),
        _ => return Err(DurationParseError::Invalid(original.to_string())),
    };
    Ok(duration)
}

// Outer None: malformed. Inner Err: well-formed but overflowing.
fn parse_iso(value: &str) -> Option<Result<Duration, DurationParseError>> {
    let upper = value.to_ascii_uppercase();
    let body = upper.strip_prefix('P')?;
    let (date_part, time_part) = match body.split_once('T') {
        Some((date, time)) => {
            if time.is_empty() {
                return None;
            }
            (date, Some(time))
        }
        None => (body, None),
    };
    if date_part.is_empty() && time_part.is_none() {
        return None;
    }

    let mut total = Duration::ZERO;
    let overflow = || DurationParseError::Overflow(value.to_string());

    if !date_part.is_empty() {
        let days: u64 = date_part.strip_suffix('D')?.parse().ok()?;
        let secs = match days.checked_mul(86_400) {
            Some(secs) => secs,
            None => return Some(Err(overflow())),
        };
        total += Duration::from_secs(secs);
    }

    if let Some(mut rest) = time_part {
        let mut last_rank = 0;
        while !rest.is_empty() {
            let unit_at = rest.find(['H', 'M', 'S'])?;
            let (number, tail) = rest.split_at(unit_at);
            let unit = tail.as_bytes()[0];
            rest = &tail[1..];

            let (rank, secs_per_unit) = match unit {
                b'H' => (1, 3600.0),
                b'M' => (2, 60.0),
                _ => (3, 1.0),
            };
            if rank <= last_rank || number.is_empty() {
                return None;
            }
            last_rank = rank;

            let amount: f64 = number.parse().ok()?;
            if !amount.is_finite() || amount < 0.0 || (rank != 3 && amount.fract() != 0.0) {
                return None;
            }
            let part = match Duration::try_from_secs_f64(amount * secs_per_unit) {
                Ok(part) => part,
                Err(_) => return Some(Err(overflow())),
            };
            total = match total.checked_add(part) {
                Some(total) => total,
                None => return Some(Err(overflow())),
            };
        }
    }

    Some(Ok(total))
}
