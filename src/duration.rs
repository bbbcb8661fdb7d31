//! Duration parsing utilities.
//!
//! Two forms are supported:
//! - human readable strings made of `<number><unit>` components such as
//!   `"1m30s"`, `"1.5h"` or `"250ms"` ([`parse_duration`])
//! - a bare integer scaled by an explicit unit, used when a field carries a
//!   `unit:` option ([`scale_integer`])

use crate::error::DecodeError;
use std::time::Duration;

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Nanoseconds in one `unit`, or `None` when the unit is unknown
pub fn unit_nanos(unit: &str) -> Option<u128> {
    let nanos = match unit {
        "ns" => 1,
        "us" | "µs" | "μs" => 1_000,
        "ms" => 1_000_000,
        "s" => NANOS_PER_SEC,
        "m" => 60 * NANOS_PER_SEC,
        "h" => 3_600 * NANOS_PER_SEC,
        _ => return None,
    };
    Some(nanos)
}

/// Parse a human readable duration like `"1h2m3.5s"` or `"300ms"`.
///
/// A lone `"0"` is accepted without a unit. Negative durations are rejected.
///
/// ```
/// use svckit::duration::parse_duration;
/// use std::time::Duration;
///
/// assert_eq!(parse_duration("1m30s").unwrap(), Duration::from_secs(90));
/// assert_eq!(parse_duration("1.5s").unwrap(), Duration::from_millis(1500));
/// ```
pub fn parse_duration(raw: &str) -> Result<Duration, DecodeError> {
    const EXPECTED: &str = "duration";

    let s = raw.trim();
    let s = s.strip_prefix('+').unwrap_or(s);
    if s.starts_with('-') {
        return Err(DecodeError::invalid(raw, EXPECTED, "negative durations are not supported"));
    }
    if s == "0" {
        return Ok(Duration::ZERO);
    }
    if s.is_empty() {
        return Err(DecodeError::invalid(raw, EXPECTED, "empty value"));
    }

    let mut total: u128 = 0;
    let mut rest = s;

    while !rest.is_empty() {
        let int_len = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
        let (int_part, after_int) = rest.split_at(int_len);

        let (frac_part, after_num) = match after_int.strip_prefix('.') {
            Some(after_dot) => {
                let frac_len = after_dot
                    .find(|c: char| !c.is_ascii_digit())
                    .unwrap_or(after_dot.len());
                after_dot.split_at(frac_len)
            }
            None => ("", after_int),
        };

        if int_part.is_empty() && frac_part.is_empty() {
            return Err(DecodeError::invalid(raw, EXPECTED, "expected a number"));
        }

        let unit_len = after_num
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(after_num.len());
        let (unit, tail) = after_num.split_at(unit_len);
        if unit.is_empty() {
            return Err(DecodeError::invalid(raw, EXPECTED, "missing unit"));
        }
        let scale = unit_nanos(unit).ok_or_else(|| {
            DecodeError::invalid(raw, EXPECTED, format!("unknown unit {:?}", unit))
        })?;

        let whole: u128 = if int_part.is_empty() {
            0
        } else {
            int_part
                .parse()
                .map_err(|e| DecodeError::invalid(raw, EXPECTED, e))?
        };

        let mut component = whole
            .checked_mul(scale)
            .ok_or_else(|| DecodeError::invalid(raw, EXPECTED, "overflow"))?;

        if !frac_part.is_empty() {
            // keep at most 18 fractional digits so the power of ten fits
            let digits = &frac_part[..frac_part.len().min(18)];
            let frac: u128 = digits
                .parse()
                .map_err(|e| DecodeError::invalid(raw, EXPECTED, e))?;
            component = component
                .checked_add(frac * scale / 10u128.pow(digits.len() as u32))
                .ok_or_else(|| DecodeError::invalid(raw, EXPECTED, "overflow"))?;
        }

        total = total
            .checked_add(component)
            .ok_or_else(|| DecodeError::invalid(raw, EXPECTED, "overflow"))?;
        rest = tail;
    }

    nanos_to_duration(total).ok_or_else(|| DecodeError::invalid(raw, EXPECTED, "overflow"))
}

/// Parse `raw` as a non-negative integer count of `unit`
pub fn scale_integer(raw: &str, unit: &str) -> Result<Duration, DecodeError> {
    let scale = unit_nanos(unit).ok_or_else(|| DecodeError::UnknownUnit(unit.to_string()))?;
    let count: u64 = raw
        .trim()
        .parse()
        .map_err(|e| DecodeError::invalid(raw, "integer duration", e))?;

    (count as u128)
        .checked_mul(scale)
        .and_then(nanos_to_duration)
        .ok_or_else(|| DecodeError::invalid(raw, "integer duration", "overflow"))
}

fn nanos_to_duration(nanos: u128) -> Option<Duration> {
    let secs = u64::try_from(nanos / NANOS_PER_SEC).ok()?;
    Some(Duration::new(secs, (nanos % NANOS_PER_SEC) as u32))
}
