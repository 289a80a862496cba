use std::time::Duration;

use super::types::AggregateError;

/// Smallest delay the `agg` command accepts between two requests
pub const MIN_INTERVAL: Duration = Duration::from_secs(10);

/// Parse the delay between fetches and enforce the `min` floor.
///
/// Accepts Go-style duration strings: a sequence of decimal numbers, each
/// with an optional fraction and a unit suffix (`ns`, `us`, `µs`, `ms`, `s`,
/// `m`, `h`), e.g. `"1m"`, `"1h30m"`, `"1.5m"`, `"500ms"`.
///
/// # Errors
///
/// - [`AggregateError::InvalidInterval`] when `raw` is not a duration
/// - [`AggregateError::IntervalTooShort`] when it is negative or below `min`
pub fn parse_interval(raw: &str, min: Duration) -> Result<Duration, AggregateError> {
    let trimmed = raw.trim();
    let (negative, nanos) =
        parse_nanos(trimmed).ok_or_else(|| AggregateError::InvalidInterval(raw.to_string()))?;

    // Bounded by i64::MAX in parse_nanos
    let interval = Duration::from_nanos(nanos as u64);
    if (negative && nanos > 0) || interval < min {
        return Err(AggregateError::IntervalTooShort(min));
    }
    Ok(interval)
}

fn unit_nanos(unit: &str) -> Option<u128> {
    Some(match unit {
        "ns" => 1,
        "us" | "µs" | "μs" => 1_000,
        "ms" => 1_000_000,
        "s" => 1_000_000_000,
        "m" => 60 * 1_000_000_000,
        "h" => 3_600 * 1_000_000_000,
        _ => return None,
    })
}

/// Returns the sign and magnitude in nanoseconds, or `None` when the string
/// is malformed or does not fit in an `i64` of nanoseconds.
fn parse_nanos(s: &str) -> Option<(bool, u128)> {
    let (negative, mut rest) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };

    // A bare zero needs no unit
    if rest == "0" {
        return Some((negative, 0));
    }
    if rest.is_empty() {
        return None;
    }

    let mut total: u128 = 0;
    while !rest.is_empty() {
        let int_len = rest.bytes().take_while(u8::is_ascii_digit).count();
        let int_part = &rest[..int_len];
        rest = &rest[int_len..];

        let mut frac_part = "";
        if let Some(after_dot) = rest.strip_prefix('.') {
            let frac_len = after_dot.bytes().take_while(u8::is_ascii_digit).count();
            frac_part = &after_dot[..frac_len];
            rest = &after_dot[frac_len..];
            if int_part.is_empty() && frac_part.is_empty() {
                return None;
            }
        } else if int_part.is_empty() {
            return None;
        }

        let unit_len = rest
            .find(|c: char| c == '.' || c.is_ascii_digit())
            .unwrap_or(rest.len());
        let unit = unit_nanos(&rest[..unit_len])?;
        rest = &rest[unit_len..];

        let whole: u128 = if int_part.is_empty() {
            0
        } else {
            int_part.parse().ok()?
        };
        total = total.checked_add(whole.checked_mul(unit)?)?;

        if !frac_part.is_empty() {
            // Digits beyond nanosecond precision of an hour cannot matter
            let digits = &frac_part[..frac_part.len().min(18)];
            let numerator: u128 = digits.parse().ok()?;
            let scale = 10u128.pow(digits.len() as u32);
            total = total.checked_add(numerator * unit / scale)?;
        }

        if total > i64::MAX as u128 {
            return None;
        }
    }

    Some((negative, total))
}
