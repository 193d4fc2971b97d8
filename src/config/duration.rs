//! WAF timeout resolution.
//!
//! Values follow the Go duration grammar (`1s200ms`, `1.5ms`, `-3us`). A value
//! whose last character is not a letter is read as microseconds.

use std::time::Duration;
use thiserror::Error;

use crate::config::env::{EnvSource, WAF_TIMEOUT_ENV_VAR};
use crate::config::validation::{log_parse_error, log_unexpected_value};

/// Default unit appended to unit-less values.
const DEFAULT_UNIT_SUFFIX: &str = "us";

/// Errors from [`parse_duration`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DurationError {
    #[error("invalid duration {0:?}")]
    Invalid(String),

    #[error("missing unit in duration {0:?}")]
    MissingUnit(String),

    #[error("unknown unit {unit:?} in duration {input:?}")]
    UnknownUnit { unit: String, input: String },

    #[error("duration {0:?} overflows")]
    Overflow(String),
}

fn unit_nanos(unit: &str) -> Option<u64> {
    match unit {
        "ns" => Some(1),
        "us" | "\u{00b5}s" | "\u{03bc}s" => Some(1_000),
        "ms" => Some(1_000_000),
        "s" => Some(1_000_000_000),
        "m" => Some(60 * 1_000_000_000),
        "h" => Some(60 * 60 * 1_000_000_000),
        _ => None,
    }
}

/// Parses a duration expression into signed nanoseconds.
///
/// Accepts an optional sign followed by one or more `<number><unit>` terms,
/// where the number may carry a fraction. A bare `0` is the only value allowed
/// without a unit.
pub fn parse_duration(input: &str) -> Result<i64, DurationError> {
    let invalid = || DurationError::Invalid(input.to_string());
    let overflow = || DurationError::Overflow(input.to_string());

    let mut s = input;
    let mut negative = false;
    if let Some(rest) = s.strip_prefix('-') {
        negative = true;
        s = rest;
    } else if let Some(rest) = s.strip_prefix('+') {
        s = rest;
    }

    if s == "0" {
        return Ok(0);
    }
    if s.is_empty() {
        return Err(invalid());
    }

    let limit: u64 = 1 << 63;
    let mut total: u64 = 0;

    while !s.is_empty() {
        let bytes = s.as_bytes();
        if !(bytes[0] == b'.' || bytes[0].is_ascii_digit()) {
            return Err(invalid());
        }

        // Integer part.
        let int_len = bytes.iter().take_while(|b| b.is_ascii_digit()).count();
        let mut whole: u64 = 0;
        for &b in &bytes[..int_len] {
            whole = whole
                .checked_mul(10)
                .and_then(|v| v.checked_add(u64::from(b - b'0')))
                .filter(|v| *v <= limit)
                .ok_or_else(invalid)?;
        }
        s = &s[int_len..];

        // Fraction part; digits beyond u64 precision are dropped.
        let mut fraction: u64 = 0;
        let mut scale: f64 = 1.0;
        let mut frac_len = 0;
        if let Some(rest) = s.strip_prefix('.') {
            s = rest;
            let mut overflowed = false;
            for &b in s.as_bytes().iter().take_while(|b| b.is_ascii_digit()) {
                frac_len += 1;
                if overflowed {
                    continue;
                }
                match fraction
                    .checked_mul(10)
                    .and_then(|v| v.checked_add(u64::from(b - b'0')))
                {
                    Some(v) => {
                        fraction = v;
                        scale *= 10.0;
                    }
                    None => overflowed = true,
                }
            }
            s = &s[frac_len..];
        }
        if int_len == 0 && frac_len == 0 {
            return Err(invalid());
        }

        let unit_len = s
            .bytes()
            .take_while(|b| *b != b'.' && !b.is_ascii_digit())
            .count();
        if unit_len == 0 {
            return Err(DurationError::MissingUnit(input.to_string()));
        }
        let unit = &s[..unit_len];
        s = &s[unit_len..];
        let scale_nanos = unit_nanos(unit).ok_or_else(|| DurationError::UnknownUnit {
            unit: unit.to_string(),
            input: input.to_string(),
        })?;

        if whole > limit / scale_nanos {
            return Err(overflow());
        }
        let mut term = whole * scale_nanos;
        if fraction > 0 {
            term += (fraction as f64 * (scale_nanos as f64 / scale)) as u64;
            if term > limit {
                return Err(overflow());
            }
        }
        total = total
            .checked_add(term)
            .filter(|v| *v <= limit)
            .ok_or_else(overflow)?;
    }

    if negative {
        // -(1 << 63) is representable.
        return Ok((total as i64).wrapping_neg());
    }
    i64::try_from(total).map_err(|_| overflow())
}

/// Resolves a raw timeout value against `default`.
///
/// Never fails: unparsable or non-positive values are logged and replaced by
/// `default`. An empty value returns `default` silently.
pub fn resolve_duration(name: &str, raw: &str, default: Duration) -> Duration {
    if raw.is_empty() {
        return default;
    }

    let mut value = raw.to_string();
    if !raw.chars().last().is_some_and(char::is_alphabetic) {
        value.push_str(DEFAULT_UNIT_SUFFIX);
    }

    let nanos = match parse_duration(&value) {
        Ok(nanos) => nanos,
        Err(e) => {
            log_parse_error(name, &value, &e, &default);
            return default;
        }
    };
    if nanos <= 0 {
        log_unexpected_value(
            name,
            &value,
            "expecting a strictly positive duration",
            &default,
        );
        return default;
    }

    tracing::debug!(var = name, value = ?Duration::from_nanos(nanos as u64), "appsec: using configured WAF timeout");
    Duration::from_nanos(nanos as u64)
}

/// Reads `DD_APPSEC_WAF_TIMEOUT`.
pub fn read_waf_timeout<E: EnvSource + ?Sized>(env: &E, default: Duration) -> Duration {
    resolve_duration(WAF_TIMEOUT_ENV_VAR, &env.get(WAF_TIMEOUT_ENV_VAR), default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::env::MapEnv;

    const DEFAULT: Duration = Duration::from_millis(4);

    #[test]
    fn test_parse_duration_terms() {
        assert_eq!(parse_duration("200ms"), Ok(200_000_000));
        assert_eq!(parse_duration("1s200ms"), Ok(1_200_000_000));
        assert_eq!(parse_duration("1h2m"), Ok(3_720_000_000_000));
        assert_eq!(parse_duration("1.5us"), Ok(1_500));
        assert_eq!(parse_duration(".5s"), Ok(500_000_000));
        assert_eq!(parse_duration("3\u{00b5}s"), Ok(3_000));
        assert_eq!(parse_duration("-5us"), Ok(-5_000));
        assert_eq!(parse_duration("+7ns"), Ok(7));
        assert_eq!(parse_duration("0"), Ok(0));
    }

    #[test]
    fn test_parse_duration_errors() {
        assert!(matches!(parse_duration(""), Err(DurationError::Invalid(_))));
        assert!(matches!(parse_duration("-"), Err(DurationError::Invalid(_))));
        assert!(matches!(parse_duration("."), Err(DurationError::Invalid(_))));
        assert!(matches!(parse_duration("ms"), Err(DurationError::Invalid(_))));
        assert!(matches!(parse_duration("10"), Err(DurationError::MissingUnit(_))));
        assert!(matches!(
            parse_duration("10days"),
            Err(DurationError::UnknownUnit { .. })
        ));
        assert!(matches!(
            parse_duration("9999999999999h"),
            Err(DurationError::Overflow(_))
        ));
    }

    #[test]
    fn test_unitless_value_is_microseconds() {
        assert_eq!(
            resolve_duration(WAF_TIMEOUT_ENV_VAR, "1500", DEFAULT),
            Duration::from_micros(1500)
        );
        assert_eq!(
            resolve_duration(WAF_TIMEOUT_ENV_VAR, "2.5", DEFAULT),
            Duration::from_nanos(2500)
        );
    }

    #[test]
    fn test_explicit_unit() {
        assert_eq!(
            resolve_duration(WAF_TIMEOUT_ENV_VAR, "200ms", DEFAULT),
            Duration::from_millis(200)
        );
        assert_eq!(
            resolve_duration(WAF_TIMEOUT_ENV_VAR, "1s200ms", DEFAULT),
            Duration::from_millis(1200)
        );
    }

    #[test]
    fn test_empty_is_default() {
        assert_eq!(resolve_duration(WAF_TIMEOUT_ENV_VAR, "", DEFAULT), DEFAULT);
    }

    #[test]
    fn test_malformed_values_fall_back() {
        for raw in ["abc", "1x", "ms", "--5", "1..5", "5 ms", "1e3", "🙂", "9999999999999999999999"] {
            assert_eq!(
                resolve_duration(WAF_TIMEOUT_ENV_VAR, raw, DEFAULT),
                DEFAULT,
                "value {raw:?}"
            );
        }
    }

    #[test]
    fn test_non_positive_values_fall_back() {
        for raw in ["0", "-5", "-1ms", "0s", "0.0"] {
            assert_eq!(
                resolve_duration(WAF_TIMEOUT_ENV_VAR, raw, DEFAULT),
                DEFAULT,
                "value {raw:?}"
            );
        }
    }

    #[test]
    fn test_read_from_env() {
        let env = MapEnv::new().with(WAF_TIMEOUT_ENV_VAR, "10ms");
        assert_eq!(read_waf_timeout(&env, DEFAULT), Duration::from_millis(10));
        assert_eq!(read_waf_timeout(&MapEnv::new(), DEFAULT), DEFAULT);
    }
}
