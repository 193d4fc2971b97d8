//! Self-healing resolvers for the non-fatal settings.
//!
//! # Responsibilities
//! - Parse the trace rate limit and reject non-positive values
//! - Validate the obfuscator regular expressions
//! - Report every rejected value along with the default used instead
//!
//! # Design Decisions
//! - Resolvers are total: bad input is logged and replaced, never returned
//! - Patterns are compiled for validation only; the source string is kept

use std::fmt::{Debug, Display};

use regex::Regex;

use crate::config::env::{
    EnvSource, OBFUSCATOR_KEY_ENV_VAR, OBFUSCATOR_VALUE_ENV_VAR, TRACE_RATE_LIMIT_ENV_VAR,
};
use crate::config::schema::{
    ObfuscatorConfig, DEFAULT_OBFUSCATOR_KEY_REGEX, DEFAULT_OBFUSCATOR_VALUE_REGEX,
};

pub(crate) fn log_parse_error(name: &str, value: &str, err: &dyn Display, default: &dyn Debug) {
    tracing::error!(
        var = name,
        value,
        "appsec: could not parse the env var {}={}: {}. Using default value {:?}.",
        name,
        value,
        err,
        default
    );
}

pub(crate) fn log_unexpected_value(name: &str, value: &dyn Display, reason: &str, default: &dyn Debug) {
    tracing::error!(
        var = name,
        value = %value,
        "appsec: unexpected configuration value of {}={}: {}. Using default value {:?}.",
        name,
        value,
        reason,
        default
    );
}

/// Resolves a raw trace rate limit against `default`.
///
/// Only a strictly positive parsed value is accepted.
pub fn resolve_rate_limit(name: &str, raw: &str, default: i64) -> i64 {
    if raw.is_empty() {
        return default;
    }

    let parsed = match raw.parse::<i64>() {
        Ok(parsed) => parsed,
        Err(e) => {
            log_parse_error(name, raw, &e, &default);
            return default;
        }
    };
    if parsed <= 0 {
        log_unexpected_value(
            name,
            &parsed,
            "expecting a value strictly greater than 0",
            &default,
        );
        return default;
    }

    tracing::debug!(var = name, value = parsed, "appsec: using configured trace rate limit");
    parsed
}

/// Reads `DD_APPSEC_TRACE_RATE_LIMIT`.
pub fn read_rate_limit<E: EnvSource + ?Sized>(env: &E, default: i64) -> i64 {
    resolve_rate_limit(
        TRACE_RATE_LIMIT_ENV_VAR,
        &env.get(TRACE_RATE_LIMIT_ENV_VAR),
        default,
    )
}

/// Returns whether `pattern` compiles.
pub fn is_valid_pattern(pattern: &str) -> Result<(), regex::Error> {
    Regex::new(pattern).map(|_| ())
}

/// Resolves one obfuscator pattern from an optional raw value.
pub fn resolve_obfuscator_regex(name: &str, raw: Option<&str>, default: &str) -> String {
    let Some(value) = raw else {
        tracing::debug!(
            var = name,
            "appsec: {} not defined, starting with the default obfuscator regular expression",
            name
        );
        return default.to_string();
    };

    if let Err(e) = is_valid_pattern(value) {
        tracing::error!(
            var = name,
            value,
            error = %e,
            "appsec: could not compile the configured obfuscator regular expression `{}={}`. Using the default value instead",
            name,
            value
        );
        return default.to_string();
    }

    tracing::debug!(
        var = name,
        value,
        "appsec: starting with the configured obfuscator regular expression {}",
        name
    );
    value.to_string()
}

/// Reads both obfuscator variables independently.
pub fn read_obfuscator<E: EnvSource + ?Sized>(env: &E) -> ObfuscatorConfig {
    let key = env.lookup(OBFUSCATOR_KEY_ENV_VAR);
    let value = env.lookup(OBFUSCATOR_VALUE_ENV_VAR);

    ObfuscatorConfig {
        key_regex: resolve_obfuscator_regex(
            OBFUSCATOR_KEY_ENV_VAR,
            key.as_deref(),
            DEFAULT_OBFUSCATOR_KEY_REGEX,
        ),
        value_regex: resolve_obfuscator_regex(
            OBFUSCATOR_VALUE_ENV_VAR,
            value.as_deref(),
            DEFAULT_OBFUSCATOR_VALUE_REGEX,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::env::MapEnv;

    #[test]
    fn test_rate_limit_accepts_positive() {
        assert_eq!(resolve_rate_limit(TRACE_RATE_LIMIT_ENV_VAR, "42", 100), 42);
        assert_eq!(resolve_rate_limit(TRACE_RATE_LIMIT_ENV_VAR, "1", 100), 1);
    }

    #[test]
    fn test_rate_limit_empty_is_default() {
        assert_eq!(resolve_rate_limit(TRACE_RATE_LIMIT_ENV_VAR, "", 100), 100);
    }

    #[test]
    fn test_rate_limit_rejects_parsed_non_positive() {
        // The default is positive, so only a check on the parsed value can reject these.
        assert_eq!(resolve_rate_limit(TRACE_RATE_LIMIT_ENV_VAR, "0", 100), 100);
        assert_eq!(resolve_rate_limit(TRACE_RATE_LIMIT_ENV_VAR, "-5", 100), 100);
        assert_eq!(
            resolve_rate_limit(TRACE_RATE_LIMIT_ENV_VAR, "-9223372036854775808", 100),
            100
        );
    }

    #[test]
    fn test_rate_limit_rejects_unparsable() {
        for raw in ["abc", "1.5", " 10", "10/s", "99999999999999999999"] {
            assert_eq!(
                resolve_rate_limit(TRACE_RATE_LIMIT_ENV_VAR, raw, 100),
                100,
                "value {raw:?}"
            );
        }
    }

    #[test]
    fn test_default_patterns_compile() {
        assert!(is_valid_pattern(DEFAULT_OBFUSCATOR_KEY_REGEX).is_ok());
        assert!(is_valid_pattern(DEFAULT_OBFUSCATOR_VALUE_REGEX).is_ok());
    }

    #[test]
    fn test_obfuscator_defaults_when_unset() {
        let obfuscator = read_obfuscator(&MapEnv::new());
        assert_eq!(obfuscator, ObfuscatorConfig::default());
    }

    #[test]
    fn test_obfuscator_keeps_literal_pattern() {
        let env = MapEnv::new().with(OBFUSCATOR_KEY_ENV_VAR, "(?i)session_?id");
        let obfuscator = read_obfuscator(&env);

        assert_eq!(obfuscator.key_regex, "(?i)session_?id");
        assert_eq!(obfuscator.value_regex, DEFAULT_OBFUSCATOR_VALUE_REGEX);
    }

    #[test]
    fn test_obfuscator_invalid_patterns_are_independent() {
        let env = MapEnv::new()
            .with(OBFUSCATOR_KEY_ENV_VAR, "(unclosed")
            .with(OBFUSCATOR_VALUE_ENV_VAR, "secret=[a-z]+");
        let obfuscator = read_obfuscator(&env);
        assert_eq!(obfuscator.key_regex, DEFAULT_OBFUSCATOR_KEY_REGEX);
        assert_eq!(obfuscator.value_regex, "secret=[a-z]+");

        let env = MapEnv::new()
            .with(OBFUSCATOR_KEY_ENV_VAR, "api_key")
            .with(OBFUSCATOR_VALUE_ENV_VAR, "[z-a]");
        let obfuscator = read_obfuscator(&env);
        assert_eq!(obfuscator.key_regex, "api_key");
        assert_eq!(obfuscator.value_regex, DEFAULT_OBFUSCATOR_VALUE_REGEX);
    }

    #[test]
    fn test_obfuscator_empty_pattern_is_accepted() {
        // Present but empty is a valid pattern, not an absent variable.
        let env = MapEnv::new().with(OBFUSCATOR_VALUE_ENV_VAR, "");
        assert_eq!(read_obfuscator(&env).value_regex, "");
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_pattern_falls_back() {
        use std::ffi::OsString;
        use std::os::unix::ffi::OsStringExt;

        let env = MapEnv::new()
            .with(OBFUSCATOR_KEY_ENV_VAR, OsString::from_vec(b"pass\xFFword".to_vec()))
            .with(OBFUSCATOR_VALUE_ENV_VAR, "card_?number")
            .with(TRACE_RATE_LIMIT_ENV_VAR, OsString::from_vec(b"5\xFF".to_vec()));
        let obfuscator = read_obfuscator(&env);

        assert_eq!(obfuscator.key_regex, DEFAULT_OBFUSCATOR_KEY_REGEX);
        assert_eq!(obfuscator.value_regex, "card_?number");
        assert_eq!(read_rate_limit(&env, 100), 100);
    }
}
