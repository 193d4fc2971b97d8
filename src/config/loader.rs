//! Configuration assembly.

use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use crate::config::duration::read_waf_timeout;
use crate::config::env::{EnvSource, ProcessEnv, ENABLED_ENV_VAR, RULES_ENV_VAR};
use crate::config::schema::{Config, StartOption, DEFAULT_TRACE_RATE_LIMIT, DEFAULT_WAF_TIMEOUT};
use crate::config::validation::{read_obfuscator, read_rate_limit};
use crate::rules::{RulesError, RulesManager, RECOMMENDED_RULES};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read the security rules file {}: {source}", .path.display())]
    RulesLoad {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Rules(#[from] RulesError),

    #[error("could not parse DD_APPSEC_ENABLED value `{value}` as a boolean value")]
    InvalidEnabled { value: String },
}

/// Result of reading `DD_APPSEC_ENABLED`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Enablement {
    pub enabled: bool,
    /// Whether the variable is present at all, even empty.
    pub set: bool,
}

/// Reads `DD_APPSEC_ENABLED`.
///
/// An empty or absent value means disabled. Accepted spellings are
/// `1 t T TRUE true True` and `0 f F FALSE false False`.
pub fn is_enabled<E: EnvSource + ?Sized>(env: &E) -> Result<Enablement, ConfigError> {
    let raw = env.lookup(ENABLED_ENV_VAR);
    let set = raw.is_some();
    let value = raw.unwrap_or_default();

    let enabled = match value.as_str() {
        "" => false,
        "1" | "t" | "T" | "TRUE" | "true" | "True" => true,
        "0" | "f" | "F" | "FALSE" | "false" | "False" => false,
        _ => return Err(ConfigError::InvalidEnabled { value }),
    };
    Ok(Enablement { enabled, set })
}

/// Returns the rule document bytes: the file named by `DD_APPSEC_RULES`, or
/// the built-in recommended rules when unset or empty.
pub fn read_rules<E: EnvSource + ?Sized>(env: &E) -> Result<Vec<u8>, ConfigError> {
    // Paths are taken as raw OS strings; they need not be UTF-8.
    let path = match env.lookup_os(RULES_ENV_VAR) {
        Some(path) if !path.is_empty() => PathBuf::from(path),
        _ => {
            tracing::debug!("appsec: using the default built-in recommended security rules");
            return Ok(RECOMMENDED_RULES.to_vec());
        }
    };

    match fs::read(&path) {
        Ok(buf) => {
            tracing::debug!(path = %path.display(), "appsec: using the security rules from file {}", path.display());
            Ok(buf)
        }
        Err(source) => {
            if source.kind() == io::ErrorKind::NotFound {
                tracing::error!(
                    path = %path.display(),
                    "appsec: could not find the rules file in path {}: {}.",
                    path.display(),
                    source
                );
            }
            Err(ConfigError::RulesLoad { path, source })
        }
    }
}

/// Resolves the configuration from `env`, then applies `options` in order.
///
/// Only the rules can fail construction; every other setting falls back to
/// its default.
pub fn new_config<E, I>(env: &E, options: I) -> Result<Config, ConfigError>
where
    E: EnvSource + ?Sized,
    I: IntoIterator<Item = StartOption>,
{
    let rules = read_rules(env)?;
    let rules_manager = RulesManager::new(&rules)?;

    let mut config = Config {
        rules_manager: Arc::new(rules_manager),
        waf_timeout: read_waf_timeout(env, DEFAULT_WAF_TIMEOUT),
        trace_rate_limit: read_rate_limit(env, DEFAULT_TRACE_RATE_LIMIT),
        obfuscator: read_obfuscator(env),
        remote_config: None,
    };
    config.apply(options);

    Ok(config)
}

impl Config {
    /// Resolves the configuration from the process environment.
    pub fn from_env(options: Vec<StartOption>) -> Result<Self, ConfigError> {
        new_config(&ProcessEnv, options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::env::MapEnv;

    #[test]
    fn test_is_enabled() {
        let cases = [
            (None, false, false),
            (Some(""), false, true),
            (Some("1"), true, true),
            (Some("True"), true, true),
            (Some("f"), false, true),
            (Some("FALSE"), false, true),
        ];
        for (value, enabled, set) in cases {
            let mut env = MapEnv::new();
            if let Some(v) = value {
                env.set(ENABLED_ENV_VAR, v);
            }
            assert_eq!(
                is_enabled(&env).unwrap(),
                Enablement { enabled, set },
                "value {value:?}"
            );
        }
    }

    #[test]
    fn test_is_enabled_rejects_garbage() {
        for value in ["yes", "on", "tRuE", " 1"] {
            let env = MapEnv::new().with(ENABLED_ENV_VAR, value);
            assert!(matches!(
                is_enabled(&env),
                Err(ConfigError::InvalidEnabled { .. })
            ));
        }
    }

    #[test]
    fn test_read_rules_default_is_stable() {
        let env = MapEnv::new().with(RULES_ENV_VAR, "");
        let first = read_rules(&env).unwrap();
        let second = read_rules(&MapEnv::new()).unwrap();

        assert_eq!(first, RECOMMENDED_RULES);
        assert_eq!(first, second);
    }

    #[test]
    fn test_read_rules_missing_file() {
        let env = MapEnv::new().with(RULES_ENV_VAR, "/nonexistent/appsec/rules.json");
        match read_rules(&env) {
            Err(ConfigError::RulesLoad { path, source }) => {
                assert_eq!(path, PathBuf::from("/nonexistent/appsec/rules.json"));
                assert_eq!(source.kind(), io::ErrorKind::NotFound);
            }
            other => panic!("expected RulesLoad, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_read_rules_non_utf8_path() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(OsStr::from_bytes(b"rules-\xFF.json"));
        fs::write(&path, br#"{"rules":[{"id":"r1"}]}"#).unwrap();

        let env = MapEnv::new().with(RULES_ENV_VAR, path.as_os_str());
        assert_eq!(read_rules(&env).unwrap(), br#"{"rules":[{"id":"r1"}]}"#);

        let config = new_config(&env, Vec::new()).unwrap();
        assert_eq!(config.rules_manager().latest().rules_count(), 1);
    }

    #[test]
    fn test_new_config_defaults() {
        let config = new_config(&MapEnv::new(), Vec::new()).unwrap();

        assert_eq!(config.waf_timeout(), DEFAULT_WAF_TIMEOUT);
        assert_eq!(config.trace_rate_limit(), DEFAULT_TRACE_RATE_LIMIT);
        assert!(config.remote_config().is_none());
    }
}
