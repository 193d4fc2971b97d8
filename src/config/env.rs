//! Environment access.
//!
//! Every resolver reads through [`EnvSource`] rather than `std::env`, so the
//! process environment is only touched by [`ProcessEnv`].

use std::collections::HashMap;
use std::ffi::OsString;

pub const ENABLED_ENV_VAR: &str = "DD_APPSEC_ENABLED";
pub const RULES_ENV_VAR: &str = "DD_APPSEC_RULES";
pub const WAF_TIMEOUT_ENV_VAR: &str = "DD_APPSEC_WAF_TIMEOUT";
pub const TRACE_RATE_LIMIT_ENV_VAR: &str = "DD_APPSEC_TRACE_RATE_LIMIT";
pub const OBFUSCATOR_KEY_ENV_VAR: &str = "DD_APPSEC_OBFUSCATION_PARAMETER_KEY_REGEXP";
pub const OBFUSCATOR_VALUE_ENV_VAR: &str = "DD_APPSEC_OBFUSCATION_PARAMETER_VALUE_REGEXP";

/// Read-only key/value view of the environment.
pub trait EnvSource {
    /// Returns the raw value of `name` and `None` when it is not set.
    fn lookup_os(&self, name: &str) -> Option<OsString>;

    /// Returns the value of `name` as text.
    ///
    /// A value that is not valid UTF-8 is logged and reported as unset, so
    /// string settings fall back to their defaults instead of being altered.
    fn lookup(&self, name: &str) -> Option<String> {
        match self.lookup_os(name)?.into_string() {
            Ok(value) => Some(value),
            Err(raw) => {
                tracing::error!(
                    var = name,
                    value = ?raw,
                    "appsec: the env var {} is not valid UTF-8. Using the default value instead.",
                    name
                );
                None
            }
        }
    }

    /// Value of `name`, empty when unset.
    fn get(&self, name: &str) -> String {
        self.lookup(name).unwrap_or_default()
    }
}

/// The real process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn lookup_os(&self, name: &str) -> Option<OsString> {
        std::env::var_os(name)
    }
}

/// Fixed set of variables, used for tests and embedding.
#[derive(Debug, Clone, Default)]
pub struct MapEnv {
    vars: HashMap<String, OsString>,
}

impl MapEnv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<OsString>) -> Self {
        self.vars.insert(name.into(), value.into());
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<OsString>) {
        self.vars.insert(name.into(), value.into());
    }

    pub fn remove(&mut self, name: &str) {
        self.vars.remove(name);
    }
}

impl<K: Into<String>, V: Into<OsString>> FromIterator<(K, V)> for MapEnv {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            vars: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

impl EnvSource for MapEnv {
    fn lookup_os(&self, name: &str) -> Option<OsString> {
        self.vars.get(name).cloned()
    }
}

impl<T: EnvSource + ?Sized> EnvSource for &T {
    fn lookup_os(&self, name: &str) -> Option<OsString> {
        (**self).lookup_os(name)
    }

    fn lookup(&self, name: &str) -> Option<String> {
        (**self).lookup(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_env_presence() {
        let env = MapEnv::new().with("A", "").with("B", "value");

        assert_eq!(env.lookup("A"), Some(String::new()));
        assert_eq!(env.lookup("B").as_deref(), Some("value"));
        assert_eq!(env.lookup("C"), None);
        assert_eq!(env.get("C"), "");
    }

    #[test]
    fn test_map_env_from_pairs() {
        let mut env: MapEnv = [("X", "1"), ("Y", "2")].into_iter().collect();
        env.remove("X");
        env.set("Z", "3");

        assert_eq!(env.lookup("X"), None);
        assert_eq!(env.get("Y"), "2");
        assert_eq!(env.get("Z"), "3");
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_value_reads_as_unset() {
        use std::os::unix::ffi::OsStringExt;

        let env = MapEnv::new().with("RAW", OsString::from_vec(b"a\xFFb".to_vec()));

        assert_eq!(
            env.lookup_os("RAW"),
            Some(OsString::from_vec(b"a\xFFb".to_vec()))
        );
        assert_eq!(env.lookup("RAW"), None);
        assert_eq!(env.get("RAW"), "");
    }
}
