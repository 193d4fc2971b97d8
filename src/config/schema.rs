//! Configuration schema definitions.
//!
//! `Config` is the snapshot handed to the WAF execution layer. Its fields are
//! only reachable through accessors and invariant-preserving setters so that a
//! timeout, a rate limit or an obfuscator pattern can never be stored invalid.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::remote::ClientConfig;
use crate::config::validation::is_valid_pattern;
use crate::rules::RulesManager;

/// Maximum WAF execution time when nothing else is configured.
pub const DEFAULT_WAF_TIMEOUT: Duration = Duration::from_millis(4);

/// Up to 100 AppSec traces per second.
pub const DEFAULT_TRACE_RATE_LIMIT: i64 = 100;

pub const DEFAULT_OBFUSCATOR_KEY_REGEX: &str = r"(?i)(?:p(?:ass)?w(?:or)?d|pass(?:_?phrase)?|secret|(?:api_?|private_?|public_?)key)|token|consumer_?(?:id|key|secret)|sign(?:ed|ature)|bearer|authorization";

pub const DEFAULT_OBFUSCATOR_VALUE_REGEX: &str = r#"(?i)(?:p(?:ass)?w(?:or)?d|pass(?:_?phrase)?|secret|(?:api_?|private_?|public_?|access_?|secret_?)key(?:_?id)?|token|consumer_?(?:id|key|secret)|sign(?:ed|ature)?|auth(?:entication|orization)?)(?:\s*=[^;]|"\s*:\s*"[^"]+")|bearer\s+[a-z0-9\._\-]+|token:[a-z0-9]{13}|gh[opsu]_[0-9a-zA-Z]{36}|ey[I-L][\w=-]+\.ey[I-L][\w=-]+(?:\.[\w.+\/=-]+)?|[\-]{5}BEGIN[a-z\s]+PRIVATE\sKEY[\-]{5}[^\-]+[\-]{5}END[a-z\s]+PRIVATE\sKEY|ssh-rsa\s*[a-z0-9\/\.+]{100,}"#;

/// Key and value patterns passed to the WAF for obfuscation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObfuscatorConfig {
    pub key_regex: String,
    pub value_regex: String,
}

impl Default for ObfuscatorConfig {
    fn default() -> Self {
        Self {
            key_regex: DEFAULT_OBFUSCATOR_KEY_REGEX.to_string(),
            value_regex: DEFAULT_OBFUSCATOR_VALUE_REGEX.to_string(),
        }
    }
}

/// A customization applied after the base configuration is resolved.
pub type StartOption = Box<dyn FnOnce(&mut Config) + Send>;

/// Installs the remote configuration client settings.
pub fn with_rc_config(cfg: ClientConfig) -> StartOption {
    Box::new(move |c: &mut Config| {
        c.set_remote_config(Some(cfg));
    })
}

/// Uses `manager` instead of the rules resolved from the environment.
pub fn with_rules_manager(manager: Arc<RulesManager>) -> StartOption {
    Box::new(move |c: &mut Config| {
        c.set_rules_manager(manager);
    })
}

/// Forces the WAF timeout.
pub fn with_waf_timeout(timeout: Duration) -> StartOption {
    Box::new(move |c: &mut Config| {
        c.set_waf_timeout(timeout);
    })
}

/// Forces the trace rate limit.
pub fn with_trace_rate_limit(rate: i64) -> StartOption {
    Box::new(move |c: &mut Config| {
        c.set_trace_rate_limit(rate);
    })
}

/// Forces the obfuscator patterns.
pub fn with_obfuscator(obfuscator: ObfuscatorConfig) -> StartOption {
    Box::new(move |c: &mut Config| {
        c.set_obfuscator(obfuscator);
    })
}

/// The AppSec configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Rules from `DD_APPSEC_RULES`, or the built-in recommended rules which
    /// remote configuration may update.
    pub(crate) rules_manager: Arc<RulesManager>,
    /// Maximum WAF execution time.
    pub(crate) waf_timeout: Duration,
    /// AppSec trace rate limit (traces per second).
    pub(crate) trace_rate_limit: i64,
    pub(crate) obfuscator: ObfuscatorConfig,
    /// `None` when remote configuration is disabled (default).
    pub(crate) remote_config: Option<ClientConfig>,
}

impl Config {
    pub fn rules_manager(&self) -> &Arc<RulesManager> {
        &self.rules_manager
    }

    pub fn waf_timeout(&self) -> Duration {
        self.waf_timeout
    }

    pub fn trace_rate_limit(&self) -> i64 {
        self.trace_rate_limit
    }

    pub fn obfuscator(&self) -> &ObfuscatorConfig {
        &self.obfuscator
    }

    pub fn remote_config(&self) -> Option<&ClientConfig> {
        self.remote_config.as_ref()
    }

    /// Replaces the rules manager, e.g. with one shared across components.
    pub fn set_rules_manager(&mut self, manager: Arc<RulesManager>) -> &mut Self {
        self.rules_manager = manager;
        self
    }

    /// Sets the WAF timeout. A zero timeout is ignored.
    pub fn set_waf_timeout(&mut self, timeout: Duration) -> &mut Self {
        if timeout.is_zero() {
            tracing::warn!(current = ?self.waf_timeout, "appsec: ignoring a zero WAF timeout override");
        } else {
            self.waf_timeout = timeout;
        }
        self
    }

    /// Sets the trace rate limit. Non-positive values are ignored.
    pub fn set_trace_rate_limit(&mut self, rate: i64) -> &mut Self {
        if rate <= 0 {
            tracing::warn!(
                rate,
                current = self.trace_rate_limit,
                "appsec: ignoring a non-positive trace rate limit override"
            );
        } else {
            self.trace_rate_limit = rate;
        }
        self
    }

    /// Sets the obfuscator patterns. Each pattern that fails to compile keeps
    /// its current value.
    pub fn set_obfuscator(&mut self, obfuscator: ObfuscatorConfig) -> &mut Self {
        let ObfuscatorConfig {
            key_regex,
            value_regex,
        } = obfuscator;

        match is_valid_pattern(&key_regex) {
            Ok(()) => self.obfuscator.key_regex = key_regex,
            Err(e) => tracing::error!(error = %e, "appsec: ignoring invalid obfuscator key regular expression override"),
        }
        match is_valid_pattern(&value_regex) {
            Ok(()) => self.obfuscator.value_regex = value_regex,
            Err(e) => tracing::error!(error = %e, "appsec: ignoring invalid obfuscator value regular expression override"),
        }
        self
    }

    pub fn set_remote_config(&mut self, cfg: Option<ClientConfig>) -> &mut Self {
        self.remote_config = cfg;
        self
    }

    /// Applies options in order; later options win.
    pub fn apply<I>(&mut self, options: I) -> &mut Self
    where
        I: IntoIterator<Item = StartOption>,
    {
        for option in options {
            option(self);
        }
        self
    }

    /// Serializable view of the resolved settings.
    pub fn summary(&self) -> ConfigSummary {
        let ruleset = self.rules_manager.latest();
        ConfigSummary {
            waf_timeout_us: self.waf_timeout.as_micros(),
            trace_rate_limit: self.trace_rate_limit,
            obfuscator: self.obfuscator.clone(),
            rules_version: ruleset.version().map(str::to_string),
            rules_revision: ruleset.revision(),
            rules_count: ruleset.rules_count(),
            remote_config: self.remote_config.clone(),
        }
    }
}

/// Snapshot of a [`Config`] for display.
#[derive(Debug, Clone, Serialize)]
pub struct ConfigSummary {
    pub waf_timeout_us: u128,
    pub trace_rate_limit: i64,
    pub obfuscator: ObfuscatorConfig,
    pub rules_version: Option<String>,
    pub rules_revision: u64,
    pub rules_count: usize,
    pub remote_config: Option<ClientConfig>,
}
