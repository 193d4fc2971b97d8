//! AppSec configuration resolution.
//!
//! Resolves the security rules, WAF timeout, trace rate limit and obfuscator
//! patterns consumed by the WAF, and keeps the active rules swappable for
//! remote configuration updates.

pub mod config;
pub mod observability;
pub mod rules;

pub use config::{new_config, Config, ConfigError, EnvSource};
pub use rules::{RulesManager, RulesUpdate, RulesUpdater};
