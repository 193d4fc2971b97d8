//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! environment (EnvSource)
//!     → loader.rs (rules file or built-in rules → RulesManager)
//!     → duration.rs (WAF timeout)
//!     → validation.rs (trace rate limit, obfuscator patterns)
//!     → StartOption overrides, applied in order
//!     → Config (validated, shared with the WAF)
//!
//! On remote rules update:
//!     → rules::RulesUpdater applies the batch
//!     → atomic swap of the compiled ruleset inside the RulesManager
//!     → Config itself is unchanged
//! ```
//!
//! # Design Decisions
//! - Only the rules can fail construction; other settings self-heal to defaults
//! - Every rejected value is logged with the variable name and the value used
//! - Setters preserve invariants, so options cannot store invalid values

pub mod duration;
pub mod env;
pub mod loader;
pub mod remote;
pub mod schema;
pub mod validation;

pub use env::{EnvSource, MapEnv, ProcessEnv};
pub use loader::{is_enabled, new_config, ConfigError, Enablement};
pub use remote::ClientConfig;
pub use schema::{
    with_obfuscator, with_rc_config, with_rules_manager, with_trace_rate_limit, with_waf_timeout,
    Config, ConfigSummary, ObfuscatorConfig, StartOption,
};
