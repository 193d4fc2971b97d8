//! Security rules subsystem.
//!
//! # Data Flow
//! ```text
//! DD_APPSEC_RULES file or built-in recommended rules
//!     → fragment.rs (parse base document)
//!     → manager.rs (base + remote edits → compiled Ruleset)
//!     → atomic swap of Arc<Ruleset>
//!     → WAF reads the latest snapshot
//!
//! Remote configuration delivery:
//!     → updates.rs receives batches over a channel
//!     → manager.rs applies the batch, recompiles, swaps
//! ```
//!
//! # Design Decisions
//! - Rule syntax is opaque here; only document shape is validated
//! - A batch either applies fully or is rejected, keeping the current rules
//! - Readers never take a lock

pub mod fragment;
pub mod manager;
pub mod updates;

use thiserror::Error;

pub use fragment::{RuleDataEntry, RuleDataValue, RulesFragment};
pub use manager::{Ruleset, RulesManager, RulesUpdate};
pub use updates::RulesUpdater;

/// Built-in recommended rules, used when no rules file is configured.
pub static RECOMMENDED_RULES: &[u8] = include_bytes!("recommended.json");

/// Errors raised while building or updating a rules document.
#[derive(Debug, Error)]
pub enum RulesError {
    #[error("malformed rules document: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("rules document defines no rules")]
    Empty,

    #[error("entry #{index} of `{field}` has no string `id`")]
    MissingId { field: &'static str, index: usize },
}

pub type Result<T> = std::result::Result<T, RulesError>;
