//! Rules documents and their merge semantics.
//!
//! Individual rules, overrides, exclusions and actions are kept as opaque JSON
//! values; the WAF engine interprets them. Only rules data is understood here
//! because entries coming from several sources must be merged by value.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::rules::{Result, RulesError};

/// A full rules document or a partial one delivered by remote configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RulesFragment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<Value>,

    #[serde(default, rename = "rules_override", skip_serializing_if = "Vec::is_empty")]
    pub overrides: Vec<Value>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclusions: Vec<Value>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules_data: Vec<RuleDataEntry>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<Value>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub custom_rules: Vec<Value>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub processors: Vec<Value>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scanners: Vec<Value>,
}

/// Data referenced by rules, e.g. the `blocked_ips` list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleDataEntry {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Vec<RuleDataValue>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleDataValue {
    pub value: String,
    /// Unix timestamp in seconds; 0 never expires.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub expiration: u64,
}

fn is_zero(v: &u64) -> bool {
    *v == 0
}

impl RulesFragment {
    /// Parses a fragment and checks rule entries carry an `id`.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let fragment: RulesFragment = serde_json::from_slice(bytes)?;
        check_ids("rules", &fragment.rules)?;
        check_ids("custom_rules", &fragment.custom_rules)?;
        Ok(fragment)
    }

    /// Parses a document that must be usable on its own.
    pub fn parse_base(bytes: &[u8]) -> Result<Self> {
        let fragment = Self::parse(bytes)?;
        if fragment.rules.is_empty() && fragment.custom_rules.is_empty() {
            return Err(RulesError::Empty);
        }
        Ok(fragment)
    }

    /// `metadata.rules_version`, when present.
    pub fn rules_version(&self) -> Option<&str> {
        self.metadata
            .as_ref()
            .and_then(|m| m.get("rules_version"))
            .and_then(Value::as_str)
    }

    /// Appends everything in `other`. Version and metadata of `self` are kept.
    pub fn merge(&mut self, other: &RulesFragment) {
        self.rules.extend(other.rules.iter().cloned());
        self.overrides.extend(other.overrides.iter().cloned());
        self.exclusions.extend(other.exclusions.iter().cloned());
        self.actions.extend(other.actions.iter().cloned());
        self.custom_rules.extend(other.custom_rules.iter().cloned());
        self.processors.extend(other.processors.iter().cloned());
        self.scanners.extend(other.scanners.iter().cloned());
        self.rules_data = merge_rules_data(&self.rules_data, &other.rules_data);
    }
}

fn check_ids(field: &'static str, entries: &[Value]) -> Result<()> {
    match entries
        .iter()
        .position(|rule| !rule.get("id").is_some_and(Value::is_string))
    {
        Some(index) => Err(RulesError::MissingId { field, index }),
        None => Ok(()),
    }
}

/// Merges rules data by `(id, type)`, keeping for each value the expiration
/// that lasts longest.
pub fn merge_rules_data(a: &[RuleDataEntry], b: &[RuleDataEntry]) -> Vec<RuleDataEntry> {
    let mut merged: BTreeMap<(String, String), BTreeMap<String, u64>> = BTreeMap::new();

    for entry in a.iter().chain(b) {
        let values = merged
            .entry((entry.id.clone(), entry.kind.clone()))
            .or_default();
        for item in &entry.data {
            values
                .entry(item.value.clone())
                .and_modify(|exp| *exp = longest_expiration(*exp, item.expiration))
                .or_insert(item.expiration);
        }
    }

    merged
        .into_iter()
        .map(|((id, kind), values)| RuleDataEntry {
            id,
            kind,
            data: values
                .into_iter()
                .map(|(value, expiration)| RuleDataValue { value, expiration })
                .collect(),
        })
        .collect()
}

fn longest_expiration(current: u64, candidate: u64) -> u64 {
    if current == 0 || candidate == 0 {
        0
    } else {
        current.max(candidate)
    }
}
