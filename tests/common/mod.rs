//! Shared fixtures for the integration tests.

use std::io::Write;

use appsec_config::config::MapEnv;
use appsec_config::config::env::RULES_ENV_VAR;
use tempfile::NamedTempFile;

/// A small but complete rules document.
pub const CUSTOM_RULES: &str = r#"{
  "version": "2.2",
  "metadata": { "rules_version": "0.0.1-test" },
  "rules": [
    {
      "id": "test-001",
      "name": "Test rule",
      "tags": { "type": "lfi", "category": "attack_attempt" },
      "conditions": [
        {
          "operator": "match_regex",
          "parameters": { "inputs": [{ "address": "server.request.query" }], "regex": "etc/passwd" }
        }
      ]
    }
  ]
}"#;

/// Write `content` to a temporary rules file.
pub fn rules_file(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

/// An environment pointing `DD_APPSEC_RULES` at `file`.
pub fn env_with_rules(file: &NamedTempFile) -> MapEnv {
    MapEnv::new().with(RULES_ENV_VAR, file.path())
}
